// Error handling for the signal codec, ring buffer and layers

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SignalError>;

#[derive(Error, Debug)]
pub enum SignalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Truncated header: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    #[error("Unknown representation tag: {0:?}")]
    UnknownRepresentation(String),

    #[error("Unknown format code: {0:?}")]
    UnknownFormat(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Out of range: offset {offset} + {len} exceeds {available}")]
    OutOfRange {
        offset: usize,
        len: usize,
        available: usize,
    },

    #[error("Pipe full: {requested} elements requested, {free} free")]
    Overflow { requested: usize, free: usize },

    #[error("Negative element count: {0}")]
    Negative(i64),

    #[error("Header does not describe a pipe")]
    NotAPipe,

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("Degenerate view: {0}")]
    DegenerateView(String),
}

impl SignalError {
    /// Header problems that retrying cannot fix.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            SignalError::Truncated { .. }
                | SignalError::UnknownRepresentation(_)
                | SignalError::UnknownFormat(_)
                | SignalError::InvalidHeader(_)
        )
    }

    /// Conditions the caller can back off from and retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SignalError::Overflow { .. } | SignalError::OutOfRange { .. }
        )
    }
}
