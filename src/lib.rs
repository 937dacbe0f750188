// sigtrace: signal-file codec, windowed layers and trace clipping
// Main library entry point

pub mod core;
pub mod models;
pub mod state;
pub mod utils;

// Re-export main types
pub use crate::core::clip::{assemble, Rect, Segment, Trace, TraceStyle, Transform};
pub use crate::core::codec::{element_size, parse_header, serialize_header, synthesize, HeaderOverrides, Payload};
pub use crate::core::error::{Result, SignalError};
pub use crate::core::format::{DataClass, Endian, FormatCode, ScalarType, SignalHeader};
pub use crate::core::layer::{attach_layer, LayerWindow, RedrawContext, Windowed};
pub use crate::core::layer1d::PointBuffer;
pub use crate::core::layer2d::GridBuffer;
pub use crate::core::reader::SignalFile;
pub use crate::core::ring::{Dispatch, RingBuffer};
pub use crate::core::transform::{project, LogScale, Mode, PhaseUnits};
pub use models::plot_config::{Decimation, PlotConfig};
pub use state::plot_state::{Frame, PlotState};

/// Parse just the header of an in-memory signal file.
pub fn open(bytes: &[u8]) -> Result<SignalHeader> {
    parse_header(bytes)
}
