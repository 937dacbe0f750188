use crate::core::constants::{DEFAULT_BUFMAX, DEFAULT_LOG_FLOOR};
use crate::core::transform::Mode;
use serde::{Deserialize, Serialize};

/// How a span wider than the working set is reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decimation {
    /// Every n-th atom.
    #[default]
    Subsample,
    /// Minimum and maximum of each bucket, in abscissa order.
    MinMax,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    /// Working-set cap: most points (or grid cells) a layer hands to rendering.
    pub bufmax: usize,
    pub log_floor: f64,
    /// 0 or 1 replaces extrema on every prep; above 1 blends with factor 1/autol.
    pub autol: f64,
    pub decimation: Decimation,
    /// Atoms a streaming layer retains; defaults to `bufmax`.
    pub pipe_history: Option<usize>,
    pub mode: Mode,
    /// Invoke ring-buffer listeners during `append` instead of deferring.
    pub sync_dispatch: bool,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            bufmax: DEFAULT_BUFMAX,
            log_floor: DEFAULT_LOG_FLOOR,
            autol: 0.0,
            decimation: Decimation::default(),
            pipe_history: None,
            mode: Mode::default(),
            sync_dispatch: false,
        }
    }
}

impl PlotConfig {
    pub fn history(&self) -> usize {
        self.pipe_history.unwrap_or(self.bufmax).max(1)
    }
}
