use std::collections::HashMap;

use tracing::{debug, info};

use crate::core::clip::{assemble, Rect, Trace, TraceStyle, Transform};
use crate::core::error::{Result, SignalError};
use crate::core::layer::{attach_layer, LayerWindow, RedrawContext};
use crate::core::reader::SignalFile;
use crate::models::plot_config::PlotConfig;

pub struct PlotLayer {
    pub window: LayerWindow,
    pub style: TraceStyle,
    /// Name the caller asked for before it was made unique.
    pub requested_name: String,
}

/// Output of one redraw pass.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Clipped traces of vector layers, in attach order.
    pub traces: Vec<(String, Trace)>,
    /// Points or cells each layer prepared, in attach order.
    pub prepared: Vec<(String, usize)>,
    pub context: RedrawContext,
}

pub struct PlotState {
    config: PlotConfig,
    layers: HashMap<String, PlotLayer>,
    order: Vec<String>,
}

impl PlotState {
    pub fn new(config: PlotConfig) -> Self {
        Self {
            config,
            layers: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn config(&self) -> &PlotConfig {
        &self.config
    }

    /// Attach `file` as a new layer. Returns the registered name, suffixed
    /// with `_1`, `_2`, ... when `name` is taken.
    pub fn attach(&mut self, name: &str, file: SignalFile, style: TraceStyle) -> Result<String> {
        let window = attach_layer(file, &self.config)?;

        let mut final_name = name.to_string();
        let mut i = 1;
        while self.layers.contains_key(&final_name) {
            final_name = format!("{}_{}", name, i);
            i += 1;
        }

        info!("Register layer: {} (requested: {})", final_name, name);
        self.layers.insert(
            final_name.clone(),
            PlotLayer {
                window,
                style,
                requested_name: name.to_string(),
            },
        );
        self.order.push(final_name.clone());
        Ok(final_name)
    }

    pub fn detach(&mut self, name: &str) -> Option<PlotLayer> {
        let layer = self.layers.remove(name)?;
        self.order.retain(|n| n != name);
        debug!("Detached layer {}", name);
        Some(layer)
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn layer(&self, name: &str) -> Option<&PlotLayer> {
        self.layers.get(name)
    }

    pub fn layer_mut(&mut self, name: &str) -> Option<&mut PlotLayer> {
        self.layers.get_mut(name)
    }

    /// Run get_data, prep and clipping for every layer over the real-space
    /// `view`, mapped onto `pixel`.
    pub fn redraw(&mut self, view: Rect, pixel: Rect) -> Result<Frame> {
        let transform = Transform::from_view(view, pixel).ok_or_else(|| {
            SignalError::DegenerateView(format!(
                "{} x {} real-space view",
                view.width(),
                view.height()
            ))
        })?;

        let mut frame = Frame::default();
        let mut ctx = RedrawContext::new();
        for name in &self.order {
            let Some(layer) = self.layers.get_mut(name) else {
                continue;
            };
            layer.window.pull()?;
            layer.window.get_data(view.x1, view.x2)?;
            let n = layer.window.prep(view.x1, view.x2, &mut ctx);
            frame.prepared.push((name.clone(), n));

            if let Some(vector) = layer.window.as_vector() {
                let trace = assemble(vector.points(), &pixel, &transform, layer.style);
                frame.traces.push((name.clone(), trace));
            }
        }
        frame.context = ctx;
        debug!("Redrew {} layers", frame.prepared.len());
        Ok(frame)
    }
}
