// Vector (type 1000) layer: windowing, decimation and projection

use crate::core::error::Result;
use crate::core::format::SignalHeader;
use crate::core::layer::{
    finite_extrema, index_bounds, is_degenerate, Backing, Leveler, RedrawContext, Windowed,
};
use crate::core::transform::{project, Mode};
use crate::models::plot_config::{Decimation, PlotConfig};
use tracing::{debug, trace};

/// Projected points ready for clipping. Storage is reused across redraws.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointBuffer {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl PointBuffer {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn clear(&mut self) {
        self.x.clear();
        self.y.clear();
    }

    pub fn push(&mut self, x: f64, y: f64) {
        self.x.push(x);
        self.y.push(y);
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.x.iter().copied().zip(self.y.iter().copied())
    }
}

/// Key identifying what the window currently holds.
#[derive(Debug, Clone, Copy, PartialEq)]
struct WindowKey {
    first: u64,
    last: u64,
    skip: u64,
    generation: u64,
    mode: Mode,
}

pub struct Layer1D {
    header: SignalHeader,
    backing: Backing,
    mode: Mode,
    bufmax: usize,
    log_floor: f64,
    decimation: Decimation,
    key: Option<WindowKey>,
    // window: abscissa and raw (re, im) per retained atom
    wx: Vec<f64>,
    wre: Vec<f64>,
    wim: Vec<f64>,
    points: PointBuffer,
    leveler: Leveler,
}

impl Layer1D {
    pub fn new(header: SignalHeader, backing: Backing, config: &PlotConfig) -> Self {
        Self {
            header,
            backing,
            mode: config.mode,
            bufmax: config.bufmax.max(2),
            log_floor: config.log_floor,
            decimation: config.decimation,
            key: None,
            wx: Vec::new(),
            wre: Vec::new(),
            wim: Vec::new(),
            points: PointBuffer::default(),
            leveler: Leveler::new(config.autol),
        }
    }

    pub fn points(&self) -> &PointBuffer {
        &self.points
    }

    /// Atoms held by the current window.
    pub fn window_len(&self) -> usize {
        self.wx.len()
    }

    /// Index of the first atom in the window.
    pub fn element_offset(&self) -> u64 {
        self.window_range().map_or(0, |(first, _)| first)
    }

    /// Atoms spanned by the window before decimation.
    pub fn window_size(&self) -> u64 {
        self.window_range().map_or(0, |(first, last)| last - first + 1)
    }

    /// Absolute index range `[first, last]` of the current window.
    pub fn window_range(&self) -> Option<(u64, u64)> {
        self.key.filter(|_| !self.wx.is_empty()).map(|k| (k.first, k.last))
    }

    pub fn set_decimation(&mut self, decimation: Decimation) {
        if self.decimation != decimation {
            self.decimation = decimation;
            self.key = None;
        }
    }

    /// Abscissa span of the available samples, ascending.
    pub fn domain(&self) -> Option<(f64, f64)> {
        let (start, end) = self.backing.atom_range();
        if start >= end {
            return None;
        }
        let a = self.header.x_at(start as f64);
        let b = self.header.x_at((end - 1) as f64);
        Some((a.min(b), a.max(b)))
    }

    fn clear_window(&mut self) {
        self.wx.clear();
        self.wre.clear();
        self.wim.clear();
    }

    fn fill_window(&mut self, first: u64, last: u64, skip: u64) -> Result<()> {
        let source = self.backing.source()?;
        let header = &self.header;
        let (wx, wre, wim) = (&mut self.wx, &mut self.wre, &mut self.wim);
        wx.clear();
        wre.clear();
        wim.clear();

        let mut keep = |atom: u64| {
            let (re, im) = source.pair(atom);
            wx.push(header.x_at(atom as f64));
            wre.push(re);
            wim.push(im);
        };

        match self.decimation {
            Decimation::Subsample => {
                let mut atom = first;
                while atom <= last {
                    keep(atom);
                    atom += skip;
                }
                // keep the far edge so the window still brackets x_max
                if (last - first) % skip != 0 {
                    keep(last);
                }
            }
            Decimation::MinMax => {
                let mut bucket = first;
                while bucket <= last {
                    let end = (bucket + skip - 1).min(last);
                    let mut lo: Option<(u64, f64)> = None;
                    let mut hi: Option<(u64, f64)> = None;
                    for atom in bucket..=end {
                        let (re, im) = source.pair(atom);
                        let v = project(self.mode, re, im, self.log_floor);
                        if !v.is_finite() {
                            continue;
                        }
                        if lo.map_or(true, |(_, m)| v < m) {
                            lo = Some((atom, v));
                        }
                        if hi.map_or(true, |(_, m)| v > m) {
                            hi = Some((atom, v));
                        }
                    }
                    match (lo, hi) {
                        (Some((a, _)), Some((b, _))) if a == b => keep(a),
                        (Some((a, _)), Some((b, _))) => {
                            keep(a.min(b));
                            keep(a.max(b));
                        }
                        // bucket entirely non-finite: keep one so gaps survive
                        _ => keep(bucket),
                    }
                    bucket = end + 1;
                }
            }
        }
        Ok(())
    }

    /// Window slice `[a, b]` that covers `[lo, hi]` plus one point beyond
    /// each edge.
    fn visible_slice(&self, lo: f64, hi: f64) -> Option<(usize, usize)> {
        let n = self.wx.len();
        if n == 0 {
            return None;
        }
        let inside = |x: f64| x >= lo && x <= hi;
        let first_in = self.wx.iter().position(|&x| inside(x));
        let last_in = self.wx.iter().rposition(|&x| inside(x));
        match (first_in, last_in) {
            (Some(a), Some(b)) => Some((a.saturating_sub(1), (b + 1).min(n - 1))),
            _ => {
                // no sample inside, but a segment may still span the view
                self.wx.windows(2).position(|w| {
                    let (p, q) = (w[0].min(w[1]), w[0].max(w[1]));
                    p < lo && q > hi
                })
                .map(|k| (k, k + 1))
            }
        }
    }
}

impl Windowed for Layer1D {
    fn header(&self) -> &SignalHeader {
        &self.header
    }

    fn get_data(&mut self, x_min: f64, x_max: f64) -> Result<()> {
        let (lo, hi) = (x_min.min(x_max), x_min.max(x_max));
        let (start, end) = self.backing.atom_range();
        let bounds = if start < end && !is_degenerate(lo, hi) {
            index_bounds(lo, hi, self.header.xstart, self.header.xdelta, start, end - 1)
        } else {
            None
        };
        let Some((first, last)) = bounds else {
            trace!("Window [{}, {}] holds no samples", lo, hi);
            self.clear_window();
            self.key = None;
            return Ok(());
        };

        let span = last - first + 1;
        let bufmax = self.bufmax as u64;
        let skip = match self.decimation {
            Decimation::Subsample if span > bufmax => {
                // the far edge is appended after the stride, so stride over
                // one point fewer
                (span - 1).div_ceil(bufmax - 1)
            }
            Decimation::Subsample => 1,
            // two points per bucket
            Decimation::MinMax => span.div_ceil((bufmax / 2).max(1)),
        }
        .max(1);

        let key = WindowKey {
            first,
            last,
            skip,
            generation: self.backing.generation(),
            mode: self.mode,
        };
        let same_mode = |k: &WindowKey| match self.decimation {
            Decimation::Subsample => true,
            Decimation::MinMax => k.mode == key.mode,
        };
        if let Some(cached) = self.key {
            let exact =
                cached.first == key.first && cached.last == key.last && cached.skip == key.skip;
            // an undecimated window already holds every atom of a narrower one
            let covered =
                cached.skip == 1 && key.skip == 1 && cached.first <= first && last <= cached.last;
            if (exact || covered) && cached.generation == key.generation && same_mode(&cached) {
                trace!("Window cache hit [{}, {}]", first, last);
                return Ok(());
            }
        }

        self.fill_window(first, last, skip)?;
        self.key = Some(key);
        debug!(
            "Loaded window [{}, {}] skip={} points={}",
            first,
            last,
            skip,
            self.wx.len()
        );
        Ok(())
    }

    fn prep(&mut self, x_min: f64, x_max: f64, ctx: &mut RedrawContext) -> usize {
        if let Some((a, b)) = self.domain() {
            if !self.mode.projects_abscissa() {
                ctx.include_x(a, b);
            }
        }

        self.points.clear();
        let (lo, hi) = (x_min.min(x_max), x_min.max(x_max));
        if is_degenerate(lo, hi) {
            return 0;
        }
        let slice = if self.mode.projects_abscissa() {
            (!self.wx.is_empty()).then(|| (0, self.wx.len() - 1))
        } else {
            self.visible_slice(lo, hi)
        };
        let Some((a, b)) = slice else {
            return 0;
        };

        for k in a..=b {
            let (re, im) = (self.wre[k], self.wim[k]);
            let y = project(self.mode, re, im, self.log_floor);
            let x = if self.mode.projects_abscissa() { re } else { self.wx[k] };
            self.points.push(x, y);
        }

        if self.mode.projects_abscissa() {
            if let Some((xa, xb)) = finite_extrema(&self.points.x) {
                ctx.include_x(xa, xb);
            }
        }
        if let Some(measured) = finite_extrema(&self.points.y) {
            let (ymin, ymax) = self.leveler.update(measured);
            ctx.include_y(ymin, ymax);
        }
        self.points.len()
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn set_mode(&mut self, mode: Mode) {
        if self.mode != mode {
            self.mode = mode;
            self.leveler.reset();
        }
    }

    fn extrema(&self) -> Option<(f64, f64)> {
        self.leveler.current()
    }

    fn backing(&self) -> &Backing {
        &self.backing
    }

    fn backing_mut(&mut self) -> &mut Backing {
        &mut self.backing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::HeaderOverrides;
    use crate::core::format::FormatCode;
    use crate::core::layer::{attach_layer, LayerWindow};
    use crate::core::reader::SignalFile;
    use crate::core::transform::{LogScale, PhaseUnits};

    fn overrides(format: &str, xstart: f64, xdelta: f64) -> HeaderOverrides {
        HeaderOverrides {
            format: Some(FormatCode::new(format).unwrap()),
            xstart: Some(xstart),
            xdelta: Some(xdelta),
            ..Default::default()
        }
    }

    fn vector(samples: &[f64], format: &str, config: &PlotConfig) -> Layer1D {
        let file = SignalFile::from_samples(&overrides(format, 0.0, 1.0), samples).unwrap();
        match attach_layer(file, config).unwrap() {
            LayerWindow::Vector(layer) => layer,
            LayerWindow::Matrix(_) => panic!("expected a vector layer"),
        }
    }

    fn ramp(n: usize) -> Vec<f64> {
        (0..n).map(|i| (i * i) as f64).collect()
    }

    #[test]
    fn test_window_brackets_view() {
        let samples = ramp(100);
        let mut layer = vector(&samples, "SF", &PlotConfig::default());
        let mut ctx = RedrawContext::new();
        layer.get_data(10.0, 20.0).unwrap();
        let n = layer.prep(10.0, 20.0, &mut ctx);

        assert_eq!(n, 13);
        let pts = layer.points();
        assert_eq!(pts.x.first(), Some(&9.0));
        assert_eq!(pts.x.last(), Some(&21.0));
        for (x, y) in pts.iter() {
            assert_eq!(y, samples[x as usize]);
        }
        assert_eq!(layer.extrema(), Some((81.0, 441.0)));
        assert_eq!(ctx.x_range(), Some((0.0, 99.0)));
        assert_eq!(ctx.y_range(), Some((81.0, 441.0)));
    }

    #[test]
    fn test_repeat_redraw_is_idempotent() {
        let mut layer = vector(&ramp(100), "SF", &PlotConfig::default());
        let mut ctx = RedrawContext::new();
        layer.get_data(10.0, 20.0).unwrap();
        layer.prep(10.0, 20.0, &mut ctx);
        let first = layer.points().clone();
        let extrema = layer.extrema();

        layer.get_data(10.0, 20.0).unwrap();
        layer.prep(10.0, 20.0, &mut ctx);
        assert_eq!(layer.points(), &first);
        assert_eq!(layer.extrema(), extrema);
    }

    #[test]
    fn test_window_clamped_to_domain() {
        let mut layer = vector(&ramp(50), "SD", &PlotConfig::default());
        let mut ctx = RedrawContext::new();
        layer.get_data(-1000.0, 1000.0).unwrap();
        assert_eq!(layer.window_range(), Some((0, 49)));
        assert_eq!(layer.element_offset(), 0);
        assert_eq!(layer.window_size(), 50);
        assert_eq!(layer.prep(-1000.0, 1000.0, &mut ctx), 50);
    }

    #[test]
    fn test_window_outside_domain() {
        let mut layer = vector(&ramp(50), "SF", &PlotConfig::default());
        let mut ctx = RedrawContext::new();
        layer.get_data(500.0, 600.0).unwrap();
        assert_eq!(layer.window_len(), 0);
        assert_eq!(layer.prep(500.0, 600.0, &mut ctx), 0);
        assert_eq!(layer.extrema(), None);
        // domain still reaches the shared accumulators
        assert_eq!(ctx.x_range(), Some((0.0, 49.0)));
        assert_eq!(ctx.y_range(), None);
    }

    #[test]
    fn test_empty_view_keeps_extrema() {
        let mut layer = vector(&ramp(50), "SF", &PlotConfig::default());
        let mut ctx = RedrawContext::new();
        layer.get_data(0.0, 49.0).unwrap();
        layer.prep(0.0, 49.0, &mut ctx);
        let before = layer.extrema();
        layer.get_data(200.0, 300.0).unwrap();
        assert_eq!(layer.prep(200.0, 300.0, &mut ctx), 0);
        assert_eq!(layer.extrema(), before);
    }

    #[test]
    fn test_subsample_bound_across_spans() {
        for bufmax in [2, 3, 7, 100] {
            let config = PlotConfig {
                bufmax,
                ..Default::default()
            };
            let mut layer = vector(&ramp(500), "SF", &config);
            let mut ctx = RedrawContext::new();
            for hi in [1.0, 5.0, 98.0, 99.0, 100.0, 101.0, 250.0, 499.0] {
                layer.get_data(0.0, hi).unwrap();
                let n = layer.prep(0.0, hi, &mut ctx);
                assert!(n <= bufmax, "bufmax {} hi {}: {} points", bufmax, hi, n);
                assert_eq!(layer.points().x.first(), Some(&0.0));
            }
        }
    }

    #[test]
    fn test_zero_width_view_is_empty() {
        let mut layer = vector(&ramp(50), "SF", &PlotConfig::default());
        let mut ctx = RedrawContext::new();
        layer.get_data(5.0, 5.0).unwrap();
        assert_eq!(layer.window_len(), 0);
        assert_eq!(layer.prep(5.0, 5.0, &mut ctx), 0);
        assert_eq!(layer.extrema(), None);
        assert_eq!(ctx.x_range(), Some((0.0, 49.0)));

        // a loaded window does not leak into a zero-width prep
        layer.get_data(0.0, 10.0).unwrap();
        layer.prep(0.0, 10.0, &mut ctx);
        let before = layer.extrema();
        assert_eq!(layer.prep(5.0, 5.0, &mut ctx), 0);
        assert!(layer.points().is_empty());
        assert_eq!(layer.extrema(), before);
        assert_eq!(layer.prep(f64::NAN, 5.0, &mut ctx), 0);
    }

    #[test]
    fn test_zoom_in_reuses_window() {
        let mut layer = vector(&ramp(100), "SF", &PlotConfig::default());
        let mut ctx = RedrawContext::new();
        layer.get_data(0.0, 60.0).unwrap();
        assert_eq!(layer.window_range(), Some((0, 61)));

        layer.get_data(10.0, 20.0).unwrap();
        assert_eq!(layer.window_range(), Some((0, 61)));
        assert_eq!(layer.prep(10.0, 20.0, &mut ctx), 13);
        assert_eq!(layer.points().x.first(), Some(&9.0));
        assert_eq!(layer.points().x.last(), Some(&21.0));

        // panning past the loaded edge reloads
        layer.get_data(70.0, 80.0).unwrap();
        assert_eq!(layer.window_range(), Some((69, 81)));
    }

    #[test]
    fn test_descending_abscissa() {
        let samples = ramp(100);
        let file = SignalFile::from_samples(&overrides("SF", 100.0, -1.0), &samples).unwrap();
        let mut layer = match attach_layer(file, &PlotConfig::default()).unwrap() {
            LayerWindow::Vector(layer) => layer,
            LayerWindow::Matrix(_) => unreachable!(),
        };
        let mut ctx = RedrawContext::new();
        layer.get_data(80.0, 90.0).unwrap();
        assert_eq!(layer.window_range(), Some((9, 21)));
        let n = layer.prep(80.0, 90.0, &mut ctx);
        assert_eq!(n, 13);
        assert_eq!(layer.points().x.first(), Some(&91.0));
        assert_eq!(layer.points().x.last(), Some(&79.0));
    }

    #[test]
    fn test_subsample_respects_bufmax() {
        let config = PlotConfig {
            bufmax: 100,
            ..Default::default()
        };
        let mut layer = vector(&ramp(1000), "SF", &config);
        layer.get_data(0.0, 999.0).unwrap();
        assert!(layer.window_len() <= config.bufmax);
        let mut ctx = RedrawContext::new();
        assert!(layer.prep(0.0, 999.0, &mut ctx) <= config.bufmax);
        assert_eq!(layer.points().x.first(), Some(&0.0));
        assert_eq!(layer.points().x.last(), Some(&999.0));
    }

    #[test]
    fn test_minmax_keeps_spikes() {
        let mut samples = vec![0.0; 1000];
        samples[333] = 50.0;
        samples[777] = -50.0;
        let config = PlotConfig {
            bufmax: 64,
            decimation: Decimation::MinMax,
            ..Default::default()
        };
        let mut layer = vector(&samples, "SF", &config);
        let mut ctx = RedrawContext::new();
        layer.get_data(0.0, 999.0).unwrap();
        assert!(layer.window_len() <= 64);
        layer.prep(0.0, 999.0, &mut ctx);
        assert_eq!(layer.extrema(), Some((-50.0, 50.0)));
        assert!(layer.points().x.contains(&333.0));
        assert!(layer.points().x.contains(&777.0));
    }

    #[test]
    fn test_complex_modes() {
        let samples = [3.0, 4.0, 0.0, 1.0, -1.0, 0.0];
        let mut layer = vector(&samples, "CF", &PlotConfig::default());
        let mut ctx = RedrawContext::new();
        layer.get_data(0.0, 2.0).unwrap();

        layer.prep(0.0, 2.0, &mut ctx);
        assert_eq!(layer.points().y, vec![3.0, 0.0, -1.0]);

        layer.set_mode(Mode::Magnitude);
        assert_eq!(layer.extrema(), None);
        layer.prep(0.0, 2.0, &mut ctx);
        assert_eq!(layer.points().y, vec![5.0, 1.0, 1.0]);

        layer.set_mode(Mode::Phase(PhaseUnits::Degrees));
        layer.prep(0.0, 2.0, &mut ctx);
        assert!((layer.points().y[1] - 90.0).abs() < 1e-9);

        layer.set_mode(Mode::RealVsImaginary);
        layer.prep(0.0, 2.0, &mut ctx);
        assert_eq!(layer.points().x, vec![3.0, 0.0, -1.0]);
        assert_eq!(layer.points().y, vec![4.0, 1.0, 0.0]);
    }

    #[test]
    fn test_log_mode_on_zero_magnitude() {
        let config = PlotConfig {
            mode: Mode::Log10(LogScale::Twenty),
            log_floor: 1e-6,
            ..Default::default()
        };
        let mut layer = vector(&[0.0, 10.0, 100.0], "SF", &config);
        let mut ctx = RedrawContext::new();
        layer.get_data(0.0, 2.0).unwrap();
        layer.prep(0.0, 2.0, &mut ctx);
        for (got, want) in layer.points().y.iter().zip([-120.0, 20.0, 40.0]) {
            assert!((got - want).abs() < 1e-9, "{} != {}", got, want);
        }
    }

    #[test]
    fn test_autol_smooths_extrema() {
        let config = PlotConfig {
            autol: 2.0,
            ..Default::default()
        };
        let samples: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let mut layer = vector(&samples, "SF", &config);
        let mut ctx = RedrawContext::new();
        layer.get_data(1.0, 3.0).unwrap();
        layer.prep(1.0, 3.0, &mut ctx);
        assert_eq!(layer.extrema(), Some((0.0, 4.0)));

        layer.get_data(11.0, 13.0).unwrap();
        layer.prep(11.0, 13.0, &mut ctx);
        assert_eq!(layer.extrema(), Some((5.0, 9.0)));
    }

    #[test]
    fn test_streaming_layer() {
        let pipe = SignalFile::pipe(&overrides("SF", 0.0, 0.5), 64 * 4).unwrap();
        let config = PlotConfig {
            pipe_history: Some(8),
            ..Default::default()
        };
        let mut window = attach_layer(pipe, &config).unwrap();
        let mut ctx = RedrawContext::new();

        let batch: Vec<f64> = (0..6).map(|i| i as f64).collect();
        window.push(&batch).unwrap();
        assert_eq!(window.pull().unwrap(), 6);
        window.get_data(0.0, 100.0).unwrap();
        assert_eq!(window.prep(0.0, 100.0, &mut ctx), 6);

        let batch: Vec<f64> = (6..12).map(|i| i as f64).collect();
        window.push(&batch).unwrap();
        assert_eq!(window.pull().unwrap(), 6);
        window.get_data(0.0, 100.0).unwrap();
        assert_eq!(window.prep(0.0, 100.0, &mut ctx), 8);

        let layer = window.as_vector().unwrap();
        // atoms 4..12 at xdelta 0.5
        assert_eq!(layer.points().x.first(), Some(&2.0));
        assert_eq!(layer.points().y.last(), Some(&11.0));
        assert_eq!(layer.domain(), Some((2.0, 5.5)));
    }
}
