// Per-trace layer state shared by vector and matrix layers

use crate::core::error::{Result, SignalError};
use crate::core::format::{DataClass, SignalHeader};
use crate::core::layer1d::Layer1D;
use crate::core::layer2d::Layer2D;
use crate::core::reader::SignalFile;
use crate::core::ring::{Dispatch, RingBuffer};
use crate::core::transform::Mode;
use crate::core::view::TypedView;
use crate::models::plot_config::PlotConfig;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Pan/zoom accumulators shared by every layer during one redraw pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RedrawContext {
    pub panxmin: f64,
    pub panxmax: f64,
    pub panymin: f64,
    pub panymax: f64,
    pub panzmin: f64,
    pub panzmax: f64,
}

impl Default for RedrawContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RedrawContext {
    pub fn new() -> Self {
        Self {
            panxmin: f64::INFINITY,
            panxmax: f64::NEG_INFINITY,
            panymin: f64::INFINITY,
            panymax: f64::NEG_INFINITY,
            panzmin: f64::INFINITY,
            panzmax: f64::NEG_INFINITY,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn include_x(&mut self, lo: f64, hi: f64) {
        include(&mut self.panxmin, &mut self.panxmax, lo, hi);
    }

    pub fn include_y(&mut self, lo: f64, hi: f64) {
        include(&mut self.panymin, &mut self.panymax, lo, hi);
    }

    pub fn include_z(&mut self, lo: f64, hi: f64) {
        include(&mut self.panzmin, &mut self.panzmax, lo, hi);
    }

    pub fn x_range(&self) -> Option<(f64, f64)> {
        range(self.panxmin, self.panxmax)
    }

    pub fn y_range(&self) -> Option<(f64, f64)> {
        range(self.panymin, self.panymax)
    }

    pub fn z_range(&self) -> Option<(f64, f64)> {
        range(self.panzmin, self.panzmax)
    }
}

fn include(min: &mut f64, max: &mut f64, lo: f64, hi: f64) {
    if lo.is_finite() {
        *min = min.min(lo);
    }
    if hi.is_finite() {
        *max = max.max(hi);
    }
}

fn range(lo: f64, hi: f64) -> Option<(f64, f64)> {
    if lo <= hi {
        Some((lo, hi))
    } else {
        None
    }
}

/// Running autoscale bounds. With `autol > 1` each new measurement is
/// blended in with weight `1/autol`, independent of elapsed time.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Leveler {
    autol: f64,
    current: Option<(f64, f64)>,
}

impl Leveler {
    pub fn new(autol: f64) -> Self {
        Self {
            autol,
            current: None,
        }
    }

    pub fn current(&self) -> Option<(f64, f64)> {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = None;
    }

    pub fn update(&mut self, measured: (f64, f64)) -> (f64, f64) {
        let next = match self.current {
            Some((lo, hi)) if self.autol > 1.0 => {
                let fac = 1.0 / self.autol;
                (
                    fac * measured.0 + (1.0 - fac) * lo,
                    fac * measured.1 + (1.0 - fac) * hi,
                )
            }
            _ => measured,
        };
        self.current = Some(next);
        next
    }
}

/// Finite min/max of `values`, or `None` when no value is finite.
pub(crate) fn finite_extrema(values: &[f64]) -> Option<(f64, f64)> {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Streaming payload: a ring buffer drained into a bounded rolling history.
pub struct PipeSource {
    ring: RingBuffer,
    history: VecDeque<f64>,
    history_atoms: usize,
    first_atom: u64,
    scalars_per_atom: usize,
    scratch: Vec<f64>,
    dirty: Arc<AtomicBool>,
    dispatch: Dispatch,
    generation: u64,
}

impl PipeSource {
    pub fn new(mut ring: RingBuffer, history_atoms: usize, scalars_per_atom: usize, dispatch: Dispatch) -> Self {
        let dirty = Arc::new(AtomicBool::new(false));
        let flag = dirty.clone();
        ring.on_write(move |_| flag.store(true, Ordering::Release));
        Self {
            ring,
            history: VecDeque::with_capacity(history_atoms * scalars_per_atom),
            history_atoms: history_atoms.max(1),
            first_atom: 0,
            scalars_per_atom: scalars_per_atom.max(1),
            scratch: Vec::new(),
            dirty,
            dispatch,
            generation: 0,
        }
    }

    pub fn ring(&self) -> &RingBuffer {
        &self.ring
    }

    pub fn ring_mut(&mut self) -> &mut RingBuffer {
        &mut self.ring
    }

    /// Producer side: append interleaved scalars to the ring.
    pub fn push(&mut self, samples: &[f64]) -> Result<()> {
        self.ring.append_with(samples, self.dispatch)
    }

    /// Deliver pending notifications and report whether data arrived since
    /// the last call.
    pub fn take_dirty(&mut self) -> bool {
        self.ring.dispatch_pending();
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Drain whole atoms from the ring into the history. Returns atoms moved.
    pub fn pull(&mut self) -> Result<usize> {
        self.take_dirty();
        let spa = self.scalars_per_atom;
        let scalars = self.ring.available() / spa * spa;
        if scalars == 0 {
            return Ok(0);
        }
        self.scratch.resize(scalars, 0.0);
        let got = self.ring.consume(&mut self.scratch, Some(scalars as i64))?;
        self.history.extend(&self.scratch[..got]);

        let limit = self.history_atoms * spa;
        if self.history.len() > limit {
            let excess = self.history.len() - limit;
            self.history.drain(..excess);
            self.first_atom += (excess / spa) as u64;
        }
        self.generation += 1;
        trace!("Pulled {} atoms from pipe", got / spa);
        Ok(got / spa)
    }

    pub fn atom_range(&self) -> (u64, u64) {
        let len = (self.history.len() / self.scalars_per_atom) as u64;
        (self.first_atom, self.first_atom + len)
    }
}

/// Where a layer's samples live.
pub enum Backing {
    Resident(SignalFile),
    Pipe(PipeSource),
}

impl Backing {
    /// Absolute atom indices available, as `[start, end)`.
    pub fn atom_range(&self) -> (u64, u64) {
        match self {
            Backing::Resident(file) => (0, file.header().size as u64),
            Backing::Pipe(pipe) => pipe.atom_range(),
        }
    }

    /// Changes whenever the available samples change.
    pub fn generation(&self) -> u64 {
        match self {
            Backing::Resident(_) => 0,
            Backing::Pipe(pipe) => pipe.generation,
        }
    }

    pub(crate) fn source(&self) -> Result<Source<'_>> {
        match self {
            Backing::Resident(file) => Ok(Source::View(file.view()?)),
            Backing::Pipe(pipe) => Ok(Source::History {
                history: &pipe.history,
                first_atom: pipe.first_atom,
                scalars_per_atom: pipe.scalars_per_atom,
            }),
        }
    }

    pub fn pipe(&self) -> Option<&PipeSource> {
        match self {
            Backing::Pipe(pipe) => Some(pipe),
            Backing::Resident(_) => None,
        }
    }

    pub fn pipe_mut(&mut self) -> Option<&mut PipeSource> {
        match self {
            Backing::Pipe(pipe) => Some(pipe),
            Backing::Resident(_) => None,
        }
    }
}

/// Random access to atoms by absolute index.
pub(crate) enum Source<'a> {
    View(TypedView<'a>),
    History {
        history: &'a VecDeque<f64>,
        first_atom: u64,
        scalars_per_atom: usize,
    },
}

impl Source<'_> {
    /// `(re, im)` of atom `atom`; `im` is 0 for real data. Callers stay
    /// within `Backing::atom_range`.
    pub(crate) fn pair(&self, atom: u64) -> (f64, f64) {
        match self {
            Source::View(view) => view.pair(atom as usize).unwrap_or((f64::NAN, f64::NAN)),
            Source::History {
                history,
                first_atom,
                scalars_per_atom,
            } => {
                let base = (atom - first_atom) as usize * scalars_per_atom;
                let re = history.get(base).copied().unwrap_or(f64::NAN);
                let im = if *scalars_per_atom > 1 {
                    history.get(base + 1).copied().unwrap_or(f64::NAN)
                } else {
                    0.0
                };
                (re, im)
            }
        }
    }
}

/// A view with zero width or a non-finite bound shows nothing.
pub(crate) fn is_degenerate(x_min: f64, x_max: f64) -> bool {
    !x_min.is_finite() || !x_max.is_finite() || x_min == x_max
}

/// Index bounds `[i1, i2]` covering `[lo, hi]` on an axis with origin
/// `start` and step `delta`, widened by one sample each side and clamped to
/// `[first, last]`. `None` when the window misses the range entirely.
pub(crate) fn index_bounds(
    lo: f64,
    hi: f64,
    start: f64,
    delta: f64,
    first: u64,
    last: u64,
) -> Option<(u64, u64)> {
    if delta == 0.0 || !delta.is_finite() || !lo.is_finite() || !hi.is_finite() {
        return None;
    }
    let a = (lo - start) / delta;
    let b = (hi - start) / delta;
    let (a, b) = (a.min(b), a.max(b));
    let i1 = (a.floor() - 1.0).max(first as f64);
    let i2 = (b.ceil() + 1.0).min(last as f64);
    if i1 > i2 {
        return None;
    }
    Some((i1 as u64, i2 as u64))
}

/// Operations every layer offers the redraw loop.
pub trait Windowed {
    fn header(&self) -> &SignalHeader;

    /// Make the backing window cover `[x_min, x_max]`.
    fn get_data(&mut self, x_min: f64, x_max: f64) -> Result<()>;

    /// Project and decimate the window, update extrema and the shared
    /// accumulators. Returns the number of points (or cells) produced.
    fn prep(&mut self, x_min: f64, x_max: f64, ctx: &mut RedrawContext) -> usize;

    fn mode(&self) -> Mode;

    fn set_mode(&mut self, mode: Mode);

    fn extrema(&self) -> Option<(f64, f64)>;

    fn backing(&self) -> &Backing;

    fn backing_mut(&mut self) -> &mut Backing;

    /// Drain streamed data into the window's store. No-op for resident data.
    fn pull(&mut self) -> Result<usize> {
        match self.backing_mut().pipe_mut() {
            Some(pipe) => pipe.pull(),
            None => Ok(0),
        }
    }

    /// Append streamed samples. Fails with `NotAPipe` for resident layers.
    fn push(&mut self, samples: &[f64]) -> Result<()> {
        self.backing_mut()
            .pipe_mut()
            .ok_or(SignalError::NotAPipe)?
            .push(samples)
    }
}

/// A trace attached to a signal file: vector or matrix.
pub enum LayerWindow {
    Vector(Layer1D),
    Matrix(Layer2D),
}

impl LayerWindow {
    pub fn as_windowed(&self) -> &dyn Windowed {
        match self {
            LayerWindow::Vector(layer) => layer,
            LayerWindow::Matrix(layer) => layer,
        }
    }

    pub fn as_windowed_mut(&mut self) -> &mut dyn Windowed {
        match self {
            LayerWindow::Vector(layer) => layer,
            LayerWindow::Matrix(layer) => layer,
        }
    }

    pub fn header(&self) -> &SignalHeader {
        self.as_windowed().header()
    }

    pub fn get_data(&mut self, x_min: f64, x_max: f64) -> Result<()> {
        self.as_windowed_mut().get_data(x_min, x_max)
    }

    pub fn prep(&mut self, x_min: f64, x_max: f64, ctx: &mut RedrawContext) -> usize {
        self.as_windowed_mut().prep(x_min, x_max, ctx)
    }

    pub fn pull(&mut self) -> Result<usize> {
        self.as_windowed_mut().pull()
    }

    pub fn push(&mut self, samples: &[f64]) -> Result<()> {
        self.as_windowed_mut().push(samples)
    }

    pub fn mode(&self) -> Mode {
        self.as_windowed().mode()
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.as_windowed_mut().set_mode(mode)
    }

    pub fn extrema(&self) -> Option<(f64, f64)> {
        self.as_windowed().extrema()
    }

    pub fn ring(&self) -> Option<&RingBuffer> {
        self.as_windowed().backing().pipe().map(PipeSource::ring)
    }

    pub fn ring_mut(&mut self) -> Option<&mut RingBuffer> {
        self.as_windowed_mut()
            .backing_mut()
            .pipe_mut()
            .map(PipeSource::ring_mut)
    }

    pub fn as_vector(&self) -> Option<&Layer1D> {
        match self {
            LayerWindow::Vector(layer) => Some(layer),
            LayerWindow::Matrix(_) => None,
        }
    }

    pub fn as_matrix(&self) -> Option<&Layer2D> {
        match self {
            LayerWindow::Matrix(layer) => Some(layer),
            LayerWindow::Vector(_) => None,
        }
    }
}

/// Attach a layer to `file`. Pipe headers get a ring buffer sized by
/// `pipesize`; resident files keep their payload.
pub fn attach_layer(file: SignalFile, config: &PlotConfig) -> Result<LayerWindow> {
    let header = file.header().clone();
    let class = header.class();
    let backing = if header.pipe {
        let ring = RingBuffer::from_header(&header)?;
        let history = match class {
            DataClass::Vector => config.history(),
            DataClass::Matrix => {
                let rows = (config.history() / header.subsize.max(1)).max(1);
                rows * header.subsize.max(1)
            }
        };
        let dispatch = if config.sync_dispatch {
            Dispatch::Sync
        } else {
            Dispatch::Deferred
        };
        debug!("Pipe layer keeps {} atoms of history", history);
        Backing::Pipe(PipeSource::new(
            ring,
            history,
            header.format.scalars_per_atom(),
            dispatch,
        ))
    } else {
        Backing::Resident(file)
    };

    info!(
        "Attached {:?} layer: format={} size={} pipe={}",
        class, header.format, header.size, header.pipe
    );
    Ok(match class {
        DataClass::Vector => LayerWindow::Vector(Layer1D::new(header, backing, config)),
        DataClass::Matrix => LayerWindow::Matrix(Layer2D::new(header, backing, config)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redraw_context_accumulates() {
        let mut ctx = RedrawContext::new();
        assert_eq!(ctx.x_range(), None);
        ctx.include_x(0.0, 10.0);
        ctx.include_x(-5.0, 3.0);
        ctx.include_y(1.0, f64::NAN);
        assert_eq!(ctx.x_range(), Some((-5.0, 10.0)));
        assert_eq!(ctx.y_range(), None);
        ctx.include_y(f64::NEG_INFINITY, 2.0);
        assert_eq!(ctx.y_range(), Some((1.0, 2.0)));
        ctx.reset();
        assert_eq!(ctx.x_range(), None);
    }

    #[test]
    fn test_leveler_direct_and_blended() {
        let mut direct = Leveler::new(0.0);
        direct.update((0.0, 10.0));
        assert_eq!(direct.update((2.0, 4.0)), (2.0, 4.0));

        let mut blended = Leveler::new(4.0);
        assert_eq!(blended.update((0.0, 8.0)), (0.0, 8.0));
        assert_eq!(blended.update((4.0, 0.0)), (1.0, 6.0));
        assert_eq!(blended.update((4.0, 0.0)), (1.75, 4.5));
    }

    #[test]
    fn test_index_bounds() {
        assert_eq!(index_bounds(10.0, 20.0, 0.0, 1.0, 0, 99), Some((9, 21)));
        assert_eq!(index_bounds(-50.0, 500.0, 0.0, 1.0, 0, 99), Some((0, 99)));
        assert_eq!(index_bounds(200.0, 300.0, 0.0, 1.0, 0, 99), None);
        // descending abscissa: xstart 100, xdelta -1
        assert_eq!(index_bounds(80.0, 90.0, 100.0, -1.0, 0, 99), Some((9, 21)));
        assert_eq!(index_bounds(0.0, 1.0, 0.0, 0.0, 0, 99), None);
    }

    #[test]
    fn test_degenerate_ranges() {
        assert!(is_degenerate(5.0, 5.0));
        assert!(is_degenerate(f64::NAN, 1.0));
        assert!(is_degenerate(0.0, f64::INFINITY));
        assert!(!is_degenerate(2.0, 1.0));
    }

    #[test]
    fn test_finite_extrema() {
        assert_eq!(finite_extrema(&[f64::NAN, 3.0, -1.0, f64::INFINITY]), Some((-1.0, 3.0)));
        assert_eq!(finite_extrema(&[f64::NAN]), None);
    }

    #[test]
    fn test_pipe_source_rolls_history() {
        let ring = RingBuffer::new(16 * 8, crate::core::format::ScalarType::Float64);
        let mut pipe = PipeSource::new(ring, 4, 2, Dispatch::Deferred);
        pipe.push(&[1.0, 1.5, 2.0, 2.5, 3.0]).unwrap();
        assert!(pipe.take_dirty());
        assert!(!pipe.take_dirty());

        // the dangling scalar stays in the ring until its atom completes
        assert_eq!(pipe.pull().unwrap(), 2);
        assert_eq!(pipe.ring().available(), 1);
        pipe.push(&[3.5, 4.0, 4.5, 5.0, 5.5, 6.0, 6.5]).unwrap();
        assert_eq!(pipe.pull().unwrap(), 4);
        assert_eq!(pipe.atom_range(), (2, 6));
        let backing = Backing::Pipe(pipe);
        let source = backing.source().unwrap();
        assert_eq!(source.pair(2), (3.0, 3.5));
        assert_eq!(source.pair(5), (6.0, 6.5));
    }
}
