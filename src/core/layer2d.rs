// Matrix (type 2000) layer: a row/column window projected to a z grid

use crate::core::error::Result;
use crate::core::format::SignalHeader;
use crate::core::layer::{
    finite_extrema, index_bounds, is_degenerate, Backing, Leveler, RedrawContext, Windowed,
};
use crate::core::transform::{project, Mode};
use crate::models::plot_config::PlotConfig;
use tracing::{debug, trace};

/// Projected cells in row-major order, with the abscissa of each kept
/// column and the ordinate of each kept row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridBuffer {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
}

impl GridBuffer {
    pub fn cols(&self) -> usize {
        self.x.len()
    }

    pub fn rows(&self) -> usize {
        self.y.len()
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<f64> {
        if col >= self.cols() {
            return None;
        }
        self.z.get(row * self.cols() + col).copied()
    }

    fn clear(&mut self) {
        self.x.clear();
        self.y.clear();
        self.z.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct GridKey {
    cols: (u64, u64, u64),
    rows: (u64, u64, u64),
    generation: u64,
}

pub struct Layer2D {
    header: SignalHeader,
    backing: Backing,
    mode: Mode,
    bufmax: usize,
    log_floor: f64,
    y_view: Option<(f64, f64)>,
    key: Option<GridKey>,
    // raw (re, im) per kept cell, row-major
    wre: Vec<f64>,
    wim: Vec<f64>,
    grid: GridBuffer,
    leveler: Leveler,
}

impl Layer2D {
    pub fn new(header: SignalHeader, backing: Backing, config: &PlotConfig) -> Self {
        Self {
            header,
            backing,
            mode: config.mode,
            bufmax: config.bufmax.max(2),
            log_floor: config.log_floor,
            y_view: None,
            key: None,
            wre: Vec::new(),
            wim: Vec::new(),
            grid: GridBuffer::default(),
            leveler: Leveler::new(config.autol),
        }
    }

    pub fn grid(&self) -> &GridBuffer {
        &self.grid
    }

    /// Restrict the rows loaded by `get_data` to ordinates in `[y_min, y_max]`.
    /// `None` loads every available row.
    pub fn set_y_range(&mut self, range: Option<(f64, f64)>) {
        if self.y_view != range {
            self.y_view = range;
            self.key = None;
        }
    }

    /// Complete rows available, as `[first, end)`.
    pub fn row_range(&self) -> (u64, u64) {
        let subsize = self.header.subsize as u64;
        if subsize == 0 {
            return (0, 0);
        }
        let (start, end) = self.backing.atom_range();
        (start.div_ceil(subsize), end / subsize)
    }

    fn clear_window(&mut self) {
        self.wre.clear();
        self.wim.clear();
        self.grid.clear();
        self.key = None;
    }
}

impl Windowed for Layer2D {
    fn header(&self) -> &SignalHeader {
        &self.header
    }

    fn get_data(&mut self, x_min: f64, x_max: f64) -> Result<()> {
        let subsize = self.header.subsize as u64;
        let (row_first, row_end) = self.row_range();
        if subsize == 0 || row_first >= row_end || is_degenerate(x_min, x_max) {
            self.clear_window();
            return Ok(());
        }

        let cols = index_bounds(
            x_min.min(x_max),
            x_min.max(x_max),
            self.header.xstart,
            self.header.xdelta,
            0,
            subsize - 1,
        );
        let rows = match self.y_view {
            Some((a, b)) => index_bounds(
                a.min(b),
                a.max(b),
                self.header.ystart,
                self.header.ydelta,
                row_first,
                row_end - 1,
            ),
            None => Some((row_first, row_end - 1)),
        };
        let (Some((c1, c2)), Some((r1, r2))) = (cols, rows) else {
            trace!("Grid window [{}, {}] holds no cells", x_min, x_max);
            self.clear_window();
            return Ok(());
        };

        let bufmax = self.bufmax as u64;
        let ncols = c2 - c1 + 1;
        let nrows = r2 - r1 + 1;
        let col_skip = ncols.div_ceil(bufmax).max(1);
        let kept_cols = ncols.div_ceil(col_skip);
        let rows_allowed = (bufmax / kept_cols).max(1);
        let row_skip = nrows.div_ceil(rows_allowed).max(1);

        let key = GridKey {
            cols: (c1, c2, col_skip),
            rows: (r1, r2, row_skip),
            generation: self.backing.generation(),
        };
        if self.key == Some(key) {
            trace!("Grid cache hit");
            return Ok(());
        }

        let source = self.backing.source()?;
        self.wre.clear();
        self.wim.clear();
        self.grid.clear();
        for c in (c1..=c2).step_by(col_skip as usize) {
            self.grid.x.push(self.header.x_at(c as f64));
        }
        for r in (r1..=r2).step_by(row_skip as usize) {
            self.grid.y.push(self.header.y_at(r as f64));
            for c in (c1..=c2).step_by(col_skip as usize) {
                let (re, im) = source.pair(r * subsize + c);
                self.wre.push(re);
                self.wim.push(im);
            }
        }
        self.key = Some(key);
        debug!(
            "Loaded grid cols [{}, {}]/{} rows [{}, {}]/{}",
            c1, c2, col_skip, r1, r2, row_skip
        );
        Ok(())
    }

    fn prep(&mut self, x_min: f64, x_max: f64, ctx: &mut RedrawContext) -> usize {
        let (xa, xb) = self.header.x_domain();
        ctx.include_x(xa, xb);
        let (row_first, row_end) = self.row_range();
        if row_first < row_end {
            let ya = self.header.y_at(row_first as f64);
            let yb = self.header.y_at((row_end - 1) as f64);
            ctx.include_y(ya.min(yb), ya.max(yb));
        }

        if is_degenerate(x_min, x_max) {
            self.grid.clear();
            return 0;
        }
        self.grid.z.clear();
        if self.wre.is_empty() {
            return 0;
        }
        let (mode, floor) = (self.mode, self.log_floor);
        self.grid.z.extend(
            self.wre
                .iter()
                .zip(&self.wim)
                .map(|(&re, &im)| project(mode, re, im, floor)),
        );

        if let Some(measured) = finite_extrema(&self.grid.z) {
            let (zmin, zmax) = self.leveler.update(measured);
            ctx.include_z(zmin, zmax);
        }
        self.grid.z.len()
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
