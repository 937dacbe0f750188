// Pixel-space clipping of a projected trace into drawable polyline runs

use crate::core::layer1d::PointBuffer;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Axis-aligned rectangle with `x1 <= x2` and `y1 <= y2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl Rect {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x1 && x <= self.x2 && y >= self.y1 && y <= self.y2
    }
}

/// Per-axis affine map from real coordinates to pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub xscale: f64,
    pub xoffset: f64,
    pub yscale: f64,
    pub yoffset: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        xscale: 1.0,
        xoffset: 0.0,
        yscale: 1.0,
        yoffset: 0.0,
    };

    /// Map `real` onto `pixel` with the pixel y axis pointing down, so
    /// `real.y1` lands on `pixel.y2`. `None` for a degenerate `real`.
    pub fn from_view(real: Rect, pixel: Rect) -> Option<Self> {
        if real.width() == 0.0 || real.height() == 0.0 {
            return None;
        }
        let xscale = pixel.width() / real.width();
        let yscale = -pixel.height() / real.height();
        let t = Self {
            xscale,
            xoffset: pixel.x1 - real.x1 * xscale,
            yscale,
            yoffset: pixel.y2 - real.y1 * yscale,
        };
        t.is_finite().then_some(t)
    }

    fn is_finite(&self) -> bool {
        self.xscale.is_finite()
            && self.xoffset.is_finite()
            && self.yscale.is_finite()
            && self.yoffset.is_finite()
    }

    pub fn to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (x * self.xscale + self.xoffset, y * self.yscale + self.yoffset)
    }

    pub fn to_real(&self, px: f64, py: f64) -> (f64, f64) {
        (
            (px - self.xoffset) / self.xscale,
            (py - self.yoffset) / self.yscale,
        )
    }

    pub fn inverse(&self) -> Option<Self> {
        if self.xscale == 0.0 || self.yscale == 0.0 {
            return None;
        }
        let t = Self {
            xscale: 1.0 / self.xscale,
            xoffset: -self.xoffset / self.xscale,
            yscale: 1.0 / self.yscale,
            yoffset: -self.yoffset / self.yscale,
        };
        t.is_finite().then_some(t)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStyle {
    /// Straight lines between consecutive samples.
    #[default]
    Connected,
    /// Hold each value until the next abscissa, then step.
    Staircase,
    /// Visible samples only, one per segment.
    PointsOnly,
}

/// One independently stroked run of pixel coordinates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Segment {
    pub points: Vec<(f64, f64)>,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<(f64, f64)> {
        self.points.first().copied()
    }

    pub fn last(&self) -> Option<(f64, f64)> {
        self.points.last().copied()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trace {
    pub segments: Vec<Segment>,
    /// Winding number of the closed sample path around the rectangle centre.
    pub winding: i32,
    /// Nothing was visible yet the rectangle lies inside the data path.
    pub filled: bool,
}

impl Trace {
    pub fn point_count(&self) -> usize {
        self.segments.iter().map(Segment::len).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
    Bottom,
    Top,
}

/// Parametric interval `[t0, t1]` of `p -> q` inside `rect`, with the side
/// that set each end.
fn clip_interval(
    p: (f64, f64),
    q: (f64, f64),
    rect: &Rect,
) -> Option<(f64, Option<Side>, f64, Option<Side>)> {
    let dx = q.0 - p.0;
    let dy = q.1 - p.1;
    let mut t0 = 0.0;
    let mut t1 = 1.0;
    let mut enter = None;
    let mut exit = None;

    let sides = [
        (Side::Left, -dx, p.0 - rect.x1),
        (Side::Right, dx, rect.x2 - p.0),
        (Side::Bottom, -dy, p.1 - rect.y1),
        (Side::Top, dy, rect.y2 - p.1),
    ];
    for (side, pk, qk) in sides {
        if pk == 0.0 {
            if qk < 0.0 {
                return None;
            }
            continue;
        }
        let r = qk / pk;
        if pk < 0.0 {
            if r > t1 {
                return None;
            }
            if r > t0 {
                t0 = r;
                enter = Some(side);
            }
        } else {
            if r < t0 {
                return None;
            }
            if r < t1 {
                t1 = r;
                exit = Some(side);
            }
        }
    }
    if t0 > t1 {
        return None;
    }
    Some((t0, enter, t1, exit))
}

/// Point at parameter `t`, snapped exactly onto the crossed boundary.
fn point_at(p: (f64, f64), q: (f64, f64), t: f64, side: Option<Side>, rect: &Rect) -> (f64, f64) {
    let x = p.0 + t * (q.0 - p.0);
    let y = p.1 + t * (q.1 - p.1);
    match side {
        None if t == 0.0 => p,
        None if t == 1.0 => q,
        None => (x, y),
        Some(Side::Left) => (rect.x1, y),
        Some(Side::Right) => (rect.x2, y),
        Some(Side::Bottom) => (x, rect.y1),
        Some(Side::Top) => (x, rect.y2),
    }
}

fn is_left(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> f64 {
    (b.0 - a.0) * (c.1 - a.1) - (c.0 - a.0) * (b.1 - a.1)
}

/// Winding number of the closed path through `path` around `c`.
fn winding_number(path: &[(f64, f64)], c: (f64, f64)) -> i32 {
    if path.len() < 2 {
        return 0;
    }
    let mut wn = 0;
    for (i, &a) in path.iter().enumerate() {
        let b = path[(i + 1) % path.len()];
        if a.1 <= c.1 {
            if b.1 > c.1 && is_left(a, b, c) > 0.0 {
                wn += 1;
            }
        } else if b.1 <= c.1 && is_left(a, b, c) < 0.0 {
            wn -= 1;
        }
    }
    wn
}

fn finite(p: (f64, f64)) -> bool {
    p.0.is_finite() && p.1.is_finite()
}

/// Collects visible runs, splitting wherever visibility is lost.
#[derive(Default)]
struct RunBuilder {
    current: Vec<(f64, f64)>,
    segments: Vec<Segment>,
}

impl RunBuilder {
    fn push(&mut self, p: (f64, f64)) {
        if self.current.last() != Some(&p) {
            self.current.push(p);
        }
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            self.segments.push(Segment {
                points: std::mem::take(&mut self.current),
            });
        }
    }

    fn edge(&mut self, p: (f64, f64), q: (f64, f64), rect: &Rect) {
        let Some((t0, enter, t1, exit)) = clip_interval(p, q, rect) else {
            self.flush();
            return;
        };
        if self.current.is_empty() || t0 > 0.0 {
            self.flush();
            self.push(point_at(p, q, t0, enter, rect));
        }
        self.push(point_at(p, q, t1, exit, rect));
        if t1 < 1.0 {
            self.flush();
        }
    }
}

fn expand_staircase(pixels: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let mut out = Vec::with_capacity(pixels.len() * 2);
    for (i, &p) in pixels.iter().enumerate() {
        if i > 0 {
            let prev = pixels[i - 1];
            out.push((p.0, prev.1));
        }
        out.push(p);
    }
    out
}

/// Turn projected points into clipped pixel-space runs inside `rect`.
pub fn assemble(points: &PointBuffer, rect: &Rect, transform: &Transform, style: TraceStyle) -> Trace {
    let pixels: Vec<(f64, f64)> = points
        .iter()
        .map(|(x, y)| transform.to_pixel(x, y))
        .collect();
    let path = match style {
        TraceStyle::Staircase => expand_staircase(&pixels),
        TraceStyle::Connected | TraceStyle::PointsOnly => pixels,
    };

    let finite_path: Vec<(f64, f64)> = path.iter().copied().filter(|&p| finite(p)).collect();
    let winding = winding_number(&finite_path, rect.center());

    let mut runs = RunBuilder::default();
    match style {
        TraceStyle::PointsOnly => {
            for &p in finite_path.iter().filter(|p| rect.contains(p.0, p.1)) {
                runs.push(p);
                runs.flush();
            }
        }
        TraceStyle::Connected | TraceStyle::Staircase if path.len() >= 2 => {
            for w in path.windows(2) {
                let (p, q) = (w[0], w[1]);
                if !finite(p) || !finite(q) {
                    runs.flush();
                    continue;
                }
                runs.edge(p, q, rect);
            }
            runs.flush();
        }
        _ => {}
    }

    let segments = runs.segments;
    let filled = segments.is_empty() && winding != 0;
    trace!(
        "Assembled {} segments from {} points, winding={}",
        segments.len(),
        points.len(),
        winding
    );
    Trace {
        segments,
        winding,
        filled,
    }
}
