// ============================================================================
// GEOMETRY: integer document rects, float screen points/rects, mapped quads
// ============================================================================

/// Integer rectangle in document space (pixels). Width/height may be zero or
/// negative, which makes the rect empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct IRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl IRect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Exclusive right edge.
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Intersection of two rects. Returns an empty rect (zero size) when they
    /// do not overlap.
    pub fn intersect(&self, other: &IRect) -> IRect {
        if self.is_empty() || other.is_empty() {
            return IRect::default();
        }
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            return IRect::default();
        }
        IRect::new(x0, y0, x1 - x0, y1 - y0)
    }

    /// Bounding union. Empty operands are ignored.
    pub fn union(&self, other: &IRect) -> IRect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = self.right().max(other.right());
        let y1 = self.bottom().max(other.bottom());
        IRect::new(x0, y0, x1 - x0, y1 - y0)
    }

    pub fn to_rectf(&self) -> RectF {
        RectF::new(
            self.x as f64,
            self.y as f64,
            self.width as f64,
            self.height as f64,
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct PointF {
    pub x: f64,
    pub y: f64,
}

impl PointF {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Floating-point rectangle, used for screen / preview-space geometry.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct RectF {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl RectF {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_center_size(center: PointF, width: f64, height: f64) -> Self {
        Self::new(center.x - width / 2.0, center.y - height / 2.0, width, height)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn contains(&self, p: PointF) -> bool {
        p.x >= self.x && p.x < self.right() && p.y >= self.y && p.y < self.bottom()
    }

    /// Grow (or shrink, for negative values) every edge by `d`.
    pub fn expanded(&self, d: f64) -> RectF {
        RectF::new(self.x - d, self.y - d, self.width + 2.0 * d, self.height + 2.0 * d)
    }

    /// Snap to integer pixels: both corners are rounded independently so
    /// adjacent float rects map to adjacent integer rects.
    pub fn to_irect(&self) -> IRect {
        let x0 = self.x.round() as i32;
        let y0 = self.y.round() as i32;
        let x1 = self.right().round() as i32;
        let y1 = self.bottom().round() as i32;
        IRect::new(x0, y0, x1 - x0, y1 - y0)
    }

    pub fn corners(&self) -> [PointF; 4] {
        [
            PointF::new(self.x, self.y),
            PointF::new(self.right(), self.y),
            PointF::new(self.right(), self.bottom()),
            PointF::new(self.x, self.bottom()),
        ]
    }
}

/// A rectangle after an affine map: a convex quadrilateral in screen space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quad {
    pub points: [PointF; 4],
}

impl Quad {
    pub fn new(points: [PointF; 4]) -> Self {
        Self { points }
    }

    /// Point-in-convex-polygon test that works for either winding, so
    /// mirrored transforms (which flip winding) need no special casing.
    pub fn contains(&self, p: PointF) -> bool {
        let mut sign = 0.0f64;
        for i in 0..4 {
            let a = self.points[i];
            let b = self.points[(i + 1) % 4];
            let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
            if cross == 0.0 {
                continue;
            }
            if sign == 0.0 {
                sign = cross.signum();
            } else if cross.signum() != sign {
                return false;
            }
        }
        // Degenerate quad (all edges collinear with p) contains nothing.
        sign != 0.0
    }

    /// Axis-aligned bounding box of the quad.
    pub fn bounding_rect(&self) -> RectF {
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        for p in &self.points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        RectF::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    /// Shortest distance from `p` to the quad outline.
    pub fn distance_to_edge(&self, p: PointF) -> f64 {
        (0..4)
            .map(|i| distance_to_segment(p, self.points[i], self.points[(i + 1) % 4]))
            .fold(f64::INFINITY, f64::min)
    }
}

fn distance_to_segment(p: PointF, a: PointF, b: PointF) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq == 0.0 {
        0.0
    } else {
        (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let cx = a.x + t * dx;
    let cy = a.y + t * dy;
    ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt()
}
