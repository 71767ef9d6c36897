// ============================================================================
// TRANSFORM ENGINE: document space <-> screen space for the current view
// ============================================================================

use crate::error::{LensError, Result};
use crate::geometry::{PointF, Quad, RectF};
use crate::host::CanvasHost;

/// Points per inch the host's zoom level is expressed against.
pub const BASE_DPI: f64 = 72.0;

/// View state reported by the host canvas.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewParams {
    /// Screen position of document point (0, 0).
    pub origin: PointF,
    /// Clockwise, in degrees.
    pub rotation: f64,
    pub zoom: f64,
    pub mirrored: bool,
}

impl Default for ViewParams {
    fn default() -> Self {
        Self {
            origin: PointF::default(),
            rotation: 0.0,
            zoom: 1.0,
            mirrored: false,
        }
    }
}

/// Affine document→screen map: translate(origin) · rotate(rotation) · scale(±s, s).
///
/// Equality compares the six matrix coefficients exactly; cached buffers are
/// invalidated on any difference, so approximate comparison would smear.
#[derive(Clone, Copy, Debug)]
pub struct Transform {
    m11: f64,
    m12: f64,
    m21: f64,
    m22: f64,
    dx: f64,
    dy: f64,
    rotation: f64,
    scale: f64,
    mirrored: bool,
}

impl PartialEq for Transform {
    fn eq(&self, other: &Self) -> bool {
        self.m11 == other.m11
            && self.m12 == other.m12
            && self.m21 == other.m21
            && self.m22 == other.m22
            && self.dx == other.dx
            && self.dy == other.dy
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        m11: 1.0,
        m12: 0.0,
        m21: 0.0,
        m22: 1.0,
        dx: 0.0,
        dy: 0.0,
        rotation: 0.0,
        scale: 1.0,
        mirrored: false,
    };

    /// Uniform document→screen scale factor (always positive).
    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn is_invertible(&self) -> bool {
        self.scale.is_finite() && self.scale > 0.0
    }

    /// Document point → screen point.
    pub fn map(&self, p: PointF) -> PointF {
        PointF::new(
            self.m11 * p.x + self.m21 * p.y + self.dx,
            self.m12 * p.x + self.m22 * p.y + self.dy,
        )
    }

    pub fn map_rect(&self, r: RectF) -> Quad {
        Quad::new(r.corners().map(|c| self.map(c)))
    }

    /// Screen point → document point, undoing translate, rotate, mirror and
    /// scale in that order. `None` when the transform has no inverse.
    pub fn map_screen_to_document(&self, screen: PointF) -> Option<PointF> {
        if !self.is_invertible() {
            return None;
        }
        let mut x = screen.x - self.dx;
        let mut y = screen.y - self.dy;
        if self.rotation != 0.0 {
            let (sin, cos) = exact_sin_cos(-self.rotation);
            let tx = x * cos - y * sin;
            let ty = x * sin + y * cos;
            x = tx;
            y = ty;
        }
        if self.mirrored {
            x = -x;
        }
        Some(PointF::new(x / self.scale, y / self.scale))
    }
}

/// Build the document→screen transform for the given view state.
pub fn compute_transform(
    origin: PointF,
    rotation_degrees: f64,
    zoom: f64,
    mirrored: bool,
    resolution: f64,
) -> Transform {
    let scale = scale_factor(zoom, resolution);
    let (sin, cos) = exact_sin_cos(rotation_degrees);
    let sx = if mirrored { -scale } else { scale };
    let sy = scale;
    Transform {
        m11: cos * sx,
        m12: sin * sx,
        m21: -sin * sy,
        m22: cos * sy,
        dx: origin.x,
        dy: origin.y,
        rotation: rotation_degrees,
        scale,
        mirrored,
    }
}

/// `(72 / resolution) * zoom`; an unknown (non-positive) resolution reads as 72 dpi.
pub fn scale_factor(zoom: f64, resolution: f64) -> f64 {
    let res = if resolution > 0.0 { resolution } else { BASE_DPI };
    (BASE_DPI / res) * zoom
}

/// Transform currently in effect on the host canvas.
pub fn current_transform<H: CanvasHost>(host: &H) -> Result<Transform> {
    let doc = host.document().ok_or(LensError::NoActiveDocument)?;
    let view = host.view().ok_or(LensError::NoActiveView)?;
    Ok(compute_transform(
        view.origin,
        view.rotation,
        view.zoom,
        view.mirrored,
        doc.resolution,
    ))
}

/// Sine and cosine of an angle in degrees, exact for multiples of 90° so
/// axis-aligned views produce exactly comparable matrices.
fn exact_sin_cos(degrees: f64) -> (f64, f64) {
    let d = degrees.rem_euclid(360.0);
    if d == 0.0 {
        (0.0, 1.0)
    } else if d == 90.0 {
        (1.0, 0.0)
    } else if d == 180.0 {
        (0.0, -1.0)
    } else if d == 270.0 {
        (-1.0, 0.0)
    } else {
        d.to_radians().sin_cos()
    }
}
