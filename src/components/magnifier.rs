// ============================================================================
// MAGNIFIER SURFACE: base + trail buffers and the fitted preview frame
// ============================================================================

use image::{Rgba, RgbaImage};

use crate::geometry::{IRect, RectF};
use crate::ops::raster::{GRID_SIZE, draw_scaled, fill_checker, stamp_replace, stroke_rect};

const RETICLE_COLOR: Rgba<u8> = Rgba([0, 120, 255, 255]);
const RETICLE_WIDTH: f64 = 2.0;

/// Uniform fit of a `buf_w`×`buf_h` buffer into a widget, centred.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FitMapping {
    pub scale: f64,
    pub target: IRect,
}

impl FitMapping {
    pub fn new(buf_w: u32, buf_h: u32, widget_w: u32, widget_h: u32) -> Self {
        let scale = if buf_w > 0 && buf_h > 0 {
            (widget_w as f64 / buf_w as f64).min(widget_h as f64 / buf_h as f64)
        } else {
            1.0
        };
        let draw_w = (buf_w as f64 * scale) as i32;
        let draw_h = (buf_h as f64 * scale) as i32;
        let x = (widget_w as i32 - draw_w).div_euclid(2);
        let y = (widget_h as i32 - draw_h).div_euclid(2);
        Self {
            scale,
            target: IRect::new(x, y, draw_w, draw_h),
        }
    }

    /// Buffer-space rect → widget-space rect.
    pub fn map_rect(&self, r: RectF) -> RectF {
        RectF::new(
            r.x * self.scale + self.target.x as f64,
            r.y * self.scale + self.target.y as f64,
            r.width * self.scale,
            r.height * self.scale,
        )
    }
}

#[derive(Clone, Debug)]
pub struct MagnifierSurface {
    /// Full mirrored region, replaced wholesale on resync.
    base: Option<RgbaImage>,
    /// Stamps accumulated since the last resync.
    trail: Option<RgbaImage>,
    cursor_rect: Option<RectF>,
    show_reticle: bool,
    /// Bumped whenever visible content changes.
    generation: u64,
}

impl Default for MagnifierSurface {
    fn default() -> Self {
        Self {
            base: None,
            trail: None,
            cursor_rect: None,
            show_reticle: true,
            generation: 0,
        }
    }
}

impl MagnifierSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base(&self) -> Option<&RgbaImage> {
        self.base.as_ref()
    }

    pub fn trail(&self) -> Option<&RgbaImage> {
        self.trail.as_ref()
    }

    pub fn trail_size(&self) -> Option<(u32, u32)> {
        self.trail.as_ref().map(|t| t.dimensions())
    }

    pub fn cursor_rect(&self) -> Option<RectF> {
        self.cursor_rect
    }

    pub fn reticle_visible(&self) -> bool {
        self.show_reticle
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Allocate a fresh, transparent trail buffer. Degenerate sizes are ignored.
    pub fn init_buffers(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.trail = Some(RgbaImage::new(width, height));
    }

    /// Replace the base image. The trail is cleared, and reallocated if its
    /// size no longer matches. `None` drops the base (no document).
    pub fn set_base(&mut self, base: Option<RgbaImage>) {
        if let Some(img) = &base
            && let Some(trail) = &mut self.trail
        {
            if trail.dimensions() != img.dimensions() {
                *trail = RgbaImage::new(img.width(), img.height());
            } else {
                trail.pixels_mut().for_each(|p| *p = Rgba([0, 0, 0, 0]));
            }
        }
        self.base = base;
        self.generation += 1;
    }

    pub fn update_cursor(&mut self, cursor: RectF) {
        self.cursor_rect = Some(cursor);
    }

    /// Stamp a freshly extracted patch at `dest` (buffer space), replacing
    /// what was there in both base and trail.
    pub fn stamp(&mut self, patch: &RgbaImage, dest: RectF) {
        let target = dest.to_irect();
        if let Some(base) = &mut self.base {
            stamp_replace(base, patch, target);
        }
        if let Some(trail) = &mut self.trail {
            stamp_replace(trail, patch, target);
        }
        self.cursor_rect = Some(dest);
        self.generation += 1;
    }

    pub fn set_reticle_visible(&mut self, visible: bool) {
        self.show_reticle = visible;
        self.generation += 1;
    }

    /// Paint a `widget_w`×`widget_h` frame: checkerboard, base fitted and
    /// centred, trail on the same mapping, then the reticle.
    pub fn compose_frame(&self, widget_w: u32, widget_h: u32) -> RgbaImage {
        let mut frame = RgbaImage::new(widget_w, widget_h);
        fill_checker(&mut frame, GRID_SIZE);

        let Some(base) = &self.base else {
            return frame;
        };
        if base.width() == 0 || base.height() == 0 {
            return frame;
        }
        let fit = FitMapping::new(base.width(), base.height(), widget_w, widget_h);
        draw_scaled(&mut frame, base, fit.target);
        if let Some(trail) = &self.trail {
            draw_scaled(&mut frame, trail, fit.target);
        }
        if self.show_reticle
            && let Some(cursor) = self.cursor_rect
        {
            stroke_rect(&mut frame, fit.map_rect(cursor), RETICLE_WIDTH, RETICLE_COLOR);
        }
        frame
    }
}
