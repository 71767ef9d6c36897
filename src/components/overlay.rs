// ============================================================================
// OVERLAY SURFACE: on-canvas mirror drawn in screen space
// ============================================================================
//
// Two buffers the size of the canvas viewport:
//   live    raw screen-space stamps of recent draw patches, valid only for
//           the transform they were stamped with
//   render  recomposed on every paint
//
// All geometry is evaluated at pixel centres: a screen pixel belongs to a
// document-space region when its centre lies inside that region's mapped quad.

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::error::{LensError, Result};
use crate::geometry::{IRect, PointF, Quad};
use crate::host::ViewportInfo;
use crate::ops::extract::SourceMode;
use crate::ops::raster::{apply_opacity, blend_over, stroke_quad};
use crate::transform::Transform;

const OUTLINE_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);
const OUTLINE_WIDTH: f64 = 2.0;
/// Live stamps are grown by half a document pixel on every side so adjacent
/// stamps leave no seams under rotation.
const STAMP_MARGIN: f64 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlayConfig {
    /// 0.0 ..= 1.0
    pub opacity: f32,
    /// Only draw outside the document bounds.
    pub crop: bool,
    pub outline: bool,
    /// Suppress the flat colour fill.
    pub no_color: bool,
    pub color: Rgba<u8>,
    pub source: SourceMode,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            crop: false,
            outline: false,
            no_color: false,
            color: Rgba([0, 0, 255, 255]),
            source: SourceMode::ActiveLayer,
        }
    }
}

/// Everything a paint needs from the rest of the controller.
#[derive(Clone, Copy, Debug)]
pub struct OverlayFrame<'a> {
    pub transform: Transform,
    /// Whole-document bounds.
    pub document: IRect,
    /// Area left unfilled: active-target or content bounds.
    pub hole: IRect,
    /// Magnifier base buffer and the document rect it mirrors.
    pub base: Option<(&'a RgbaImage, IRect)>,
}

#[derive(Clone, Debug, Default)]
pub struct OverlaySurface {
    pub config: OverlayConfig,
    width: u32,
    height: u32,
    visible: bool,
    live: Option<RgbaImage>,
    render: Option<RgbaImage>,
    /// Transform `live` was stamped with.
    live_transform: Option<Transform>,
    has_content: bool,
}

impl OverlaySurface {
    pub fn new(config: OverlayConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn has_content(&self) -> bool {
        self.has_content
    }

    pub fn live(&self) -> Option<&RgbaImage> {
        self.live.as_ref()
    }

    /// Follow the host viewport: size and visibility. A missing viewport
    /// means the widget the overlay sits on has been destroyed.
    pub fn sync_geometry(&mut self, viewport: Option<ViewportInfo>) -> Result<()> {
        let vp = viewport.ok_or(LensError::HostWidgetGone)?;
        self.resize(vp.width, vp.height);
        self.visible = vp.visible;
        Ok(())
    }

    /// Drop every buffer if the size changed; they are reallocated lazily.
    pub fn resize(&mut self, width: u32, height: u32) {
        if (width, height) == (self.width, self.height) {
            return;
        }
        self.width = width;
        self.height = height;
        self.live = None;
        self.render = None;
        self.live_transform = None;
        self.has_content = false;
    }

    fn ensure_buffers(&mut self) -> bool {
        if self.width == 0 || self.height == 0 {
            return false;
        }
        if self.live.is_none() {
            self.live = Some(RgbaImage::new(self.width, self.height));
        }
        if self.render.is_none() {
            self.render = Some(RgbaImage::new(self.width, self.height));
        }
        true
    }

    pub fn clear_live(&mut self) {
        if let Some(live) = &mut self.live {
            live.pixels_mut().for_each(|p| *p = Rgba([0, 0, 0, 0]));
        }
        self.live_transform = None;
    }

    fn invalidate_for(&mut self, transform: Transform) {
        if self.live_transform.is_some_and(|t| t != transform) {
            tracing::debug!("overlay: view transform changed, clearing live stamps");
            self.clear_live();
        }
    }

    /// Stamp a draw patch (straight RGBA8, document rect `rect`) into the live
    /// buffer, replacing whatever was under it.
    pub fn stamp_live(&mut self, patch: &RgbaImage, rect: IRect, transform: Transform) {
        self.invalidate_for(transform);
        if rect.is_empty() || patch.width() == 0 || patch.height() == 0 || !transform.is_invertible() {
            return;
        }
        if !self.ensure_buffers() {
            return;
        }
        self.live_transform = Some(transform);
        let Some(live) = &mut self.live else {
            return;
        };

        let quad = transform.map_rect(rect.to_rectf().expanded(STAMP_MARGIN));
        let area = quad.bounding_rect();
        let x0 = area.x.floor().max(0.0) as u32;
        let y0 = area.y.floor().max(0.0) as u32;
        let x1 = (area.right().ceil().max(0.0) as u32).min(live.width());
        let y1 = (area.bottom().ceil().max(0.0) as u32).min(live.height());
        let (pw, ph) = (patch.width() as i64, patch.height() as i64);

        for y in y0..y1 {
            for x in x0..x1 {
                let c = PointF::new(x as f64 + 0.5, y as f64 + 0.5);
                if !quad.contains(c) {
                    continue;
                }
                let Some(d) = transform.map_screen_to_document(c) else {
                    continue;
                };
                let sx = ((d.x - rect.x as f64).floor() as i64).clamp(0, pw - 1) as u32;
                let sy = ((d.y - rect.y as f64).floor() as i64).clamp(0, ph - 1) as u32;
                live.put_pixel(x, y, *patch.get_pixel(sx, sy));
            }
        }
        self.has_content = true;
    }

    /// Recompose and return the render buffer at the configured opacity.
    /// `None` while the surface has no area.
    pub fn paint(&mut self, frame: OverlayFrame<'_>) -> Option<&RgbaImage> {
        self.invalidate_for(frame.transform);
        if !self.ensure_buffers() {
            return None;
        }
        let config = self.config;
        let transform = frame.transform;
        let live = self.live.as_ref()?;
        let render = self.render.as_mut()?;
        let width = render.width() as usize;

        let doc_quad = transform.map_rect(frame.document.to_rectf());
        let hole = if frame.hole.is_empty() {
            frame.document
        } else {
            frame.hole
        };
        let hole_quad = transform.map_rect(hole.to_rectf());

        render
            .par_chunks_mut(width * 4)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, px) in row.chunks_exact_mut(4).enumerate() {
                    let out = overlay_pixel(
                        x as u32,
                        y as u32,
                        &config,
                        &transform,
                        &doc_quad,
                        &hole_quad,
                        frame.base,
                        live,
                    );
                    px.copy_from_slice(&out.0);
                }
            });

        if config.outline {
            stroke_quad(render, &doc_quad, OUTLINE_WIDTH, OUTLINE_COLOR);
        }
        apply_opacity(render, config.opacity);
        self.render.as_ref()
    }
}

fn overlay_pixel(
    x: u32,
    y: u32,
    config: &OverlayConfig,
    transform: &Transform,
    doc_quad: &Quad,
    hole_quad: &Quad,
    base: Option<(&RgbaImage, IRect)>,
    live: &RgbaImage,
) -> Rgba<u8> {
    let c = PointF::new(x as f64 + 0.5, y as f64 + 0.5);
    let outside = !doc_quad.contains(c);
    if config.crop && !outside {
        return Rgba([0, 0, 0, 0]);
    }

    let mut out = Rgba([0, 0, 0, 0]);
    if !config.no_color && !hole_quad.contains(c) {
        out = config.color;
    }
    if let Some((img, src)) = base
        && let Some(sample) = sample_base(img, src, transform, c)
    {
        blend_over(&mut out, sample);
    }
    blend_over(&mut out, *live.get_pixel(x, y));
    out
}

/// Nearest sample of the magnifier base at screen point `c`.
fn sample_base(img: &RgbaImage, src: IRect, transform: &Transform, c: PointF) -> Option<Rgba<u8>> {
    if src.is_empty() || img.width() == 0 || img.height() == 0 {
        return None;
    }
    let d = transform.map_screen_to_document(c)?;
    let u = (d.x - src.x as f64) / src.width as f64;
    let v = (d.y - src.y as f64) / src.height as f64;
    if !(0.0..1.0).contains(&u) || !(0.0..1.0).contains(&v) {
        return None;
    }
    let sx = ((u * img.width() as f64) as u32).min(img.width() - 1);
    let sy = ((v * img.height() as f64) as u32).min(img.height() - 1);
    Some(*img.get_pixel(sx, sy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::compute_transform;

    fn viewport(w: u32, h: u32) -> Option<ViewportInfo> {
        Some(ViewportInfo {
            width: w,
            height: h,
            visible: true,
        })
    }

    fn frame(transform: Transform, document: IRect, hole: IRect) -> OverlayFrame<'static> {
        OverlayFrame {
            transform,
            document,
            hole,
            base: None,
        }
    }

    #[test]
    fn widget_gone_is_reported() {
        let mut o = OverlaySurface::default();
        assert!(matches!(o.sync_geometry(None), Err(LensError::HostWidgetGone)));
        o.sync_geometry(viewport(10, 10)).unwrap();
        assert_eq!(o.size(), (10, 10));
    }

    #[test]
    fn fill_covers_everything_but_the_hole() {
        let mut o = OverlaySurface::default();
        o.sync_geometry(viewport(40, 40)).unwrap();
        let t = compute_transform(PointF::new(10.0, 10.0), 0.0, 1.0, false, 72.0);
        let img = o
            .paint(frame(t, IRect::new(0, 0, 20, 20), IRect::new(5, 5, 5, 5)))
            .unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 255, 255]);
        assert_eq!(img.get_pixel(16, 16).0, [0, 0, 0, 0]);
        assert_eq!(img.get_pixel(25, 25).0, [0, 0, 255, 255]);
    }

    #[test]
    fn crop_with_content_covering_canvas_draws_no_colour() {
        let mut o = OverlaySurface::new(OverlayConfig {
            crop: true,
            source: SourceMode::FullDocument,
            ..Default::default()
        });
        o.sync_geometry(viewport(30, 20)).unwrap();
        let doc = IRect::new(0, 0, 30, 20);
        let img = o.paint(frame(Transform::IDENTITY, doc, doc)).unwrap();
        assert!(img.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn crop_limits_drawing_to_outside_document() {
        let mut o = OverlaySurface::new(OverlayConfig {
            crop: true,
            ..Default::default()
        });
        o.sync_geometry(viewport(30, 30)).unwrap();
        let img = o
            .paint(frame(Transform::IDENTITY, IRect::new(0, 0, 10, 10), IRect::new(0, 0, 5, 5)))
            .unwrap();
        assert_eq!(img.get_pixel(7, 7)[3], 0);
        assert_eq!(img.get_pixel(20, 20).0, [0, 0, 255, 255]);
    }

    #[test]
    fn live_is_cleared_when_transform_changes() {
        let mut o = OverlaySurface::new(OverlayConfig {
            no_color: true,
            ..Default::default()
        });
        o.sync_geometry(viewport(20, 20)).unwrap();
        let red = RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255]));
        let t = Transform::IDENTITY;
        o.stamp_live(&red, IRect::new(2, 2, 4, 4), t);
        assert_eq!(o.live().unwrap().get_pixel(3, 3).0, [255, 0, 0, 255]);

        let doc = IRect::new(0, 0, 20, 20);
        let img = o.paint(frame(t, doc, doc)).unwrap();
        assert_eq!(img.get_pixel(3, 3).0, [255, 0, 0, 255]);

        let panned = compute_transform(PointF::new(1.0, 0.0), 0.0, 1.0, false, 72.0);
        let img = o.paint(frame(panned, doc, doc)).unwrap();
        assert_eq!(img.get_pixel(3, 3)[3], 0);
    }

    #[test]
    fn base_is_mapped_through_transform_and_opacity_applied() {
        let mut o = OverlaySurface::new(OverlayConfig {
            no_color: true,
            opacity: 0.5,
            ..Default::default()
        });
        o.sync_geometry(viewport(40, 40)).unwrap();
        // Half-resolution base mirroring document rect (0,0,20,20) at zoom 2.
        let base = RgbaImage::from_pixel(10, 10, Rgba([0, 255, 0, 255]));
        let t = compute_transform(PointF::default(), 0.0, 2.0, false, 72.0);
        let doc = IRect::new(0, 0, 20, 20);
        let img = o
            .paint(OverlayFrame {
                transform: t,
                document: doc,
                hole: doc,
                base: Some((&base, doc)),
            })
            .unwrap();
        assert_eq!(img.get_pixel(39, 39).0, [0, 255, 0, 128]);
    }

    #[test]
    fn painting_alone_adds_no_live_content() {
        let mut o = OverlaySurface::default();
        o.sync_geometry(viewport(8, 8)).unwrap();
        let doc = IRect::new(0, 0, 8, 8);
        assert!(o
            .paint(OverlayFrame {
                transform: Transform::IDENTITY,
                document: doc,
                hole: doc,
                base: None,
            })
            .is_some());
        assert!(!o.has_content());
    }

    #[test]
    fn resize_drops_content() {
        let mut o = OverlaySurface::default();
        o.sync_geometry(viewport(8, 8)).unwrap();
        o.stamp_live(&RgbaImage::new(1, 1), IRect::new(0, 0, 1, 1), Transform::IDENTITY);
        assert!(o.has_content());
        o.resize(9, 9);
        assert!(!o.has_content());
        assert!(o.live().is_none());
    }
}
