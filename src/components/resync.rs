// ============================================================================
// RESYNC: full recomputation of the mirrored region
// ============================================================================

use image::RgbaImage;
use image::imageops::{self, FilterType};

use crate::components::bounds::compute_region;
use crate::error::{LensError, Result};
use crate::geometry::IRect;
use crate::host::{CanvasHost, LayerNode};
use crate::ops::extract::{SourceMode, composite_tree, extract_layer};

/// Longest edge the magnifier buffers may have.
pub const DEFAULT_MAX_BUFFER_SIZE: u32 = 2500;

/// Why a resync was requested; only used for logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResyncReason {
    Enabled,
    StrokeFinished,
    HistoryAction,
    BoundsChanged,
    SourceChanged,
    CanvasChanged,
    Settle,
}

/// A fully computed resync, not yet applied to any state.
#[derive(Clone, Debug)]
pub struct ResyncFrame {
    pub src_rect: IRect,
    pub scale: f64,
    pub base: RgbaImage,
}

impl ResyncFrame {
    pub fn buffer_size(&self) -> (u32, u32) {
        self.base.dimensions()
    }
}

/// `min(1, max_buffer / longest edge)`.
pub fn buffer_scale(region: IRect, max_buffer: u32) -> f64 {
    let longest = region.width.max(region.height);
    if longest <= 0 {
        return 1.0;
    }
    (max_buffer as f64 / longest as f64).min(1.0)
}

/// Buffer dimensions for `region` at `scale`, never below 1×1.
pub fn target_size(region: IRect, scale: f64) -> (u32, u32) {
    let w = (region.width as f64 * scale).round().max(1.0) as u32;
    let h = (region.height as f64 * scale).round().max(1.0) as u32;
    (w, h)
}

#[derive(Clone, Copy, Debug)]
pub struct ResyncController {
    pub max_buffer_size: u32,
}

impl Default for ResyncController {
    fn default() -> Self {
        Self {
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
        }
    }
}

impl ResyncController {
    pub fn new(max_buffer_size: u32) -> Self {
        Self {
            max_buffer_size: max_buffer_size.max(1),
        }
    }

    /// Compute region, scale and a fresh base image. Nothing is committed
    /// here, so a failure at any step leaves the caller's state untouched.
    pub fn compute<H: CanvasHost>(&self, host: &H, mode: SourceMode) -> Result<ResyncFrame> {
        let region = compute_region(host, mode)?;
        let scale = buffer_scale(region, self.max_buffer_size);
        let (w, h) = target_size(region, scale);

        let base = match mode {
            SourceMode::ActiveLayer => {
                let node = host.active_node().ok_or(LensError::NoActiveLayer)?;
                match node.thumbnail(w, h) {
                    Some(thumb) if thumb.dimensions() == (w, h) => thumb,
                    Some(thumb) => imageops::resize(&thumb, w, h, FilterType::Triangle),
                    None => {
                        tracing::debug!("resync: no thumbnail, reading layer pixels");
                        let full = extract_layer(node, region)?.to_rgba8();
                        fit(full, w, h)
                    }
                }
            }
            SourceMode::FullDocument => {
                let root = host.root_node().ok_or(LensError::NoActiveDocument)?;
                let full = composite_tree(root, region)?.to_rgba8();
                fit(full, w, h)
            }
        };

        Ok(ResyncFrame {
            src_rect: region,
            scale,
            base,
        })
    }
}

fn fit(img: RgbaImage, w: u32, h: u32) -> RgbaImage {
    if img.dimensions() == (w, h) {
        img
    } else {
        imageops::resize(&img, w, h, FilterType::Triangle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{MemoryDocument, MemoryNode};
    use approx::assert_relative_eq;
    use image::Rgba;

    #[test]
    fn scale_caps_longest_edge() {
        let region = IRect::new(0, 0, 5000, 4000);
        let scale = buffer_scale(region, DEFAULT_MAX_BUFFER_SIZE);
        assert_relative_eq!(scale, 0.5);
        assert_eq!(target_size(region, scale), (2500, 2000));
        assert_relative_eq!(buffer_scale(IRect::new(0, 0, 300, 200), 2500), 1.0);
    }

    #[test]
    fn target_size_rounds() {
        assert_eq!(target_size(IRect::new(0, 0, 333, 1000), 0.25), (83, 250));
        assert_eq!(target_size(IRect::new(0, 0, 3, 1000), 0.1), (1, 100));
    }

    #[test]
    fn single_target_uses_layer_bounds_and_pixels() {
        let layer = MemoryNode::layer("a", 10, 20, RgbaImage::from_pixel(40, 30, Rgba([9, 8, 7, 255])));
        let doc = MemoryDocument::new(100, 100, MemoryNode::group("root", vec![layer]));
        let frame = ResyncController::default()
            .compute(&doc, SourceMode::ActiveLayer)
            .unwrap();
        assert_eq!(frame.src_rect, IRect::new(10, 20, 40, 30));
        assert_eq!(frame.buffer_size(), (40, 30));
        assert_eq!(frame.base.get_pixel(5, 5).0, [9, 8, 7, 255]);
    }

    #[test]
    fn full_composite_downscales() {
        let layer = MemoryNode::layer("a", 0, 0, RgbaImage::from_pixel(400, 200, Rgba([255, 0, 0, 255])));
        let doc = MemoryDocument::new(400, 200, MemoryNode::group("root", vec![layer]));
        let frame = ResyncController::new(100)
            .compute(&doc, SourceMode::FullDocument)
            .unwrap();
        assert_relative_eq!(frame.scale, 0.25);
        assert_eq!(frame.buffer_size(), (100, 50));
        assert_eq!(frame.base.get_pixel(50, 25).0, [255, 0, 0, 255]);
    }

    #[test]
    fn missing_layer_fails_without_side_effects() {
        let mut doc = MemoryDocument::new(10, 10, MemoryNode::group("root", vec![]));
        doc.set_active_path(vec![]);
        assert!(matches!(
            ResyncController::default().compute(&doc, SourceMode::ActiveLayer),
            Err(LensError::NoActiveLayer)
        ));
    }
}
