// ============================================================================
// PATCH EXTRACTION: single layer reads and flattened layer-tree composites
// ============================================================================

use image::RgbaImage;
use rayon::prelude::*;

use crate::error::{LensError, Result};
use crate::geometry::IRect;
use crate::host::{CanvasHost, LayerNode, NodeKind};
use crate::ops::blend::{BlendMode, Premul};
use crate::ops::pixels::{PixelPatch, decode_host_pixels, premultiply, to_u8, unpremultiply};

/// Which pixels the lens mirrors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SourceMode {
    /// The host's active (editable) layer only.
    #[default]
    ActiveLayer,
    /// Every visible layer, flattened with its opacity and blend mode.
    FullDocument,
}

impl SourceMode {
    /// Index as stored in the settings blob. Unknown indices read as ActiveLayer.
    pub fn from_index(index: i64) -> Self {
        match index {
            1 => SourceMode::FullDocument,
            _ => SourceMode::ActiveLayer,
        }
    }

    pub fn index(self) -> i64 {
        match self {
            SourceMode::ActiveLayer => 0,
            SourceMode::FullDocument => 1,
        }
    }
}

/// Read `rect` from the host according to `mode`.
pub fn extract<H: CanvasHost>(host: &H, rect: IRect, mode: SourceMode) -> Result<PixelPatch> {
    if rect.is_empty() {
        return Err(LensError::invalid_region(rect));
    }
    host.document().ok_or(LensError::NoActiveDocument)?;
    match mode {
        SourceMode::ActiveLayer => {
            let node = host.active_node().ok_or(LensError::NoActiveLayer)?;
            extract_layer(node, rect)
        }
        SourceMode::FullDocument => {
            let root = host.root_node().ok_or(LensError::NoActiveDocument)?;
            composite_tree(root, rect)
        }
    }
}

/// Raw pixels of a single node, decoded to RGBA (8 or 16 bit).
pub fn extract_layer<N: LayerNode>(node: &N, rect: IRect) -> Result<PixelPatch> {
    if rect.is_empty() {
        return Err(LensError::invalid_region(rect));
    }
    let data = node.pixel_data(rect);
    let pixels = decode_host_pixels(&data, rect.width as u32, rect.height as u32)?;
    Ok(PixelPatch { rect, pixels })
}

/// Rows flattened per pass. The f32 accumulator only ever spans one band,
/// so peak memory stays close to the 8-bit output.
const COMPOSITE_BAND_ROWS: u32 = 256;

/// Flatten every visible content node under `root` into an 8-bit patch
/// covering `rect`. Nodes that fail to produce pixels are skipped.
pub fn composite_tree<N: LayerNode>(root: &N, rect: IRect) -> Result<PixelPatch> {
    composite_banded(root, rect, COMPOSITE_BAND_ROWS)
}

fn composite_banded<N: LayerNode>(root: &N, rect: IRect, band_rows: u32) -> Result<PixelPatch> {
    if rect.is_empty() {
        return Err(LensError::invalid_region(rect));
    }
    let (w, h) = (rect.width as u32, rect.height as u32);
    let band_rows = band_rows.clamp(1, h);
    let mut image = RgbaImage::new(w, h);
    let mut acc: Vec<Premul> = Vec::with_capacity(w as usize * band_rows as usize);

    for y0 in (0..h).step_by(band_rows as usize) {
        let rows = band_rows.min(h - y0);
        let band = IRect::new(rect.x, rect.y + y0 as i32, rect.width, rows as i32);
        acc.clear();
        acc.resize(w as usize * rows as usize, [0.0; 4]);
        composite_children(root, band, &mut acc);

        let start = y0 as usize * w as usize * 4;
        let out = &mut (*image)[start..start + acc.len() * 4];
        out.par_chunks_mut(4).zip(acc.par_iter()).for_each(|(px, p)| {
            let p = unpremultiply(*p);
            px.copy_from_slice(&[to_u8(p[0]), to_u8(p[1]), to_u8(p[2]), to_u8(p[3])]);
        });
    }
    Ok(PixelPatch::from_rgba8(rect, image))
}

fn composite_children<N: LayerNode>(node: &N, view: IRect, acc: &mut [Premul]) {
    for child in node.children() {
        if !child.is_visible() {
            continue;
        }
        match child.kind() {
            NodeKind::Group => composite_children(child, view, acc),
            NodeKind::Content => {
                if let Err(e) = composite_leaf(child, view, acc) {
                    tracing::debug!("skipping layer in composite: {e}");
                }
            }
        }
    }
}

fn composite_leaf<N: LayerNode>(node: &N, view: IRect, acc: &mut [Premul]) -> Result<()> {
    let bounds = node.bounds();
    if bounds.is_empty() {
        return Ok(());
    }
    let visible = view.intersect(&bounds);
    if visible.is_empty() {
        return Ok(());
    }
    let data = node.pixel_data(visible);
    if data.is_empty() {
        return Ok(());
    }
    let patch = PixelPatch {
        rect: visible,
        pixels: decode_host_pixels(&data, visible.width as u32, visible.height as u32)?,
    };

    let opacity = node.opacity() as f32 / 255.0;
    let mode = BlendMode::from_id(node.blend_mode());
    let stride = view.width as usize;
    let off_x = (visible.x - view.x) as usize;
    let off_y = (visible.y - view.y) as usize;
    let (pw, ph) = (visible.width as usize, visible.height as usize);

    acc.par_chunks_mut(stride)
        .skip(off_y)
        .take(ph)
        .enumerate()
        .for_each(|(sy, line)| {
            for sx in 0..pw {
                let src = premultiply(patch.pixel_f32(sx as u32, sy as u32));
                let dst = &mut line[off_x + sx];
                *dst = mode.combine(src, *dst, opacity);
            }
        });
    Ok(())
}
