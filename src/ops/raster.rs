// ============================================================================
// RASTER HELPERS: the handful of painter operations the surfaces need
// ============================================================================

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::geometry::{IRect, PointF, Quad, RectF};

/// Cell size of the transparency checkerboard.
pub const GRID_SIZE: u32 = 12;
const GRID_DARK: Rgba<u8> = Rgba([220, 220, 220, 255]);
const GRID_LIGHT: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Fill `img` with a two-tone checkerboard (light cells on the diagonal).
pub fn fill_checker(img: &mut RgbaImage, cell: u32) {
    let cell = cell.max(1);
    for (x, y, px) in img.enumerate_pixels_mut() {
        let light = (x / cell) % 2 == (y / cell) % 2;
        *px = if light { GRID_LIGHT } else { GRID_DARK };
    }
}

/// Straight-alpha source-over of one pixel.
#[inline]
pub fn blend_over(dst: &mut Rgba<u8>, src: Rgba<u8>) {
    match src[3] {
        0 => {}
        255 => *dst = src,
        sa => {
            let sa = sa as f32 / 255.0;
            let da = dst[3] as f32 / 255.0;
            let oa = sa + da * (1.0 - sa);
            for c in 0..3 {
                let s = src[c] as f32 / 255.0;
                let d = dst[c] as f32 / 255.0;
                let v = (s * sa + d * da * (1.0 - sa)) / oa;
                dst[c] = (v * 255.0 + 0.5) as u8;
            }
            dst[3] = (oa * 255.0 + 0.5) as u8;
        }
    }
}

/// Smooth-scale `src` into `target` and composite it source-over.
pub fn draw_scaled(dst: &mut RgbaImage, src: &RgbaImage, target: IRect) {
    if target.is_empty() || src.width() == 0 || src.height() == 0 {
        return;
    }
    let (tw, th) = (target.width as u32, target.height as u32);
    if (tw, th) == src.dimensions() {
        imageops::overlay(dst, src, target.x as i64, target.y as i64);
    } else {
        let scaled = imageops::resize(src, tw, th, FilterType::Triangle);
        imageops::overlay(dst, &scaled, target.x as i64, target.y as i64);
    }
}

/// Nearest-scale `src` into `target`, replacing destination pixels
/// (including alpha) instead of blending.
pub fn stamp_replace(dst: &mut RgbaImage, src: &RgbaImage, target: IRect) {
    if target.is_empty() || src.width() == 0 || src.height() == 0 {
        return;
    }
    let (tw, th) = (target.width as u32, target.height as u32);
    let scaled;
    let src = if (tw, th) == src.dimensions() {
        src
    } else {
        scaled = imageops::resize(src, tw, th, FilterType::Nearest);
        &scaled
    };
    let bounds = IRect::new(0, 0, dst.width() as i32, dst.height() as i32);
    let clip = bounds.intersect(&target);
    for y in clip.y..clip.bottom() {
        for x in clip.x..clip.right() {
            let p = *src.get_pixel((x - target.x) as u32, (y - target.y) as u32);
            dst.put_pixel(x as u32, y as u32, p);
        }
    }
}

/// Outline a (possibly rotated) quad with a line `width` pixels wide.
pub fn stroke_quad(dst: &mut RgbaImage, quad: &Quad, width: f64, color: Rgba<u8>) {
    let half = width / 2.0;
    let area = quad.bounding_rect().expanded(half + 1.0);
    let x0 = area.x.floor().max(0.0) as u32;
    let y0 = area.y.floor().max(0.0) as u32;
    let x1 = (area.right().ceil().max(0.0) as u32).min(dst.width());
    let y1 = (area.bottom().ceil().max(0.0) as u32).min(dst.height());
    for y in y0..y1 {
        for x in x0..x1 {
            let c = PointF::new(x as f64 + 0.5, y as f64 + 0.5);
            if quad.distance_to_edge(c) <= half {
                blend_over(dst.get_pixel_mut(x, y), color);
            }
        }
    }
}

pub fn stroke_rect(dst: &mut RgbaImage, rect: RectF, width: f64, color: Rgba<u8>) {
    stroke_quad(dst, &Quad::new(rect.corners()), width, color);
}

/// Multiply every pixel's alpha by `opacity` (0..=1).
pub fn apply_opacity(img: &mut RgbaImage, opacity: f32) {
    let o = opacity.clamp(0.0, 1.0);
    if o >= 1.0 {
        return;
    }
    img.par_chunks_mut(4).for_each(|px| {
        px[3] = (px[3] as f32 * o + 0.5) as u8;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opacity_scales_alpha_only() {
        let mut img = RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, 200]));
        img.put_pixel(2, 1, Rgba([1, 2, 3, 0]));
        apply_opacity(&mut img, 0.5);
        assert_eq!(img.get_pixel(0, 0).0, [10, 20, 30, 100]);
        assert_eq!(img.get_pixel(2, 1).0, [1, 2, 3, 0]);
    }

    #[test]
    fn checker_alternates() {
        let mut img = RgbaImage::new(48, 48);
        fill_checker(&mut img, GRID_SIZE);
        assert_eq!(*img.get_pixel(0, 0), GRID_LIGHT);
        assert_eq!(*img.get_pixel(12, 0), GRID_DARK);
        assert_eq!(*img.get_pixel(12, 12), GRID_LIGHT);
    }

    #[test]
    fn stamp_replaces_alpha_and_clips() {
        let mut dst = RgbaImage::from_pixel(4, 4, Rgba([9, 9, 9, 255]));
        let src = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 0]));
        stamp_replace(&mut dst, &src, IRect::new(2, 2, 4, 4));
        assert_eq!(dst.get_pixel(3, 3).0, [0, 0, 0, 0]);
        assert_eq!(dst.get_pixel(1, 1).0, [9, 9, 9, 255]);
    }

    #[test]
    fn stroke_touches_only_outline() {
        let mut dst = RgbaImage::new(20, 20);
        stroke_rect(&mut dst, RectF::new(2.0, 2.0, 16.0, 16.0), 2.0, Rgba([0, 0, 0, 255]));
        assert_eq!(dst.get_pixel(2, 10)[3], 255);
        assert_eq!(dst.get_pixel(10, 10)[3], 0);
    }

    #[test]
    fn blend_over_half_alpha() {
        let mut px = Rgba([0, 0, 0, 255]);
        blend_over(&mut px, Rgba([255, 255, 255, 128]));
        assert!((px[0] as i32 - 128).abs() <= 1);
        assert_eq!(px[3], 255);
    }
}
