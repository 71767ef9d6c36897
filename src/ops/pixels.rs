// ============================================================================
// PIXEL PATCHES: decoding raw host buffers into typed images
// ============================================================================

use image::{ImageBuffer, Rgba, RgbaImage};

use crate::error::{LensError, Result};
use crate::geometry::IRect;

/// 16-bit-per-channel RGBA image.
pub type Rgba16Image = ImageBuffer<Rgba<u16>, Vec<u16>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba8,
    Rgba16,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 => 4,
            PixelFormat::Rgba16 => 8,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PatchPixels {
    Rgba8(RgbaImage),
    Rgba16(Rgba16Image),
}

/// A rectangular block of pixels together with the document-space rect it
/// was read from. Straight (non-premultiplied) alpha, RGBA channel order.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelPatch {
    pub rect: IRect,
    pub pixels: PatchPixels,
}

impl PixelPatch {
    pub fn from_rgba8(rect: IRect, image: RgbaImage) -> Self {
        Self {
            rect,
            pixels: PatchPixels::Rgba8(image),
        }
    }

    pub fn width(&self) -> u32 {
        match &self.pixels {
            PatchPixels::Rgba8(img) => img.width(),
            PatchPixels::Rgba16(img) => img.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match &self.pixels {
            PatchPixels::Rgba8(img) => img.height(),
            PatchPixels::Rgba16(img) => img.height(),
        }
    }

    pub fn format(&self) -> PixelFormat {
        match &self.pixels {
            PatchPixels::Rgba8(_) => PixelFormat::Rgba8,
            PatchPixels::Rgba16(_) => PixelFormat::Rgba16,
        }
    }

    /// Straight-alpha RGBA in 0..=1.
    pub fn pixel_f32(&self, x: u32, y: u32) -> [f32; 4] {
        match &self.pixels {
            PatchPixels::Rgba8(img) => {
                let p = img.get_pixel(x, y);
                [
                    p[0] as f32 / 255.0,
                    p[1] as f32 / 255.0,
                    p[2] as f32 / 255.0,
                    p[3] as f32 / 255.0,
                ]
            }
            PatchPixels::Rgba16(img) => {
                let p = img.get_pixel(x, y);
                [
                    p[0] as f32 / 65535.0,
                    p[1] as f32 / 65535.0,
                    p[2] as f32 / 65535.0,
                    p[3] as f32 / 65535.0,
                ]
            }
        }
    }

    /// 8-bit view for drawing into preview buffers. 16-bit patches are
    /// scaled down to 8 bits.
    pub fn to_rgba8(&self) -> RgbaImage {
        match &self.pixels {
            PatchPixels::Rgba8(img) => img.clone(),
            PatchPixels::Rgba16(img) => {
                image::DynamicImage::ImageRgba16(img.clone()).into_rgba8()
            }
        }
    }
}

/// Decode a raw host buffer for a `width`×`height` region.
///
/// Hosts hand out BGRA in native byte order; 4 bytes per pixel is 8-bit,
/// 8 bytes per pixel is 16-bit. Channels are swapped into RGBA. Any other
/// length is rejected.
pub fn decode_host_pixels(data: &[u8], width: u32, height: u32) -> Result<PatchPixels> {
    let malformed = || LensError::MalformedPixelBuffer {
        len: data.len(),
        width,
        height,
    };
    let count = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(malformed)?;
    if count == 0 {
        return Err(malformed());
    }

    if data.len() == count * PixelFormat::Rgba8.bytes_per_pixel() {
        let mut buf = data.to_vec();
        for px in buf.chunks_exact_mut(4) {
            px.swap(0, 2);
        }
        let img = RgbaImage::from_raw(width, height, buf).ok_or_else(malformed)?;
        Ok(PatchPixels::Rgba8(img))
    } else if data.len() == count * PixelFormat::Rgba16.bytes_per_pixel() {
        // Host bytes carry no alignment guarantee for u16.
        let mut buf: Vec<u16> = bytemuck::pod_collect_to_vec(data);
        for px in buf.chunks_exact_mut(4) {
            px.swap(0, 2);
        }
        let img = Rgba16Image::from_raw(width, height, buf).ok_or_else(malformed)?;
        Ok(PatchPixels::Rgba16(img))
    } else {
        Err(malformed())
    }
}

/// Encode straight RGBA8 into host BGRA bytes. Inverse of the 8-bit decode
/// path; used by in-memory hosts.
pub fn encode_host_bgra8(img: &RgbaImage) -> Vec<u8> {
    let mut out = img.as_raw().clone();
    for px in out.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
    out
}

/// Encode straight RGBA8 into 16-bit host BGRA (native-endian `u16`s).
pub fn encode_host_bgra16(img: &RgbaImage) -> Vec<u8> {
    let mut words: Vec<u16> = img.as_raw().iter().map(|&v| v as u16 * 257).collect();
    for px in words.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
    bytemuck::cast_slice(&words).to_vec()
}

#[inline]
pub fn premultiply(p: [f32; 4]) -> [f32; 4] {
    [p[0] * p[3], p[1] * p[3], p[2] * p[3], p[3]]
}

#[inline]
pub fn unpremultiply(p: [f32; 4]) -> [f32; 4] {
    if p[3] <= 0.0 {
        return [0.0; 4];
    }
    [
        (p[0] / p[3]).min(1.0),
        (p[1] / p[3]).min(1.0),
        (p[2] / p[3]).min(1.0),
        p[3],
    ]
}

#[inline]
pub fn to_u8(v: f32) -> u8 {
    (v * 255.0 + 0.5).clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_8bit_bgra() {
        let data = [10u8, 20, 30, 255, 1, 2, 3, 4];
        let PatchPixels::Rgba8(img) = decode_host_pixels(&data, 2, 1).unwrap() else {
            panic!("expected 8-bit");
        };
        assert_eq!(img.get_pixel(0, 0).0, [30, 20, 10, 255]);
        assert_eq!(img.get_pixel(1, 0).0, [3, 2, 1, 4]);
    }

    #[test]
    fn decodes_16bit_bgra() {
        let src = RgbaImage::from_pixel(1, 1, Rgba([255, 0, 128, 255]));
        let data = encode_host_bgra16(&src);
        assert_eq!(data.len(), 8);
        let PatchPixels::Rgba16(img) = decode_host_pixels(&data, 1, 1).unwrap() else {
            panic!("expected 16-bit");
        };
        assert_eq!(img.get_pixel(0, 0).0, [65535, 0, 128 * 257, 65535]);
    }

    #[test]
    fn rejects_length_mismatch() {
        for len in [0usize, 3, 12, 15, 17, 31] {
            let data = vec![0u8; len];
            let err = decode_host_pixels(&data, 2, 2).unwrap_err();
            assert!(matches!(err, LensError::MalformedPixelBuffer { .. }), "len {len}");
        }
        assert!(decode_host_pixels(&[], 0, 0).is_err());
    }

    #[test]
    fn round_trips_through_host_layout() {
        let src = RgbaImage::from_fn(3, 2, |x, y| Rgba([x as u8 * 40, y as u8 * 90, 7, 200]));
        let PatchPixels::Rgba8(back) = decode_host_pixels(&encode_host_bgra8(&src), 3, 2).unwrap() else {
            panic!("expected 8-bit");
        };
        assert_eq!(back, src);
    }
}
