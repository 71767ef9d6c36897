// ============================================================================
// FILE I/O: layer images in, frames and settings out (CLI only)
// ============================================================================

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageEncoder, ImageFormat, RgbaImage};

use crate::error::Result;
use crate::settings::LensSettings;

/// Formats a rendered frame can be written as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveFormat {
    Png,
    Jpeg,
    Bmp,
    Tga,
    Tiff,
}

impl SaveFormat {
    /// Infer from a file extension, defaulting to PNG.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase()
            .as_str()
        {
            "jpg" | "jpeg" => SaveFormat::Jpeg,
            "bmp" => SaveFormat::Bmp,
            "tga" => SaveFormat::Tga,
            "tiff" | "tif" => SaveFormat::Tiff,
            _ => SaveFormat::Png,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            SaveFormat::Png => "png",
            SaveFormat::Jpeg => "jpg",
            SaveFormat::Bmp => "bmp",
            SaveFormat::Tga => "tga",
            SaveFormat::Tiff => "tiff",
        }
    }
}

/// Decode any raster format the `image` crate supports into straight RGBA8.
pub fn load_layer_image(path: &Path) -> Result<RgbaImage> {
    Ok(image::open(path)?.to_rgba8())
}

/// Encode and write a frame; the format follows the file extension.
pub fn save_frame(image: &RgbaImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    match SaveFormat::from_path(path) {
        SaveFormat::Png => {
            let writer = BufWriter::new(File::create(path)?);
            PngEncoder::new(writer).write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        SaveFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut writer = BufWriter::new(File::create(path)?);
            JpegEncoder::new_with_quality(&mut writer, 90).encode(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                image::ColorType::Rgb8,
            )?;
        }
        SaveFormat::Bmp => image.save_with_format(path, ImageFormat::Bmp)?,
        SaveFormat::Tga => image.save_with_format(path, ImageFormat::Tga)?,
        SaveFormat::Tiff => image.save_with_format(path, ImageFormat::Tiff)?,
    }
    Ok(())
}

/// Read a settings file. A missing file means defaults; a corrupt one is
/// logged and also yields defaults.
pub fn load_settings(path: &Path) -> Result<LensSettings> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(LensSettings::from_json(&text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("no settings at {}, using defaults", path.display());
            Ok(LensSettings::default())
        }
        Err(e) => Err(e.into()),
    }
}

pub fn save_settings(path: &Path, settings: &LensSettings) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, settings.to_json()?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn settings_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("lens.json");
        let settings = LensSettings {
            is_active: true,
            size_index: 2,
            opacity: 40,
            color: "#ff0000".into(),
            ..Default::default()
        };
        save_settings(&path, &settings).unwrap();
        assert_eq!(load_settings(&path).unwrap(), settings);
    }

    #[test]
    fn missing_settings_file_is_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_settings(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, LensSettings::default());
    }

    #[test]
    fn png_frame_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        let img = RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, 40]));
        save_frame(&img, &path).unwrap();
        assert_eq!(load_layer_image(&path).unwrap(), img);
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(SaveFormat::from_path(Path::new("a.JPG")), SaveFormat::Jpeg);
        assert_eq!(SaveFormat::from_path(Path::new("a")), SaveFormat::Png);
        assert_eq!(SaveFormat::Tiff.extension(), "tiff");
    }
}
