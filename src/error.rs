use thiserror::Error;

/// Every failure the lens pipeline can hit. All of them are recoverable: the
/// stage that sees one aborts its current cycle, leaves persistent state
/// untouched, and the caller skips that frame.
#[derive(Error, Debug)]
pub enum LensError {
    #[error("no active document")]
    NoActiveDocument,

    #[error("no active view")]
    NoActiveView,

    #[error("no active layer")]
    NoActiveLayer,

    #[error("invalid region {width}x{height} at ({x}, {y})")]
    InvalidRegion { x: i32, y: i32, width: i32, height: i32 },

    #[error("pixel buffer of {len} bytes does not match a {width}x{height} region")]
    MalformedPixelBuffer { len: usize, width: u32, height: u32 },

    #[error("host display surface is gone")]
    HostWidgetGone,

    #[error("settings error: {0}")]
    Settings(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl LensError {
    pub fn invalid_region(rect: crate::geometry::IRect) -> Self {
        LensError::InvalidRegion {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
        }
    }
}

pub type Result<T> = std::result::Result<T, LensError>;
