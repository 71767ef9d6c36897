pub mod blend;
pub mod extract;
pub mod pixels;
pub mod raster;
