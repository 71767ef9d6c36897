#![allow(clippy::too_many_arguments)]

pub mod app;
pub mod cli;
pub mod components;
pub mod error;
pub mod geometry;
pub mod host;
pub mod io;
pub mod logger;
pub mod ops;
pub mod project;
pub mod settings;
pub mod transform;

pub use app::{EventDisposition, HistoryAction, LensController, LensEvent, ViewState};
pub use error::{LensError, Result};
pub use host::{CanvasHost, LayerNode};
