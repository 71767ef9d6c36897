// ============================================================================
// HOST CAPABILITIES: the read-only view of the drawing application
// ============================================================================
//
// The lens never talks to a widget toolkit or a document model directly.
// Whatever embeds it implements `CanvasHost` (and `LayerNode` for its layer
// tree); every query may come back empty because the host owns the lifetime
// of documents, views and widgets.

use image::RgbaImage;

use crate::geometry::{IRect, PointF};
use crate::transform::ViewParams;

/// Group nodes are traversed but never contribute pixels or bounds directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Group,
    Content,
}

impl NodeKind {
    /// Classify a host type string ("grouplayer", "GroupLayer", "paintlayer", ...).
    pub fn from_type_name(name: &str) -> Self {
        if name.to_ascii_lowercase().contains("group") {
            NodeKind::Group
        } else {
            NodeKind::Content
        }
    }
}

/// A node of the host's layer tree. Read-only; the lens never mutates it.
pub trait LayerNode {
    fn is_visible(&self) -> bool;
    fn kind(&self) -> NodeKind;
    /// Extent of the node's pixels in document space (may be empty).
    fn bounds(&self) -> IRect;
    /// 0..=255
    fn opacity(&self) -> u8;
    /// Host blend-mode identifier, e.g. `"normal"`, `"multiply"`.
    fn blend_mode(&self) -> &str;
    /// Children in back-to-front order.
    fn children(&self) -> &[Self]
    where
        Self: Sized;
    /// Raw pixels for `rect` in host channel order (BGRA), either 4 or 8
    /// bytes per pixel. Any other length is treated as malformed.
    fn pixel_data(&self, rect: IRect) -> Vec<u8>;
    /// Host-provided downscaled rendering of the node at exactly `width`×`height`.
    fn thumbnail(&self, width: u32, height: u32) -> Option<RgbaImage>;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DocumentInfo {
    pub width: u32,
    pub height: u32,
    /// Dots per inch; non-positive values mean "unknown" and read as 72.
    pub resolution: f64,
}

impl DocumentInfo {
    pub fn bounds(&self) -> IRect {
        IRect::new(0, 0, self.width as i32, self.height as i32)
    }
}

/// Current geometry of the host's canvas viewport widget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewportInfo {
    pub width: u32,
    pub height: u32,
    pub visible: bool,
}

/// Opaque handle for a host widget, only compared for identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WidgetId(pub u64);

pub trait CanvasHost {
    type Node: LayerNode;

    fn document(&self) -> Option<DocumentInfo>;
    fn root_node(&self) -> Option<&Self::Node>;
    fn active_node(&self) -> Option<&Self::Node>;
    /// Zoom, rotation, mirror and the on-screen position of document (0,0).
    fn view(&self) -> Option<ViewParams>;
    /// `None` once the canvas viewport widget has been destroyed.
    fn canvas_viewport(&self) -> Option<ViewportInfo>;

    fn widget_at(&self, global: PointF) -> Option<WidgetId>;
    fn focus_widget(&self) -> Option<WidgetId>;
    fn central_widget(&self) -> Option<WidgetId>;
    /// Map a global screen position into `widget`'s local coordinates.
    fn map_from_global(&self, widget: WidgetId, global: PointF) -> Option<PointF>;
}
