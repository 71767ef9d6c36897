// ============================================================================
// IN-MEMORY DOCUMENT: a self-contained `CanvasHost` over `image` buffers
// ============================================================================
//
// Backs the headless CLI and the test suite. Layers are plain RGBA images
// placed at an offset; groups nest. Pixel reads hand out host-layout BGRA
// bytes exactly like an embedding application would.

use image::RgbaImage;
use image::imageops::{self, FilterType};

use crate::geometry::{IRect, PointF, RectF};
use crate::host::{CanvasHost, DocumentInfo, LayerNode, NodeKind, ViewportInfo, WidgetId};
use crate::ops::extract::composite_tree;
use crate::ops::pixels::{encode_host_bgra8, encode_host_bgra16};
use crate::transform::ViewParams;

pub const CANVAS_WIDGET: WidgetId = WidgetId(1);
pub const MAGNIFIER_WIDGET: WidgetId = WidgetId(2);

#[derive(Clone, Debug)]
pub struct MemoryNode {
    pub name: String,
    pub visible: bool,
    pub kind: NodeKind,
    /// Document position of the pixel buffer's top-left corner.
    pub x: i32,
    pub y: i32,
    pub opacity: u8,
    pub blend_mode: String,
    pub pixels: Option<RgbaImage>,
    pub children: Vec<MemoryNode>,
    /// Hand out 8 bytes per pixel instead of 4.
    pub sixteen_bit: bool,
    /// Truncate pixel reads by one byte, simulating a misbehaving host.
    pub corrupt_pixel_data: bool,
}

impl MemoryNode {
    pub fn layer(name: &str, x: i32, y: i32, pixels: RgbaImage) -> Self {
        Self {
            name: name.to_string(),
            visible: true,
            kind: NodeKind::Content,
            x,
            y,
            opacity: 255,
            blend_mode: "normal".to_string(),
            pixels: Some(pixels),
            children: Vec::new(),
            sixteen_bit: false,
            corrupt_pixel_data: false,
        }
    }

    pub fn group(name: &str, children: Vec<MemoryNode>) -> Self {
        Self {
            name: name.to_string(),
            visible: true,
            kind: NodeKind::Group,
            x: 0,
            y: 0,
            opacity: 255,
            blend_mode: "normal".to_string(),
            pixels: None,
            children,
            sixteen_bit: false,
            corrupt_pixel_data: false,
        }
    }

    /// Straight RGBA8 pixels of this node for `rect` (transparent where the
    /// node has no data).
    fn render_rect(&self, rect: IRect) -> RgbaImage {
        let (w, h) = (rect.width.max(0) as u32, rect.height.max(0) as u32);
        match self.kind {
            NodeKind::Group => composite_tree(self, rect)
                .map(|p| p.to_rgba8())
                .unwrap_or_else(|_| RgbaImage::new(w, h)),
            NodeKind::Content => {
                let mut out = RgbaImage::new(w, h);
                if let Some(src) = &self.pixels {
                    let overlap = rect.intersect(&self.bounds());
                    for y in overlap.y..overlap.bottom() {
                        for x in overlap.x..overlap.right() {
                            let p = *src.get_pixel((x - self.x) as u32, (y - self.y) as u32);
                            out.put_pixel((x - rect.x) as u32, (y - rect.y) as u32, p);
                        }
                    }
                }
                out
            }
        }
    }
}

impl LayerNode for MemoryNode {
    fn is_visible(&self) -> bool {
        self.visible
    }

    fn kind(&self) -> NodeKind {
        self.kind
    }

    fn bounds(&self) -> IRect {
        match self.kind {
            NodeKind::Group => self
                .children
                .iter()
                .fold(IRect::default(), |acc, c| acc.union(&c.bounds())),
            NodeKind::Content => match &self.pixels {
                Some(img) => IRect::new(self.x, self.y, img.width() as i32, img.height() as i32),
                None => IRect::default(),
            },
        }
    }

    fn opacity(&self) -> u8 {
        self.opacity
    }

    fn blend_mode(&self) -> &str {
        &self.blend_mode
    }

    fn children(&self) -> &[Self] {
        &self.children
    }

    fn pixel_data(&self, rect: IRect) -> Vec<u8> {
        if rect.is_empty() {
            return Vec::new();
        }
        let img = self.render_rect(rect);
        let mut bytes = if self.sixteen_bit {
            encode_host_bgra16(&img)
        } else {
            encode_host_bgra8(&img)
        };
        if self.corrupt_pixel_data {
            bytes.pop();
        }
        bytes
    }

    fn thumbnail(&self, width: u32, height: u32) -> Option<RgbaImage> {
        let bounds = self.bounds();
        if bounds.is_empty() || width == 0 || height == 0 {
            return None;
        }
        let full = self.render_rect(bounds);
        Some(imageops::resize(&full, width, height, FilterType::Triangle))
    }
}

/// Single open document with one view and one canvas viewport.
#[derive(Clone, Debug)]
pub struct MemoryDocument {
    pub width: u32,
    pub height: u32,
    pub resolution: f64,
    pub root: MemoryNode,
    /// Child indices from the root down to the active node.
    pub active_path: Vec<usize>,
    pub view: Option<ViewParams>,
    pub viewport: Option<ViewportInfo>,
    /// Global position of the canvas viewport's top-left corner.
    pub canvas_origin: PointF,
    /// Global area occupied by the magnifier widget, if shown.
    pub magnifier_area: Option<RectF>,
    pub has_focus: bool,
}

impl MemoryDocument {
    /// A document whose active node is the topmost root child and whose
    /// viewport exactly covers the document at zoom 1.
    pub fn new(width: u32, height: u32, root: MemoryNode) -> Self {
        let active_path = if root.children.is_empty() {
            Vec::new()
        } else {
            vec![root.children.len() - 1]
        };
        Self {
            width,
            height,
            resolution: 72.0,
            root,
            active_path,
            view: Some(ViewParams::default()),
            viewport: Some(ViewportInfo {
                width,
                height,
                visible: true,
            }),
            canvas_origin: PointF::default(),
            magnifier_area: None,
            has_focus: true,
        }
    }

    pub fn set_active_path(&mut self, path: Vec<usize>) {
        self.active_path = path;
    }

    pub fn active_node_mut(&mut self) -> Option<&mut MemoryNode> {
        let mut node = &mut self.root;
        for &i in &self.active_path {
            node = node.children.get_mut(i)?;
        }
        Some(node)
    }

    fn canvas_area(&self) -> Option<RectF> {
        let vp = self.viewport?;
        Some(RectF::new(
            self.canvas_origin.x,
            self.canvas_origin.y,
            vp.width as f64,
            vp.height as f64,
        ))
    }
}

impl CanvasHost for MemoryDocument {
    type Node = MemoryNode;

    fn document(&self) -> Option<DocumentInfo> {
        Some(DocumentInfo {
            width: self.width,
            height: self.height,
            resolution: self.resolution,
        })
    }

    fn root_node(&self) -> Option<&MemoryNode> {
        Some(&self.root)
    }

    fn active_node(&self) -> Option<&MemoryNode> {
        if self.active_path.is_empty() {
            return None;
        }
        let mut node = &self.root;
        for &i in &self.active_path {
            node = node.children.get(i)?;
        }
        Some(node)
    }

    fn view(&self) -> Option<ViewParams> {
        self.view
    }

    fn canvas_viewport(&self) -> Option<ViewportInfo> {
        self.viewport
    }

    fn widget_at(&self, global: PointF) -> Option<WidgetId> {
        if self.magnifier_area.is_some_and(|a| a.contains(global)) {
            return Some(MAGNIFIER_WIDGET);
        }
        self.canvas_area()
            .filter(|a| a.contains(global))
            .map(|_| CANVAS_WIDGET)
    }

    fn focus_widget(&self) -> Option<WidgetId> {
        self.has_focus.then_some(CANVAS_WIDGET)
    }

    fn central_widget(&self) -> Option<WidgetId> {
        self.viewport.map(|_| CANVAS_WIDGET)
    }

    fn map_from_global(&self, widget: WidgetId, global: PointF) -> Option<PointF> {
        let origin = match widget {
            CANVAS_WIDGET => {
                self.viewport?;
                self.canvas_origin
            }
            MAGNIFIER_WIDGET => {
                let a = self.magnifier_area?;
                PointF::new(a.x, a.y)
            }
            _ => return None,
        };
        Some(PointF::new(global.x - origin.x, global.y - origin.y))
    }
}
