// ============================================================================
// BOUNDS TRACKER: region of interest and change detection
// ============================================================================

use std::time::Duration;

use crate::error::{LensError, Result};
use crate::geometry::IRect;
use crate::host::{CanvasHost, LayerNode, NodeKind};
use crate::ops::extract::SourceMode;

/// Active-layer bounds are not event driven, so they are polled.
pub const BOUNDS_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Snapshot of the mirrored region used to detect changes.
pub type BoundsSignature = IRect;

/// Region the magnifier mirrors for `mode`. Empty results fall back to the
/// full document rect; a degenerate document is an `InvalidRegion`.
pub fn compute_region<H: CanvasHost>(host: &H, mode: SourceMode) -> Result<IRect> {
    let doc = host.document().ok_or(LensError::NoActiveDocument)?;
    let region = match mode {
        SourceMode::ActiveLayer => host
            .active_node()
            .ok_or(LensError::NoActiveLayer)?
            .bounds(),
        SourceMode::FullDocument => host
            .root_node()
            .map(visible_content_bounds)
            .unwrap_or_default(),
    };
    let region = if region.is_empty() { doc.bounds() } else { region };
    if region.is_empty() {
        return Err(LensError::invalid_region(region));
    }
    Ok(region)
}

/// Union of the bounds of every visible content node, depth first. Groups
/// are walked but never contribute their own bounds.
pub fn visible_content_bounds<N: LayerNode>(root: &N) -> IRect {
    let mut total = IRect::default();
    for child in root.children() {
        if !child.is_visible() {
            continue;
        }
        match child.kind() {
            NodeKind::Group => total = total.union(&visible_content_bounds(child)),
            NodeKind::Content => total = total.union(&child.bounds()),
        }
    }
    total
}

/// True when `current` differs from the last committed signature (or none
/// was committed yet).
pub fn signature_changed(last: Option<BoundsSignature>, current: BoundsSignature) -> bool {
    last != Some(current)
}
