use crate::components::bounds::{BOUNDS_POLL_INTERVAL, compute_region, signature_changed};
use crate::components::input::{
    BASE_CAMERA_SIZE, InputRouter, PointerEvent, Route, SIZE_MULTIPLIERS, ThrottleConfig, cycle_geometry,
    pointer_to_document,
};
use crate::components::magnifier::{FitMapping, MagnifierSurface};
use crate::components::overlay::{OverlayFrame, OverlaySurface};
use crate::components::resync::{ResyncController, ResyncReason};
use crate::components::scheduler::{
    OVERLAY_REENABLE_DELAY, OVERLAY_SYNC_INTERVAL, SETTLE_DELAY, Scheduler, TaskKind,
};
use crate::error::{LensError, Result};
use crate::geometry::IRect;
use crate::host::{CanvasHost, LayerNode, WidgetId};
use crate::ops::extract::{SourceMode, extract};
use crate::ops::raster::{GRID_SIZE, draw_scaled, fill_checker};
use crate::settings::{LensSettings, format_color};
use crate::transform::{Transform, current_transform};
use image::{Rgba, RgbaImage};
use std::time::Instant;

/// Edge length of the camera preview frame.
pub const DEFAULT_PREVIEW_SIZE: u32 = 300;

// ============================================================================
// VIEW STATE: what the magnifier currently mirrors
// ============================================================================

/// Owned by the controller and only mutated by a committed resync.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewState {
    /// Document rect mirrored by the magnifier base.
    pub src_rect: IRect,
    /// Magnifier buffer pixels per document pixel (≤ 1).
    pub scale: f64,
    /// Geometry may only be computed while this is set.
    pub valid: bool,
    pub last_bounds_signature: Option<IRect>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            src_rect: IRect::default(),
            scale: 1.0,
            valid: false,
            last_bounds_signature: None,
        }
    }
}

/// Edit actions the host forwards after they happen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HistoryAction {
    Undo,
    Redo,
    Cut,
    Paste,
    Clear,
}

/// Change notifications for the embedding UI. Drained with
/// [`LensController::take_events`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LensEvent {
    MagnifierChanged,
    OverlayChanged,
    PreviewChanged,
    /// The overlay lost its host widget and was switched off.
    OverlayDisabled,
}

/// The lens only observes input; the host always keeps the event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventDisposition {
    Passthrough,
}

// ============================================================================
// LENS CONTROLLER: owns every surface, timer and piece of lens state
// ============================================================================

#[derive(Debug)]
pub struct LensController {
    settings: LensSettings,
    view: ViewState,
    router: InputRouter,
    resync: ResyncController,
    magnifier: MagnifierSurface,
    overlay: Option<OverlaySurface>,
    /// Transform the overlay was last painted or synced with.
    overlay_transform: Option<Transform>,
    /// Most recent draw patch, for the camera preview.
    last_patch: Option<RgbaImage>,
    scheduler: Scheduler,
    /// Validity token handed to delayed tasks; bumped whenever pending
    /// work must be discarded.
    token: u64,
    events: Vec<LensEvent>,
    magnifier_widget: Option<WidgetId>,
}

impl Default for LensController {
    fn default() -> Self {
        Self::new(LensSettings::default())
    }
}

impl LensController {
    /// Build a controller from stored settings. Nothing is started until
    /// [`LensController::restore`] or an explicit setter runs.
    pub fn new(settings: LensSettings) -> Self {
        let settings = settings.normalized();
        let mut magnifier = MagnifierSurface::new();
        magnifier.set_reticle_visible(settings.reticle);
        Self {
            settings,
            view: ViewState::default(),
            router: InputRouter::new(ThrottleConfig::default()),
            resync: ResyncController::default(),
            magnifier,
            overlay: None,
            overlay_transform: None,
            last_patch: None,
            scheduler: Scheduler::new(),
            token: 0,
            events: Vec::new(),
            magnifier_widget: None,
        }
    }

    pub fn with_resync(mut self, resync: ResyncController) -> Self {
        self.resync = resync;
        self
    }

    pub fn with_throttle(mut self, throttle: ThrottleConfig) -> Self {
        self.router = InputRouter::new(throttle);
        self
    }

    /// Bring the live state in line with the stored settings.
    pub fn restore<H: CanvasHost>(&mut self, host: &H, now: Instant) {
        if self.settings.is_active {
            self.set_enabled(host, true, now);
        }
    }

    // --- Accessors ---

    pub fn settings(&self) -> &LensSettings {
        &self.settings
    }

    pub fn view_state(&self) -> &ViewState {
        &self.view
    }

    pub fn magnifier(&self) -> &MagnifierSurface {
        &self.magnifier
    }

    pub fn overlay(&self) -> Option<&OverlaySurface> {
        self.overlay.as_ref()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn router(&self) -> &InputRouter {
        &self.router
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.is_active
    }

    pub fn source_mode(&self) -> SourceMode {
        self.settings.source_mode()
    }

    /// Edge of the square document crop for the current size multiplier.
    pub fn crop_size(&self) -> u32 {
        let idx = (self.settings.size_index.max(0) as usize).min(SIZE_MULTIPLIERS.len() - 1);
        BASE_CAMERA_SIZE * SIZE_MULTIPLIERS[idx]
    }

    /// The magnifier's own widget, skipped when resolving the pointer target.
    pub fn set_magnifier_widget(&mut self, widget: Option<WidgetId>) {
        self.magnifier_widget = widget;
    }

    pub fn take_events(&mut self) -> Vec<LensEvent> {
        std::mem::take(&mut self.events)
    }

    fn emit(&mut self, event: LensEvent) {
        if !self.events.contains(&event) {
            self.events.push(event);
        }
    }

    // --- Switches ---

    pub fn set_enabled<H: CanvasHost>(&mut self, host: &H, enabled: bool, now: Instant) {
        let running = self.scheduler.is_running(TaskKind::BoundsPoll);
        self.settings.is_active = enabled;
        if enabled == running {
            return;
        }
        if enabled {
            tracing::info!("lens enabled");
            self.scheduler
                .start_periodic(TaskKind::BoundsPoll, BOUNDS_POLL_INTERVAL, now);
            self.run_resync(host, ResyncReason::Enabled);
            if self.settings.overlay && self.overlay.is_none() {
                self.set_overlay_enabled(host, true, now);
            }
        } else {
            tracing::info!("lens disabled");
            self.token += 1;
            self.router.reset();
            self.scheduler.stop(TaskKind::BoundsPoll);
            self.scheduler.stop(TaskKind::OverlaySync);
            self.overlay = None;
            self.overlay_transform = None;
            self.view.valid = false;
            self.emit(LensEvent::OverlayChanged);
        }
    }

    pub fn set_size_index(&mut self, index: usize) {
        self.settings.size_index = if index < SIZE_MULTIPLIERS.len() { index as i64 } else { 0 };
    }

    pub fn set_source_mode<H: CanvasHost>(&mut self, host: &H, mode: SourceMode) {
        if mode == self.settings.source_mode() {
            return;
        }
        self.settings.source_index = mode.index();
        if let Some(overlay) = &mut self.overlay {
            overlay.config.source = mode;
        }
        if self.settings.is_active {
            self.run_resync(host, ResyncReason::SourceChanged);
        }
    }

    pub fn set_reticle_visible(&mut self, visible: bool) {
        self.settings.reticle = visible;
        self.magnifier.set_reticle_visible(visible);
        self.emit(LensEvent::MagnifierChanged);
    }

    // --- Overlay ---

    pub fn set_overlay_enabled<H: CanvasHost>(&mut self, host: &H, enabled: bool, now: Instant) {
        self.settings.overlay = enabled;
        if !enabled {
            self.overlay = None;
            self.overlay_transform = None;
            self.scheduler.stop(TaskKind::OverlaySync);
            self.emit(LensEvent::OverlayChanged);
            return;
        }
        if !self.settings.is_active {
            // Remembered; created when the lens is switched on.
            return;
        }
        let mut overlay = OverlaySurface::new(self.settings.overlay_config());
        if let Err(e) = overlay.sync_geometry(host.canvas_viewport()) {
            self.drop_overlay(e);
            return;
        }
        self.overlay = Some(overlay);
        self.overlay_transform = None;
        self.scheduler
            .start_periodic(TaskKind::OverlaySync, OVERLAY_SYNC_INTERVAL, now);
        self.emit(LensEvent::OverlayChanged);
    }

    /// 0 ..= 100
    pub fn set_overlay_opacity(&mut self, opacity: u8) {
        self.settings.opacity = opacity.min(100) as i64;
        self.refresh_overlay_config();
    }

    pub fn set_overlay_crop(&mut self, crop: bool) {
        self.settings.crop = crop;
        self.refresh_overlay_config();
    }

    pub fn set_overlay_outline(&mut self, outline: bool) {
        self.settings.outline = outline;
        self.refresh_overlay_config();
    }

    pub fn set_overlay_no_color(&mut self, no_color: bool) {
        self.settings.no_color = no_color;
        self.refresh_overlay_config();
    }

    pub fn set_overlay_color(&mut self, color: Rgba<u8>) {
        self.settings.color = format_color(color);
        self.refresh_overlay_config();
    }

    fn refresh_overlay_config(&mut self) {
        let config = self.settings.overlay_config();
        if let Some(overlay) = &mut self.overlay {
            overlay.config = config;
            self.emit(LensEvent::OverlayChanged);
        }
    }

    /// Release the overlay after its host widget disappeared.
    fn drop_overlay(&mut self, reason: LensError) {
        tracing::warn!("overlay disabled: {reason}");
        self.overlay = None;
        self.overlay_transform = None;
        self.settings.overlay = false;
        self.scheduler.stop(TaskKind::OverlaySync);
        self.emit(LensEvent::OverlayDisabled);
    }

    // --- Input ---

    /// Observe one pointer event. The event is never consumed.
    pub fn handle_pointer<H: CanvasHost>(&mut self, host: &H, event: &PointerEvent, now: Instant) -> EventDisposition {
        if !self.settings.is_active {
            return EventDisposition::Passthrough;
        }
        match self.router.route(event, self.view.valid) {
            Route::Passthrough => {}
            Route::Hover => {
                if let Err(e) = self.hover_cycle(host, event) {
                    tracing::debug!("hover cycle skipped: {e}");
                }
            }
            Route::Draw => {
                if let Err(e) = self.draw_cycle(host, event) {
                    tracing::debug!("draw cycle skipped: {e}");
                }
            }
            Route::StrokeFinished => {
                self.run_resync(host, ResyncReason::StrokeFinished);
                self.schedule_settle(now);
            }
        }
        EventDisposition::Passthrough
    }

    fn hover_cycle<H: CanvasHost>(&mut self, host: &H, event: &PointerEvent) -> Result<()> {
        let doc_point = pointer_to_document(host, event.global_pos, self.magnifier_widget)?;
        let geo = cycle_geometry(doc_point, self.view.src_rect, self.view.scale, self.crop_size());
        self.magnifier.update_cursor(geo.dest);
        self.emit(LensEvent::MagnifierChanged);
        Ok(())
    }

    fn draw_cycle<H: CanvasHost>(&mut self, host: &H, event: &PointerEvent) -> Result<()> {
        let transform = current_transform(host)?;
        let doc_point = pointer_to_document(host, event.global_pos, self.magnifier_widget)?;
        let geo = cycle_geometry(doc_point, self.view.src_rect, self.view.scale, self.crop_size());
        let patch = extract(host, geo.crop, self.settings.source_mode())?.to_rgba8();

        self.magnifier.stamp(&patch, geo.dest);
        let relayed = self.relay_to_overlay(host, &patch, geo.crop, transform);
        self.last_patch = Some(patch);

        self.emit(LensEvent::MagnifierChanged);
        if relayed {
            self.emit(LensEvent::OverlayChanged);
        }
        self.emit(LensEvent::PreviewChanged);
        Ok(())
    }

    /// Stamp a draw patch into the overlay's live buffer. Returns whether
    /// the overlay took it.
    fn relay_to_overlay<H: CanvasHost>(
        &mut self,
        host: &H,
        patch: &RgbaImage,
        crop: IRect,
        transform: Transform,
    ) -> bool {
        if self.overlay.is_none() {
            return false;
        }
        if host.canvas_viewport().is_none() {
            self.drop_overlay(LensError::HostWidgetGone);
            return false;
        }
        match &mut self.overlay {
            Some(overlay) if overlay.is_visible() => {
                overlay.stamp_live(patch, crop, transform);
                true
            }
            _ => false,
        }
    }

    // --- Resync triggers ---

    pub fn on_history_action<H: CanvasHost>(&mut self, host: &H, action: HistoryAction, now: Instant) {
        if !self.settings.is_active {
            return;
        }
        tracing::debug!("history action {action:?}");
        self.run_resync(host, ResyncReason::HistoryAction);
        self.schedule_settle(now);
    }

    /// The host switched (or closed) its active canvas.
    pub fn canvas_changed<H: CanvasHost>(&mut self, host: &H, now: Instant) {
        self.token += 1;
        if host.document().is_none() || host.canvas_viewport().is_none() {
            self.magnifier.set_base(None);
            self.view = ViewState::default();
            self.emit(LensEvent::MagnifierChanged);
            return;
        }
        if !self.settings.is_active {
            return;
        }
        self.view.last_bounds_signature = None;
        self.run_resync(host, ResyncReason::CanvasChanged);
        if self.overlay.take().is_some() {
            // The viewport widget is replaced on a canvas switch; rebuild later.
            self.overlay_transform = None;
            self.scheduler.stop(TaskKind::OverlaySync);
            self.scheduler
                .schedule_once(TaskKind::OverlayReenable, OVERLAY_REENABLE_DELAY, now, self.token);
            self.emit(LensEvent::OverlayChanged);
        }
    }

    fn schedule_settle(&mut self, now: Instant) {
        self.scheduler
            .schedule_once(TaskKind::SettleResync, SETTLE_DELAY, now, self.token);
    }

    /// Recompute the mirrored region and commit it. Returns false (leaving
    /// every piece of state untouched) when the host cannot provide it.
    fn run_resync<H: CanvasHost>(&mut self, host: &H, reason: ResyncReason) -> bool {
        let frame = match self.resync.compute(host, self.settings.source_mode()) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!("resync ({reason:?}) skipped: {e}");
                return false;
            }
        };
        let (w, h) = frame.buffer_size();
        tracing::info!(
            "resync ({reason:?}): region {:?}, scale {:.4}, buffer {w}x{h}",
            frame.src_rect,
            frame.scale
        );

        if self.magnifier.trail_size() != Some((w, h)) {
            self.magnifier.init_buffers(w, h);
        }
        self.magnifier.set_base(Some(frame.base));
        self.view = ViewState {
            src_rect: frame.src_rect,
            scale: frame.scale,
            valid: true,
            last_bounds_signature: Some(frame.src_rect),
        };
        if let Some(overlay) = &mut self.overlay {
            overlay.clear_live();
            self.emit(LensEvent::OverlayChanged);
        }
        self.emit(LensEvent::MagnifierChanged);
        true
    }

    // --- Timers ---

    /// Fire every scheduled task due at `now`.
    pub fn tick<H: CanvasHost>(&mut self, host: &H, now: Instant) {
        for task in self.scheduler.drain_due(now) {
            match task.kind {
                TaskKind::OverlaySync => self.sync_overlay(host),
                TaskKind::BoundsPoll => self.poll_bounds(host),
                TaskKind::SettleResync => {
                    if task.token != self.token || !self.settings.is_active {
                        tracing::debug!("settle resync dropped, lens state moved on");
                        continue;
                    }
                    self.run_resync(host, ResyncReason::Settle);
                }
                TaskKind::OverlayReenable => {
                    if task.token != self.token || !self.settings.overlay || self.overlay.is_some() {
                        continue;
                    }
                    self.set_overlay_enabled(host, true, now);
                }
            }
        }
    }

    fn sync_overlay<H: CanvasHost>(&mut self, host: &H) {
        let Some(overlay) = &mut self.overlay else {
            return;
        };
        let before = (overlay.size(), overlay.is_visible());
        if let Err(e) = overlay.sync_geometry(host.canvas_viewport()) {
            self.drop_overlay(e);
            return;
        }
        let after = (overlay.size(), overlay.is_visible());
        let transform = current_transform(host).ok();
        if before != after || transform != self.overlay_transform {
            self.overlay_transform = transform;
            self.emit(LensEvent::OverlayChanged);
        }
    }

    fn poll_bounds<H: CanvasHost>(&mut self, host: &H) {
        if !self.settings.is_active || self.settings.source_mode() != SourceMode::ActiveLayer {
            return;
        }
        match compute_region(host, SourceMode::ActiveLayer) {
            Ok(region) if signature_changed(self.view.last_bounds_signature, region) => {
                self.run_resync(host, ResyncReason::BoundsChanged);
            }
            Ok(_) => {}
            Err(e) => tracing::debug!("bounds poll skipped: {e}"),
        }
    }

    // --- Frames ---

    pub fn paint_magnifier(&self, width: u32, height: u32) -> RgbaImage {
        self.magnifier.compose_frame(width, height)
    }

    /// Overlay frame for the current view, or `None` when there is nothing
    /// to draw (overlay off or hidden, no document or view).
    pub fn paint_overlay<H: CanvasHost>(&mut self, host: &H) -> Option<&RgbaImage> {
        self.overlay.as_ref()?;
        if host.canvas_viewport().is_none() {
            self.drop_overlay(LensError::HostWidgetGone);
            return None;
        }
        let overlay = self.overlay.as_mut()?;
        if !overlay.is_visible() {
            return None;
        }
        let doc = host.document()?;
        let transform = current_transform(host).ok()?;
        let hole = match self.settings.source_mode() {
            SourceMode::ActiveLayer => host.active_node().map(|n| n.bounds()),
            SourceMode::FullDocument => host.root_node().map(|n| n.bounds()),
        }
        .unwrap_or_default();
        let base = if self.view.valid {
            self.magnifier.base().map(|b| (b, self.view.src_rect))
        } else {
            None
        };
        self.overlay_transform = Some(transform);
        overlay.paint(OverlayFrame {
            transform,
            document: doc.bounds(),
            hole,
            base,
        })
    }

    /// Camera preview: the last draw patch fitted into a `width`×`height`
    /// checkerboard frame.
    pub fn compose_preview(&self, width: u32, height: u32) -> RgbaImage {
        let mut frame = RgbaImage::new(width, height);
        fill_checker(&mut frame, GRID_SIZE);
        if let Some(patch) = &self.last_patch {
            let fit = FitMapping::new(patch.width(), patch.height(), width, height);
            draw_scaled(&mut frame, patch, fit.target);
        }
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PointF;
    use crate::project::{MemoryDocument, MemoryNode};
    use std::time::Duration;

    fn doc() -> MemoryDocument {
        let layer = MemoryNode::layer("paint", 100, 100, RgbaImage::from_pixel(200, 200, Rgba([200, 10, 10, 255])));
        MemoryDocument::new(1000, 800, MemoryNode::group("root", vec![layer]))
    }

    #[test]
    fn enable_resyncs_and_starts_poll() {
        let host = doc();
        let mut lens = LensController::default();
        lens.set_enabled(&host, true, Instant::now());
        assert!(lens.view_state().valid);
        assert_eq!(lens.view_state().src_rect, IRect::new(100, 100, 200, 200));
        assert!(lens.scheduler().is_running(TaskKind::BoundsPoll));
        assert_eq!(lens.magnifier().trail_size(), Some((200, 200)));
    }

    #[test]
    fn draw_stamps_magnifier_and_preview() {
        let host = doc();
        let now = Instant::now();
        let mut lens = LensController::default();
        lens.set_enabled(&host, true, now);
        lens.take_events();
        lens.handle_pointer(&host, &PointerEvent::press(PointF::new(150.0, 150.0), now), now);
        let events = lens.take_events();
        assert!(events.contains(&LensEvent::MagnifierChanged));
        assert!(events.contains(&LensEvent::PreviewChanged));
        assert_eq!(lens.magnifier().cursor_rect().map(|r| r.width), Some(100.0));
        let preview = lens.compose_preview(DEFAULT_PREVIEW_SIZE, DEFAULT_PREVIEW_SIZE);
        assert_eq!(preview.get_pixel(150, 150).0, [200, 10, 10, 255]);
    }

    #[test]
    fn size_index_scales_crop() {
        let mut lens = LensController::default();
        assert_eq!(lens.crop_size(), 100);
        lens.set_size_index(2);
        assert_eq!(lens.crop_size(), 500);
        lens.set_size_index(9);
        assert_eq!(lens.crop_size(), 100);
    }

    #[test]
    fn disabled_lens_ignores_input() {
        let host = doc();
        let now = Instant::now();
        let mut lens = LensController::default();
        lens.handle_pointer(&host, &PointerEvent::press(PointF::new(150.0, 150.0), now), now);
        assert!(lens.take_events().is_empty());
        assert!(lens.scheduler().is_empty());
    }

    #[test]
    fn bounds_poll_resyncs_on_change() {
        let mut host = doc();
        let now = Instant::now();
        let mut lens = LensController::default();
        lens.set_enabled(&host, true, now);
        if let Some(node) = host.active_node_mut() {
            node.x = 300;
        }
        lens.tick(&host, now + Duration::from_millis(150));
        assert_eq!(lens.view_state().src_rect, IRect::new(300, 100, 200, 200));
    }
}
