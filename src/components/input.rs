// ============================================================================
// INPUT ROUTER: observes pointer events and decides hover vs. draw cycles
// ============================================================================
//
// The router never consumes input: the host keeps its normal editing
// behaviour and the lens only reacts to what it sees.

use std::time::{Duration, Instant};

use crate::error::{LensError, Result};
use crate::geometry::{IRect, PointF, RectF};
use crate::host::{CanvasHost, WidgetId};
use crate::transform::current_transform;

/// Edge length of the mirrored crop at multiplier 1, in document pixels.
pub const BASE_CAMERA_SIZE: u32 = 100;

/// Multipliers selectable from the UI ("Normal", "Wide", "Ultra").
pub const SIZE_MULTIPLIERS: [u32; 3] = [1, 3, 5];

pub const DEFAULT_DRAW_INTERVAL: Duration = Duration::from_millis(10);
pub const DEFAULT_HOVER_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RouterState {
    #[default]
    Idle,
    Hovering,
    Drawing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerEventKind {
    Press,
    Move,
    Release,
}

/// Mouse and tablet events are routed identically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PointerDevice {
    #[default]
    Mouse,
    Tablet,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PointerButton {
    #[default]
    None,
    Left,
    Middle,
    Right,
}

/// Buttons held at the time of the event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct PointerButtons {
    pub left: bool,
    pub middle: bool,
    pub right: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerEvent {
    pub kind: PointerEventKind,
    pub device: PointerDevice,
    /// Button that changed state (press/release only).
    pub button: PointerButton,
    pub buttons: PointerButtons,
    pub modifiers: Modifiers,
    /// Global screen position.
    pub global_pos: PointF,
    pub time: Instant,
}

impl PointerEvent {
    pub fn press(global_pos: PointF, time: Instant) -> Self {
        Self {
            kind: PointerEventKind::Press,
            device: PointerDevice::Mouse,
            button: PointerButton::Left,
            buttons: PointerButtons {
                left: true,
                ..Default::default()
            },
            modifiers: Modifiers::default(),
            global_pos,
            time,
        }
    }

    pub fn moved(global_pos: PointF, time: Instant) -> Self {
        Self {
            kind: PointerEventKind::Move,
            button: PointerButton::None,
            buttons: PointerButtons::default(),
            ..Self::press(global_pos, time)
        }
    }

    pub fn release(global_pos: PointF, time: Instant) -> Self {
        Self {
            kind: PointerEventKind::Release,
            buttons: PointerButtons::default(),
            ..Self::press(global_pos, time)
        }
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn with_button(mut self, button: PointerButton, buttons: PointerButtons) -> Self {
        self.button = button;
        self.buttons = buttons;
        self
    }

    pub fn from_tablet(mut self) -> Self {
        self.device = PointerDevice::Tablet;
        self
    }

    /// Pan/zoom/rotate gestures: Ctrl or Alt held, or the middle button alone.
    pub fn is_navigating(&self) -> bool {
        let middle_only = self.buttons.middle && !self.buttons.left && !self.buttons.right;
        self.modifiers.ctrl || self.modifiers.alt || middle_only
    }
}

/// What the controller should do with an observed event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Passthrough,
    Hover,
    Draw,
    StrokeFinished,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThrottleConfig {
    pub draw_interval: Duration,
    pub hover_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            draw_interval: DEFAULT_DRAW_INTERVAL,
            hover_interval: DEFAULT_HOVER_INTERVAL,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct InputRouter {
    state: RouterState,
    /// Shared between hover and draw cycles.
    last_process: Option<Instant>,
    pub throttle: ThrottleConfig,
}

impl InputRouter {
    pub fn new(throttle: ThrottleConfig) -> Self {
        Self {
            throttle,
            ..Default::default()
        }
    }

    pub fn state(&self) -> RouterState {
        self.state
    }

    /// Forget any in-progress stroke (tracking turned off).
    pub fn reset(&mut self) {
        self.state = RouterState::Idle;
        self.last_process = None;
    }

    pub fn route(&mut self, event: &PointerEvent, view_valid: bool) -> Route {
        if !view_valid {
            return Route::Passthrough;
        }
        if event.is_navigating() {
            self.state = RouterState::Idle;
            return Route::Passthrough;
        }

        match event.kind {
            PointerEventKind::Press => {
                if event.button != PointerButton::Left {
                    return Route::Passthrough;
                }
                self.state = RouterState::Drawing;
                if self.throttle_ok(event.time, self.throttle.draw_interval) {
                    Route::Draw
                } else {
                    Route::Passthrough
                }
            }
            PointerEventKind::Release => {
                if self.state == RouterState::Drawing {
                    self.state = RouterState::Hovering;
                    Route::StrokeFinished
                } else {
                    Route::Passthrough
                }
            }
            PointerEventKind::Move => {
                if self.state == RouterState::Drawing {
                    if self.throttle_ok(event.time, self.throttle.draw_interval) {
                        Route::Draw
                    } else {
                        Route::Passthrough
                    }
                } else {
                    self.state = RouterState::Hovering;
                    if self.throttle_ok(event.time, self.throttle.hover_interval) {
                        Route::Hover
                    } else {
                        Route::Passthrough
                    }
                }
            }
        }
    }

    fn throttle_ok(&mut self, now: Instant, interval: Duration) -> bool {
        if let Some(last) = self.last_process
            && now.saturating_duration_since(last) < interval
        {
            return false;
        }
        self.last_process = Some(now);
        true
    }
}

/// Per-cycle geometry: where to read and where to stamp.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CycleGeometry {
    pub doc_point: PointF,
    /// Square document-space crop centred on the pointer.
    pub crop: IRect,
    /// Crop footprint in magnifier-buffer space.
    pub dest: RectF,
}

/// Crop and destination rects for a pointer at `doc_point`, given the
/// mirrored region `src_rect` and its buffer `scale`.
pub fn cycle_geometry(doc_point: PointF, src_rect: IRect, scale: f64, crop_size: u32) -> CycleGeometry {
    let size = crop_size as f64;
    let crop_x = (doc_point.x - size / 2.0).floor() as i32;
    let crop_y = (doc_point.y - size / 2.0).floor() as i32;
    let center = PointF::new(
        (doc_point.x - src_rect.x as f64) * scale,
        (doc_point.y - src_rect.y as f64) * scale,
    );
    let display = size * scale;
    CycleGeometry {
        doc_point,
        crop: IRect::new(crop_x, crop_y, crop_size as i32, crop_size as i32),
        dest: RectF::from_center_size(center, display, display),
    }
}

/// Resolve a global pointer position to a document point.
///
/// The widget under the pointer is used unless it is the magnifier itself
/// (or nothing), in which case the focus widget and then the central widget
/// stand in. In multi-window layouts that fallback is best effort only.
pub fn pointer_to_document<H: CanvasHost>(
    host: &H,
    global: PointF,
    magnifier: Option<WidgetId>,
) -> Result<PointF> {
    let transform = current_transform(host)?;
    let target = host
        .widget_at(global)
        .filter(|w| Some(*w) != magnifier)
        .or_else(|| host.focus_widget())
        .or_else(|| host.central_widget())
        .ok_or(LensError::NoActiveView)?;
    let local = host
        .map_from_global(target, global)
        .ok_or(LensError::NoActiveView)?;
    transform
        .map_screen_to_document(local)
        .ok_or(LensError::NoActiveView)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> Instant {
        Instant::now()
    }

    #[test]
    fn press_move_release_cycle() {
        let now = t0();
        let mut r = InputRouter::default();
        let p = PointF::new(1.0, 1.0);
        assert_eq!(r.route(&PointerEvent::moved(p, now), true), Route::Hover);
        assert_eq!(r.state(), RouterState::Hovering);
        let later = now + Duration::from_millis(20);
        assert_eq!(r.route(&PointerEvent::press(p, later), true), Route::Draw);
        assert_eq!(r.state(), RouterState::Drawing);
        let later = later + Duration::from_millis(20);
        assert_eq!(r.route(&PointerEvent::moved(p, later), true), Route::Draw);
        assert_eq!(r.route(&PointerEvent::release(p, later), true), Route::StrokeFinished);
        assert_eq!(r.state(), RouterState::Hovering);
        assert_eq!(r.route(&PointerEvent::release(p, later), true), Route::Passthrough);
    }

    #[test]
    fn burst_within_interval_runs_one_cycle() {
        let start = t0();
        let mut r = InputRouter::default();
        r.route(&PointerEvent::press(PointF::default(), start), true);
        let cycles = (1..=9)
            .map(|i| start + Duration::from_millis(10) + Duration::from_micros(i * 100))
            .filter(|&t| r.route(&PointerEvent::moved(PointF::default(), t), true) == Route::Draw)
            .count();
        assert_eq!(cycles, 1);
    }

    #[test]
    fn hover_throttle_is_shorter() {
        let start = t0();
        let mut r = InputRouter::default();
        assert_eq!(r.route(&PointerEvent::moved(PointF::default(), start), true), Route::Hover);
        let t = start + Duration::from_millis(6);
        assert_eq!(r.route(&PointerEvent::moved(PointF::default(), t), true), Route::Hover);
        let t = t + Duration::from_millis(2);
        assert_eq!(r.route(&PointerEvent::moved(PointF::default(), t), true), Route::Passthrough);
    }

    #[test]
    fn navigation_forces_idle() {
        let now = t0();
        let mut r = InputRouter::default();
        r.route(&PointerEvent::press(PointF::default(), now), true);
        let nav = PointerEvent::moved(PointF::default(), now + Duration::from_millis(50)).with_modifiers(
            Modifiers {
                alt: true,
                ..Default::default()
            },
        );
        assert_eq!(r.route(&nav, true), Route::Passthrough);
        assert_eq!(r.state(), RouterState::Idle);

        let middle = PointerEvent::press(PointF::default(), now + Duration::from_millis(90)).with_button(
            PointerButton::Middle,
            PointerButtons {
                middle: true,
                ..Default::default()
            },
        );
        assert!(middle.is_navigating());
        assert_eq!(r.route(&middle, true), Route::Passthrough);
    }

    #[test]
    fn invalid_view_passes_through_untouched() {
        let mut r = InputRouter::default();
        let tablet = PointerEvent::press(PointF::default(), t0()).from_tablet();
        assert_eq!(r.route(&tablet, false), Route::Passthrough);
        assert_eq!(r.state(), RouterState::Idle);
        assert_eq!(r.route(&tablet, true), Route::Draw);
    }

    #[test]
    fn right_press_is_ignored() {
        let mut r = InputRouter::default();
        let right = PointerEvent::press(PointF::default(), t0()).with_button(
            PointerButton::Right,
            PointerButtons {
                right: true,
                ..Default::default()
            },
        );
        assert_eq!(r.route(&right, true), Route::Passthrough);
        assert_eq!(r.state(), RouterState::Idle);
    }

    #[test]
    fn geometry_centres_crop_on_pointer() {
        let g = cycle_geometry(PointF::new(150.0, 150.0), IRect::new(100, 100, 200, 200), 1.0, BASE_CAMERA_SIZE);
        assert_eq!(g.crop, IRect::new(100, 100, 100, 100));
        assert_eq!(g.dest, RectF::new(0.0, 0.0, 100.0, 100.0));

        let scaled = cycle_geometry(PointF::new(2500.0, 2000.0), IRect::new(0, 0, 5000, 4000), 0.5, 300);
        assert_eq!(scaled.crop, IRect::new(2350, 1850, 300, 300));
        assert_eq!(scaled.dest, RectF::new(1175.0, 925.0, 150.0, 150.0));
    }
}
