use std::time::{Duration, Instant};

use approx::assert_abs_diff_eq;
use canvas_lens::components::input::{PointerEvent, pointer_to_document};
use canvas_lens::components::resync::{ResyncController, buffer_scale, target_size};
use canvas_lens::geometry::{IRect, PointF, RectF};
use canvas_lens::ops::extract::SourceMode;
use canvas_lens::project::{MemoryDocument, MemoryNode};
use canvas_lens::settings::LensSettings;
use canvas_lens::transform::{ViewParams, current_transform};
use canvas_lens::{LensController, LensEvent};
use image::{Rgba, RgbaImage};

const RED: Rgba<u8> = Rgba([200, 10, 10, 255]);
const BLUE: [u8; 4] = [0, 0, 255, 255];

fn single_layer_doc() -> MemoryDocument {
    let layer = MemoryNode::layer("paint", 100, 100, RgbaImage::from_pixel(200, 200, RED));
    MemoryDocument::new(1000, 800, MemoryNode::group("root", vec![layer]))
}

#[test]
fn crop_and_destination_follow_the_pointer() {
    let host = single_layer_doc();
    let now = Instant::now();
    let mut lens = LensController::default();
    lens.set_enabled(&host, true, now);
    assert_eq!(lens.view_state().src_rect, IRect::new(100, 100, 200, 200));

    lens.handle_pointer(&host, &PointerEvent::press(PointF::new(150.0, 150.0), now), now);

    assert_eq!(lens.crop_size(), 100);
    assert_eq!(lens.magnifier().cursor_rect(), Some(RectF::new(0.0, 0.0, 100.0, 100.0)));
    let trail = lens.magnifier().trail().unwrap();
    assert_eq!(*trail.get_pixel(50, 50), RED);
    assert_eq!(trail.get_pixel(150, 150)[3], 0);
}

#[test]
fn large_region_is_downscaled_to_buffer_cap() {
    let region = IRect::new(0, 0, 5000, 4000);
    let scale = buffer_scale(region, 2500);
    assert_abs_diff_eq!(scale, 0.5);
    assert_eq!(target_size(region, scale), (2500, 2000));

    // Same proportions end to end, on a smaller document.
    let layer = MemoryNode::layer("big", 0, 0, RgbaImage::from_pixel(500, 400, RED));
    let host = MemoryDocument::new(500, 400, MemoryNode::group("root", vec![layer]));
    let mut lens = LensController::default().with_resync(ResyncController::new(250));
    lens.set_enabled(&host, true, Instant::now());
    assert_abs_diff_eq!(lens.view_state().scale, 0.5);
    assert_eq!(lens.magnifier().trail_size(), Some((250, 200)));
    assert_eq!(lens.magnifier().base().map(|b| b.dimensions()), Some((250, 200)));
}

#[test]
fn quarter_turn_swaps_axes() {
    let mut host = single_layer_doc();
    host.view = Some(ViewParams {
        origin: PointF::new(500.0, 0.0),
        rotation: 90.0,
        zoom: 1.0,
        mirrored: false,
    });
    let t = current_transform(&host).unwrap();
    let screen = t.map(PointF::new(10.0, 0.0));
    assert_abs_diff_eq!(screen.x, 500.0);
    assert_abs_diff_eq!(screen.y, 10.0);

    let doc = pointer_to_document(&host, PointF::new(500.0, 10.0), None).unwrap();
    assert_abs_diff_eq!(doc.x, 10.0);
    assert_abs_diff_eq!(doc.y, 0.0, epsilon = 1e-12);
}

#[test]
fn cropped_overlay_over_covering_document_draws_no_colour() {
    let layer = MemoryNode::layer("bg", 0, 0, RgbaImage::from_pixel(120, 80, RED));
    let host = MemoryDocument::new(120, 80, MemoryNode::group("root", vec![layer]));
    let settings = LensSettings {
        is_active: true,
        overlay: true,
        crop: true,
        source_index: SourceMode::FullDocument.index(),
        ..Default::default()
    };
    let mut lens = LensController::new(settings);
    lens.restore(&host, Instant::now());
    assert!(lens.overlay().is_some());

    let frame = lens.paint_overlay(&host).unwrap();
    assert_eq!(frame.dimensions(), (120, 80));
    assert!(frame.pixels().all(|p| p.0 != BLUE && p[3] == 0));
}

#[test]
fn settings_without_opacity_are_fully_opaque() {
    let settings = LensSettings::from_json(r##"{"is_active": false, "overlay": true, "color": "#00ff00"}"##);
    assert_eq!(settings.opacity, 100);
    let lens = LensController::new(settings);
    assert_eq!(lens.settings().overlay_config().opacity, 1.0);
    assert_eq!(lens.settings().overlay_config().color, Rgba([0, 255, 0, 255]));
}

#[test]
fn zoomed_out_overlay_fills_around_document_and_mirrors_inside() {
    let green = Rgba([0, 200, 0, 255]);
    let layer = MemoryNode::layer("bg", 0, 0, RgbaImage::from_pixel(120, 80, green));
    let mut host = MemoryDocument::new(120, 80, MemoryNode::group("root", vec![layer]));
    host.view = Some(ViewParams {
        zoom: 0.5,
        ..Default::default()
    });
    let settings = LensSettings {
        is_active: true,
        overlay: true,
        source_index: SourceMode::FullDocument.index(),
        ..Default::default()
    };
    let mut lens = LensController::new(settings);
    lens.restore(&host, Instant::now());

    let frame = lens.paint_overlay(&host).unwrap();
    assert_eq!(frame.get_pixel(100, 70).0, BLUE);
    assert_eq!(*frame.get_pixel(10, 10), green);
}

#[test]
fn burst_of_moves_runs_one_cycle() {
    let host = single_layer_doc();
    let start = Instant::now();
    let mut lens = LensController::default();
    lens.set_enabled(&host, true, start);
    lens.handle_pointer(&host, &PointerEvent::press(PointF::new(150.0, 150.0), start), start);
    lens.take_events();

    let mut cycles = 0;
    for i in 1..=20u64 {
        let t = start + Duration::from_millis(10) + Duration::from_micros(i * 400);
        lens.handle_pointer(&host, &PointerEvent::moved(PointF::new(150.0 + i as f64, 150.0), t), t);
        if lens.take_events().contains(&LensEvent::PreviewChanged) {
            cycles += 1;
        }
    }
    assert_eq!(cycles, 1);
}
