// ============================================================================
// CanvasLens CLI: headless replay of a pointer stroke over a layered document
// ============================================================================
//
// Usage examples:
//   canvas-lens --layer bg.png --layer ink.png --stroke "120,80;160,90;200,140" \
//               --magnifier-out mag.png
//   canvas-lens --layer "layers/*.png" --source full --zoom 2 --rotation 90 \
//               --origin 600,0 --viewport 1200x900 --overlay-out overlay.png
//
// Layers stack bottom to top in the order given; the topmost is active.
// Stroke points are screen coordinates relative to the canvas viewport and
// are replayed as press / move ... / release, spaced so no event is throttled.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;

use crate::app::{DEFAULT_PREVIEW_SIZE, LensController};
use crate::components::input::{PointerEvent, SIZE_MULTIPLIERS};
use crate::geometry::PointF;
use crate::host::ViewportInfo;
use crate::io::{load_layer_image, load_settings, save_frame};
use crate::ops::extract::SourceMode;
use crate::project::{MemoryDocument, MemoryNode};
use crate::settings::LensSettings;
use crate::transform::ViewParams;

/// Gap between replayed events; above every throttle interval.
const REPLAY_STEP: Duration = Duration::from_millis(20);

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// CanvasLens headless magnifier.
#[derive(Parser, Debug)]
#[command(
    name = "canvas-lens",
    about = "Replay a stroke through the canvas magnifier and write its frames"
)]
pub struct CliArgs {
    /// Layer image(s), bottom to top. Glob patterns accepted.
    #[arg(short, long, required = true, num_args = 1..)]
    pub layer: Vec<String>,

    /// Document width (defaults to the first layer's width).
    #[arg(long)]
    pub width: Option<u32>,

    /// Document height (defaults to the first layer's height).
    #[arg(long)]
    pub height: Option<u32>,

    /// Document resolution in DPI.
    #[arg(long, default_value_t = 72.0)]
    pub resolution: f64,

    #[arg(long, default_value_t = 1.0)]
    pub zoom: f64,

    /// Clockwise view rotation in degrees.
    #[arg(long, default_value_t = 0.0)]
    pub rotation: f64,

    #[arg(long)]
    pub mirror: bool,

    /// Screen position of document (0,0), as `x,y`.
    #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
    pub origin: Option<PointF>,

    /// Canvas viewport size as `WxH` (defaults to the document size).
    #[arg(long, value_parser = parse_size)]
    pub viewport: Option<(u32, u32)>,

    /// What to mirror: `layer` (active layer) or `full` (flattened document).
    #[arg(long, value_name = "layer|full")]
    pub source: Option<String>,

    /// Crop multiplier: 1, 3 or 5.
    #[arg(long)]
    pub size: Option<u32>,

    /// Stroke as `x,y;x,y;...` in viewport coordinates.
    #[arg(long, allow_hyphen_values = true)]
    pub stroke: Option<String>,

    /// JSON settings file applied before the command-line overrides.
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    pub magnifier_out: Option<PathBuf>,

    /// Writing an overlay frame switches the overlay on.
    #[arg(long, value_name = "FILE")]
    pub overlay_out: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    pub preview_out: Option<PathBuf>,

    /// Magnifier frame size as `WxH`.
    #[arg(long, value_parser = parse_size, default_value = "400x400")]
    pub magnifier_size: (u32, u32),

    /// Debug-level logging.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the replay and return an OS exit code.
pub fn run(args: CliArgs) -> ExitCode {
    match run_replay(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            tracing::error!("replay failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_replay(args: &CliArgs) -> Result<(), String> {
    // -- Step 1: Build the document --------------------------------------
    let inputs = resolve_inputs(&args.layer);
    if inputs.is_empty() {
        return Err("no layer files matched the given pattern(s).".into());
    }
    let mut layers = Vec::with_capacity(inputs.len());
    for path in &inputs {
        let img = load_layer_image(path).map_err(|e| format!("load '{}' failed: {}", path.display(), e))?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Layer")
            .to_string();
        layers.push(MemoryNode::layer(&name, 0, 0, img));
    }
    let (first_w, first_h) = layers[0].pixels.as_ref().map(|p| p.dimensions()).unwrap_or((1, 1));
    let width = args.width.unwrap_or(first_w);
    let height = args.height.unwrap_or(first_h);

    let mut host = MemoryDocument::new(width, height, MemoryNode::group("root", layers));
    host.resolution = args.resolution;
    host.view = Some(ViewParams {
        origin: args.origin.unwrap_or_default(),
        rotation: args.rotation,
        zoom: args.zoom,
        mirrored: args.mirror,
    });
    let (vw, vh) = args.viewport.unwrap_or((width, height));
    host.viewport = Some(ViewportInfo {
        width: vw,
        height: vh,
        visible: true,
    });

    // -- Step 2: Configure the lens --------------------------------------
    let settings = match &args.settings {
        Some(path) => load_settings(path).map_err(|e| format!("settings: {}", e))?,
        None => LensSettings::default(),
    };
    let mut lens = LensController::new(settings);
    let mut now = Instant::now();

    if let Some(source) = &args.source {
        let mode = match source.to_lowercase().as_str() {
            "layer" => SourceMode::ActiveLayer,
            "full" => SourceMode::FullDocument,
            other => return Err(format!("unknown source '{}', expected layer or full", other)),
        };
        lens.set_source_mode(&host, mode);
    }
    if let Some(size) = args.size {
        let index = SIZE_MULTIPLIERS
            .iter()
            .position(|&m| m == size)
            .ok_or_else(|| format!("unsupported size {}, expected 1, 3 or 5", size))?;
        lens.set_size_index(index);
    }
    lens.set_enabled(&host, true, now);
    if args.overlay_out.is_some() {
        lens.set_overlay_enabled(&host, true, now);
    }

    // -- Step 3: Replay ---------------------------------------------------
    let points = match &args.stroke {
        Some(s) => parse_stroke(s)?,
        None => Vec::new(),
    };
    for (i, &p) in points.iter().enumerate() {
        now += REPLAY_STEP;
        let event = if i == 0 {
            PointerEvent::press(p, now)
        } else {
            PointerEvent::moved(p, now)
        };
        lens.handle_pointer(&host, &event, now);
        lens.tick(&host, now);
    }
    if let Some(&last) = points.last() {
        now += REPLAY_STEP;
        lens.handle_pointer(&host, &PointerEvent::release(last, now), now);
    }
    // Let the settle resync and any periodic work run once.
    now += Duration::from_millis(200);
    lens.tick(&host, now);
    if args.verbose {
        println!(
            "region {:?} at scale {:.4}",
            lens.view_state().src_rect,
            lens.view_state().scale
        );
    }

    // -- Step 4: Write frames ---------------------------------------------
    if let Some(out) = &args.magnifier_out {
        let (w, h) = args.magnifier_size;
        write(&lens.paint_magnifier(w, h), out)?;
    }
    if let Some(out) = &args.preview_out {
        write(&lens.compose_preview(DEFAULT_PREVIEW_SIZE, DEFAULT_PREVIEW_SIZE), out)?;
    }
    if let Some(out) = &args.overlay_out {
        let frame = lens
            .paint_overlay(&host)
            .cloned()
            .ok_or_else(|| "overlay produced no frame".to_string())?;
        write(&frame, out)?;
    }
    Ok(())
}

fn write(img: &image::RgbaImage, path: &Path) -> Result<(), String> {
    save_frame(img, path).map_err(|e| format!("save '{}' failed: {}", path.display(), e))?;
    println!("  → {}", path.display());
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

fn parse_point(s: &str) -> Result<PointF, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected x,y but got '{}'", s))?;
    let x = x.trim().parse::<f64>().map_err(|e| e.to_string())?;
    let y = y.trim().parse::<f64>().map_err(|e| e.to_string())?;
    Ok(PointF::new(x, y))
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .to_lowercase()
        .split_once('x')
        .map(|(w, h)| (w.trim().to_string(), h.trim().to_string()))
        .ok_or_else(|| format!("expected WxH but got '{}'", s))?;
    let w = w.parse::<u32>().map_err(|e| e.to_string())?;
    let h = h.parse::<u32>().map_err(|e| e.to_string())?;
    if w == 0 || h == 0 {
        return Err(format!("size '{}' has a zero dimension", s));
    }
    Ok((w, h))
}

fn parse_stroke(s: &str) -> Result<Vec<PointF>, String> {
    s.split(';')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(parse_point)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_points_sizes_and_strokes() {
        assert_eq!(parse_point("1.5,-2").unwrap(), PointF::new(1.5, -2.0));
        assert!(parse_point("3").is_err());
        assert_eq!(parse_size("640X480").unwrap(), (640, 480));
        assert!(parse_size("0x4").is_err());
        assert_eq!(
            parse_stroke("1,2; 3,4;").unwrap(),
            vec![PointF::new(1.0, 2.0), PointF::new(3.0, 4.0)]
        );
    }

    #[test]
    fn arguments_parse() {
        let args = CliArgs::try_parse_from([
            "canvas-lens",
            "--layer",
            "a.png",
            "--origin",
            "-10,5",
            "--viewport",
            "800x600",
            "--size",
            "3",
        ])
        .unwrap();
        assert_eq!(args.origin, Some(PointF::new(-10.0, 5.0)));
        assert_eq!(args.viewport, Some((800, 600)));
        assert_eq!(args.magnifier_size, (400, 400));
    }

    #[test]
    fn replay_writes_requested_frames() {
        let dir = tempfile::tempdir().unwrap();
        let layer = dir.path().join("ink.png");
        save_frame(
            &image::RgbaImage::from_pixel(64, 48, image::Rgba([0, 0, 0, 255])),
            &layer,
        )
        .unwrap();
        let mag = dir.path().join("mag.png");
        let overlay = dir.path().join("overlay.png");
        let layer_arg = layer.to_string_lossy().into_owned();
        let mag_arg = mag.to_string_lossy().into_owned();
        let overlay_arg = overlay.to_string_lossy().into_owned();
        let args = CliArgs::try_parse_from([
            "canvas-lens",
            "--layer",
            &layer_arg,
            "--stroke",
            "10,10;20,12;30,20",
            "--viewport",
            "100x80",
            "--magnifier-out",
            &mag_arg,
            "--overlay-out",
            &overlay_arg,
        ])
        .unwrap();
        assert_eq!(run(args), ExitCode::SUCCESS);
        assert_eq!(load_layer_image(&mag).unwrap().dimensions(), (400, 400));
        assert_eq!(load_layer_image(&overlay).unwrap().dimensions(), (100, 80));
    }
}
