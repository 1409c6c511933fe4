// ============================================================================
// batchpix CLI — headless batch processing via command-line arguments
// ============================================================================
//
// Usage examples:
//   batchpix --input photo.png --format webp --quality 85 --output-dir out/
//   batchpix -i "*.jpg" --filter sepia --resize-width 1280 --output-dir out/
//   batchpix -i shots/ --wm-text "© 2026" --wm-position "bottom right" -o out/
//   batchpix -i a.png b.png --brightness 1.2 --rotate 90 -o out/
//
// All edits given here are global: the same pipeline is replayed on every
// input image (geometry is in source-pixel space, so it adapts to each
// image's native resolution).  Processing fans out over a bounded worker
// pool; per-item failures never abort the batch.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use clap::Parser;

use crate::error::EngineError;
use crate::export::{
    BatchReport, CancelToken, ExportFormat, ExportItem, ExportOptions, ItemStatus, export_all,
};
use crate::log_info;
use crate::ops::{
    Adjustment, Anchor, FilterKind, ImageWatermark, Operation, ResizeSpec, TextWatermark,
    TransformKind,
};
use crate::pipeline::EditPipeline;
use crate::settings::AppSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// batchpix headless batch image processor.
///
/// Replay a set of edits over many images and export them — no GUI required.
#[derive(Parser, Debug)]
#[command(
    name = "batchpix",
    about = "batchpix headless batch image processor",
    long_about = "Apply masks-free batch edits (filter, tone, resize, rotation, watermarks)\n\
                  to a set of images and export them as PNG, JPEG or WEBP.\n\n\
                  Example:\n  \
                  batchpix --input \"*.jpg\" --filter sepia --wm-text \"© 2026\" \\\n           \
                  --format webp --quality 85 --output-dir processed/"
)]
pub struct CliArgs {
    /// Input file(s), folder(s), or glob patterns (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Output directory. Defaults to each input file's own folder
    /// (collisions with the source are warned about, not prevented).
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format: png, jpeg, webp. Defaults to the saved preference.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG / WEBP quality (1–100). Defaults to the saved preference.
    #[arg(short, long, value_name = "1-100")]
    pub quality: Option<u8>,

    /// Output filename pattern; `<OriginalName>` and `<#>` are expanded.
    #[arg(long, value_name = "PATTERN")]
    pub pattern: Option<String>,

    /// Settings/preset file to seed defaults from (watermark, format, ...).
    #[arg(long, value_name = "FILE")]
    pub preset: Option<PathBuf>,

    // -- pipeline: single-slot ops ---------------------------------------
    /// Filter: none, grayscale, sepia, blur, sharpen, edge-enhance, contour.
    #[arg(long, value_name = "NAME")]
    pub filter: Option<String>,

    /// Brightness factor, 0–2 (1.0 = unchanged).
    #[arg(long, value_name = "FACTOR")]
    pub brightness: Option<f32>,

    /// Contrast factor, 0–2 (1.0 = unchanged).
    #[arg(long, value_name = "FACTOR")]
    pub contrast: Option<f32>,

    /// Saturation factor, 0–2 (1.0 = unchanged).
    #[arg(long, value_name = "FACTOR")]
    pub saturation: Option<f32>,

    /// Target width in pixels (aspect preserved unless --exact-size).
    #[arg(long, value_name = "PX")]
    pub resize_width: Option<u32>,

    /// Target height in pixels (aspect preserved unless --exact-size).
    #[arg(long, value_name = "PX")]
    pub resize_height: Option<u32>,

    /// With both resize dimensions: stretch to exactly that size.
    #[arg(long)]
    pub exact_size: bool,

    // -- pipeline: transforms ---------------------------------------------
    /// Rotate: 90 (clockwise), -90, 270, or 180.
    #[arg(long, value_name = "DEG")]
    pub rotate: Option<i32>,

    /// Mirror left↔right.
    #[arg(long)]
    pub flip_h: bool,

    /// Mirror top↕bottom.
    #[arg(long)]
    pub flip_v: bool,

    // -- pipeline: text watermark ------------------------------------------
    /// Text watermark content. Presence enables the watermark.
    #[arg(long, value_name = "TEXT")]
    pub wm_text: Option<String>,

    /// Watermark font size in source pixels.
    #[arg(long, value_name = "PX")]
    pub wm_size: Option<f32>,

    /// Watermark color as #RRGGBB.
    #[arg(long, value_name = "HEX")]
    pub wm_color: Option<String>,

    /// Watermark opacity, 0–1.
    #[arg(long, value_name = "0-1")]
    pub wm_opacity: Option<f32>,

    /// Placement: center, top left, top right, bottom left, bottom right,
    /// tile, diagonal fit.
    #[arg(long, value_name = "POS")]
    pub wm_position: Option<String>,

    /// Font file for the watermark (defaults to the system sans-serif).
    #[arg(long, value_name = "FILE")]
    pub wm_font: Option<PathBuf>,

    // -- pipeline: image watermark -----------------------------------------
    /// Image watermark file. Presence enables it.
    #[arg(long, value_name = "FILE")]
    pub wm_image: Option<PathBuf>,

    /// Image watermark top-left position in source pixels.
    #[arg(long, value_name = "PX", default_value_t = 10.0)]
    pub wm_image_x: f32,

    #[arg(long, value_name = "PX", default_value_t = 10.0)]
    pub wm_image_y: f32,

    /// Image watermark scale factor on its native size.
    #[arg(long, value_name = "FACTOR", default_value_t = 1.0)]
    pub wm_image_scale: f32,

    /// Image watermark rotation in degrees counter-clockwise.
    #[arg(long, value_name = "DEG", default_value_t = 0.0)]
    pub wm_image_rotation: f32,

    /// Image watermark opacity, 0–1.
    #[arg(long, value_name = "0-1", default_value_t = 0.5)]
    pub wm_image_opacity: f32,

    /// Worker threads for the export pool (default: rayon's choice).
    #[arg(short = 'j', long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Print per-file timing and degraded-render warnings.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the batch and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    let settings = match &args.preset {
        Some(path) => AppSettings::load_from(path),
        None => AppSettings::load(),
    };

    let options = match build_options(&args, &settings) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let pipeline = match build_pipeline(&args, &settings) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let items: Vec<ExportItem> = inputs
        .iter()
        .map(|path| ExportItem { source: path.clone(), pipeline: pipeline.clone() })
        .collect();

    let total = items.len();
    log_info!("batch export: {} file(s), format {:?}", total, options.format);
    let start = Instant::now();

    let report = run_batch(&items, &options, args.jobs);

    print_report(&report, args.verbose, start);
    remember_settings(&args, &options, settings);

    if report.failed == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

fn run_batch(items: &[ExportItem], options: &ExportOptions, jobs: Option<usize>) -> BatchReport {
    let cancel = CancelToken::new();
    let last_printed = AtomicUsize::new(0);
    let progress = |done: usize, total: usize| {
        // The completed count only ever grows; skip stale out-of-order calls.
        if last_printed.fetch_max(done, Ordering::SeqCst) < done {
            println!("[{}/{}] complete", done, total);
        }
    };

    match jobs {
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new().num_threads(n.max(1)).build();
            match pool {
                Ok(pool) => pool.install(|| export_all(items, options, &cancel, &progress)),
                Err(e) => {
                    eprintln!("warning: cannot build {n}-thread pool ({e}); using default");
                    export_all(items, options, &cancel, &progress)
                }
            }
        }
        None => export_all(items, options, &cancel, &progress),
    }
}

fn print_report(report: &BatchReport, verbose: bool, start: Instant) {
    for item in &report.items {
        match &item.status {
            ItemStatus::Written(path) => {
                if verbose {
                    println!("  {} → {}", item.source.display(), path.display());
                }
            }
            ItemStatus::Failed(e) => eprintln!("  error: {}: {}", item.source.display(), e),
            ItemStatus::Cancelled => eprintln!("  cancelled: {}", item.source.display()),
        }
        for warning in &item.warnings {
            if verbose {
                eprintln!("  warning: {}: {}", item.source.display(), warning);
            }
        }
    }
    println!(
        "Conversion complete. Success: {}, Failed: {}. ({:.1}s)",
        report.succeeded,
        report.failed,
        start.elapsed().as_secs_f64()
    );
}

/// Persist last-used output preferences for the next session.
fn remember_settings(args: &CliArgs, options: &ExportOptions, mut settings: AppSettings) {
    if let Some(dir) = &args.output_dir {
        settings.output_dir = dir.to_string_lossy().into_owned();
    }
    settings.format = match options.format {
        ExportFormat::Png => "png".into(),
        ExportFormat::Jpeg => "jpeg".into(),
        ExportFormat::Webp => "webp".into(),
    };
    settings.quality = options.quality;
    settings.save();
}

// ============================================================================
// Argument → engine translation
// ============================================================================

fn build_options(args: &CliArgs, settings: &AppSettings) -> Result<ExportOptions, EngineError> {
    let format_name = args.format.as_deref().unwrap_or(&settings.format);
    let format = ExportFormat::parse(format_name)
        .ok_or_else(|| EngineError::invalid(format!("unknown format '{format_name}'")))?;

    let quality = args.quality.unwrap_or(settings.quality);
    let mut options = ExportOptions::new(format, quality)?;
    options.output_dir = args.output_dir.clone().or_else(|| {
        if settings.output_dir.is_empty() { None } else { Some(PathBuf::from(&settings.output_dir)) }
    });
    if let Some(pattern) = &args.pattern {
        options.pattern = pattern.clone();
    } else {
        options.pattern = settings.filename_pattern.clone();
    }
    Ok(options)
}

fn build_pipeline(args: &CliArgs, settings: &AppSettings) -> Result<EditPipeline, EngineError> {
    let mut pipeline = EditPipeline::new();

    // Transforms first, matching the render order users expect.
    if args.flip_h {
        pipeline.append(Operation::Transform(TransformKind::FlipH))?;
    }
    if args.flip_v {
        pipeline.append(Operation::Transform(TransformKind::FlipV))?;
    }
    match args.rotate {
        None | Some(0) => {}
        Some(90) => pipeline.append(Operation::Transform(TransformKind::Rotate90))?,
        Some(-90) | Some(270) => pipeline.append(Operation::Transform(TransformKind::Rotate270))?,
        Some(180) | Some(-180) => {
            pipeline.append(Operation::Transform(TransformKind::Rotate90))?;
            pipeline.append(Operation::Transform(TransformKind::Rotate90))?;
        }
        Some(other) => {
            return Err(EngineError::invalid(format!("unsupported rotation {other}° (use 90/-90/180)")));
        }
    }

    let filter_name = args.filter.as_deref().unwrap_or(&settings.filter);
    let filter = FilterKind::parse(filter_name)
        .ok_or_else(|| EngineError::invalid(format!("unknown filter '{filter_name}'")))?;
    if filter != FilterKind::None {
        pipeline.append(Operation::Filter(filter))?;
    }

    if args.brightness.is_some() || args.contrast.is_some() || args.saturation.is_some() {
        pipeline.append(Operation::Adjustment(Adjustment {
            brightness: args.brightness.unwrap_or(1.0),
            contrast: args.contrast.unwrap_or(1.0),
            saturation: args.saturation.unwrap_or(1.0),
        }))?;
    }

    let resize_width = args.resize_width.or(settings.resize_width);
    let resize_height = args.resize_height.or(settings.resize_height);
    if resize_width.is_some() || resize_height.is_some() {
        pipeline.append(Operation::Resize(ResizeSpec {
            width: resize_width,
            height: resize_height,
            preserve_aspect: !args.exact_size,
        }))?;
    }

    let wm_enabled = args.wm_text.is_some() || settings.watermark.enabled;
    if wm_enabled {
        let text = args.wm_text.clone().unwrap_or_else(|| settings.watermark.text.clone());
        let color_hex = args.wm_color.as_deref().unwrap_or(&settings.watermark.color);
        let anchor_name = args.wm_position.as_deref().unwrap_or(&settings.watermark.position);
        pipeline.append(Operation::TextWatermark(TextWatermark {
            text,
            font_size: args.wm_size.unwrap_or(settings.watermark.font_size),
            color: parse_hex_color(color_hex)?,
            opacity: args.wm_opacity.unwrap_or(settings.watermark.opacity),
            anchor: Anchor::parse(anchor_name)
                .ok_or_else(|| EngineError::invalid(format!("unknown position '{anchor_name}'")))?,
            rotation: 0.0,
            font_path: args.wm_font.clone(),
        }))?;
    }

    if let Some(source) = &args.wm_image {
        pipeline.append(Operation::ImageWatermark(ImageWatermark {
            source: source.clone(),
            x: args.wm_image_x,
            y: args.wm_image_y,
            scale: args.wm_image_scale,
            rotation: args.wm_image_rotation,
            opacity: args.wm_image_opacity,
        }))?;
    }

    Ok(pipeline)
}

fn parse_hex_color(hex: &str) -> Result<[u8; 3], EngineError> {
    let raw = hex.trim_start_matches('#');
    if raw.len() != 6 {
        return Err(EngineError::invalid(format!("color '{hex}' is not #RRGGBB")));
    }
    let parse = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&raw[range], 16)
            .map_err(|_| EngineError::invalid(format!("color '{hex}' is not #RRGGBB")))
    };
    Ok([parse(0..2)?, parse(2..4)?, parse(4..6)?])
}

// ============================================================================
// Input resolution
// ============================================================================

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "tga", "tif", "tiff", "gif"];

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Expand glob patterns, folders and literal paths into a deduplicated,
/// ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();
    let push = |p: PathBuf, result: &mut Vec<PathBuf>| {
        if !result.contains(&p) {
            result.push(p);
        }
    };

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.is_dir() {
            // Folder intake: every image file directly inside, sorted.
            let mut entries: Vec<PathBuf> = std::fs::read_dir(as_path)
                .map(|rd| {
                    rd.flatten()
                        .map(|e| e.path())
                        .filter(|p| p.is_file() && is_image_file(p))
                        .collect()
                })
                .unwrap_or_default();
            entries.sort();
            for entry in entries {
                push(entry, &mut result);
            }
            continue;
        }

        if as_path.exists() {
            push(as_path.to_path_buf(), &mut result);
            continue;
        }

        // Treat as glob pattern
        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    push(entry, &mut result);
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

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> CliArgs {
        CliArgs::parse_from(["batchpix", "-i", "x.png"])
    }

    #[test]
    fn hex_colors_parse() {
        assert_eq!(parse_hex_color("#FFFFFF").unwrap(), [255, 255, 255]);
        assert_eq!(parse_hex_color("001020").unwrap(), [0, 16, 32]);
        assert!(parse_hex_color("#FFF").is_err());
        assert!(parse_hex_color("#GGGGGG").is_err());
    }

    #[test]
    fn pipeline_built_from_flags() {
        let mut args = base_args();
        args.filter = Some("sepia".into());
        args.brightness = Some(1.2);
        args.resize_width = Some(800);
        args.rotate = Some(90);

        let settings = AppSettings::default();
        let pipeline = build_pipeline(&args, &settings).unwrap();
        assert_eq!(pipeline.filter(), FilterKind::Sepia);
        assert_eq!(pipeline.adjustment().brightness, 1.2);
        assert_eq!(pipeline.resize().unwrap().width, Some(800));
        assert_eq!(pipeline.transform().quarter_turns, 1);
    }

    #[test]
    fn bad_flag_values_are_rejected() {
        let settings = AppSettings::default();

        let mut args = base_args();
        args.rotate = Some(45);
        assert!(build_pipeline(&args, &settings).is_err());

        let mut args = base_args();
        args.filter = Some("vaporwave".into());
        assert!(build_pipeline(&args, &settings).is_err());

        let mut args = base_args();
        args.quality = Some(0);
        assert!(build_options(&args, &settings).is_err());
    }

    #[test]
    fn settings_seed_defaults_flags_override() {
        let mut settings = AppSettings::default();
        settings.format = "webp".into();
        settings.quality = 70;

        let args = base_args();
        let options = build_options(&args, &settings).unwrap();
        assert_eq!(options.format, ExportFormat::Webp);
        assert_eq!(options.quality, 70);

        let mut args = base_args();
        args.format = Some("jpeg".into());
        args.quality = Some(85);
        let options = build_options(&args, &settings).unwrap();
        assert_eq!(options.format, ExportFormat::Jpeg);
        assert_eq!(options.quality, 85);
    }
}
