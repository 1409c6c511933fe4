//! Batch export — renders each image's finalized pipeline at full resolution
//! and writes encoded output.
//!
//! Every item is independent (its own pixel buffer, its own output path), so
//! the batch fans out across the rayon worker pool.  A failed item never
//! aborts the batch; the report carries per-item status plus aggregate
//! counts.  Progress callbacks observe a monotonically increasing completed
//! count regardless of completion order.  Output is written to a temporary
//! path and atomically renamed, so cancellation or a crash never leaves a
//! half-written file under the final name.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use image::RgbaImage;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use rayon::prelude::*;

use crate::error::EngineError;
use crate::log_warn;
use crate::pipeline::EditPipeline;
use crate::render::{RenderTarget, render};

// ============================================================================
// Export parameters
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Png,
    Jpeg,
    Webp,
}

impl ExportFormat {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "png" => Some(ExportFormat::Png),
            "jpeg" | "jpg" => Some(ExportFormat::Jpeg),
            "webp" => Some(ExportFormat::Webp),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpg",
            ExportFormat::Webp => "webp",
        }
    }
}

/// Format, quality and naming for one batch — global across all items.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub format: ExportFormat,
    /// 1..=100; applies to JPEG and WEBP only.
    pub quality: u8,
    /// `None` writes next to each source file.
    pub output_dir: Option<PathBuf>,
    /// Filename pattern with `<OriginalName>` and `<#>` placeholders.
    pub pattern: String,
}

impl ExportOptions {
    pub fn new(format: ExportFormat, quality: u8) -> Result<Self, EngineError> {
        if !(1..=100).contains(&quality) {
            return Err(EngineError::invalid(format!("quality {quality} outside 1..=100")));
        }
        Ok(Self {
            format,
            quality,
            output_dir: None,
            pattern: "<OriginalName>".to_string(),
        })
    }
}

/// One source image plus its finalized edit pipeline.
pub struct ExportItem {
    pub source: PathBuf,
    pub pipeline: EditPipeline,
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug)]
pub enum ItemStatus {
    Written(PathBuf),
    Failed(EngineError),
    /// The batch was cancelled before this item started.
    Cancelled,
}

#[derive(Debug)]
pub struct ItemReport {
    pub source: PathBuf,
    pub status: ItemStatus,
    /// Degraded-render warnings (missing overlay, ...) and collision notes.
    pub warnings: Vec<String>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub items: Vec<ItemReport>,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// Cooperative cancellation flag shared with the caller.  Cancelling stops
/// dispatch of unstarted items; in-flight items finish cleanly.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Batch driver
// ============================================================================

/// Export every item concurrently over the rayon pool.  `progress` is called
/// after each item completes with `(completed_count, total)`; the count is
/// strictly increasing even though items finish out of order.
pub fn export_all(
    items: &[ExportItem],
    options: &ExportOptions,
    cancel: &CancelToken,
    progress: &(dyn Fn(usize, usize) + Sync),
) -> BatchReport {
    let total = items.len();
    let completed = AtomicUsize::new(0);

    let reports: Vec<ItemReport> = items
        .par_iter()
        .enumerate()
        .map(|(idx, item)| {
            let report = if cancel.is_cancelled() {
                ItemReport { source: item.source.clone(), status: ItemStatus::Cancelled, warnings: Vec::new() }
            } else {
                export_one(item, options, idx + 1, total)
            };
            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            progress(done, total);
            report
        })
        .collect();

    let mut batch = BatchReport { items: reports, ..Default::default() };
    for item in &batch.items {
        match item.status {
            ItemStatus::Written(_) => batch.succeeded += 1,
            ItemStatus::Failed(_) => batch.failed += 1,
            ItemStatus::Cancelled => batch.cancelled += 1,
        }
    }
    batch
}

/// Export a single item: decode, render at full resolution, encode, write.
/// `index` is 1-based within the batch (used by the `<#>` pattern).
pub fn export_one(item: &ExportItem, options: &ExportOptions, index: usize, total: usize) -> ItemReport {
    let mut warnings = Vec::new();
    let status = match run_one(item, options, index, total, &mut warnings) {
        Ok(path) => ItemStatus::Written(path),
        Err(e) => {
            log_warn!("export of '{}' failed: {}", item.source.display(), e);
            ItemStatus::Failed(e)
        }
    };
    ItemReport { source: item.source.clone(), status, warnings }
}

fn run_one(
    item: &ExportItem,
    options: &ExportOptions,
    index: usize,
    total: usize,
    warnings: &mut Vec<String>,
) -> Result<PathBuf, EngineError> {
    // -- decode ----------------------------------------------------------
    let decoded = image::open(&item.source)
        .map_err(|e| EngineError::decode(&item.source, e))?
        .to_rgba8();

    // -- render at full resolution ---------------------------------------
    let rendered = render(&decoded, &item.pipeline, RenderTarget::Full);
    for warning in &rendered.warnings {
        log_warn!("'{}': {}", item.source.display(), warning);
        warnings.push(warning.to_string());
    }

    // -- resolve output path ----------------------------------------------
    let output_path = build_output_path(&item.source, options, index, total)?;
    if output_path == item.source {
        // A known risk, surfaced rather than silently prevented.
        let note = format!("output path '{}' overwrites the source file", output_path.display());
        log_warn!("{}", note);
        warnings.push(note);
    }

    // -- encode to a temp file, then atomically rename --------------------
    write_atomic(&rendered.image, &output_path, options.format, options.quality)?;
    Ok(output_path)
}

// ============================================================================
// Output naming
// ============================================================================

/// Expand the filename pattern for one batch item.
///
/// `<OriginalName>` inserts the source stem and `<#>` a zero-padded 1-based
/// index.  Multi-item batches whose pattern would produce colliding names get
/// an automatic `_N` suffix.  Illegal filename characters become `_`.
pub fn output_file_name(pattern: &str, stem: &str, index: usize, total: usize) -> String {
    let pattern = if pattern.trim().is_empty() { "<OriginalName>" } else { pattern };

    let mut name = pattern.replace("<OriginalName>", stem);
    if name.contains("<#>") {
        let digits = total.to_string().len();
        name = name.replace("<#>", &format!("{index:0digits$}"));
    } else if total > 1 && !pattern.contains("<OriginalName>") {
        // Static pattern over multiple files would overwrite itself.
        name = format!("{name}_{index}");
    }

    if name.trim().is_empty() {
        name = format!("image_{index}");
    }
    name.chars()
        .map(|c| if matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') { '_' } else { c })
        .collect()
}

fn build_output_path(
    source: &Path,
    options: &ExportOptions,
    index: usize,
    total: usize,
) -> Result<PathBuf, EngineError> {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| EngineError::invalid(format!("no file stem in '{}'", source.display())))?;

    let dir = match &options.output_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| EngineError::io(dir.clone(), e))?;
            dir.clone()
        }
        None => source.parent().unwrap_or(Path::new(".")).to_path_buf(),
    };

    let name = output_file_name(&options.pattern, &stem, index, total);
    Ok(dir.join(format!("{}.{}", name, options.format.extension())))
}

// ============================================================================
// Encoding
// ============================================================================

fn write_atomic(
    image: &RgbaImage,
    path: &Path,
    format: ExportFormat,
    quality: u8,
) -> Result<(), EngineError> {
    let tmp_name = format!(
        "{}.tmp",
        path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
    );
    let tmp_path = path.with_file_name(tmp_name);

    if let Err(e) = encode_and_write(image, &tmp_path, format, quality) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }
    std::fs::rename(&tmp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        EngineError::io(path, e)
    })
}

fn encode_and_write(
    image: &RgbaImage,
    path: &Path,
    format: ExportFormat,
    quality: u8,
) -> Result<(), EngineError> {
    use std::fs::File;
    use std::io::BufWriter;

    let file = File::create(path).map_err(|e| EngineError::io(path, e))?;
    let mut writer = BufWriter::new(file);

    match format {
        ExportFormat::Png => {
            let encoder = PngEncoder::new(&mut writer);
            #[allow(deprecated)]
            encoder
                .encode(image.as_raw(), image.width(), image.height(), image::ColorType::Rgba8)
                .map_err(|e| EngineError::encode(path, e))?;
        }
        ExportFormat::Jpeg => {
            // JPEG has no alpha — flatten onto white first.
            let rgb = flatten_on_white(image);
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality);
            encoder
                .encode(rgb.as_raw(), rgb.width(), rgb.height(), image::ColorType::Rgb8)
                .map_err(|e| EngineError::encode(path, e))?;
        }
        ExportFormat::Webp => {
            use image::codecs::webp::{WebPEncoder, WebPQuality};
            #[allow(deprecated)]
            let encoder = WebPEncoder::new_with_quality(&mut writer, WebPQuality::lossy(quality));
            encoder
                .encode(image.as_raw(), image.width(), image.height(), image::ColorType::Rgba8)
                .map_err(|e| EngineError::encode(path, e))?;
        }
    }
    Ok(())
}

/// Alpha-blend onto an opaque white background (JPEG export).
fn flatten_on_white(image: &RgbaImage) -> image::RgbImage {
    let mut out = image::RgbImage::new(image.width(), image.height());
    for (src, dst) in image.pixels().zip(out.pixels_mut()) {
        let a = src.0[3] as f32 / 255.0;
        for c in 0..3 {
            dst.0[c] = (src.0[c] as f32 * a + 255.0 * (1.0 - a)).round() as u8;
        }
    }
    out
}
