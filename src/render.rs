//! The compositor — renders a pixel buffer through an edit pipeline.
//!
//! `render` is a deterministic pure function: the same buffer, pipeline and
//! target always produce byte-identical output.  The stage order is fixed
//! and not user-reorderable:
//!
//!   1. transform (rotate / mirror)
//!   2. resize
//!   3. filter
//!   4. adjustment (brightness / contrast / saturation)
//!   5. masks, in append order
//!   6. overlays, in ascending stacking order
//!   7. watermarks, in append order, on top of everything
//!
//! Watermarks and masks are meant to be visible in the final artifact
//! regardless of other edits, and must survive resize/rotation identically
//! between preview and batch export.
//!
//! A missing or unreadable overlay/watermark source skips that single
//! operation and surfaces a warning; the rest of the pipeline still renders.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use ab_glyph::FontArc;
use image::{RgbaImage, imageops};

use crate::ops::{self, GeomCtx, MaskMode, WatermarkOp};
use crate::pipeline::EditPipeline;

/// Output resolution request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTarget {
    /// Full source resolution (after transform/resize) — used at export.
    Full,
    /// Bounded preview: the full-resolution result is scaled down (never up)
    /// to fit inside the box, and all geometry scales with it.
    Preview { max_width: u32, max_height: u32 },
}

/// A non-fatal problem encountered while rendering one operation.
#[derive(Debug, Clone)]
pub struct RenderWarning {
    pub stage: &'static str,
    pub source: Option<PathBuf>,
    pub reason: String,
}

impl fmt::Display for RenderWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(path) => write!(f, "{} '{}' skipped: {}", self.stage, path.display(), self.reason),
            None => write!(f, "{} skipped: {}", self.stage, self.reason),
        }
    }
}

/// A finished render plus any per-operation warnings.
pub struct Rendered {
    pub image: RgbaImage,
    pub warnings: Vec<RenderWarning>,
}

/// Decoded sprites for one render call; keyed by path, `None` = known bad.
type SpriteCache = HashMap<PathBuf, Option<RgbaImage>>;

pub fn render(buffer: &RgbaImage, pipeline: &EditPipeline, target: RenderTarget) -> Rendered {
    let mut warnings = Vec::new();

    // -- 1. transform ------------------------------------------------------
    let transform = pipeline.transform();
    let mut img =
        if transform.is_identity() { buffer.clone() } else { transform.apply_to_image(buffer) };
    let (tw, th) = img.dimensions();

    // -- 2. resize ---------------------------------------------------------
    let (full_w, full_h) = match pipeline.resize() {
        Some(spec) => spec.target_dims(tw, th),
        None => (tw, th),
    };
    let (out_w, out_h) = match target {
        RenderTarget::Full => (full_w, full_h),
        RenderTarget::Preview { max_width, max_height } => {
            fit_within(full_w, full_h, max_width, max_height)
        }
    };
    if (out_w, out_h) != (tw, th) {
        img = imageops::resize(&img, out_w, out_h, imageops::FilterType::Lanczos3);
    }

    let ctx = GeomCtx {
        transform,
        src_w: buffer.width() as f32,
        src_h: buffer.height() as f32,
        sx: out_w as f32 / tw as f32,
        sy: out_h as f32 / th as f32,
    };

    // -- 3. filter ---------------------------------------------------------
    let filter = pipeline.filter();
    if filter != ops::FilterKind::None {
        img = ops::filter::apply(filter, &img);
    }

    // -- 4. adjustment -----------------------------------------------------
    let adjustment = pipeline.adjustment();
    if !adjustment.is_identity() {
        img = ops::adjust::apply(adjustment, &img);
    }

    // -- 5. masks ----------------------------------------------------------
    for mask in pipeline.masks() {
        let bounds = ctx.map_rect(mask.bounds);
        let mode = match mask.mode {
            MaskMode::Blur { radius } => MaskMode::Blur { radius: radius * ctx.scale_avg() },
            MaskMode::Blackout => MaskMode::Blackout,
        };
        ops::mask::apply(&mut img, mask.shape, bounds, mode);
    }

    // -- 6. overlays -------------------------------------------------------
    let mut sprites = SpriteCache::new();
    for ov in pipeline.overlays_stacked() {
        match load_sprite(&mut sprites, &ov.source) {
            Ok(sprite) => {
                ops::overlay::composite_sprite(
                    &mut img,
                    sprite,
                    ctx.map_rect(ov.bounds),
                    ov.rotation,
                    ov.opacity,
                );
            }
            Err(reason) => warnings.push(RenderWarning {
                stage: "overlay",
                source: Some(ov.source.clone()),
                reason,
            }),
        }
    }

    // -- 7. watermarks -----------------------------------------------------
    let mut fonts: HashMap<Option<PathBuf>, Result<FontArc, String>> = HashMap::new();
    for wm in pipeline.watermarks() {
        match wm {
            WatermarkOp::Text(text_wm) => {
                let font = fonts
                    .entry(text_wm.font_path.clone())
                    .or_insert_with(|| ops::watermark::load_font(text_wm.font_path.as_deref()));
                match font {
                    Ok(font) => ops::watermark::apply(&mut img, text_wm, &ctx, font),
                    Err(reason) => warnings.push(RenderWarning {
                        stage: "text watermark",
                        source: text_wm.font_path.clone(),
                        reason: reason.clone(),
                    }),
                }
            }
            WatermarkOp::Image(image_wm) => match load_sprite(&mut sprites, &image_wm.source) {
                Ok(sprite) => {
                    ops::watermark::apply_image(
                        &mut img,
                        sprite,
                        image_wm.x,
                        image_wm.y,
                        image_wm.scale,
                        image_wm.rotation,
                        image_wm.opacity,
                        &ctx,
                    );
                }
                Err(reason) => warnings.push(RenderWarning {
                    stage: "image watermark",
                    source: Some(image_wm.source.clone()),
                    reason,
                }),
            },
        }
    }

    Rendered { image: img, warnings }
}

/// Scale `(w, h)` down (never up) to fit inside `(max_w, max_h)`.
fn fit_within(w: u32, h: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    if w == 0 || h == 0 || max_w == 0 || max_h == 0 || (w <= max_w && h <= max_h) {
        return (w, h);
    }
    let ratio = (max_w as f64 / w as f64).min(max_h as f64 / h as f64);
    (
        ((w as f64 * ratio).round() as u32).max(1),
        ((h as f64 * ratio).round() as u32).max(1),
    )
}

fn load_sprite<'a>(cache: &'a mut SpriteCache, path: &Path) -> Result<&'a RgbaImage, String> {
    let entry = cache.entry(path.to_path_buf()).or_insert_with(|| {
        image::open(path).ok().map(|img| img.to_rgba8())
    });
    match entry {
        Some(img) => Ok(img),
        None => Err("file missing or not a decodable image".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{
        Adjustment, FilterKind, ImageWatermark, MaskMode, MaskOp, MaskShape, Operation, OverlayOp,
        Rect, ResizeSpec, TransformKind,
    };
    use image::Rgba;
    use std::path::PathBuf;

    fn gradient(w: u32, h: u32) -> RgbaImage {
        let mut img = RgbaImage::new(w, h);
        for (x, y, px) in img.enumerate_pixels_mut() {
            *px = Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255]);
        }
        img
    }

    #[test]
    fn render_is_deterministic() {
        let buffer = gradient(64, 48);
        let mut pipeline = EditPipeline::new();
        pipeline.append(Operation::Filter(FilterKind::Sepia)).unwrap();
        pipeline
            .append(Operation::Adjustment(Adjustment { brightness: 1.2, contrast: 1.1, saturation: 0.8 }))
            .unwrap();
        pipeline
            .append(Operation::Mask(MaskOp::new(
                MaskShape::Rect,
                Rect::new(5.0, 5.0, 20.0, 20.0),
                MaskMode::Blur { radius: 3.0 },
            )))
            .unwrap();
        pipeline.append(Operation::Transform(TransformKind::Rotate90)).unwrap();

        let a = render(&buffer, &pipeline, RenderTarget::Full);
        let b = render(&buffer, &pipeline, RenderTarget::Full);
        assert_eq!(a.image.as_raw(), b.image.as_raw());
    }

    #[test]
    fn empty_pipeline_is_a_passthrough() {
        let buffer = gradient(32, 32);
        let out = render(&buffer, &EditPipeline::new(), RenderTarget::Full);
        assert_eq!(out.image.as_raw(), buffer.as_raw());
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn resize_respects_aspect_rule() {
        let buffer = gradient(1600, 1200);
        let mut pipeline = EditPipeline::new();
        pipeline
            .append(Operation::Resize(ResizeSpec { width: Some(800), height: None, preserve_aspect: true }))
            .unwrap();
        let out = render(&buffer, &pipeline, RenderTarget::Full);
        assert_eq!(out.image.dimensions(), (800, 600));
    }

    #[test]
    fn preview_scales_down_never_up() {
        let buffer = gradient(1000, 500);
        let pipeline = EditPipeline::new();

        let preview =
            render(&buffer, &pipeline, RenderTarget::Preview { max_width: 100, max_height: 100 });
        assert_eq!(preview.image.dimensions(), (100, 50));

        let small =
            render(&gradient(40, 20), &pipeline, RenderTarget::Preview { max_width: 100, max_height: 100 });
        assert_eq!(small.image.dimensions(), (40, 20));
    }

    #[test]
    fn mask_geometry_follows_rotation() {
        // Black out the top-left 10×10 of a 40×20 source, then rotate 90° CW.
        // The masked content must land in the rotated position: top-right.
        let buffer = RgbaImage::from_pixel(40, 20, Rgba([200, 200, 200, 255]));
        let mut pipeline = EditPipeline::new();
        pipeline
            .append(Operation::Mask(MaskOp::new(
                MaskShape::Rect,
                Rect::new(0.0, 0.0, 10.0, 10.0),
                MaskMode::Blackout,
            )))
            .unwrap();
        pipeline.append(Operation::Transform(TransformKind::Rotate90)).unwrap();

        let out = render(&buffer, &pipeline, RenderTarget::Full).image;
        assert_eq!(out.dimensions(), (20, 40));
        // Source (0,0)..(10,10) maps to (10,0)..(20,10) after a CW turn.
        assert_eq!(out.get_pixel(15, 5).0, [0, 0, 0, 255]);
        assert_eq!(out.get_pixel(5, 5).0, [200, 200, 200, 255]);
        assert_eq!(out.get_pixel(15, 15).0, [200, 200, 200, 255]);
    }

    #[test]
    fn mask_geometry_follows_resize() {
        // Mask the right half; downscale by 2. The masked area must still be
        // exactly the right half of the output.
        let buffer = RgbaImage::from_pixel(100, 100, Rgba([9, 9, 9, 255]));
        let mut pipeline = EditPipeline::new();
        pipeline
            .append(Operation::Mask(MaskOp::new(
                MaskShape::Rect,
                Rect::new(50.0, 0.0, 100.0, 100.0),
                MaskMode::Blackout,
            )))
            .unwrap();
        pipeline
            .append(Operation::Resize(ResizeSpec { width: Some(50), height: None, preserve_aspect: true }))
            .unwrap();

        let out = render(&buffer, &pipeline, RenderTarget::Full).image;
        assert_eq!(out.dimensions(), (50, 50));
        assert_eq!(out.get_pixel(30, 25).0, [0, 0, 0, 255]);
        assert_eq!(out.get_pixel(20, 25).0, [9, 9, 9, 255]);
    }

    #[test]
    fn missing_overlay_degrades_with_warning() {
        let buffer = gradient(30, 30);
        let mut pipeline = EditPipeline::new();
        pipeline
            .append(Operation::Overlay(OverlayOp::new(
                PathBuf::from("/nonexistent/overlay.png"),
                Rect::new(0.0, 0.0, 10.0, 10.0),
                0.0,
                1.0,
            )))
            .unwrap();
        pipeline.append(Operation::Filter(FilterKind::Grayscale)).unwrap();

        let out = render(&buffer, &pipeline, RenderTarget::Full);
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].stage, "overlay");
        // The rest of the pipeline still ran.
        let p = out.image.get_pixel(10, 10).0;
        assert_eq!(p[0], p[1]);
    }

    #[test]
    fn missing_image_watermark_degrades_with_warning() {
        let buffer = gradient(30, 30);
        let mut pipeline = EditPipeline::new();
        pipeline
            .append(Operation::ImageWatermark(ImageWatermark {
                source: PathBuf::from("/nonexistent/logo.png"),
                x: 0.0,
                y: 0.0,
                scale: 1.0,
                rotation: 0.0,
                opacity: 0.5,
            }))
            .unwrap();
        let out = render(&buffer, &pipeline, RenderTarget::Full);
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.image.as_raw(), buffer.as_raw());
    }

    #[test]
    fn overlays_composite_in_stacking_order() {
        use tempfile::TempDir;
        let tmp = TempDir::new().unwrap();
        let red = tmp.path().join("red.png");
        let blue = tmp.path().join("blue.png");
        RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255])).save(&red).unwrap();
        RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255])).save(&blue).unwrap();

        let buffer = RgbaImage::from_pixel(16, 16, Rgba([0, 0, 0, 255]));
        let mut pipeline = EditPipeline::new();
        let bounds = Rect::new(4.0, 4.0, 12.0, 12.0);
        pipeline
            .append(Operation::Overlay(OverlayOp::new(red.clone(), bounds, 0.0, 1.0)))
            .unwrap();
        pipeline
            .append(Operation::Overlay(OverlayOp::new(blue.clone(), bounds, 0.0, 1.0)))
            .unwrap();

        // Blue was appended last → stacks on top.
        let out = render(&buffer, &pipeline, RenderTarget::Full).image;
        assert_eq!(out.get_pixel(8, 8).0, [0, 0, 255, 255]);

        // Swap stacking: red on top now, nothing else changed.
        let red_id = pipeline.overlays()[0].id;
        pipeline
            .apply_edit(&crate::pipeline::PipelineEdit::MoveOverlayUp(red_id))
            .unwrap();
        let out = render(&buffer, &pipeline, RenderTarget::Full).image;
        assert_eq!(out.get_pixel(8, 8).0, [255, 0, 0, 255]);
    }

    #[test]
    fn watermark_composites_above_overlay() {
        use tempfile::TempDir;
        let tmp = TempDir::new().unwrap();
        let green = tmp.path().join("green.png");
        let logo = tmp.path().join("logo.png");
        RgbaImage::from_pixel(8, 8, Rgba([0, 255, 0, 255])).save(&green).unwrap();
        RgbaImage::from_pixel(8, 8, Rgba([255, 255, 255, 255])).save(&logo).unwrap();

        let buffer = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255]));
        let mut pipeline = EditPipeline::new();
        pipeline
            .append(Operation::ImageWatermark(ImageWatermark {
                source: logo,
                x: 0.0,
                y: 0.0,
                scale: 1.0,
                rotation: 0.0,
                opacity: 1.0,
            }))
            .unwrap();
        pipeline
            .append(Operation::Overlay(OverlayOp::new(
                green,
                Rect::new(0.0, 0.0, 8.0, 8.0),
                0.0,
                1.0,
            )))
            .unwrap();

        // Despite the overlay being appended later, the watermark wins: the
        // stage order composites watermarks last.
        let out = render(&buffer, &pipeline, RenderTarget::Full).image;
        assert_eq!(out.get_pixel(4, 4).0, [255, 255, 255, 255]);
    }
}
