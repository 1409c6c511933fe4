// ============================================================================
// TEXT WATERMARKS — glyph layout, rasterization, placement
// ============================================================================

use std::path::Path;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont, point};
use image::RgbaImage;

use super::overlay::{composite_sprite, rotate_rgba};
use super::{Anchor, GeomCtx, Rect, TextWatermark};

/// Padding between a corner-anchored watermark and the image edge,
/// in source pixels.
const ANCHOR_PADDING: f32 = 10.0;

/// Fraction of the diagonal the DiagonalFit text is scaled to span.
const DIAGONAL_SPAN: f32 = 0.9;

/// Load a font face: an explicit file if given, otherwise the system
/// sans-serif face via font-kit.
pub fn load_font(path: Option<&Path>) -> Result<FontArc, String> {
    match path {
        Some(p) => {
            let bytes = std::fs::read(p).map_err(|e| format!("cannot read font '{}': {}", p.display(), e))?;
            FontArc::try_from_vec(bytes).map_err(|e| format!("cannot parse font '{}': {}", p.display(), e))
        }
        None => load_system_sans(),
    }
}

fn load_system_sans() -> Result<FontArc, String> {
    use font_kit::family_name::FamilyName;
    use font_kit::properties::Properties;
    use font_kit::source::SystemSource;

    let handle = SystemSource::new()
        .select_best_match(&[FamilyName::SansSerif], &Properties::new())
        .map_err(|e| format!("no system sans-serif font: {}", e))?;
    let font = handle.load().map_err(|e| format!("cannot load system font: {}", e))?;
    let bytes = font
        .copy_font_data()
        .ok_or_else(|| "system font has no accessible data".to_string())?;
    FontArc::try_from_vec((*bytes).clone()).map_err(|e| format!("cannot parse system font: {}", e))
}

/// Lay out one line of text and return `(positions, width, ascent, height)`.
/// Positions are (glyph id, x offset) pairs along the baseline.
fn layout_line(
    font: &FontArc,
    text: &str,
    size: f32,
) -> (Vec<(ab_glyph::GlyphId, f32)>, f32, f32, f32) {
    let scaled = font.as_scaled(PxScale::from(size));
    let ascent = scaled.ascent();
    let height = scaled.height();

    let mut glyphs = Vec::new();
    let mut cursor = 0.0f32;
    let mut last: Option<ab_glyph::GlyphId> = None;

    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = last {
            cursor += scaled.kern(prev, id);
        }
        glyphs.push((id, cursor));
        cursor += scaled.h_advance(id);
        last = Some(id);
    }

    (glyphs, cursor, ascent, height)
}

/// Rasterize one line of text into a tight RGBA buffer.
/// Alpha = glyph coverage × `opacity`.
pub fn rasterize_text(
    font: &FontArc,
    text: &str,
    size: f32,
    color: [u8; 3],
    opacity: f32,
) -> RgbaImage {
    let (glyphs, width, ascent, height) = layout_line(font, text, size);
    let buf_w = (width.ceil() as u32).max(1) + 2;
    let buf_h = (height.ceil() as u32).max(1) + 2;
    let mut buf = RgbaImage::new(buf_w, buf_h);

    let alpha_scale = opacity.clamp(0.0, 1.0) * 255.0;
    for (id, x) in glyphs {
        let glyph = id.with_scale_and_position(PxScale::from(size), point(x + 1.0, ascent + 1.0));
        let Some(outlined) = font.outline_glyph(glyph) else {
            continue;
        };
        let bounds = outlined.px_bounds();
        outlined.draw(|gx, gy, cov| {
            let px = bounds.min.x as i64 + gx as i64;
            let py = bounds.min.y as i64 + gy as i64;
            if px < 0 || py < 0 || px >= buf_w as i64 || py >= buf_h as i64 {
                return;
            }
            let alpha = (cov * alpha_scale).round().clamp(0.0, 255.0) as u8;
            let dst = buf.get_pixel_mut(px as u32, py as u32);
            // Glyph outlines can overlap; keep the stronger coverage.
            if alpha > dst.0[3] {
                *dst = image::Rgba([color[0], color[1], color[2], alpha]);
            }
        });
    }
    buf
}

/// The diagonal-fit rotation for a `w`×`h` image, in degrees (negative =
/// clockwise tilt: the text descends from top-left to bottom-right).
pub fn diagonal_angle(w: f32, h: f32) -> f32 {
    if w <= 0.0 { 0.0 } else { -h.atan2(w).to_degrees() }
}

/// Render a text watermark onto `img` (already in output space).
/// `ctx` maps source-space geometry (custom positions, font size) through
/// the current transform and render scale.
pub fn apply(img: &mut RgbaImage, wm: &TextWatermark, ctx: &GeomCtx, font: &FontArc) {
    let scale = ctx.scale_avg();
    let size = (wm.font_size * scale).max(1.0);
    let (img_w, img_h) = (img.width() as f32, img.height() as f32);

    match &wm.anchor {
        Anchor::Tile => {
            let tile = rasterize_text(font, &wm.text, size, wm.color, wm.opacity);
            let tile = rotate_rgba(&tile, wm.rotation);
            let (tw, th) = (tile.width() as f32, tile.height() as f32);
            if tw <= 0.0 || th <= 0.0 {
                return;
            }
            let sp_x = tw + (50.0 * scale).max(tw * 0.5);
            let sp_y = th + (30.0 * scale).max(th * 0.5);
            let mut y = -(th / 2.0);
            while y < img_h {
                let mut x = -(tw / 2.0);
                while x < img_w {
                    image::imageops::overlay(img, &tile, x as i64, y as i64);
                    x += sp_x;
                }
                y += sp_y;
            }
        }
        Anchor::DiagonalFit => {
            // Scale the face so the baseline spans the diagonal, then rotate
            // to lie along it, centered.
            let (_, base_width, _, _) = layout_line(font, &wm.text, size);
            if base_width <= 0.0 {
                return;
            }
            let diag = (img_w * img_w + img_h * img_h).sqrt();
            let fitted = (size * DIAGONAL_SPAN * diag / base_width).max(1.0);
            let text = rasterize_text(font, &wm.text, fitted, wm.color, wm.opacity);
            let rotated = rotate_rgba(&text, diagonal_angle(img_w, img_h));
            let px = (img_w / 2.0 - rotated.width() as f32 / 2.0).round() as i64;
            let py = (img_h / 2.0 - rotated.height() as f32 / 2.0).round() as i64;
            image::imageops::overlay(img, &rotated, px, py);
        }
        anchor => {
            let text = rasterize_text(font, &wm.text, size, wm.color, wm.opacity);
            let sprite = rotate_rgba(&text, wm.rotation);
            let (tw, th) = (sprite.width() as f32, sprite.height() as f32);
            let pad = ANCHOR_PADDING * scale;

            let (x, y) = match anchor {
                Anchor::Center => ((img_w - tw) / 2.0, (img_h - th) / 2.0),
                Anchor::TopLeft => (pad, pad),
                Anchor::TopRight => (img_w - tw - pad, pad),
                Anchor::BottomLeft => (pad, img_h - th - pad),
                Anchor::BottomRight => (img_w - tw - pad, img_h - th - pad),
                Anchor::Custom { x, y } => ctx.map_point(*x, *y),
                Anchor::Tile | Anchor::DiagonalFit => unreachable!(),
            };
            // Fixed anchors stay inside the frame; custom placement may hang off.
            let (x, y) = if matches!(anchor, Anchor::Custom { .. }) {
                (x, y)
            } else {
                (x.clamp(0.0, (img_w - tw).max(0.0)), y.clamp(0.0, (img_h - th).max(0.0)))
            };
            image::imageops::overlay(img, &sprite, x.round() as i64, y.round() as i64);
        }
    }
}

/// Render an image watermark onto `img` from its already-decoded sprite.
pub fn apply_image(
    img: &mut RgbaImage,
    sprite: &RgbaImage,
    x: f32,
    y: f32,
    sprite_scale: f32,
    rotation: f32,
    opacity: f32,
    ctx: &GeomCtx,
) {
    let w = sprite.width() as f32 * sprite_scale;
    let h = sprite.height() as f32 * sprite_scale;
    let bounds = ctx.map_rect(Rect::new(x, y, x + w, y + h));
    composite_sprite(img, sprite, bounds, rotation, opacity);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagonal_angle_square_is_45() {
        assert!((diagonal_angle(100.0, 100.0) + 45.0).abs() < 1e-4);
    }

    #[test]
    fn diagonal_angle_matches_aspect() {
        let angle = diagonal_angle(1600.0, 900.0);
        let expected = -(900.0f32).atan2(1600.0).to_degrees();
        assert!((angle - expected).abs() < 1e-4);
        assert!(angle > -45.0 && angle < 0.0);
    }

    // Font-dependent tests run only when a system face is available, so CI
    // images without fontconfig still pass.
    #[test]
    fn rasterized_text_is_nonempty() {
        let Ok(font) = load_font(None) else { return };
        let buf = rasterize_text(&font, "SAMPLE", 32.0, [255, 255, 255], 1.0);
        assert!(buf.width() > 10);
        let covered = buf.pixels().filter(|p| p.0[3] > 0).count();
        assert!(covered > 0, "no glyph coverage rendered");
    }

    #[test]
    fn diagonal_fit_centers_on_the_image() {
        use crate::ops::TransformState;
        let Ok(font) = load_font(None) else { return };

        let mut img = image::RgbaImage::from_pixel(200, 200, image::Rgba([0, 0, 0, 255]));
        let wm = TextWatermark {
            text: "WATERMARK".into(),
            font_size: 20.0,
            color: [255, 255, 255],
            opacity: 1.0,
            anchor: Anchor::DiagonalFit,
            rotation: 0.0,
            font_path: None,
        };
        let ctx = GeomCtx {
            transform: TransformState::default(),
            src_w: 200.0,
            src_h: 200.0,
            sx: 1.0,
            sy: 1.0,
        };
        apply(&mut img, &wm, &ctx, &font);

        // Centroid of the rendered glyph pixels sits at the image center.
        let (mut sum_x, mut sum_y, mut n) = (0.0f64, 0.0f64, 0u64);
        for (x, y, px) in img.enumerate_pixels() {
            if px.0[0] > 0 {
                sum_x += x as f64;
                sum_y += y as f64;
                n += 1;
            }
        }
        assert!(n > 0, "no watermark pixels rendered");
        let (cx, cy) = (sum_x / n as f64, sum_y / n as f64);
        assert!((cx - 100.0).abs() < 10.0, "centroid x {cx} too far from center");
        assert!((cy - 100.0).abs() < 10.0, "centroid y {cy} too far from center");
    }

    #[test]
    fn opacity_caps_rasterized_alpha() {
        let Ok(font) = load_font(None) else { return };
        let buf = rasterize_text(&font, "X", 40.0, [0, 0, 0], 0.5);
        let max_alpha = buf.pixels().map(|p| p.0[3]).max().unwrap_or(0);
        assert!(max_alpha <= 128);
        assert!(max_alpha > 0);
    }
}
