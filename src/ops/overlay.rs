// ============================================================================
// SPRITE COMPOSITING — shared by overlays and image watermarks
// ============================================================================
//
// An overlay or image watermark is a "sprite": an external image resized to
// its target bounds, faded to its stored opacity, rotated about its center,
// and alpha-blended onto the frame.

use image::{RgbaImage, imageops};

use super::Rect;

/// Scale every alpha value by `opacity` (0.0 ..= 1.0).
pub fn with_opacity(img: &RgbaImage, opacity: f32) -> RgbaImage {
    if opacity >= 1.0 {
        return img.clone();
    }
    let mut out = img.clone();
    for px in out.pixels_mut() {
        px.0[3] = (px.0[3] as f32 * opacity).round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// Rotate counter-clockwise by `degrees` about the image center, expanding
/// the canvas to hold the rotated result.  Bilinear sampling; uncovered
/// pixels are transparent.
pub fn rotate_rgba(img: &RgbaImage, degrees: f32) -> RgbaImage {
    let normalized = degrees.rem_euclid(360.0);
    // Quarter turns get the exact lossless path.
    if normalized.abs() < 1e-3 || (normalized - 360.0).abs() < 1e-3 {
        return img.clone();
    }
    if (normalized - 90.0).abs() < 1e-3 {
        return imageops::rotate270(img); // 90° CCW
    }
    if (normalized - 180.0).abs() < 1e-3 {
        return imageops::rotate180(img);
    }
    if (normalized - 270.0).abs() < 1e-3 {
        return imageops::rotate90(img); // 270° CCW = 90° CW
    }

    let (w, h) = (img.width() as f32, img.height() as f32);
    let rad = normalized.to_radians();
    let (sin, cos) = rad.sin_cos();

    // Expanded canvas size.
    let out_w = (w * cos.abs() + h * sin.abs()).ceil().max(1.0) as u32;
    let out_h = (w * sin.abs() + h * cos.abs()).ceil().max(1.0) as u32;

    let (cx, cy) = (w / 2.0, h / 2.0);
    let (ocx, ocy) = (out_w as f32 / 2.0, out_h as f32 / 2.0);

    let mut out = RgbaImage::new(out_w, out_h);
    for (x, y, px) in out.enumerate_pixels_mut() {
        // Inverse map: rotate the output pixel back into source space.
        // Screen y grows downward, so CCW on screen is CW in math coords.
        let dx = x as f32 + 0.5 - ocx;
        let dy = y as f32 + 0.5 - ocy;
        let sx = dx * cos - dy * sin + cx - 0.5;
        let sy = dx * sin + dy * cos + cy - 0.5;
        *px = sample_bilinear(img, sx, sy);
    }
    out
}

fn sample_bilinear(img: &RgbaImage, x: f32, y: f32) -> image::Rgba<u8> {
    let (w, h) = (img.width() as i64, img.height() as i64);
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    if x0 < -1 || y0 < -1 || x0 >= w || y0 >= h {
        return image::Rgba([0, 0, 0, 0]);
    }
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let fetch = |px: i64, py: i64| -> [f32; 4] {
        if px < 0 || py < 0 || px >= w || py >= h {
            [0.0; 4]
        } else {
            let p = img.get_pixel(px as u32, py as u32).0;
            [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
        }
    };

    let p00 = fetch(x0, y0);
    let p10 = fetch(x0 + 1, y0);
    let p01 = fetch(x0, y0 + 1);
    let p11 = fetch(x0 + 1, y0 + 1);

    let mut acc = [0u8; 4];
    for c in 0..4 {
        let top = p00[c] * (1.0 - fx) + p10[c] * fx;
        let bot = p01[c] * (1.0 - fx) + p11[c] * fx;
        acc[c] = (top * (1.0 - fy) + bot * fy).round().clamp(0.0, 255.0) as u8;
    }
    image::Rgba(acc)
}

/// Resize `sprite` to `bounds`, fade to `opacity`, rotate by `rotation`
/// degrees, and alpha-blend onto `base` centered on the bounds center.
/// `bounds` is in `base`'s coordinate space.
pub fn composite_sprite(
    base: &mut RgbaImage,
    sprite: &RgbaImage,
    bounds: Rect,
    rotation: f32,
    opacity: f32,
) {
    let target_w = bounds.width().round().max(1.0) as u32;
    let target_h = bounds.height().round().max(1.0) as u32;

    let resized = if sprite.dimensions() == (target_w, target_h) {
        sprite.clone()
    } else {
        imageops::resize(sprite, target_w, target_h, imageops::FilterType::Lanczos3)
    };
    let faded = with_opacity(&resized, opacity.clamp(0.0, 1.0));
    let rotated = rotate_rgba(&faded, rotation);

    // Rotation expands the canvas; keep the sprite centered on the bounds.
    let (cx, cy) = bounds.center();
    let paste_x = (cx - rotated.width() as f32 / 2.0).round() as i64;
    let paste_y = (cy - rotated.height() as f32 / 2.0).round() as i64;
    imageops::overlay(base, &rotated, paste_x, paste_y);
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn opacity_scales_alpha_only() {
        let img = RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 200]));
        let out = with_opacity(&img, 0.5);
        assert_eq!(out.get_pixel(0, 0).0, [10, 20, 30, 100]);
    }

    #[test]
    fn rotate_zero_is_identity() {
        let img = RgbaImage::from_pixel(5, 3, Rgba([1, 2, 3, 4]));
        let out = rotate_rgba(&img, 0.0);
        assert_eq!(out.as_raw(), img.as_raw());
    }

    #[test]
    fn rotate_90_swaps_dimensions() {
        let img = RgbaImage::from_pixel(8, 4, Rgba([255, 0, 0, 255]));
        let out = rotate_rgba(&img, 90.0);
        assert_eq!(out.dimensions(), (4, 8));
        // Center pixel still opaque red.
        assert_eq!(out.get_pixel(2, 4).0, [255, 0, 0, 255]);
    }

    #[test]
    fn composite_blends_at_bounds() {
        let mut base = RgbaImage::from_pixel(20, 20, Rgba([0, 0, 0, 255]));
        let sprite = RgbaImage::from_pixel(2, 2, Rgba([255, 255, 255, 255]));
        composite_sprite(&mut base, &sprite, Rect::new(5.0, 5.0, 15.0, 15.0), 0.0, 1.0);
        assert_eq!(base.get_pixel(10, 10).0, [255, 255, 255, 255]);
        assert_eq!(base.get_pixel(1, 1).0, [0, 0, 0, 255]);
    }

    #[test]
    fn composite_respects_opacity() {
        let mut base = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255]));
        let sprite = RgbaImage::from_pixel(10, 10, Rgba([255, 255, 255, 255]));
        composite_sprite(&mut base, &sprite, Rect::new(0.0, 0.0, 10.0, 10.0), 0.0, 0.5);
        let p = base.get_pixel(5, 5).0;
        // ~50% white over black.
        assert!(p[0] > 100 && p[0] < 155, "got {p:?}");
        assert_eq!(p[3], 255);
    }
}
