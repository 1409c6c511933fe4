// ============================================================================
// MASK REGIONS — localized blur / blackout
// ============================================================================
//
// Masks arrive here with their bounds already mapped into the render's
// output space.  Blur is restricted to the padded bounding box of the
// region — crop, blur, composite back through the shape — which is
// dramatically cheaper than blurring the whole frame for a small region.

use image::{RgbaImage, imageops};

use super::filter::gaussian_blur;
use super::{MaskMode, MaskShape, Rect};

/// Apply one mask whose `bounds` are in the coordinate space of `img`.
/// `radius` for blur mode must likewise be pre-scaled to output pixels.
pub fn apply(img: &mut RgbaImage, shape: MaskShape, bounds: Rect, mode: MaskMode) {
    let (w, h) = (img.width(), img.height());
    let Some((x0, y0, x1, y1)) = bounds.clip_to(w, h) else {
        return;
    };

    match mode {
        MaskMode::Blackout => fill_shape(img, shape, bounds, x0, y0, x1, y1),
        MaskMode::Blur { radius } => {
            // Tiny regions get a proportionally smaller kernel.
            let region_max = (x1 - x0).max(y1 - y0) as f32;
            let sigma = radius.min(region_max / 4.0).max(0.5);

            // Expand the crop by ceil(3*sigma) so the kernel can read
            // surrounding pixels (avoids dark edge artifacts).
            let pad = (sigma * 3.0).ceil() as u32;
            let cx0 = x0.saturating_sub(pad);
            let cy0 = y0.saturating_sub(pad);
            let cx1 = (x1 + pad).min(w);
            let cy1 = (y1 + pad).min(h);

            let sub = imageops::crop_imm(img, cx0, cy0, cx1 - cx0, cy1 - cy0).to_image();
            let blurred = gaussian_blur(&sub, sigma);

            for y in y0..y1 {
                for x in x0..x1 {
                    if covers(shape, bounds, x, y) {
                        let local = *blurred.get_pixel(x - cx0, y - cy0);
                        img.put_pixel(x, y, local);
                    }
                }
            }
        }
    }
}

fn fill_shape(img: &mut RgbaImage, shape: MaskShape, bounds: Rect, x0: u32, y0: u32, x1: u32, y1: u32) {
    let black = image::Rgba([0, 0, 0, 255]);
    for y in y0..y1 {
        for x in x0..x1 {
            if covers(shape, bounds, x, y) {
                img.put_pixel(x, y, black);
            }
        }
    }
}

/// Does the shape inscribed in `bounds` cover the pixel at `(x, y)`?
#[inline]
fn covers(shape: MaskShape, bounds: Rect, x: u32, y: u32) -> bool {
    match shape {
        MaskShape::Rect => true,
        MaskShape::Circle => {
            let (cx, cy) = bounds.center();
            let rx = bounds.width() / 2.0;
            let ry = bounds.height() / 2.0;
            if rx <= 0.0 || ry <= 0.0 {
                return false;
            }
            let dx = (x as f32 + 0.5 - cx) / rx;
            let dy = (y as f32 + 0.5 - cy) / ry;
            dx * dx + dy * dy <= 1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn noisy(w: u32, h: u32) -> RgbaImage {
        let mut img = RgbaImage::new(w, h);
        for (x, y, px) in img.enumerate_pixels_mut() {
            *px = Rgba([((x * 83 + y * 7) % 256) as u8, ((x + y * 91) % 256) as u8, 128, 255]);
        }
        img
    }

    #[test]
    fn blackout_rect_fills_exactly_the_bounds() {
        let mut img = RgbaImage::from_pixel(20, 20, Rgba([200, 200, 200, 255]));
        apply(&mut img, MaskShape::Rect, Rect::new(5.0, 5.0, 10.0, 10.0), MaskMode::Blackout);
        assert_eq!(img.get_pixel(7, 7).0, [0, 0, 0, 255]);
        assert_eq!(img.get_pixel(4, 7).0, [200, 200, 200, 255]);
        assert_eq!(img.get_pixel(10, 10).0, [200, 200, 200, 255]);
    }

    #[test]
    fn blackout_circle_spares_corners() {
        let mut img = RgbaImage::from_pixel(20, 20, Rgba([200, 200, 200, 255]));
        apply(&mut img, MaskShape::Circle, Rect::new(0.0, 0.0, 20.0, 20.0), MaskMode::Blackout);
        // Center covered, extreme corner outside the inscribed ellipse.
        assert_eq!(img.get_pixel(10, 10).0, [0, 0, 0, 255]);
        assert_eq!(img.get_pixel(0, 0).0, [200, 200, 200, 255]);
    }

    #[test]
    fn blur_touches_only_the_region() {
        let mut img = noisy(40, 40);
        let before = img.clone();
        apply(&mut img, MaskShape::Rect, Rect::new(10.0, 10.0, 30.0, 30.0), MaskMode::Blur {
            radius: 4.0,
        });
        // Outside the region: byte-identical.
        assert_eq!(img.get_pixel(2, 2), before.get_pixel(2, 2));
        assert_eq!(img.get_pixel(35, 35), before.get_pixel(35, 35));
        // Inside: changed (the noise pattern cannot survive a sigma-4 blur).
        assert_ne!(img.get_pixel(20, 20), before.get_pixel(20, 20));
    }

    #[test]
    fn off_image_mask_is_ignored() {
        let mut img = noisy(10, 10);
        let before = img.clone();
        apply(&mut img, MaskShape::Rect, Rect::new(50.0, 50.0, 60.0, 60.0), MaskMode::Blackout);
        assert_eq!(img.as_raw(), before.as_raw());
    }
}
