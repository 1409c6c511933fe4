// ============================================================================
// TONE ADJUSTMENTS — brightness, contrast, saturation
// ============================================================================
//
// Enhancement-factor semantics: each value is a multiplier with 1.0 as the
// identity, bounded to [0.0, 2.0].  Brightness scales toward black, contrast
// interpolates around the image's mean luma, saturation interpolates against
// the grayscale image.  The three are applied in that order.

use image::RgbaImage;
use rayon::prelude::*;

use crate::error::EngineError;

const EPS: f32 = 1e-6;

/// Single-slot tone state: setting a new adjustment replaces the previous
/// values — stacking brightness would be semantically ambiguous.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adjustment {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
}

impl Default for Adjustment {
    fn default() -> Self {
        Self { brightness: 1.0, contrast: 1.0, saturation: 1.0 }
    }
}

impl Adjustment {
    pub fn is_identity(&self) -> bool {
        (self.brightness - 1.0).abs() < EPS
            && (self.contrast - 1.0).abs() < EPS
            && (self.saturation - 1.0).abs() < EPS
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        for (name, v) in [
            ("brightness", self.brightness),
            ("contrast", self.contrast),
            ("saturation", self.saturation),
        ] {
            if !(0.0..=2.0).contains(&v) {
                return Err(EngineError::invalid(format!("{name} factor {v} outside [0, 2]")));
            }
        }
        Ok(())
    }
}

#[inline]
fn luma(r: f32, g: f32, b: f32) -> f32 {
    0.299 * r + 0.587 * g + 0.114 * b
}

/// Apply the adjustment, returning a new buffer.  Identity values skip their
/// pass entirely.
pub fn apply(adj: &Adjustment, img: &RgbaImage) -> RgbaImage {
    let mut out = img.clone();
    if (adj.brightness - 1.0).abs() >= EPS {
        let factor = adj.brightness;
        map_rgb(&mut out, move |r, g, b| (r * factor, g * factor, b * factor));
    }
    if (adj.contrast - 1.0).abs() >= EPS {
        // Pivot on the mean luma of the (already brightness-adjusted) image.
        let mean = mean_luma(&out);
        let factor = adj.contrast;
        map_rgb(&mut out, move |r, g, b| {
            (
                mean + factor * (r - mean),
                mean + factor * (g - mean),
                mean + factor * (b - mean),
            )
        });
    }
    if (adj.saturation - 1.0).abs() >= EPS {
        let factor = adj.saturation;
        map_rgb(&mut out, move |r, g, b| {
            let gray = luma(r, g, b);
            (
                gray + factor * (r - gray),
                gray + factor * (g - gray),
                gray + factor * (b - gray),
            )
        });
    }
    out
}

fn mean_luma(img: &RgbaImage) -> f32 {
    let raw = img.as_raw();
    if raw.is_empty() {
        return 0.0;
    }
    let sum: f64 = raw
        .par_chunks_exact(4)
        .map(|px| luma(px[0] as f32, px[1] as f32, px[2] as f32) as f64)
        .sum();
    (sum / (raw.len() / 4) as f64).round() as f32
}

/// Parallel in-place RGB map; alpha untouched.
fn map_rgb(img: &mut RgbaImage, f: impl Fn(f32, f32, f32) -> (f32, f32, f32) + Sync) {
    let stride = img.width() as usize * 4;
    if stride == 0 {
        return;
    }
    img.as_mut().par_chunks_mut(stride).for_each(|row| {
        for px in row.chunks_exact_mut(4) {
            let (r, g, b) = f(px[0] as f32, px[1] as f32, px[2] as f32);
            px[0] = r.round().clamp(0.0, 255.0) as u8;
            px[1] = g.round().clamp(0.0, 255.0) as u8;
            px[2] = b.round().clamp(0.0, 255.0) as u8;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn identity_is_a_noop() {
        let img = RgbaImage::from_pixel(6, 6, Rgba([120, 80, 40, 255]));
        let out = apply(&Adjustment::default(), &img);
        assert_eq!(out.as_raw(), img.as_raw());
    }

    #[test]
    fn brightness_scales_channels() {
        let img = RgbaImage::from_pixel(2, 2, Rgba([100, 50, 200, 128]));
        let out = apply(&Adjustment { brightness: 1.5, ..Default::default() }, &img);
        assert_eq!(out.get_pixel(0, 0).0, [150, 75, 255, 128]);

        let dark = apply(&Adjustment { brightness: 0.0, ..Default::default() }, &img);
        assert_eq!(dark.get_pixel(0, 0).0, [0, 0, 0, 128]);
    }

    #[test]
    fn contrast_pushes_away_from_mean() {
        // Half dark, half light: boosting contrast must widen the gap.
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([50, 50, 50, 255]));
        img.put_pixel(1, 0, Rgba([200, 200, 200, 255]));
        let out = apply(&Adjustment { contrast: 1.5, ..Default::default() }, &img);
        assert!(out.get_pixel(0, 0).0[0] < 50);
        assert!(out.get_pixel(1, 0).0[0] > 200);
    }

    #[test]
    fn zero_saturation_is_grayscale() {
        let img = RgbaImage::from_pixel(3, 3, Rgba([200, 100, 50, 255]));
        let out = apply(&Adjustment { saturation: 0.0, ..Default::default() }, &img);
        let p = out.get_pixel(1, 1).0;
        assert_eq!(p[0], p[1]);
        assert_eq!(p[1], p[2]);
    }

    #[test]
    fn out_of_range_factors_are_rejected() {
        assert!(Adjustment { brightness: 2.5, ..Default::default() }.validate().is_err());
        assert!(Adjustment { saturation: -0.1, ..Default::default() }.validate().is_err());
        assert!(Adjustment::default().validate().is_ok());
    }
}
