// ============================================================================
// IMAGE FILTERS — grayscale, sepia, blur, sharpen, edge enhance, contour
// ============================================================================

use image::RgbaImage;
use rayon::prelude::*;

/// Whole-image filter.  Single-slot state: selecting a new filter replaces
/// the previous one rather than stacking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FilterKind {
    #[default]
    None,
    Grayscale,
    Sepia,
    Blur,
    Sharpen,
    EdgeEnhance,
    Contour,
}

impl FilterKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "none" => Some(FilterKind::None),
            "grayscale" | "greyscale" => Some(FilterKind::Grayscale),
            "sepia" => Some(FilterKind::Sepia),
            "blur" => Some(FilterKind::Blur),
            "sharpen" => Some(FilterKind::Sharpen),
            "edge-enhance" | "edge enhance" | "edgeenhance" => Some(FilterKind::EdgeEnhance),
            "contour" => Some(FilterKind::Contour),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FilterKind::None => "None",
            FilterKind::Grayscale => "Grayscale",
            FilterKind::Sepia => "Sepia",
            FilterKind::Blur => "Blur",
            FilterKind::Sharpen => "Sharpen",
            FilterKind::EdgeEnhance => "Edge Enhance",
            FilterKind::Contour => "Contour",
        }
    }
}

/// Gaussian radius used by the whole-image Blur filter.
const FILTER_BLUR_RADIUS: f32 = 2.0;

/// Apply the filter, returning a new buffer.  `FilterKind::None` is a clone.
pub fn apply(kind: FilterKind, img: &RgbaImage) -> RgbaImage {
    match kind {
        FilterKind::None => img.clone(),
        FilterKind::Grayscale => per_pixel(img, |r, g, b| {
            let lum = luma(r, g, b);
            (lum, lum, lum)
        }),
        FilterKind::Sepia => per_pixel(img, |r, g, b| {
            (
                0.393 * r + 0.769 * g + 0.189 * b,
                0.349 * r + 0.686 * g + 0.168 * b,
                0.272 * r + 0.534 * g + 0.131 * b,
            )
        }),
        FilterKind::Blur => gaussian_blur(img, FILTER_BLUR_RADIUS),
        // 3×3 kernels with the classic scale/offset parameters.
        FilterKind::Sharpen => {
            convolve3x3(img, &[-2.0, -2.0, -2.0, -2.0, 32.0, -2.0, -2.0, -2.0, -2.0], 16.0, 0.0)
        }
        FilterKind::EdgeEnhance => {
            convolve3x3(img, &[-1.0, -1.0, -1.0, -1.0, 9.0, -1.0, -1.0, -1.0, -1.0], 1.0, 0.0)
        }
        FilterKind::Contour => {
            // Edge trace on luma, inverted by the +255 offset.
            let gray = apply(FilterKind::Grayscale, img);
            convolve3x3(&gray, &[-1.0, -1.0, -1.0, -1.0, 8.0, -1.0, -1.0, -1.0, -1.0], 1.0, 255.0)
        }
    }
}

/// ITU-R 601 luma.
#[inline]
fn luma(r: f32, g: f32, b: f32) -> f32 {
    0.299 * r + 0.587 * g + 0.114 * b
}

/// Parallel per-pixel color map; alpha passes through untouched.
fn per_pixel(src: &RgbaImage, f: impl Fn(f32, f32, f32) -> (f32, f32, f32) + Sync) -> RgbaImage {
    let w = src.width() as usize;
    let h = src.height() as usize;
    let stride = w * 4;
    let src_raw = src.as_raw();
    let mut dst_raw = vec![0u8; w * h * 4];

    dst_raw.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        let row_in = &src_raw[y * stride..(y + 1) * stride];
        for x in 0..w {
            let pi = x * 4;
            let (r, g, b) = f(row_in[pi] as f32, row_in[pi + 1] as f32, row_in[pi + 2] as f32);
            row_out[pi] = r.round().clamp(0.0, 255.0) as u8;
            row_out[pi + 1] = g.round().clamp(0.0, 255.0) as u8;
            row_out[pi + 2] = b.round().clamp(0.0, 255.0) as u8;
            row_out[pi + 3] = row_in[pi + 3];
        }
    });

    RgbaImage::from_raw(src.width(), src.height(), dst_raw).unwrap()
}

/// Build a 1-D Gaussian kernel truncated at ceil(3*sigma).
fn build_gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil() as usize;
    if radius == 0 {
        return vec![1.0];
    }
    let len = radius * 2 + 1;
    let mut kernel = vec![0.0f32; len];
    let s2 = 2.0 * sigma * sigma;
    let mut sum = 0.0f32;
    for (i, v) in kernel.iter_mut().enumerate() {
        let x = i as f32 - radius as f32;
        *v = (-x * x / s2).exp();
        sum += *v;
    }
    let inv = 1.0 / sum;
    for v in &mut kernel {
        *v *= inv;
    }
    kernel
}

/// Rayon-parallelized separable Gaussian blur.  Edge pixels clamp.
pub fn gaussian_blur(src: &RgbaImage, sigma: f32) -> RgbaImage {
    let w = src.width() as usize;
    let h = src.height() as usize;
    if w == 0 || h == 0 || sigma <= 0.0 {
        return src.clone();
    }

    let kernel = build_gaussian_kernel(sigma);
    let radius = kernel.len() / 2;
    let src_raw = src.as_raw();

    let pixel_count = w * h * 4;
    let buf_in: Vec<f32> = src_raw.iter().map(|&b| b as f32).collect();

    // --- Horizontal pass (parallel by row) ---
    let mut buf_h = vec![0.0f32; pixel_count];
    buf_h.par_chunks_mut(w * 4).enumerate().for_each(|(y, row_out)| {
        let row_in_start = y * w * 4;
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for (ki, &kv) in kernel.iter().enumerate() {
                let sx = (x as isize + ki as isize - radius as isize).clamp(0, w as isize - 1) as usize;
                let idx = row_in_start + sx * 4;
                for c in 0..4 {
                    acc[c] += buf_in[idx + c] * kv;
                }
            }
            row_out[x * 4..x * 4 + 4].copy_from_slice(&acc);
        }
    });

    // --- Vertical pass (parallel by row) ---
    let mut buf_v = vec![0.0f32; pixel_count];
    buf_v.par_chunks_mut(w * 4).enumerate().for_each(|(y, row_out)| {
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for (ki, &kv) in kernel.iter().enumerate() {
                let sy = (y as isize + ki as isize - radius as isize).clamp(0, h as isize - 1) as usize;
                let idx = sy * w * 4 + x * 4;
                for c in 0..4 {
                    acc[c] += buf_h[idx + c] * kv;
                }
            }
            row_out[x * 4..x * 4 + 4].copy_from_slice(&acc);
        }
    });

    let dst_raw: Vec<u8> = buf_v.iter().map(|&v| v.round().clamp(0.0, 255.0) as u8).collect();
    RgbaImage::from_raw(w as u32, h as u32, dst_raw).unwrap()
}

/// 3×3 convolution with divisor `scale` and additive `offset`, parallel by
/// row.  Edge pixels clamp to the border.  Alpha passes through.
fn convolve3x3(src: &RgbaImage, kernel: &[f32; 9], scale: f32, offset: f32) -> RgbaImage {
    let w = src.width() as usize;
    let h = src.height() as usize;
    if w == 0 || h == 0 {
        return src.clone();
    }
    let stride = w * 4;
    let src_raw = src.as_raw();
    let mut dst_raw = vec![0u8; w * h * 4];
    let inv_scale = 1.0 / scale;

    dst_raw.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        for x in 0..w {
            let mut acc = [0.0f32; 3];
            for ky in 0..3usize {
                let sy = (y as isize + ky as isize - 1).clamp(0, h as isize - 1) as usize;
                for kx in 0..3usize {
                    let sx = (x as isize + kx as isize - 1).clamp(0, w as isize - 1) as usize;
                    let kv = kernel[ky * 3 + kx];
                    let idx = sy * stride + sx * 4;
                    for c in 0..3 {
                        acc[c] += src_raw[idx + c] as f32 * kv;
                    }
                }
            }
            let pi = x * 4;
            for c in 0..3 {
                row_out[pi + c] = (acc[c] * inv_scale + offset).round().clamp(0.0, 255.0) as u8;
            }
            row_out[pi + 3] = src_raw[y * stride + pi + 3];
        }
    });

    RgbaImage::from_raw(src.width(), src.height(), dst_raw).unwrap()
}
