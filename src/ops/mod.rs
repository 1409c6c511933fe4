// ============================================================================
// OPERATION MODEL — pure-data edit descriptions, no pixel storage
// ============================================================================
//
// Every user edit is one of these values.  Geometry is always stored in
// source-pixel space; the renderer maps it through the current transform and
// render scale.  Parameters are range-checked at the point of construction
// (`Operation::validate`); an out-of-range value never reaches the pipeline.

pub mod adjust;
pub mod filter;
pub mod mask;
pub mod overlay;
pub mod transform;
pub mod watermark;

use std::path::PathBuf;

use uuid::Uuid;

use crate::error::EngineError;

pub use adjust::Adjustment;
pub use filter::FilterKind;
pub use transform::{TransformKind, TransformState};

/// Axis-aligned rectangle in source-pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    /// Build a normalized rect (x0 <= x1, y0 <= y1) from any two corners.
    pub fn new(ax: f32, ay: f32, bx: f32, by: f32) -> Self {
        Self {
            x0: ax.min(bx),
            y0: ay.min(by),
            x1: ax.max(bx),
            y1: ay.max(by),
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    pub fn scale(&self, sx: f32, sy: f32) -> Self {
        Self::new(self.x0 * sx, self.y0 * sy, self.x1 * sx, self.y1 * sy)
    }

    /// Intersect with `[0,w] × [0,h]` and round outward to integer pixels.
    /// Returns `None` when nothing remains.
    pub fn clip_to(&self, w: u32, h: u32) -> Option<(u32, u32, u32, u32)> {
        let x0 = self.x0.floor().max(0.0) as u32;
        let y0 = self.y0.floor().max(0.0) as u32;
        let x1 = (self.x1.ceil() as i64).clamp(0, w as i64) as u32;
        let y1 = (self.y1.ceil() as i64).clamp(0, h as i64) as u32;
        if x1 > x0 && y1 > y0 { Some((x0, y0, x1, y1)) } else { None }
    }
}

/// Maps source-space geometry into a render's output space: through the
/// flat transform (quarter-turns / mirror), then the render scale.
/// Built once per render by the compositor.
#[derive(Debug, Clone, Copy)]
pub struct GeomCtx {
    pub transform: TransformState,
    /// Untransformed source dimensions.
    pub src_w: f32,
    pub src_h: f32,
    /// Output pixels per transformed-source pixel.
    pub sx: f32,
    pub sy: f32,
}

impl GeomCtx {
    pub fn map_point(&self, x: f32, y: f32) -> (f32, f32) {
        let (tx, ty) = self.transform.map_point(x, y, self.src_w, self.src_h);
        (tx * self.sx, ty * self.sy)
    }

    pub fn map_rect(&self, rect: Rect) -> Rect {
        self.transform.map_rect(rect, self.src_w, self.src_h).scale(self.sx, self.sy)
    }

    /// Isotropic scale estimate for scalar quantities (blur radii, font
    /// sizes, paddings).
    pub fn scale_avg(&self) -> f32 {
        (self.sx + self.sy) / 2.0
    }
}

/// Shape of a masked region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskShape {
    Rect,
    /// Ellipse inscribed in `bounds`.
    Circle,
}

/// What happens to the pixels inside the masked region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaskMode {
    /// Localized gaussian blur of the given radius.
    Blur { radius: f32 },
    /// Opaque black fill.
    Blackout,
}

/// A region of the image to obscure (license plates, faces, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct MaskOp {
    pub id: Uuid,
    pub shape: MaskShape,
    pub bounds: Rect,
    pub mode: MaskMode,
}

impl MaskOp {
    pub fn new(shape: MaskShape, bounds: Rect, mode: MaskMode) -> Self {
        Self { id: Uuid::new_v4(), shape, bounds, mode }
    }
}

/// Placement of a text watermark.
#[derive(Debug, Clone, PartialEq)]
pub enum Anchor {
    Center,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    /// Repeating grid across the whole image.
    Tile,
    /// Rotated to lie along the image diagonal, centered, scaled to span it.
    DiagonalFit,
    /// Explicit top-left position in source-pixel space (drag-to-place).
    Custom { x: f32, y: f32 },
}

impl Anchor {
    /// Parse the UI / settings-file name ("Bottom Right", "Diagonal Fit", ...).
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "center" => Some(Anchor::Center),
            "top left" | "top-left" => Some(Anchor::TopLeft),
            "top right" | "top-right" => Some(Anchor::TopRight),
            "bottom left" | "bottom-left" => Some(Anchor::BottomLeft),
            "bottom right" | "bottom-right" => Some(Anchor::BottomRight),
            "tile" => Some(Anchor::Tile),
            "diagonal fit" | "diagonal" => Some(Anchor::DiagonalFit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextWatermark {
    pub text: String,
    pub font_size: f32,
    pub color: [u8; 3],
    /// 0.0 ..= 1.0
    pub opacity: f32,
    pub anchor: Anchor,
    /// Degrees counter-clockwise; ignored for `DiagonalFit` (computed).
    pub rotation: f32,
    /// Explicit font file; `None` selects the system sans-serif face.
    pub font_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageWatermark {
    pub source: PathBuf,
    /// Top-left of the unrotated placement, source-pixel space.
    pub x: f32,
    pub y: f32,
    /// Multiplier on the watermark image's native size.
    pub scale: f32,
    /// Degrees counter-clockwise, about the placement center.
    pub rotation: f32,
    pub opacity: f32,
}

/// Either watermark flavor; composited last, in append order.
#[derive(Debug, Clone, PartialEq)]
pub enum WatermarkOp {
    Text(TextWatermark),
    Image(ImageWatermark),
}

/// A stacked overlay image.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayOp {
    pub id: Uuid,
    pub source: PathBuf,
    /// Target bounds in source-pixel space (the overlay is resized to fit).
    pub bounds: Rect,
    /// Degrees counter-clockwise, about the bounds center.
    pub rotation: f32,
    /// Back-to-front stacking position; unique per image.
    pub order: u32,
    pub opacity: f32,
}

impl OverlayOp {
    /// `order` is assigned by the pipeline on append.
    pub fn new(source: PathBuf, bounds: Rect, rotation: f32, opacity: f32) -> Self {
        Self { id: Uuid::new_v4(), source, bounds, rotation, order: 0, opacity }
    }
}

/// Output resolution request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeSpec {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub preserve_aspect: bool,
}

impl ResizeSpec {
    /// Resolve the concrete output dimensions for a `cur_w`×`cur_h` input.
    ///
    /// A single given dimension always derives the other from the aspect
    /// ratio.  With both given and `preserve_aspect`, the image is fitted
    /// inside the box; without it, the exact dimensions are used.
    pub fn target_dims(&self, cur_w: u32, cur_h: u32) -> (u32, u32) {
        if cur_w == 0 || cur_h == 0 {
            return (cur_w, cur_h);
        }
        match (self.width, self.height) {
            (Some(w), None) => {
                let h = (cur_h as f64 * w as f64 / cur_w as f64).round() as u32;
                (w.max(1), h.max(1))
            }
            (None, Some(h)) => {
                let w = (cur_w as f64 * h as f64 / cur_h as f64).round() as u32;
                (w.max(1), h.max(1))
            }
            (Some(w), Some(h)) if self.preserve_aspect => {
                let ratio = (w as f64 / cur_w as f64).min(h as f64 / cur_h as f64);
                (
                    ((cur_w as f64 * ratio).round() as u32).max(1),
                    ((cur_h as f64 * ratio).round() as u32).max(1),
                )
            }
            (Some(w), Some(h)) => (w.max(1), h.max(1)),
            (None, None) => (cur_w, cur_h),
        }
    }
}

/// A single reversible edit description.  Pure data; no pixel storage.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Mask(MaskOp),
    TextWatermark(TextWatermark),
    ImageWatermark(ImageWatermark),
    Overlay(OverlayOp),
    Adjustment(Adjustment),
    Filter(FilterKind),
    Transform(TransformKind),
    Resize(ResizeSpec),
}

fn check_opacity(opacity: f32, what: &str) -> Result<(), EngineError> {
    if (0.0..=1.0).contains(&opacity) {
        Ok(())
    } else {
        Err(EngineError::invalid(format!("{what} opacity {opacity} outside [0, 1]")))
    }
}

impl Operation {
    /// Range-check all parameters.  Called by the pipeline before the
    /// operation is accepted; on error the pipeline is unchanged.
    pub fn validate(&self) -> Result<(), EngineError> {
        match self {
            Operation::Mask(mask) => {
                if mask.bounds.is_empty() {
                    return Err(EngineError::invalid("mask bounds are empty"));
                }
                if let MaskMode::Blur { radius } = mask.mode
                    && radius <= 0.0
                {
                    return Err(EngineError::invalid(format!("blur radius {radius} must be > 0")));
                }
                Ok(())
            }
            Operation::TextWatermark(wm) => {
                check_opacity(wm.opacity, "text watermark")?;
                if wm.text.is_empty() {
                    return Err(EngineError::invalid("watermark text is empty"));
                }
                if wm.font_size <= 0.0 {
                    return Err(EngineError::invalid(format!(
                        "font size {} must be > 0",
                        wm.font_size
                    )));
                }
                Ok(())
            }
            Operation::ImageWatermark(wm) => {
                check_opacity(wm.opacity, "image watermark")?;
                if wm.scale <= 0.0 {
                    return Err(EngineError::invalid(format!("watermark scale {} must be > 0", wm.scale)));
                }
                Ok(())
            }
            Operation::Overlay(ov) => {
                check_opacity(ov.opacity, "overlay")?;
                if ov.bounds.is_empty() {
                    return Err(EngineError::invalid("overlay bounds are empty"));
                }
                Ok(())
            }
            Operation::Adjustment(adj) => adj.validate(),
            Operation::Filter(_) | Operation::Transform(_) => Ok(()),
            Operation::Resize(spec) => {
                if spec.width.is_none() && spec.height.is_none() {
                    return Err(EngineError::invalid("resize needs at least one target dimension"));
                }
                if spec.width == Some(0) || spec.height == Some(0) {
                    return Err(EngineError::invalid("resize dimensions must be >= 1"));
                }
                Ok(())
            }
        }
    }
}
