// ============================================================================
// TRANSFORM OPERATIONS — quarter-turn rotation and mirroring
// ============================================================================

use image::{RgbaImage, imageops};

use super::Rect;

/// One user-requested transform step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    /// 90° clockwise.
    Rotate90,
    /// 90° counter-clockwise.
    Rotate270,
    FlipH,
    FlipV,
}

impl TransformKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "rotate90" | "90" | "cw" => Some(TransformKind::Rotate90),
            "rotate270" | "rotate-90" | "-90" | "270" | "ccw" => Some(TransformKind::Rotate270),
            "fliph" | "flip-h" | "h" => Some(TransformKind::FlipH),
            "flipv" | "flip-v" | "v" => Some(TransformKind::FlipV),
            _ => None,
        }
    }
}

/// The pipeline's flat transform state: successive [`TransformKind`] steps
/// compose into one element of the dihedral group, normalized as
/// "mirror horizontally first, then rotate `quarter_turns` × 90° clockwise".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformState {
    pub quarter_turns: u8,
    pub mirrored: bool,
}

impl TransformState {
    pub fn is_identity(&self) -> bool {
        self.quarter_turns == 0 && !self.mirrored
    }

    /// Compose another step onto the current state (the step is applied
    /// *after* everything already accumulated).
    pub fn compose(&mut self, kind: TransformKind) {
        match kind {
            TransformKind::Rotate90 => self.quarter_turns = (self.quarter_turns + 1) % 4,
            TransformKind::Rotate270 => self.quarter_turns = (self.quarter_turns + 3) % 4,
            // A flip after R^q folds into R^-q with the mirror toggled:
            //   H ∘ R^q = R^(4-q) ∘ H,  and  V = R^2 ∘ H.
            TransformKind::FlipH => {
                self.quarter_turns = (4 - self.quarter_turns) % 4;
                self.mirrored = !self.mirrored;
            }
            TransformKind::FlipV => {
                self.quarter_turns = (4 - self.quarter_turns + 2) % 4;
                self.mirrored = !self.mirrored;
            }
        }
    }

    /// Output dimensions for a `w`×`h` input.
    pub fn transformed_dims(&self, w: u32, h: u32) -> (u32, u32) {
        if self.quarter_turns % 2 == 1 { (h, w) } else { (w, h) }
    }

    /// Apply to pixel data.
    pub fn apply_to_image(&self, img: &RgbaImage) -> RgbaImage {
        let mut out = if self.mirrored { imageops::flip_horizontal(img) } else { img.clone() };
        out = match self.quarter_turns {
            1 => imageops::rotate90(&out),
            2 => imageops::rotate180(&out),
            3 => imageops::rotate270(&out),
            _ => out,
        };
        out
    }

    /// Map a source-space point into transformed-image space.
    /// `(w, h)` are the *untransformed* source dimensions.
    pub fn map_point(&self, x: f32, y: f32, w: f32, h: f32) -> (f32, f32) {
        let (mut x, mut y) = (x, y);
        let (mut cw, mut ch) = (w, h);
        if self.mirrored {
            x = cw - x;
        }
        for _ in 0..self.quarter_turns {
            // 90° clockwise: (x, y) on a cw×ch image lands at (ch - y, x).
            let (nx, ny) = (ch - y, x);
            x = nx;
            y = ny;
            std::mem::swap(&mut cw, &mut ch);
        }
        (x, y)
    }

    /// Map a source-space rect into transformed-image space.  Exact for
    /// quarter-turn rotations (the mapped rect stays axis-aligned).
    pub fn map_rect(&self, rect: Rect, w: f32, h: f32) -> Rect {
        let (ax, ay) = self.map_point(rect.x0, rect.y0, w, h);
        let (bx, by) = self.map_point(rect.x1, rect.y1, w, h);
        Rect::new(ax, ay, bx, by)
    }
}
