//! The per-image edit pipeline — the authoritative non-destructive edit state.
//!
//! Masks, overlays and watermarks are **ordered and cumulative**: several may
//! coexist and they compose in append order.  Filter, adjustment and resize
//! are **single-slot**: a new value of the same kind replaces the previous
//! one (stacking brightness or resize would be visually ambiguous).
//! Transform steps compose into one flat rotation/mirror state.
//!
//! The pipeline is pure data.  It never touches pixels; the compositor in
//! [`crate::render`] consumes it.

use uuid::Uuid;

use crate::error::EngineError;
use crate::ops::{
    Adjustment, FilterKind, MaskOp, Operation, OverlayOp, ResizeSpec, TransformState, WatermarkOp,
};

/// One undoable mutation of the pipeline.  [`crate::session::ImageSession`]
/// records a history snapshot around each edit.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEdit {
    Append(Operation),
    RemoveMask(Uuid),
    ClearMasks,
    RemoveOverlay(Uuid),
    MoveOverlayUp(Uuid),
    MoveOverlayDown(Uuid),
    SetOverlayOpacity(Uuid, f32),
    ClearWatermarks,
    Reset,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditPipeline {
    masks: Vec<MaskOp>,
    overlays: Vec<OverlayOp>,
    watermarks: Vec<WatermarkOp>,
    adjustment: Adjustment,
    filter: FilterKind,
    transform: TransformState,
    resize: Option<ResizeSpec>,
}

impl EditPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// No edits at all?
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    // -- accessors (render-side view of the current state) ----------------

    pub fn masks(&self) -> &[MaskOp] {
        &self.masks
    }

    /// Overlays in stacking order (ascending `order`, back to front).
    pub fn overlays_stacked(&self) -> Vec<&OverlayOp> {
        let mut sorted: Vec<&OverlayOp> = self.overlays.iter().collect();
        sorted.sort_by_key(|ov| ov.order);
        sorted
    }

    pub fn overlays(&self) -> &[OverlayOp] {
        &self.overlays
    }

    pub fn watermarks(&self) -> &[WatermarkOp] {
        &self.watermarks
    }

    pub fn adjustment(&self) -> &Adjustment {
        &self.adjustment
    }

    pub fn filter(&self) -> FilterKind {
        self.filter
    }

    pub fn transform(&self) -> TransformState {
        self.transform
    }

    pub fn resize(&self) -> Option<ResizeSpec> {
        self.resize
    }

    // -- mutations ---------------------------------------------------------

    /// Validate and apply one edit.  On error the pipeline is unchanged.
    pub fn apply_edit(&mut self, edit: &PipelineEdit) -> Result<(), EngineError> {
        match edit {
            PipelineEdit::Append(op) => self.append(op.clone()),
            PipelineEdit::RemoveMask(id) => self.remove_mask(*id),
            PipelineEdit::ClearMasks => {
                self.masks.clear();
                Ok(())
            }
            PipelineEdit::RemoveOverlay(id) => self.remove_overlay(*id),
            PipelineEdit::MoveOverlayUp(id) => self.move_overlay(*id, true),
            PipelineEdit::MoveOverlayDown(id) => self.move_overlay(*id, false),
            PipelineEdit::SetOverlayOpacity(id, opacity) => self.set_overlay_opacity(*id, *opacity),
            PipelineEdit::ClearWatermarks => {
                self.watermarks.clear();
                Ok(())
            }
            PipelineEdit::Reset => {
                *self = Self::default();
                Ok(())
            }
        }
    }

    /// Insert an operation.  Cumulative kinds append; single-slot kinds
    /// replace; transforms compose.
    pub fn append(&mut self, op: Operation) -> Result<(), EngineError> {
        op.validate()?;
        match op {
            Operation::Mask(mask) => self.masks.push(mask),
            Operation::TextWatermark(wm) => self.watermarks.push(WatermarkOp::Text(wm)),
            Operation::ImageWatermark(wm) => self.watermarks.push(WatermarkOp::Image(wm)),
            Operation::Overlay(mut ov) => {
                ov.order = self.next_overlay_order();
                self.overlays.push(ov);
            }
            Operation::Adjustment(adj) => self.adjustment = adj,
            Operation::Filter(kind) => self.filter = kind,
            Operation::Transform(kind) => self.transform.compose(kind),
            Operation::Resize(spec) => self.resize = Some(spec),
        }
        Ok(())
    }

    fn next_overlay_order(&self) -> u32 {
        self.overlays.iter().map(|ov| ov.order + 1).max().unwrap_or(0)
    }

    fn remove_mask(&mut self, id: Uuid) -> Result<(), EngineError> {
        let before = self.masks.len();
        self.masks.retain(|m| m.id != id);
        if self.masks.len() == before {
            return Err(EngineError::invalid(format!("no mask with id {id}")));
        }
        Ok(())
    }

    fn remove_overlay(&mut self, id: Uuid) -> Result<(), EngineError> {
        let before = self.overlays.len();
        self.overlays.retain(|ov| ov.id != id);
        if self.overlays.len() == before {
            return Err(EngineError::invalid(format!("no overlay with id {id}")));
        }
        Ok(())
    }

    fn set_overlay_opacity(&mut self, id: Uuid, opacity: f32) -> Result<(), EngineError> {
        if !(0.0..=1.0).contains(&opacity) {
            return Err(EngineError::invalid(format!("overlay opacity {opacity} outside [0, 1]")));
        }
        let ov = self
            .overlays
            .iter_mut()
            .find(|ov| ov.id == id)
            .ok_or_else(|| EngineError::invalid(format!("no overlay with id {id}")))?;
        ov.opacity = opacity;
        Ok(())
    }

    /// Swap the overlay's `order` with its stacking neighbor (up = toward
    /// the front).  A no-op at the end of the stack.
    fn move_overlay(&mut self, id: Uuid, up: bool) -> Result<(), EngineError> {
        let mut order: Vec<(usize, u32)> =
            self.overlays.iter().enumerate().map(|(i, ov)| (i, ov.order)).collect();
        order.sort_by_key(|&(_, o)| o);

        let pos = order
            .iter()
            .position(|&(i, _)| self.overlays[i].id == id)
            .ok_or_else(|| EngineError::invalid(format!("no overlay with id {id}")))?;

        let neighbor = if up { pos.checked_add(1).filter(|&p| p < order.len()) } else { pos.checked_sub(1) };
        if let Some(npos) = neighbor {
            let (a, ao) = order[pos];
            let (b, bo) = order[npos];
            self.overlays[a].order = bo;
            self.overlays[b].order = ao;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{MaskMode, MaskShape, Rect};
    use std::path::PathBuf;

    fn overlay(name: &str) -> Operation {
        Operation::Overlay(OverlayOp::new(
            PathBuf::from(name),
            Rect::new(0.0, 0.0, 10.0, 10.0),
            0.0,
            0.8,
        ))
    }

    fn mask() -> Operation {
        Operation::Mask(MaskOp::new(
            MaskShape::Rect,
            Rect::new(0.0, 0.0, 5.0, 5.0),
            MaskMode::Blackout,
        ))
    }

    #[test]
    fn masks_accumulate_filters_replace() {
        let mut p = EditPipeline::new();
        p.append(mask()).unwrap();
        p.append(mask()).unwrap();
        assert_eq!(p.masks().len(), 2);

        p.append(Operation::Filter(FilterKind::Sepia)).unwrap();
        p.append(Operation::Filter(FilterKind::Blur)).unwrap();
        assert_eq!(p.filter(), FilterKind::Blur);

        p.append(Operation::Resize(ResizeSpec { width: Some(100), height: None, preserve_aspect: true }))
            .unwrap();
        p.append(Operation::Resize(ResizeSpec { width: Some(200), height: None, preserve_aspect: true }))
            .unwrap();
        assert_eq!(p.resize().unwrap().width, Some(200));
    }

    #[test]
    fn overlay_orders_are_unique_and_sequential() {
        let mut p = EditPipeline::new();
        p.append(overlay("a.png")).unwrap();
        p.append(overlay("b.png")).unwrap();
        p.append(overlay("c.png")).unwrap();

        let orders: Vec<u32> = p.overlays_stacked().iter().map(|ov| ov.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
    }

    #[test]
    fn move_overlay_swaps_only_order_values() {
        let mut p = EditPipeline::new();
        p.append(overlay("a.png")).unwrap();
        p.append(overlay("b.png")).unwrap();
        let a_id = p.overlays()[0].id;
        let a_opacity = p.overlays()[0].opacity;
        let a_bounds = p.overlays()[0].bounds;

        p.apply_edit(&PipelineEdit::MoveOverlayUp(a_id)).unwrap();

        let stacked = p.overlays_stacked();
        assert_eq!(stacked[1].id, a_id, "a should now stack on top");
        let a = p.overlays().iter().find(|ov| ov.id == a_id).unwrap();
        assert_eq!(a.opacity, a_opacity);
        assert_eq!(a.bounds, a_bounds);

        // Moving past the top is a no-op, not an error.
        p.apply_edit(&PipelineEdit::MoveOverlayUp(a_id)).unwrap();
        assert_eq!(p.overlays_stacked()[1].id, a_id);
    }

    #[test]
    fn transform_steps_compose() {
        let mut p = EditPipeline::new();
        use crate::ops::TransformKind;
        p.append(Operation::Transform(TransformKind::Rotate90)).unwrap();
        p.append(Operation::Transform(TransformKind::Rotate90)).unwrap();
        p.append(Operation::Transform(TransformKind::Rotate90)).unwrap();
        p.append(Operation::Transform(TransformKind::Rotate90)).unwrap();
        assert!(p.transform().is_identity());
    }

    #[test]
    fn invalid_ops_leave_pipeline_unchanged() {
        let mut p = EditPipeline::new();
        p.append(mask()).unwrap();
        let snapshot = p.clone();

        let bad = Operation::Overlay(OverlayOp::new(
            PathBuf::from("x.png"),
            Rect::new(0.0, 0.0, 10.0, 10.0),
            0.0,
            7.0, // out-of-range opacity
        ));
        assert!(p.append(bad).is_err());
        assert_eq!(p, snapshot);

        assert!(p.apply_edit(&PipelineEdit::RemoveOverlay(Uuid::new_v4())).is_err());
        assert_eq!(p, snapshot);
    }

    #[test]
    fn reset_restores_default() {
        let mut p = EditPipeline::new();
        p.append(mask()).unwrap();
        p.append(Operation::Filter(FilterKind::Sepia)).unwrap();
        p.apply_edit(&PipelineEdit::Reset).unwrap();
        assert!(p.is_empty());
    }
}
