//! One open image: decoded pixel buffer, edit pipeline, history, viewport.
//!
//! The buffer is decoded once at open and never mutated — every edit lives in
//! the pipeline, so the original pixels survive arbitrarily many re-renders.
//! Edit state is session-local and never persisted; closing the image (or the
//! process) discards it.

use std::path::{Path, PathBuf};

use image::RgbaImage;

use crate::error::EngineError;
use crate::geometry::Viewport;
use crate::history::HistoryStack;
use crate::pipeline::{EditPipeline, PipelineEdit};
use crate::render::{Rendered, RenderTarget, render};

#[derive(Debug)]
pub struct ImageSession {
    path: PathBuf,
    buffer: RgbaImage,
    pipeline: EditPipeline,
    history: HistoryStack,
    pub viewport: Viewport,
}

impl ImageSession {
    /// Decode a source file into a new session with an empty pipeline.
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        let decoded = image::open(path).map_err(|e| EngineError::decode(path, e))?;
        Ok(Self::from_buffer(decoded.to_rgba8(), path.to_path_buf()))
    }

    /// Build a session around an already-decoded buffer (tests, clipboard).
    pub fn from_buffer(buffer: RgbaImage, path: PathBuf) -> Self {
        Self {
            path,
            buffer,
            pipeline: EditPipeline::new(),
            history: HistoryStack::default(),
            viewport: Viewport::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn buffer(&self) -> &RgbaImage {
        &self.buffer
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    pub fn pipeline(&self) -> &EditPipeline {
        &self.pipeline
    }

    /// Apply one edit, recording the prior state for undo.  On a rejected
    /// edit (`InvalidOperation`, unknown id) neither pipeline nor history
    /// changes.
    pub fn edit(&mut self, edit: PipelineEdit) -> Result<(), EngineError> {
        let before = self.pipeline.clone();
        self.pipeline.apply_edit(&edit)?;
        self.history.record(before);
        Ok(())
    }

    /// Step the pipeline back one edit.  Returns `false` when at the start.
    pub fn undo(&mut self) -> bool {
        self.history.undo(&mut self.pipeline)
    }

    /// Reapply an undone edit.  Returns `false` when there is none.
    pub fn redo(&mut self) -> bool {
        self.history.redo(&mut self.pipeline)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Render at preview resolution — called on every pipeline or viewport
    /// change, so it stays cheap by bounding the output size.
    pub fn render_preview(&self, max_width: u32, max_height: u32) -> Rendered {
        render(&self.buffer, &self.pipeline, RenderTarget::Preview { max_width, max_height })
    }

    /// Render at full output resolution, as batch export does.
    pub fn render_full(&self) -> Rendered {
        render(&self.buffer, &self.pipeline, RenderTarget::Full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{FilterKind, MaskMode, MaskOp, MaskShape, Operation, Rect};
    use image::Rgba;

    fn session() -> ImageSession {
        let buffer = RgbaImage::from_pixel(40, 30, Rgba([100, 150, 200, 255]));
        ImageSession::from_buffer(buffer, PathBuf::from("test.png"))
    }

    #[test]
    fn open_missing_file_is_decode_error() {
        let err = ImageSession::open(Path::new("/definitely/not/here.png")).unwrap_err();
        assert!(matches!(err, EngineError::Decode { .. }));
    }

    #[test]
    fn buffer_is_never_mutated_by_edits() {
        let mut s = session();
        let original = s.buffer().clone();
        s.edit(PipelineEdit::Append(Operation::Filter(FilterKind::Sepia))).unwrap();
        s.edit(PipelineEdit::Append(Operation::Mask(MaskOp::new(
            MaskShape::Rect,
            Rect::new(0.0, 0.0, 10.0, 10.0),
            MaskMode::Blackout,
        ))))
        .unwrap();
        let _ = s.render_full();
        assert_eq!(s.buffer().as_raw(), original.as_raw());
    }

    #[test]
    fn edits_are_undoable_through_the_session() {
        let mut s = session();
        s.edit(PipelineEdit::Append(Operation::Filter(FilterKind::Sepia))).unwrap();
        s.edit(PipelineEdit::Append(Operation::Filter(FilterKind::Blur))).unwrap();
        assert_eq!(s.pipeline().filter(), FilterKind::Blur);

        assert!(s.undo());
        assert_eq!(s.pipeline().filter(), FilterKind::Sepia);
        assert!(s.redo());
        assert_eq!(s.pipeline().filter(), FilterKind::Blur);
    }

    #[test]
    fn rejected_edit_records_no_history() {
        let mut s = session();
        let bad = PipelineEdit::Append(Operation::Resize(crate::ops::ResizeSpec {
            width: None,
            height: None,
            preserve_aspect: true,
        }));
        assert!(s.edit(bad).is_err());
        assert!(!s.can_undo());
    }

    #[test]
    fn preview_render_is_bounded() {
        let s = session();
        let out = s.render_preview(16, 16);
        let (w, h) = out.image.dimensions();
        assert!(w <= 16 && h <= 16);
    }
}
