//! Per-image undo/redo over pipeline snapshots.
//!
//! The pipeline is small pure data, so each history step stores a full
//! snapshot — push/pop are O(1) amortized and restoring a step trivially
//! preserves exact operation ordering, including overlay `order` values.
//! Linear history: recording a new step after an undo discards the redo
//! branch.  Bounded by a step count, not persisted.

use std::collections::VecDeque;

use crate::pipeline::EditPipeline;

pub const DEFAULT_MAX_STEPS: usize = 50;

#[derive(Debug)]
pub struct HistoryStack {
    undo_stack: VecDeque<EditPipeline>,
    redo_stack: VecDeque<EditPipeline>,
    max_steps: usize,
}

impl Default for HistoryStack {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_STEPS)
    }
}

impl HistoryStack {
    pub fn new(max_steps: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_steps: max_steps.max(1),
        }
    }

    /// Record the state *before* a mutation.  Clears the redo branch and
    /// prunes the oldest step past the cap.
    pub fn record(&mut self, before: EditPipeline) {
        self.redo_stack.clear();
        self.undo_stack.push_back(before);
        while self.undo_stack.len() > self.max_steps {
            self.undo_stack.pop_front();
        }
    }

    /// Step back.  Returns `false` (leaving `current` untouched) when there
    /// is nothing to undo.
    pub fn undo(&mut self, current: &mut EditPipeline) -> bool {
        match self.undo_stack.pop_back() {
            Some(previous) => {
                self.redo_stack.push_back(std::mem::replace(current, previous));
                true
            }
            None => false,
        }
    }

    /// Step forward again.  Returns `false` when there is nothing to redo.
    pub fn redo(&mut self, current: &mut EditPipeline) -> bool {
        match self.redo_stack.pop_back() {
            Some(next) => {
                self.undo_stack.push_back(std::mem::replace(current, next));
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}
