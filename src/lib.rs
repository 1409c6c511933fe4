//! batchpix — a non-destructive batch image-editing and compositing engine.
//!
//! Each open image holds an [`session::ImageSession`]: the decoded pixel
//! buffer (immutable after load) plus an ordered, reversible
//! [`pipeline::EditPipeline`] of edit operations tracked by a per-image
//! [`history::HistoryStack`].  The [`render`] compositor turns buffer +
//! pipeline into pixels — at preview resolution on every pipeline change, at
//! full resolution for export — and [`export`] replays that across a whole
//! batch on a worker pool.

pub mod cli;
pub mod error;
pub mod export;
pub mod geometry;
pub mod history;
pub mod logger;
pub mod ops;
pub mod pipeline;
pub mod render;
pub mod session;
pub mod settings;

pub use error::EngineError;
pub use pipeline::{EditPipeline, PipelineEdit};
pub use session::ImageSession;
