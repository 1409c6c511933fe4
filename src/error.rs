//! Engine-wide error taxonomy.
//!
//! Nothing in here is fatal to the process: decode failures on a referenced
//! overlay or watermark degrade the render, and per-item export failures are
//! isolated inside the batch report.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Source / overlay / watermark image could not be decoded.
    #[error("cannot decode '{}': {reason}", .path.display())]
    Decode { path: PathBuf, reason: String },

    /// Encoding to the target format failed.
    #[error("cannot encode '{}': {reason}", .path.display())]
    Encode { path: PathBuf, reason: String },

    /// Filesystem-level failure (unwritable path, permission denied, ...).
    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Out-of-range or otherwise malformed operation parameter.
    /// Rejected at construction; the pipeline is left unchanged.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl EngineError {
    pub fn decode(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        EngineError::Decode { path: path.into(), reason: reason.to_string() }
    }

    pub fn encode(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        EngineError::Encode { path: path.into(), reason: reason.to_string() }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Io { path: path.into(), source }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        EngineError::InvalidOperation(msg.into())
    }
}
