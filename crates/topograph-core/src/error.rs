//! Error types shared across the core crate.

use thiserror::Error;

/// Errors raised by diagram operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Pen not found: {0}")]
    PenNotFound(String),
    #[error("No shape registered under {0:?}")]
    UnknownShape(String),
    #[error("Diagram is locked")]
    Locked,
    #[error("Invalid property path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },
    #[error("Script error: {0}")]
    Script(String),
    #[error("Realtime error: {0}")]
    Realtime(String),
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
