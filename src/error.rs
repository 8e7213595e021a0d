//! Error types for the event log tailer.

use thiserror::Error;

/// The main error type for eve-tail operations.
///
/// Conditions the follower recovers from on its own (missing file, partial
/// records, truncation, transient reads) never reach the consumer; this type
/// only covers the fallible public surface and the follower's internal I/O.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors when opening or reading the event log.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File watching errors from the notify crate.
    #[error("File watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// JSON errors when loading a configuration document.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A configuration value is out of range.
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    /// The stream or publisher has already been shut down.
    #[error("Stream closed")]
    StreamClosed,
}

/// A convenient Result type for eve-tail operations.
pub type Result<T> = std::result::Result<T, Error>;
