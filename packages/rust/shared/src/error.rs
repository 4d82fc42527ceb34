//! Error types for paperflow.
//!
//! Library crates use [`PaperflowError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all paperflow operations.
#[derive(Debug, thiserror::Error)]
pub enum PaperflowError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during harvesting.
    #[error("network error: {0}")]
    Network(String),

    /// Tabular, HTML, or JSON parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (malformed manifest, bad input shape, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A mandatory audit gate did not pass.
    #[error("audit failed: {0}")]
    Audit(String),

    /// Word document export error.
    #[error("export error: {0}")]
    Export(String),

    /// An external process could not be spawned or exited non-zero.
    #[error("subprocess error: {0}")]
    Subprocess(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PaperflowError>;

impl PaperflowError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
