//! Error types for ContactScrub.
//!
//! Library crates use [`ContactScrubError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all ContactScrub operations.
#[derive(Debug, thiserror::Error)]
pub enum ContactScrubError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// CSV decoding or encoding error.
    #[error("table error: {message}")]
    Table { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Inference client construction error. Per-call failures never surface
    /// here — the client degrades to empty responses instead.
    #[error("inference error: {0}")]
    Inference(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (unknown job, malformed status, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ContactScrubError>;

impl ContactScrubError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a table error from any displayable message.
    pub fn table(msg: impl Into<String>) -> Self {
        Self::Table {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = ContactScrubError::config("missing API key env var");
        assert_eq!(err.to_string(), "config error: missing API key env var");

        let err = ContactScrubError::table("row 3: unterminated quoted field");
        assert!(err.to_string().contains("unterminated quoted field"));

        let err = ContactScrubError::validation("job not found");
        assert!(err.to_string().contains("job not found"));
    }
}
