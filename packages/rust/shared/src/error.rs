//! Error types for OfficeFinder.
//!
//! Library crates use [`OfficeFinderError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all OfficeFinder operations.
#[derive(Debug, thiserror::Error)]
pub enum OfficeFinderError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while searching or fetching pages.
    #[error("network error: {0}")]
    Network(String),

    /// An external collaborator refused the request because its quota is exhausted.
    #[error("rate limit reached: {0}")]
    RateLimited(String),

    /// HTML or API response parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Ledger or master input read/write error.
    #[error("ledger error: {0}")]
    Ledger(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (missing column, empty name, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Address formatter (LLM) error.
    #[error("formatter error: {0}")]
    Formatter(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, OfficeFinderError>;

impl OfficeFinderError {
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

    /// Create a ledger error from any displayable message.
    pub fn ledger(msg: impl Into<String>) -> Self {
        Self::Ledger(msg.into())
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
