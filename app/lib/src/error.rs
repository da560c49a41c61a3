//! Error types for the valmap library.
//!
//! This module defines all error types that can occur while reading mapping
//! logs, building datasets, computing statistics and fitting models.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the valmap library.
///
/// All fallible operations return `Result<T, ValmapError>`.
#[derive(Debug, Error)]
pub enum ValmapError {
    /// I/O failure on a specific file.
    ///
    /// Missing files, permission problems and read failures all land here,
    /// always carrying the path that caused them.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File that could not be opened or read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The input file is not valid UTF-8.
    #[error("{} is not valid UTF-8 (line {line})", path.display())]
    InvalidEncoding {
        /// File being read
        path: PathBuf,
        /// Line number where decoding failed (1-indexed)
        line: usize,
    },

    /// None of the known log grammars matched the file prefix.
    #[error("unrecognized log format in {}", path.display())]
    UnrecognizedFormat {
        /// File that was inspected
        path: PathBuf,
    },

    /// The file was read but no line produced a record.
    #[error("no mapping records found in {}", path.display())]
    NoData {
        /// File that was read, or `<session>` when nothing is loaded
        path: PathBuf,
    },

    /// A model family's input precondition does not hold.
    ///
    /// Power, logarithmic and exponential fits need strictly positive input.
    #[error("{model} model skipped: {message}")]
    Precondition {
        /// Name of the skipped model family
        model: &'static str,
        /// What the input violated
        message: String,
    },

    /// Input has no variance or too few points for the requested fit.
    #[error("degenerate input: {message}")]
    Degenerate {
        /// Description of the degeneracy
        message: String,
    },

    /// A configuration value is out of range.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Which value is wrong and why
        message: String,
    },

    /// Error reading or writing delimited text.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Error reading or writing JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unexpected failure inside an analysis step.
    #[error("analysis failed: {message}")]
    Analysis {
        /// Description of the failure
        message: String,
    },
}

impl ValmapError {
    /// Wrap an I/O error with the path that produced it.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ValmapError::Io {
            path: path.into(),
            source,
        }
    }

    /// Shorthand for [`ValmapError::Degenerate`].
    pub fn degenerate(message: impl Into<String>) -> Self {
        ValmapError::Degenerate {
            message: message.into(),
        }
    }

    /// Shorthand for [`ValmapError::InvalidConfig`].
    pub fn invalid_config(message: impl Into<String>) -> Self {
        ValmapError::InvalidConfig {
            message: message.into(),
        }
    }

    /// Whether the caller can reasonably retry with different input.
    ///
    /// Format mismatches, empty results and per-model precondition
    /// failures are recoverable; I/O and internal failures are not.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ValmapError::UnrecognizedFormat { .. }
                | ValmapError::NoData { .. }
                | ValmapError::Precondition { .. }
        )
    }
}

/// Type alias for Results using `ValmapError`.
pub type Result<T> = std::result::Result<T, ValmapError>;
