//! Error types and exit codes for pysift

use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;

/// Main error type for pysift operations
///
/// Recoverable per-file problems (unreadable file, syntax error, unresolved
/// import) are *not* errors: they accumulate as [`crate::diagnostics::Diagnostic`]s
/// on the graph. This enum covers failures that abort the current phase.
#[derive(Error, Debug)]
pub enum PysiftError {
    #[error("invalid configuration in {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("no source roots to walk")]
    NoRoots,

    #[error("graph file {path}: {message}")]
    GraphFormat { path: PathBuf, message: String },

    #[error("import trace {path}: {message}")]
    Trace { path: PathBuf, message: String },

    #[error("{missing} dynamic import(s) missing from the static graph")]
    Validation { missing: usize },

    #[error("build cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PysiftError {
    /// Convert error to the exit code reported by the CLI:
    /// - 0: Success
    /// - 1: IO error
    /// - 2: Configuration error / nothing to walk
    /// - 3: Graph file corrupt or version mismatch
    /// - 4: Validation failed in strict mode
    /// - 5: Cancelled
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Io(_) => ExitCode::from(1),
            Self::Config { .. } => ExitCode::from(2),
            Self::NoRoots => ExitCode::from(2),
            Self::GraphFormat { .. } => ExitCode::from(3),
            Self::Trace { .. } => ExitCode::from(3),
            Self::Validation { .. } => ExitCode::from(4),
            Self::Cancelled => ExitCode::from(5),
        }
    }
}

/// Result type alias for pysift operations
pub type Result<T> = std::result::Result<T, PysiftError>;
