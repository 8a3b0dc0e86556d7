//! Error types for the end-to-end orchestrator.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for orchestrator operations.
#[derive(Error, Debug)]
pub enum Error {
    /// No recognized manifest file was found.
    #[error("no dependency manifest found at {path}")]
    ConfigNotFound { path: PathBuf },

    /// A manifest file exists but could not be parsed.
    #[error("malformed dependency manifest {path}: {reason}")]
    ConfigMalformed { path: PathBuf, reason: String },

    /// A dependency's source could not be retrieved.
    #[error("failed to fetch dependency '{dependency}': {reason}")]
    FetchFailed { dependency: String, reason: String },

    /// The run was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The tunnel status channel returned an error.
    #[error("status check failed: {0}")]
    StatusCheckFailed(String),

    /// An external command could not be run or exited unsuccessfully.
    #[error("command '{program}' failed: {reason}")]
    Command { program: String, reason: String },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true for the non-fatal "no manifest" condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ConfigNotFound { .. })
    }
}

/// Result type alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, Error>;
