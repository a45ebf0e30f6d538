//! Error types for the backup engine.
//!
//! `EngineError` covers both run-level failures (bad input, a run already
//! active, a stage thread that could not be spawned) and the per-file
//! failures that stages log and record without stopping the run.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the backup engine.
///
/// Only `InvalidInput`, `RunAlreadyActive` and `StageSpawn` ever abort a
/// `start` call. `FileAccess` and `Verification` are per-file and are
/// recorded in the run report; `Persistence` is logged and defaults are used.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Source or destination rejected before any stage starts
    #[error("invalid input {}: {reason}", .path.display())]
    InvalidInput { path: PathBuf, reason: String },

    /// Enqueue attempted after the work channel was closed
    #[error("work channel is closed")]
    ClosedChannel,

    /// A file could not be listed, read or written
    #[error("file access failed for {}: {source}", .path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Preferences could not be loaded or saved
    #[error("preference '{key}' could not be persisted: {reason}")]
    Persistence { key: String, reason: String },

    /// A run is still active on this controller
    #[error("a backup run is already active")]
    RunAlreadyActive,

    /// The OS refused to spawn a stage thread
    #[error("failed to spawn {stage} stage: {source}")]
    StageSpawn {
        stage: &'static str,
        #[source]
        source: io::Error,
    },

    /// Source and destination differ after copy
    #[error("verification failed for {}: {reason}", .path.display())]
    Verification { path: PathBuf, reason: String },
}

impl EngineError {
    pub(crate) fn file_access(path: impl Into<PathBuf>, source: io::Error) -> Self {
        EngineError::FileAccess {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_input(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        EngineError::InvalidInput {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<u32> {
        match self {
            Self::FileAccess { source, .. } | Self::StageSpawn { source, .. } => {
                source.raw_os_error().map(|e| e as u32)
            }
            _ => None,
        }
    }
}
