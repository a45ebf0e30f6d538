//! Core data model for backup runs.
//!
//! This module defines the values that flow through the pipeline and the
//! report produced when a run ends:
//! - WorkItem: one source file queued for copying
//! - PipelineConfig: tunables for one run
//! - RunStatus, StageReport, RunReport: final outcome of a run

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::checksums::ChecksumAlgorithm;
use crate::error::EngineError;

/// An absolute source file path queued for copying.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkItem {
    path: PathBuf,
}

impl WorkItem {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        WorkItem { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name used for log lines; falls back to the full path.
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn into_path(self) -> PathBuf {
        self.path
    }
}

/// Tunables for one backup run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Work queue bound; `None` for an unbounded queue
    pub channel_capacity: Option<usize>,

    /// Heartbeat period of the monitor stage
    pub monitor_interval: Duration,

    /// How often a blocked scanner or copier rechecks the stop flag
    pub poll_interval: Duration,

    /// Pause after each queued file (throttling)
    pub scan_delay: Duration,

    /// Pause after each copied file (throttling)
    pub copy_delay: Duration,

    /// Compare checksums of source and destination after each copy
    pub verify: Option<ChecksumAlgorithm>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            channel_capacity: Some(256),
            monitor_interval: Duration::from_millis(500),
            poll_interval: Duration::from_millis(50),
            scan_delay: Duration::ZERO,
            copy_delay: Duration::ZERO,
            verify: None,
        }
    }
}

impl PipelineConfig {
    /// Reject settings that would stall the pipeline.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.channel_capacity == Some(0) {
            return Err(EngineError::invalid_input(
                "",
                "channel capacity must be at least 1",
            ));
        }
        if self.monitor_interval.is_zero() {
            return Err(EngineError::invalid_input("", "monitor interval must be non-zero"));
        }
        if self.poll_interval.is_zero() {
            return Err(EngineError::invalid_input("", "poll interval must be non-zero"));
        }
        Ok(())
    }
}

/// A file that could not be backed up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub message: String,
    /// OS error code, when the failure came from the OS
    pub error_code: Option<u32>,
}

/// The three pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Scanner,
    Copier,
    Monitor,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Scanner => "scanner",
            Stage::Copier => "copier",
            Stage::Monitor => "monitor",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageState {
    /// Ran to its natural end
    Finished,
    /// Ended early because stop was requested
    Stopped,
    /// The stage thread panicked
    Panicked,
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageState::Finished => write!(f, "Finished"),
            StageState::Stopped => write!(f, "Stopped"),
            StageState::Panicked => write!(f, "Panicked"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub state: StageState,
}

/// Final status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Cancelled,
    CompletedWithErrors { errors: usize },
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Cancelled => write!(f, "cancelled"),
            RunStatus::CompletedWithErrors { errors: 1 } => write!(f, "completed with 1 file error"),
            RunStatus::CompletedWithErrors { errors } => {
                write!(f, "completed with {} file errors", errors)
            }
        }
    }
}

/// Everything known about a run once all stages have been joined.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub discovered: usize,
    pub completed: usize,
    pub bytes_copied: u64,
    pub failures: Vec<FileFailure>,
    /// Queued items never copied because the run was cancelled
    pub abandoned: usize,
    pub stages: Vec<StageReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn stage_state(&self, stage: Stage) -> Option<StageState> {
        self.stages
            .iter()
            .find(|r| r.stage == stage)
            .map(|r| r.state)
    }
}
