//! # BackUP Engine - Concurrent Backup Pipeline
//!
//! A headless, cancellable file backup engine, designed as the foundation
//! for multiple front ends (CLI, GUI, automation).
//!
//! ## Overview
//!
//! A run is three threads joined by a bounded work channel:
//! - the **scanner** lists the source directory and queues each file
//! - the **copier** drains the queue into the destination directory
//! - the **monitor** reports `(completed, total)` to a [`UiSurface`] on a
//!   heartbeat, waking early whenever a file completes
//!
//! Every stage polls a shared [`CancellationToken`]. Per-file failures are
//! logged and recorded; they never stop the run.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use engine::{BackupController, MemoryPreferences, PipelineConfig, UiSurface};
//!
//! struct Stdout;
//!
//! impl UiSurface for Stdout {
//!     fn append_log(&self, text: &str) {
//!         println!("{}", text);
//!     }
//!     fn set_progress(&self, current: usize, total: usize) {
//!         println!("{}/{}", current, total);
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let controller = BackupController::new(
//!     Arc::new(Stdout),
//!     Arc::new(MemoryPreferences::new()),
//!     PipelineConfig::default(),
//! );
//!
//! let mut run = controller.start("/data/photos", "/mnt/backup/photos")?;
//! let report = controller.wait(&mut run);
//! println!("{}: {}/{} files", report.status, report.completed, report.discovered);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **channel**: work queue between scanner and copier
//! - **cancel**: one-way stop flag
//! - **progress**: guarded counters with change notification
//! - **scanner**, **copier**, **monitor**: the three stage bodies
//! - **controller**: run lifecycle (start, wait, cancel)
//! - **surface**, **prefs**: traits for the UI and preference store
//! - **fs_ops**: listing and copying
//! - **checksums**: optional post-copy verification
//! - **model**: config and run report types
//! - **error**: error types

pub mod cancel;
pub mod channel;
pub mod checksums;
pub mod controller;
pub mod copier;
pub mod error;
pub mod fs_ops;
pub mod model;
pub mod monitor;
pub mod prefs;
pub mod progress;
pub mod scanner;
pub mod surface;

// Re-export main types and functions
pub use cancel::CancellationToken;
pub use channel::{Dequeue, Enqueue, WorkChannel};
pub use checksums::{compute_file_checksum, ChecksumAlgorithm, ChecksumValue};
pub use controller::{BackupController, RunHandle, SavedPaths};
pub use error::EngineError;
pub use model::{
    FileFailure, PipelineConfig, RunReport, RunStatus, Stage, StageReport, StageState, WorkItem,
};
pub use prefs::{JsonFilePreferences, MemoryPreferences, PreferencesStore};
pub use progress::{ProgressSnapshot, ProgressState};
pub use surface::UiSurface;
