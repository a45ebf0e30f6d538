//! Copier stage: drains the work channel into the destination directory.

use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::cancel::CancellationToken;
use crate::channel::{Dequeue, WorkChannel};
use crate::checksums::{self, ChecksumAlgorithm};
use crate::error::EngineError;
use crate::fs_ops;
use crate::model::{FileFailure, StageState, WorkItem};
use crate::progress::ProgressState;

#[derive(Debug, Clone, Copy)]
pub struct CopyOptions {
    pub poll_interval: Duration,
    pub copy_delay: Duration,
    pub verify: Option<ChecksumAlgorithm>,
}

/// What the copier did before it stopped.
#[derive(Debug, Default)]
pub struct CopyOutcome {
    pub copied: usize,
    pub bytes_copied: u64,
    pub failures: Vec<FileFailure>,
    /// Items left in the channel when the copier stopped early
    pub abandoned: usize,
    pub stopped_early: bool,
}

impl CopyOutcome {
    pub fn state(&self) -> StageState {
        if self.stopped_early {
            StageState::Stopped
        } else {
            StageState::Finished
        }
    }
}

/// Copy one item into `destination`, verifying it if asked to.
fn copy_item(
    item: &WorkItem,
    destination: &Path,
    verify: Option<ChecksumAlgorithm>,
) -> Result<u64, EngineError> {
    let target = fs_ops::destination_for(item.path(), destination)?;
    let bytes = fs_ops::copy_file_with_metadata(item.path(), &target)?;
    if let Some(algorithm) = verify {
        checksums::verify_copy(item.path(), &target, algorithm)?;
    }
    Ok(bytes)
}

/// Copy items from `channel` until it drains or stop is requested.
///
/// A failed file is logged and recorded; the loop moves on to the next one.
/// On stop, anything still queued is abandoned rather than flushed.
pub fn run_copier(
    destination: &Path,
    channel: &WorkChannel,
    token: &CancellationToken,
    progress: &ProgressState,
    options: CopyOptions,
) -> CopyOutcome {
    let mut outcome = CopyOutcome::default();

    loop {
        let item = match channel.dequeue_until(token, options.poll_interval) {
            Dequeue::Item(item) => item,
            Dequeue::Drained => break,
            Dequeue::Stopped => {
                outcome.stopped_early = true;
                break;
            }
        };

        if token.is_stop_requested() {
            outcome.stopped_early = true;
            outcome.abandoned += 1;
            break;
        }

        match copy_item(&item, destination, options.verify) {
            Ok(bytes) => {
                outcome.copied += 1;
                outcome.bytes_copied += bytes;
                progress.record_completed();
                log::debug!("Copied: {}", item.display_name());
            }
            Err(e) => {
                log::warn!("Error copying file {}: {}", item.path().display(), e);
                outcome.failures.push(FileFailure {
                    path: item.into_path(),
                    message: e.to_string(),
                    error_code: e.raw_os_error(),
                });
            }
        }

        if !options.copy_delay.is_zero() {
            thread::sleep(options.copy_delay);
        }
    }

    if outcome.stopped_early {
        outcome.abandoned += channel.len();
    }

    log::info!(
        "copier finished: {} copied, {} failed, {} abandoned",
        outcome.copied,
        outcome.failures.len(),
        outcome.abandoned
    );
    outcome
}
