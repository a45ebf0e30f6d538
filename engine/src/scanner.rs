//! Scanner stage: lists the source directory and feeds the work channel.

use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::cancel::CancellationToken;
use crate::channel::{Enqueue, WorkChannel};
use crate::error::EngineError;
use crate::fs_ops;
use crate::model::{StageState, WorkItem};
use crate::progress::ProgressState;

#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    pub poll_interval: Duration,
    pub scan_delay: Duration,
}

/// What the scanner did before it closed the channel.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub enqueued: usize,
    pub stopped_early: bool,
    pub listing_error: Option<String>,
}

impl ScanOutcome {
    pub fn state(&self) -> StageState {
        if self.stopped_early {
            StageState::Stopped
        } else {
            StageState::Finished
        }
    }
}

/// Closes the channel when dropped, including on panic.
struct CloseOnDrop<'a>(&'a WorkChannel);

impl Drop for CloseOnDrop<'_> {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Enqueue every file directly inside `source`, then close `channel`.
///
/// The channel is closed exactly once however this returns, so the copier
/// never waits on a scanner that has given up.
pub fn run_scanner(
    source: &Path,
    channel: &WorkChannel,
    token: &CancellationToken,
    progress: &ProgressState,
    options: ScanOptions,
) -> ScanOutcome {
    let _close = CloseOnDrop(channel);
    let mut outcome = ScanOutcome::default();

    let files = match fs_ops::list_files(source) {
        Ok(files) => files,
        Err(e) => {
            log::warn!("Error during file scan: {}", e);
            outcome.listing_error = Some(e.to_string());
            return outcome;
        }
    };
    progress.ensure_discovered_at_least(files.len());

    for path in files {
        if token.is_stop_requested() {
            outcome.stopped_early = true;
            break;
        }

        let item = WorkItem::new(path);
        let name = item.display_name();
        match channel.enqueue_until(item, token, options.poll_interval) {
            Ok(Enqueue::Accepted) => {
                outcome.enqueued += 1;
                log::debug!("Queued: {}", name);
            }
            Ok(Enqueue::Stopped) => {
                outcome.stopped_early = true;
                break;
            }
            Err(EngineError::ClosedChannel) => {
                log::error!("work channel closed under the scanner; stopping");
                outcome.stopped_early = true;
                break;
            }
            Err(e) => {
                log::error!("failed to queue {}: {}", name, e);
                break;
            }
        }

        if !options.scan_delay.is_zero() {
            thread::sleep(options.scan_delay);
        }
    }

    log::info!(
        "scanner finished: {} file(s) queued{}",
        outcome.enqueued,
        if outcome.stopped_early { " (stopped early)" } else { "" }
    );
    outcome
}
