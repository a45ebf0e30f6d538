//! Monitor stage: reports progress to the UI surface on a heartbeat.

use std::time::Duration;

use crate::cancel::CancellationToken;
use crate::model::StageState;
use crate::progress::ProgressState;
use crate::surface::UiSurface;

#[derive(Debug, Default)]
pub struct MonitorOutcome {
    pub reports: usize,
}

impl MonitorOutcome {
    pub fn state(&self) -> StageState {
        StageState::Stopped
    }
}

/// Report `(completed, total)` after every change or `interval`, until stop
/// is requested.
///
/// The final report of a run is the controller's job; this loop exits as
/// soon as it sees the stop flag.
pub fn run_monitor(
    token: &CancellationToken,
    progress: &ProgressState,
    ui: &dyn UiSurface,
    interval: Duration,
) -> MonitorOutcome {
    let mut outcome = MonitorOutcome::default();

    while !token.is_stop_requested() {
        let snapshot = progress.snapshot_and_wait(interval);
        if token.is_stop_requested() {
            break;
        }
        ui.set_progress(snapshot.completed, snapshot.total);
        outcome.reports += 1;
    }

    log::debug!("monitor stopped after {} report(s)", outcome.reports);
    outcome
}
