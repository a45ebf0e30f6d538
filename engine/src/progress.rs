//! Shared progress counters.
//!
//! The scanner and copier update the counters; the monitor sleeps on the
//! condition variable and wakes either when a file completes or when its
//! heartbeat timeout elapses. Both counters live under one guard, so a
//! snapshot is never torn.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// A consistent `(completed, total)` pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub total: usize,
}

impl ProgressSnapshot {
    pub fn percent(&self) -> u32 {
        if self.total == 0 {
            return 100;
        }
        ((self.completed.min(self.total) as f64 / self.total as f64) * 100.0) as u32
    }
}

#[derive(Debug, Default)]
struct Counters {
    discovered: usize,
    completed: usize,
}

/// Guarded discovered/completed counters plus a change notification.
#[derive(Debug, Default)]
pub struct ProgressState {
    counters: Mutex<Counters>,
    changed: Condvar,
}

impl ProgressState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the total file count known at the start of a run.
    pub fn record_discovered(&self, total: usize) {
        self.counters.lock().discovered = total;
        self.changed.notify_all();
    }

    /// Raise the total if more files turned up than were counted upfront.
    pub fn ensure_discovered_at_least(&self, total: usize) {
        let mut counters = self.counters.lock();
        if counters.discovered < total {
            log::debug!(
                "discovered count raised from {} to {}",
                counters.discovered,
                total
            );
            counters.discovered = total;
        }
    }

    /// Count one more completed file and wake every waiter.
    pub fn record_completed(&self) -> usize {
        let completed = {
            let mut counters = self.counters.lock();
            counters.completed += 1;
            counters.completed
        };
        self.changed.notify_all();
        completed
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let counters = self.counters.lock();
        ProgressSnapshot {
            completed: counters.completed,
            total: counters.discovered,
        }
    }

    /// Wait for a change or `timeout`, whichever comes first, then read both
    /// counters under the same guard.
    pub fn snapshot_and_wait(&self, timeout: Duration) -> ProgressSnapshot {
        let mut counters = self.counters.lock();
        let _ = self.changed.wait_for(&mut counters, timeout);
        ProgressSnapshot {
            completed: counters.completed,
            total: counters.discovered,
        }
    }

    /// Wake waiters without touching the counters.
    ///
    /// A waiter that has not yet blocked misses this and sleeps until its
    /// own timeout instead.
    pub fn wake_all(&self) {
        self.changed.notify_all();
    }
}
