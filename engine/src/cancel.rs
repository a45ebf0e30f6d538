//! One-way stop flag shared by every stage of a run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Lock-free "stop requested" flag.
///
/// Clones share the same flag. Once set it stays set for the lifetime of the
/// run; there is no way to reset it.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    requested: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that all stages stop. Idempotent and non-blocking.
    pub fn request_stop(&self) {
        self.requested.store(true, Ordering::Release);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}
