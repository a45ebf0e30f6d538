//! UI surface trait.
//!
//! This module defines the UiSurface trait, which decouples the pipeline
//! from any specific UI technology. The engine never touches presentation
//! state directly; it only calls these two sinks, from the monitor thread and
//! from whichever thread joins the run.

/// Sink for user-visible log lines and progress.
///
/// Implementations must be cheap and thread-safe. If the UI requires
/// updates on a particular thread, the implementation is responsible for
/// marshaling them there.
pub trait UiSurface: Send + Sync {
    /// Append one line to the user-visible log.
    fn append_log(&self, text: &str);

    /// Show `current` out of `total` files done.
    fn set_progress(&self, current: usize, total: usize);
}
