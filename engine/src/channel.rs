//! Work channel between the scanner and the copier.
//!
//! A FIFO queue of [`WorkItem`]s backed by a crossbeam channel. The channel
//! owns its only sender; [`WorkChannel::close`] drops it, which lets
//! consumers drain what is left and then observe end-of-stream instead of
//! blocking forever.

use std::time::Duration;

use crossbeam_channel::{
    bounded, unbounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender,
};
use parking_lot::Mutex;

use crate::cancel::CancellationToken;
use crate::error::EngineError;
use crate::model::WorkItem;

/// Result of a cancellation-aware enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    Accepted,
    /// Stop was requested while the queue was full; the item was dropped.
    Stopped,
}

/// Result of a cancellation-aware dequeue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dequeue {
    Item(WorkItem),
    /// Closed and empty: no more work will arrive.
    Drained,
    /// Stop was requested while waiting for work.
    Stopped,
}

/// Thread-safe FIFO of file paths with an explicit closed state.
pub struct WorkChannel {
    sender: Mutex<Option<Sender<WorkItem>>>,
    receiver: Receiver<WorkItem>,
    capacity: Option<usize>,
}

impl WorkChannel {
    /// Create a channel; `None` means unbounded.
    pub fn new(capacity: Option<usize>) -> Self {
        let (sender, receiver) = match capacity {
            Some(cap) => bounded(cap),
            None => unbounded(),
        };
        WorkChannel {
            sender: Mutex::new(Some(sender)),
            receiver,
            capacity,
        }
    }

    pub fn bounded(capacity: usize) -> Self {
        Self::new(Some(capacity))
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    // Clone the sender so the lock is not held across a blocking send.
    fn sender(&self) -> Result<Sender<WorkItem>, EngineError> {
        self.sender.lock().clone().ok_or(EngineError::ClosedChannel)
    }

    /// Add an item, blocking while a bounded channel is full.
    pub fn enqueue(&self, item: WorkItem) -> Result<(), EngineError> {
        self.sender()?
            .send(item)
            .map_err(|_| EngineError::ClosedChannel)
    }

    /// Add an item, rechecking `token` every `poll` while the channel is full.
    pub fn enqueue_until(
        &self,
        item: WorkItem,
        token: &CancellationToken,
        poll: Duration,
    ) -> Result<Enqueue, EngineError> {
        let sender = self.sender()?;
        let mut item = item;
        loop {
            match sender.send_timeout(item, poll) {
                Ok(()) => return Ok(Enqueue::Accepted),
                Err(SendTimeoutError::Timeout(back)) => {
                    if token.is_stop_requested() {
                        return Ok(Enqueue::Stopped);
                    }
                    item = back;
                }
                Err(SendTimeoutError::Disconnected(_)) => return Err(EngineError::ClosedChannel),
            }
        }
    }

    /// Mark the channel closed. Idempotent.
    pub fn close(&self) {
        if self.sender.lock().take().is_some() {
            log::debug!("work channel closed with {} item(s) queued", self.len());
        }
    }

    /// Block until an item arrives, or return `None` once closed and drained.
    pub fn dequeue(&self) -> Option<WorkItem> {
        self.receiver.recv().ok()
    }

    /// Block until an item arrives, the channel drains, or stop is requested.
    pub fn dequeue_until(&self, token: &CancellationToken, poll: Duration) -> Dequeue {
        loop {
            match self.receiver.recv_timeout(poll) {
                Ok(item) => return Dequeue::Item(item),
                Err(RecvTimeoutError::Disconnected) => return Dequeue::Drained,
                Err(RecvTimeoutError::Timeout) => {
                    if token.is_stop_requested() {
                        return Dequeue::Stopped;
                    }
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}
