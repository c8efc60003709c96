//! Deferred self-echo delivery
//!
//! A sender observes its own message only after `send()` has returned. The
//! echo is parked on a per-node channel instead of being delivered inside the
//! routing call chain; the harness later drains it synchronously or awaits
//! it.

use std::sync::atomic::{AtomicUsize, Ordering};

use meshsim_core::Message;
use tokio::sync::{Mutex, mpsc};
use tracing::warn;

/// Unbounded queue of self-echoes waiting to be delivered
pub struct SelfEchoQueue {
    tx: mpsc::UnboundedSender<Message>,
    rx: Mutex<mpsc::UnboundedReceiver<Message>>,
    pending: AtomicUsize,
}

impl SelfEchoQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            pending: AtomicUsize::new(0),
        }
    }

    /// Park an echo for later delivery
    pub fn push(&self, message: Message) {
        self.pending.fetch_add(1, Ordering::AcqRel);
        if let Err(e) = self.tx.send(message) {
            // The receiver lives as long as the queue, so this only happens
            // during teardown.
            self.pending.fetch_sub(1, Ordering::AcqRel);
            warn!(message_id = %e.0.id, "self-echo dropped, queue closed");
        }
    }

    /// Number of echoes not yet taken
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Take the next echo without waiting
    ///
    /// Returns `None` when the queue is empty or another task is currently
    /// awaiting it.
    pub fn try_next(&self) -> Option<Message> {
        let mut rx = self.rx.try_lock().ok()?;
        let message = rx.try_recv().ok()?;
        self.pending.fetch_sub(1, Ordering::AcqRel);
        Some(message)
    }

    /// Wait until an echo is available
    pub async fn next(&self) -> Option<Message> {
        let mut rx = self.rx.lock().await;
        let message = rx.recv().await?;
        self.pending.fetch_sub(1, Ordering::AcqRel);
        Some(message)
    }
}

impl Default for SelfEchoQueue {
    fn default() -> Self {
        Self::new()
    }
}
