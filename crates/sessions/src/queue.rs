//! Bounded per-session prompt queue.
//!
//! One producer side shared by all attached clients, one consumer (the
//! session's turn runner). `enqueue` never blocks: a full queue surfaces
//! `Backpressure`, a closed queue surfaces `Closed`.

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use ccsdk_domain::{Error, Result};

/// Producer half of the prompt queue. The consumer half is the
/// `mpsc::Receiver` handed to the turn runner at construction.
pub struct PromptQueue {
    tx: Mutex<Option<mpsc::Sender<String>>>,
    capacity: usize,
}

impl PromptQueue {
    /// Create a queue with at least one slot. Returns the producer and
    /// the receiver for the turn-runner loop.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx: Mutex::new(Some(tx)),
                capacity,
            },
            rx,
        )
    }

    /// Append a prompt. Fails fast instead of waiting.
    pub fn enqueue(&self, prompt: String) -> Result<()> {
        let guard = self.tx.lock();
        let tx = guard.as_ref().ok_or(Error::Closed)?;
        tx.try_send(prompt).map_err(|e| match e {
            TrySendError::Full(_) => Error::Backpressure,
            TrySendError::Closed(_) => Error::Closed,
        })
    }

    /// Clone the sender, for two-phase submits (reserve a slot, persist,
    /// then send). `None` once closed.
    pub fn sender(&self) -> Option<mpsc::Sender<String>> {
        self.tx.lock().clone()
    }

    /// Close the queue: wakes the consumer with a terminal `None`;
    /// subsequent enqueues fail with `Closed`.
    pub fn close(&self) {
        self.tx.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }

    /// Number of prompts waiting to be dequeued.
    pub fn pending(&self) -> usize {
        match self.tx.lock().as_ref() {
            Some(tx) => self.capacity - tx.capacity(),
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }
}
