//! Bounded outbound queue between the hub and one session
//!
//! The queue is split in two halves:
//!
//! - [`OutboundQueue`]: the sending half, owned exclusively by the hub's live
//!   set. Only the hub enqueues and only the hub closes.
//! - [`QueueReceiver`]: the receiving half, owned by the session's outbound
//!   loop. It yields every buffered envelope, then `None` once the queue has
//!   been closed.
//!
//! Enqueue never waits. A full queue is reported to the hub, which evicts the
//! session instead of stalling the broadcast.

use super::envelope::Envelope;
use super::error::QueueError;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Default depth: one undelivered envelope per session
pub const DEFAULT_QUEUE_CAPACITY: usize = 1;

/// Lifecycle of an outbound queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Open,
    Closed,
}

/// Create a queue holding at most `capacity` envelopes (minimum 1)
pub fn outbound_queue(capacity: usize) -> (OutboundQueue, QueueReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (OutboundQueue { tx: Some(tx) }, QueueReceiver { rx })
}

/// Sending half of a session's outbound queue
#[derive(Debug)]
pub struct OutboundQueue {
    tx: Option<mpsc::Sender<Arc<Envelope>>>,
}

impl OutboundQueue {
    pub fn state(&self) -> QueueState {
        match self.tx {
            Some(_) => QueueState::Open,
            None => QueueState::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == QueueState::Open
    }

    /// Enqueue without waiting
    ///
    /// Returns [`QueueError::Full`] when the receiver has not drained the
    /// previous envelope, and [`QueueError::Closed`] when this queue was
    /// closed or the receiving loop has already exited.
    pub fn try_enqueue(&self, envelope: Arc<Envelope>) -> Result<(), QueueError> {
        let tx = self.tx.as_ref().ok_or(QueueError::Closed)?;
        tx.try_send(envelope).map_err(|e| match e {
            TrySendError::Full(_) => QueueError::Full,
            TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    /// Close the queue
    ///
    /// Returns `true` on the transition from open to closed and `false` if
    /// the queue was already closed. The receiver still drains whatever was
    /// buffered before it observes the closure.
    pub fn close(&mut self) -> bool {
        self.tx.take().is_some()
    }
}

/// Receiving half of a session's outbound queue
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::Receiver<Arc<Envelope>>,
}

impl QueueReceiver {
    /// Wait for the next envelope; `None` means the hub closed the queue
    pub async fn recv(&mut self) -> Option<Arc<Envelope>> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`recv`](Self::recv)
    ///
    /// `Err(QueueError::Full)` is never returned; an empty open queue yields
    /// `Ok(None)`.
    pub fn try_recv(&mut self) -> Result<Option<Arc<Envelope>>, QueueError> {
        match self.rx.try_recv() {
            Ok(envelope) => Ok(Some(envelope)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(QueueError::Closed),
        }
    }

    /// Number of envelopes waiting to be written
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
