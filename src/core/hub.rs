//! The hub: single owner of the live session set
//!
//! Every membership change and every broadcast goes through one mailbox and
//! is processed by one task, in arrival order. Nothing else reads or writes
//! the live set, so it needs no lock.
//!
//! ```text
//! session.start() ──join──┐
//! inbound loop ──leave────┼──▶ mailbox ──▶ Hub::run()
//! inbound loop ──broadcast┘                   │
//!                                 for each live session
//!                                             │
//!                                  queue.try_enqueue(envelope)
//!                                   │                  │
//!                                  ok            full / gone
//!                                                      │
//!                                          remove + close queue (evict)
//! ```
//!
//! The fan-out never waits on a session: a session that has not drained its
//! previous envelope is evicted rather than allowed to stall everyone else.

use super::diagnostics::{Diagnostic, DiagnosticEvent, DiagnosticSink, Severity};
use super::envelope::Envelope;
use super::error::{QueueError, RelayError};
use super::queue::OutboundQueue;
use super::session::SessionId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Mailbox depth; senders wait when the hub falls this far behind
pub const HUB_MAILBOX_CAPACITY: usize = 256;

/// Events processed by the hub control loop
#[derive(Debug)]
pub enum HubCommand {
    /// Admit a session with the sending half of its outbound queue
    Join { id: SessionId, queue: OutboundQueue },
    /// Remove a session and close its queue, if still present
    Leave { id: SessionId },
    /// Fan an envelope out to every live session
    Broadcast(Arc<Envelope>),
    /// Report current counters
    Stats(oneshot::Sender<HubStats>),
}

/// Snapshot of hub counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Sessions currently in the live set
    pub live: usize,
    pub joined: u64,
    /// Sessions removed through `leave`
    pub left: u64,
    /// Sessions removed by the broadcast because their queue was full or gone
    pub evicted: u64,
    pub broadcasts: u64,
}

/// The control loop state
pub struct Hub {
    clients: HashMap<SessionId, OutboundQueue>,
    mailbox: mpsc::Receiver<HubCommand>,
    sink: Arc<dyn DiagnosticSink>,
    stats: HubStats,
}

impl Hub {
    /// Create a hub and a handle to its mailbox, without starting it
    pub fn new(sink: Arc<dyn DiagnosticSink>) -> (Self, HubHandle) {
        let (tx, rx) = mpsc::channel(HUB_MAILBOX_CAPACITY);
        let hub = Self {
            clients: HashMap::new(),
            mailbox: rx,
            sink,
            stats: HubStats::default(),
        };
        (hub, HubHandle { tx })
    }

    /// Create a hub and run it on a background task
    pub fn spawn(sink: Arc<dyn DiagnosticSink>) -> HubHandle {
        let (hub, handle) = Self::new(sink);
        tokio::spawn(hub.run());
        handle
    }

    /// Process commands until every [`HubHandle`] has been dropped
    ///
    /// On exit every remaining queue is closed, so the sessions still
    /// attached see the closure and shut down.
    pub async fn run(mut self) {
        self.sink
            .emit(Diagnostic::new(DiagnosticEvent::HubStarted, Severity::Info));

        while let Some(command) = self.mailbox.recv().await {
            self.handle(command);
        }

        for (_, mut queue) in self.clients.drain() {
            queue.close();
        }
        self.sink.emit(
            Diagnostic::new(DiagnosticEvent::HubStopped, Severity::Info)
                .detail(format!("{} broadcasts relayed", self.stats.broadcasts)),
        );
    }

    /// Apply one command to the live set
    ///
    /// Never waits: every effect is a map update or a non-blocking enqueue.
    pub fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Join { id, queue } => self.join(id, queue),
            HubCommand::Leave { id } => self.leave(id),
            HubCommand::Broadcast(envelope) => self.broadcast(envelope),
            HubCommand::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
        }
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            live: self.clients.len(),
            ..self.stats
        }
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.clients.contains_key(id)
    }

    fn join(&mut self, id: SessionId, queue: OutboundQueue) {
        if let Some(mut previous) = self.clients.insert(id, queue) {
            previous.close();
            self.sink.emit(
                Diagnostic::new(DiagnosticEvent::SessionLeft, Severity::Warn)
                    .session(id)
                    .detail("replaced by a second join with the same id"),
            );
        }
        self.stats.joined += 1;
        self.sink.emit(
            Diagnostic::new(DiagnosticEvent::SessionJoined, Severity::Debug)
                .session(id)
                .detail(format!("{} live", self.clients.len())),
        );
    }

    fn leave(&mut self, id: SessionId) {
        // Absent means an earlier leave or an eviction already handled it.
        let Some(mut queue) = self.clients.remove(&id) else {
            return;
        };
        queue.close();
        self.stats.left += 1;
        self.sink.emit(
            Diagnostic::new(DiagnosticEvent::SessionLeft, Severity::Debug)
                .session(id)
                .detail(format!("{} live", self.clients.len())),
        );
    }

    fn broadcast(&mut self, envelope: Arc<Envelope>) {
        self.stats.broadcasts += 1;

        let mut evicted = Vec::new();
        for (id, queue) in &self.clients {
            if let Err(e) = queue.try_enqueue(envelope.clone()) {
                evicted.push((*id, e));
            }
        }

        for (id, reason) in evicted {
            if let Some(mut queue) = self.clients.remove(&id) {
                queue.close();
            }
            self.stats.evicted += 1;

            let severity = match reason {
                QueueError::Full => Severity::Warn,
                QueueError::Closed => Severity::Debug,
            };
            self.sink.emit(
                Diagnostic::new(DiagnosticEvent::SessionEvicted, severity)
                    .session(id)
                    .error(&RelayError::Queue(reason)),
            );
        }
    }
}

/// Cloneable handle used by sessions and the server to reach the hub
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    pub async fn join(&self, id: SessionId, queue: OutboundQueue) -> Result<(), RelayError> {
        self.send(HubCommand::Join { id, queue }).await
    }

    /// Request removal; safe to call more than once for the same session
    pub async fn leave(&self, id: SessionId) -> Result<(), RelayError> {
        self.send(HubCommand::Leave { id }).await
    }

    /// Hand an envelope to the control loop for fan-out
    ///
    /// Waits only if the mailbox is full, never on a slow session.
    pub async fn broadcast(&self, envelope: Envelope) -> Result<(), RelayError> {
        self.send(HubCommand::Broadcast(Arc::new(envelope))).await
    }

    /// Counters as seen after every command sent before this call
    pub async fn stats(&self) -> Result<HubStats, RelayError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Stats(reply)).await?;
        rx.await.map_err(|_| RelayError::HubStopped)
    }

    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    async fn send(&self, command: HubCommand) -> Result<(), RelayError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| RelayError::HubStopped)
    }
}
