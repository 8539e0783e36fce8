//! Structured diagnostics for hub and session events
//!
//! The hub and the session loops never log directly. They emit a
//! [`Diagnostic`] (an event kind plus a severity) into a [`DiagnosticSink`]
//! injected at construction time.
//!
//! - [`TracingSink`] forwards everything to `tracing` and is what the server uses
//! - [`MemorySink`] records diagnostics so tests can assert on them
//!
//! ```text
//! inbound loop ──┐
//! outbound loop ─┼──▶ DiagnosticSink::emit() ──▶ tracing / test recorder
//! hub loop ──────┘
//! ```

use super::error::RelayError;
use super::session::SessionId;
use std::fmt;
use std::sync::{Arc, Mutex};

/// How loud a diagnostic is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticEvent {
    HubStarted,
    HubStopped,
    SessionJoined,
    SessionLeft,
    /// The hub dropped a session whose outbound queue was full or gone
    SessionEvicted,
    MalformedEnvelope,
    FrameTooLarge,
    HeartbeatTimeout,
    /// The peer closed with an unusual code or the read failed oddly
    UnexpectedClose,
    /// The connection ended the ordinary way
    ConnectionClosed,
    WriteFailed,
    PingFailed,
    UpgradeFailed,
}

impl DiagnosticEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticEvent::HubStarted => "hub_started",
            DiagnosticEvent::HubStopped => "hub_stopped",
            DiagnosticEvent::SessionJoined => "session_joined",
            DiagnosticEvent::SessionLeft => "session_left",
            DiagnosticEvent::SessionEvicted => "session_evicted",
            DiagnosticEvent::MalformedEnvelope => "malformed_envelope",
            DiagnosticEvent::FrameTooLarge => "frame_too_large",
            DiagnosticEvent::HeartbeatTimeout => "heartbeat_timeout",
            DiagnosticEvent::UnexpectedClose => "unexpected_close",
            DiagnosticEvent::ConnectionClosed => "connection_closed",
            DiagnosticEvent::WriteFailed => "write_failed",
            DiagnosticEvent::PingFailed => "ping_failed",
            DiagnosticEvent::UpgradeFailed => "upgrade_failed",
        }
    }
}

impl fmt::Display for DiagnosticEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single emitted diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub event: DiagnosticEvent,
    pub severity: Severity,
    /// The session concerned, if any
    pub session: Option<SessionId>,
    /// Free-form detail (error text, counts)
    pub detail: String,
    /// [`RelayError::error_code`] of the failure behind this diagnostic
    pub code: Option<&'static str>,
}

impl Diagnostic {
    pub fn new(event: DiagnosticEvent, severity: Severity) -> Self {
        Self {
            event,
            severity,
            session: None,
            detail: String::new(),
            code: None,
        }
    }

    pub fn session(mut self, id: SessionId) -> Self {
        self.session = Some(id);
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    /// Attach an error: its message becomes the detail and its code is kept
    pub fn error(mut self, error: &RelayError) -> Self {
        self.detail = error.to_string();
        self.code = Some(error.error_code());
        self
    }
}

/// Destination for diagnostics
///
/// Implementations must be cheap and non-blocking: `emit` is called from
/// inside the hub control loop.
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to `tracing` with structured fields
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, d: Diagnostic) {
        let session_id = d.session.map(|id| id.to_string()).unwrap_or_default();
        let event = d.event.as_str();
        let error_code = d.code.unwrap_or_default();

        match d.severity {
            Severity::Debug => {
                tracing::debug!(event, session_id = %session_id, error_code, detail = %d.detail, "relay diagnostic")
            }
            Severity::Info => {
                tracing::info!(event, session_id = %session_id, error_code, detail = %d.detail, "relay diagnostic")
            }
            Severity::Warn => {
                tracing::warn!(event, session_id = %session_id, error_code, detail = %d.detail, "relay diagnostic")
            }
            Severity::Error => {
                tracing::error!(event, session_id = %session_id, error_code, detail = %d.detail, "relay diagnostic")
            }
        }
    }
}

/// Records every diagnostic in memory
///
/// Clones share the same buffer, so a test can keep one clone and hand
/// another to the hub or a session.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<Diagnostic>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far
    pub fn records(&self) -> Vec<Diagnostic> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Recorded diagnostics of one kind
    pub fn events(&self, event: DiagnosticEvent) -> Vec<Diagnostic> {
        self.records()
            .into_iter()
            .filter(|d| d.event == event)
            .collect()
    }

    pub fn count(&self, event: DiagnosticEvent) -> usize {
        self.events(event).len()
    }

    pub fn contains(&self, event: DiagnosticEvent) -> bool {
        self.count(event) > 0
    }
}

impl DiagnosticSink for MemorySink {
    fn emit(&self, diagnostic: Diagnostic) {
        if let Ok(mut records) = self.records.lock() {
            records.push(diagnostic);
        }
    }
}

impl<T: DiagnosticSink + ?Sized> DiagnosticSink for Arc<T> {
    fn emit(&self, diagnostic: Diagnostic) {
        (**self).emit(diagnostic)
    }
}
