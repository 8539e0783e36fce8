//! Typed error handling for the relay
//!
//! Errors are grouped the way failures actually behave at runtime:
//!
//! - [`ProtocolError`]: the peer broke the framing or envelope contract
//! - [`TransportError`]: the underlying connection failed or closed
//! - [`QueueError`]: an outbound queue could not accept an envelope
//! - [`ConfigError`]: invalid configuration values
//!
//! Every error is terminal for the session that hit it, except a malformed
//! envelope, which is logged and dropped by the inbound loop.
//!
//! # Example
//!
//! ```rust,ignore
//! match reader.read_frame().await {
//!     Err(RelayError::Transport(e)) if e.is_expected_closure() => { /* quiet */ }
//!     Err(e) => tracing::warn!(error = %e, "read failed"),
//!     Ok(frame) => { /* ... */ }
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

/// Close codes that mean the peer went away normally
///
/// 1000 normal closure, 1001 going away, 1005 no status, 1006 abnormal
/// closure (dropped TCP connection without a close frame).
pub const EXPECTED_CLOSE_CODES: [u16; 4] = [1000, 1001, 1005, 1006];

/// The main error type for the relay
#[derive(Debug, Error)]
pub enum RelayError {
    /// Framing or envelope violations
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Connection-level failures
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Outbound queue pressure or lifecycle errors
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The transport upgrade was rejected before a session existed
    #[error("Upgrade failed: {0}")]
    Upgrade(String),

    /// The hub control loop is gone (process shutting down)
    #[error("Hub is not running")]
    HubStopped,

    /// Internal errors (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Whether this error ends the session that observed it
    ///
    /// Only a malformed envelope is tolerated; everything else tears the
    /// session down.
    pub fn is_fatal_to_session(&self) -> bool {
        !matches!(self, RelayError::Protocol(ProtocolError::MalformedEnvelope(_)))
    }

    /// Short machine-readable code, used as a structured log field
    pub fn error_code(&self) -> &'static str {
        match self {
            RelayError::Protocol(e) => e.error_code(),
            RelayError::Transport(e) => e.error_code(),
            RelayError::Queue(QueueError::Full) => "QUEUE_FULL",
            RelayError::Queue(QueueError::Closed) => "QUEUE_CLOSED",
            RelayError::Config(_) => "CONFIG_ERROR",
            RelayError::Upgrade(_) => "UPGRADE_FAILED",
            RelayError::HubStopped => "HUB_STOPPED",
            RelayError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

// =============================================================================
// Protocol Errors
// =============================================================================

/// Errors caused by a peer not respecting the wire contract
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Inbound frame exceeds the configured maximum size
    #[error("Frame of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { size: usize, limit: usize },

    /// Inbound payload is not a valid envelope
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Outbound envelope could not be encoded
    #[error("Failed to encode envelope: {0}")]
    EncodeFailed(String),
}

impl ProtocolError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ProtocolError::FrameTooLarge { .. } => "FRAME_TOO_LARGE",
            ProtocolError::MalformedEnvelope(_) => "MALFORMED_ENVELOPE",
            ProtocolError::EncodeFailed(_) => "ENCODE_FAILED",
        }
    }
}

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors raised by the connection adapter
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Reading the next frame failed
    #[error("Read failed: {0}")]
    ReadFailed(String),

    /// Writing a frame failed
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// Writing a frame took longer than the write deadline
    #[error("Write timed out after {0:?}")]
    WriteTimedOut(Duration),

    /// No pong arrived before the read deadline
    #[error("No pong received within {0:?}")]
    HeartbeatTimedOut(Duration),

    /// The connection is closed, optionally with the peer's close code
    #[error("Connection closed (code: {code:?})")]
    Closed { code: Option<u16> },
}

impl TransportError {
    /// Whether the failure is an ordinary way for a connection to end
    ///
    /// Expected closures are logged quietly; anything else is reported as
    /// an unexpected close. Recovery is identical in both cases.
    pub fn is_expected_closure(&self) -> bool {
        match self {
            TransportError::Closed { code: None } => true,
            TransportError::Closed { code: Some(code) } => EXPECTED_CLOSE_CODES.contains(code),
            TransportError::ReadFailed(_) => true,
            _ => false,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            TransportError::ReadFailed(_) => "READ_FAILED",
            TransportError::WriteFailed(_) => "WRITE_FAILED",
            TransportError::WriteTimedOut(_) => "WRITE_TIMED_OUT",
            TransportError::HeartbeatTimedOut(_) => "HEARTBEAT_TIMED_OUT",
            TransportError::Closed { .. } => "CONNECTION_CLOSED",
        }
    }
}

// =============================================================================
// Queue Errors
// =============================================================================

/// Errors returned by a non-blocking enqueue
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The receiver has not drained its previous envelope yet
    #[error("Outbound queue is full")]
    Full,

    /// The queue was closed, or its receiver is gone
    #[error("Outbound queue is closed")]
    Closed,
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors related to configuration values
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A field holds a value the relay cannot run with
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// The listen address could not be parsed
    #[error("Invalid listen address '{0}'")]
    InvalidAddress(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_envelope_is_not_fatal() {
        let err = RelayError::from(ProtocolError::MalformedEnvelope("eof".into()));
        assert!(!err.is_fatal_to_session());
        assert_eq!(err.error_code(), "MALFORMED_ENVELOPE");
    }

    #[test]
    fn test_frame_too_large_is_fatal() {
        let err = RelayError::from(ProtocolError::FrameTooLarge {
            size: 600,
            limit: 512,
        });
        assert!(err.is_fatal_to_session());
        assert_eq!(err.to_string(), "Frame of 600 bytes exceeds the 512 byte limit");
    }

    #[test]
    fn test_expected_closure_codes() {
        assert!(TransportError::Closed { code: None }.is_expected_closure());
        assert!(TransportError::Closed { code: Some(1001) }.is_expected_closure());
        assert!(TransportError::Closed { code: Some(1006) }.is_expected_closure());
        assert!(!TransportError::Closed { code: Some(1002) }.is_expected_closure());
        assert!(!TransportError::Closed { code: Some(1011) }.is_expected_closure());
    }

    #[test]
    fn test_timeouts_are_unexpected() {
        let write = TransportError::WriteTimedOut(Duration::from_secs(20));
        let heartbeat = TransportError::HeartbeatTimedOut(Duration::from_secs(10));
        assert!(!write.is_expected_closure());
        assert!(!heartbeat.is_expected_closure());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(RelayError::from(QueueError::Full).error_code(), "QUEUE_FULL");
        assert_eq!(RelayError::HubStopped.error_code(), "HUB_STOPPED");
        assert_eq!(
            RelayError::from(TransportError::WriteFailed("broken pipe".into())).error_code(),
            "WRITE_FAILED"
        );
    }
}
