//! Core module containing the connection hub and its building blocks

pub mod connection;
pub mod diagnostics;
pub mod envelope;
pub mod error;
pub mod hub;
pub mod queue;
pub mod session;

pub use connection::{CloseSignal, Frame, FrameReader, FrameWriter};
pub use diagnostics::{
    Diagnostic, DiagnosticEvent, DiagnosticSink, MemorySink, Severity, TracingSink,
};
pub use envelope::Envelope;
pub use error::{ConfigError, ProtocolError, QueueError, RelayError, TransportError};
pub use hub::{Hub, HubCommand, HubHandle, HubStats};
pub use queue::{OutboundQueue, QueueReceiver, QueueState, outbound_queue};
pub use session::{ClientSession, SessionHandle, SessionId};
