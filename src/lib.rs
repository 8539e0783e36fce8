//! # relay-hub
//!
//! A real-time message relay: clients connect over WebSocket and every
//! message one client sends is fanned out to every connected client.
//!
//! ## Features
//!
//! - **Single-owner hub**: membership and broadcast go through one control loop, no locks
//! - **Slow-consumer eviction**: a client that cannot keep up is dropped, never waited on
//! - **Heartbeats**: ping/pong liveness with a read deadline per connection
//! - **Bounded writes**: optional write deadline so a stalled peer cannot pin a task
//! - **Transport-agnostic core**: sessions run over any `FrameReader`/`FrameWriter` pair
//! - **Structured diagnostics**: every hub/session event goes through an injectable sink
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use relay_hub::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     ServerBuilder::new()
//!         .with_listen_addr(":8080")
//!         .serve()
//!         .await
//! }
//! ```
//!
//! Driving the hub without a network:
//!
//! ```rust,ignore
//! use relay_hub::core::connection::memory;
//!
//! let sink: Arc<dyn DiagnosticSink> = Arc::new(TracingSink);
//! let hub = Hub::spawn(sink.clone());
//!
//! let (reader, writer, mut peer) = memory::pair(16);
//! ClientSession::new(reader, writer, SessionConfig::default(), sink)
//!     .start(&hub)
//!     .await?;
//!
//! peer.send_envelope(&Envelope::new("hi", "alice")).await?;
//! let echoed = peer.recv_envelope().await;
//! ```

pub mod config;
pub mod core;
pub mod server;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        ClientSession, Diagnostic, DiagnosticEvent, DiagnosticSink, Envelope, Frame, FrameReader,
        FrameWriter, Hub, HubHandle, HubStats, MemorySink, RelayError, SessionHandle, SessionId,
        Severity, TracingSink,
    };

    // === Config ===
    pub use crate::config::{RelayConfig, SessionConfig};

    // === Server ===
    pub use crate::server::{PageExposure, ServerBuilder, ServerHost, WebSocketExposure};

    // === External dependencies ===
    pub use anyhow::Result;
    pub use chrono::{DateTime, Utc};
    pub use std::sync::Arc;
}
