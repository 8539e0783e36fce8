//! WebSocket exposure for the relay
//!
//! This module turns the upgrade endpoint into sessions attached to the hub.
//! It is the only place that knows about axum's WebSocket type; the core sees
//! a [`FrameReader`](crate::core::FrameReader) and a
//! [`FrameWriter`](crate::core::FrameWriter).
//!
//! # Architecture
//!
//! ```text
//! Client ──ws──▶ /ws ──▶ ws_handler() ──▶ ClientSession::start()
//!                                              │
//!                                         hub.join()
//!                                              │
//!                      inbound loop ──broadcast──▶ Hub ──try_enqueue──▶ every outbound loop
//! ```
//!
//! # Protocol
//!
//! Client → Server and Server → Client use the same text frame:
//! - `{"data": "hello", "name": "alice", "time": "2024-05-01T10:00:00Z"}`
//!
//! The server pings every 8/10 of the pong wait; clients must answer with a
//! pong (browsers do this automatically).

pub mod adapter;
mod handler;

use crate::server::host::ServerHost;
use anyhow::Result;
use axum::{Router, routing::get};
use std::sync::Arc;

/// WebSocket API exposure implementation
pub struct WebSocketExposure;

impl WebSocketExposure {
    /// Build the router with the `/ws` endpoint
    pub fn build_router(host: Arc<ServerHost>) -> Result<Router> {
        host.session_config().validate()?;

        let router = Router::new()
            .route("/ws", get(handler::ws_handler))
            .with_state(host);

        Ok(router)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::core::diagnostics::MemorySink;

    #[tokio::test]
    async fn test_build_router_rejects_invalid_session_config() {
        let mut config = RelayConfig::default();
        config.session.queue_capacity = 0;
        let host = Arc::new(ServerHost::start(config, Arc::new(MemorySink::new())));

        assert!(WebSocketExposure::build_router(host).is_err());
    }

    #[tokio::test]
    async fn test_build_router_with_defaults() {
        let host = Arc::new(ServerHost::start(
            RelayConfig::default(),
            Arc::new(MemorySink::new()),
        ));
        assert!(WebSocketExposure::build_router(host).is_ok());
    }
}
