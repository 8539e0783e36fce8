//! WebSocket upgrade handler
//!
//! Each upgraded connection becomes one [`ClientSession`]: it is split into
//! read/write halves, registered with the hub, and its two loops are spawned.
//! The handler returns as soon as the loops are running.

use super::adapter;
use crate::core::diagnostics::{Diagnostic, DiagnosticEvent, Severity};
use crate::core::error::RelayError;
use crate::core::session::ClientSession;
use crate::server::host::ServerHost;
use axum::extract::ws::WebSocket;
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use std::sync::Arc;

/// Headroom the transport allows above `max_frame_size`
///
/// Frames between the two limits reach the session, which rejects them with
/// a frame-too-large diagnostic. Frames past the transport limit are refused
/// while reading and the adapter reports them as too large as well.
const TRANSPORT_LIMIT_FACTOR: usize = 16;

/// Smallest message size the transport is configured with
const MIN_TRANSPORT_LIMIT: usize = 64 * 1024;

/// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(host): State<Arc<ServerHost>>) -> impl IntoResponse {
    let max_frame_size = host.session_config().max_frame_size;
    let limit = max_frame_size
        .saturating_mul(TRANSPORT_LIMIT_FACTOR)
        .max(MIN_TRANSPORT_LIMIT);

    let failed_host = host.clone();
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_failed_upgrade(move |e: axum::Error| {
            let error = RelayError::Upgrade(e.to_string());
            failed_host.sink.emit(
                Diagnostic::new(DiagnosticEvent::UpgradeFailed, Severity::Warn).error(&error),
            );
        })
        .on_upgrade(move |socket| handle_socket(socket, host, limit))
}

async fn handle_socket(socket: WebSocket, host: Arc<ServerHost>, limit: usize) {
    let (reader, writer) = adapter::split(socket, limit);
    let session = ClientSession::new(
        reader,
        writer,
        host.session_config().clone(),
        host.sink.clone(),
    );
    let id = session.id();

    if let Err(e) = session.start(&host.hub).await {
        tracing::error!(
            session_id = %id,
            error_code = e.error_code(),
            error = %e,
            "Failed to register WebSocket session"
        );
    }
}
