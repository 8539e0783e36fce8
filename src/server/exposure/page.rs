//! Static chat page and health routes
//!
//! - `GET /` serves the chat UI (embedded at compile time)
//! - `GET /health`, `GET /healthz` report the hub's live session count
//!
//! Any other path is a 404 and any other method on these paths is a 405,
//! both produced by the router.

use crate::server::host::ServerHost;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Html;
use axum::{Json, Router, routing::get};
use serde_json::{Value, json};
use std::sync::Arc;

const INDEX_HTML: &str = include_str!("../../../static/index.html");

/// Page and health exposure
pub struct PageExposure;

impl PageExposure {
    pub fn build_router(host: Arc<ServerHost>) -> Router {
        Router::new()
            .route("/", get(Self::index))
            .route("/health", get(Self::health_check))
            .route("/healthz", get(Self::health_check))
            .with_state(host)
    }

    async fn index() -> Html<&'static str> {
        Html(INDEX_HTML)
    }

    /// Health check endpoint handler
    async fn health_check(State(host): State<Arc<ServerHost>>) -> (StatusCode, Json<Value>) {
        match host.hub.stats().await {
            Ok(stats) => (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "service": "relay-hub",
                    "sessions": stats.live,
                    "broadcasts": stats.broadcasts,
                })),
            ),
            Err(e) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unavailable",
                    "service": "relay-hub",
                    "error": e.to_string(),
                })),
            ),
        }
    }
}
