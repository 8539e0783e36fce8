//! ServerBuilder for fluent API to build the relay HTTP server

use super::exposure::{PageExposure, WebSocketExposure};
use super::host::ServerHost;
use crate::config::{RelayConfig, SessionConfig};
use crate::core::diagnostics::{DiagnosticSink, TracingSink};
use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Builder for the relay server
///
/// # Example
///
/// ```ignore
/// ServerBuilder::new()
///     .with_config(RelayConfig::from_yaml_file("relay.yaml")?)
///     .serve()
///     .await?;
/// ```
pub struct ServerBuilder {
    config: RelayConfig,
    sink: Option<Arc<dyn DiagnosticSink>>,
    custom_routes: Vec<Router>,
}

impl ServerBuilder {
    /// Create a new ServerBuilder with default configuration
    pub fn new() -> Self {
        Self {
            config: RelayConfig::default(),
            sink: None,
            custom_routes: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_session_config(mut self, session: SessionConfig) -> Self {
        self.config.session = session;
        self
    }

    pub fn with_listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Send diagnostics somewhere other than `tracing`
    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Add custom routes to the server
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    /// Validate the configuration and start the hub
    ///
    /// Must be called from within a tokio runtime.
    pub fn build_host(&self) -> Result<ServerHost> {
        self.config.session.validate()?;
        self.config.socket_addr()?;

        let sink = self
            .sink
            .clone()
            .unwrap_or_else(|| Arc::new(TracingSink));

        Ok(ServerHost::start(self.config.clone(), sink))
    }

    /// Build the router along with the host behind it
    pub fn build_with_host(self) -> Result<(Router, Arc<ServerHost>)> {
        let host = Arc::new(self.build_host()?);

        let mut app = PageExposure::build_router(host.clone())
            .merge(WebSocketExposure::build_router(host.clone())?);

        for custom_router in self.custom_routes {
            app = app.merge(custom_router);
        }

        Ok((app.layer(TraceLayer::new_for_http()), host))
    }

    /// Build the router
    pub fn build(self) -> Result<Router> {
        self.build_with_host().map(|(app, _)| app)
    }

    /// Serve on the configured listen address with graceful shutdown
    ///
    /// This will:
    /// - Bind to `listen_addr` (`:port` means every interface)
    /// - Start serving the page and the `/ws` endpoint
    /// - Handle SIGTERM and SIGINT (Ctrl+C) for graceful shutdown
    pub async fn serve(self) -> Result<()> {
        let addr = self.config.socket_addr()?;
        let listener = TcpListener::bind(addr).await?;
        self.serve_on(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve_on(self, listener: TcpListener) -> Result<()> {
        let app = self.build()?;

        tracing::info!("Relay listening on {}", listener.local_addr()?);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}
