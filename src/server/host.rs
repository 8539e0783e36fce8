//! Server host shared by every exposure
//!
//! The host owns the process-wide state the transport boundary needs: a
//! handle to the running hub, the session policy, and the diagnostic sink.
//! It is agnostic of the transport itself; the WebSocket exposure and the
//! page exposure both consume an `Arc<ServerHost>`.

use crate::config::{RelayConfig, SessionConfig};
use crate::core::diagnostics::DiagnosticSink;
use crate::core::hub::{Hub, HubHandle};
use std::sync::Arc;

/// Host context containing all relay state
///
/// # Example
///
/// ```rust,ignore
/// let host = Arc::new(ServerHost::start(RelayConfig::default(), Arc::new(TracingSink)));
///
/// let app = PageExposure::build_router(host.clone())
///     .merge(WebSocketExposure::build_router(host)?);
/// ```
pub struct ServerHost {
    /// Loaded configuration
    pub config: Arc<RelayConfig>,

    /// Handle to the hub control loop
    pub hub: HubHandle,

    /// Where hub, session and upgrade diagnostics go
    pub sink: Arc<dyn DiagnosticSink>,
}

impl ServerHost {
    /// Spawn the hub and build the host around it
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: RelayConfig, sink: Arc<dyn DiagnosticSink>) -> Self {
        let hub = Hub::spawn(sink.clone());
        Self::from_parts(config, hub, sink)
    }

    /// Build the host around an already running hub
    pub fn from_parts(config: RelayConfig, hub: HubHandle, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            config: Arc::new(config),
            hub,
            sink,
        }
    }

    /// Policy applied to every new session
    pub fn session_config(&self) -> &SessionConfig {
        &self.config.session
    }
}
