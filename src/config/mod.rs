//! Configuration loading and management

use crate::core::error::ConfigError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Address used when nothing else is configured
pub const DEFAULT_LISTEN_ADDR: &str = ":8080";

/// Time allowed between two pongs before a peer is considered dead
pub const DEFAULT_PONG_WAIT_MS: u64 = 10_000;

/// Largest accepted pong wait: one day
pub const MAX_PONG_WAIT_MS: u64 = 24 * 60 * 60 * 1000;

/// Largest accepted outbound queue depth
pub const MAX_QUEUE_CAPACITY: usize = 65_536;

/// Maximum accepted inbound frame payload
pub const DEFAULT_MAX_FRAME_SIZE: usize = 512;

/// Time allowed for a single outbound write
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 20_000;

/// Per-session liveness and backpressure policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Peer liveness timeout in milliseconds
    pub pong_wait_ms: u64,

    /// Largest inbound frame payload in bytes; larger frames close the connection
    pub max_frame_size: usize,

    /// Outbound queue depth per session
    pub queue_capacity: usize,

    /// Deadline for one outbound write; `None` lets writes block indefinitely
    pub write_timeout_ms: Option<u64>,

    /// Stamp envelopes that arrive without a time with the server clock
    pub stamp_arrival: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pong_wait_ms: DEFAULT_PONG_WAIT_MS,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            queue_capacity: crate::core::queue::DEFAULT_QUEUE_CAPACITY,
            write_timeout_ms: Some(DEFAULT_WRITE_TIMEOUT_MS),
            stamp_arrival: false,
        }
    }
}

impl SessionConfig {
    pub fn pong_wait(&self) -> Duration {
        Duration::from_millis(self.pong_wait_ms)
    }

    /// Heartbeat interval, always 8/10 of the pong wait
    ///
    /// A ping therefore goes out before the peer's read deadline expires.
    pub fn ping_period(&self) -> Duration {
        self.pong_wait() * 8 / 10
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }

    /// Reject values the session loops cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pong_wait_ms == 0 {
            return Err(invalid("pong_wait_ms", "must be greater than zero"));
        }
        if self.pong_wait_ms > MAX_PONG_WAIT_MS {
            return Err(invalid("pong_wait_ms", "must be at most one day"));
        }
        if self.max_frame_size == 0 {
            return Err(invalid("max_frame_size", "must be greater than zero"));
        }
        if self.queue_capacity == 0 {
            return Err(invalid("queue_capacity", "must be greater than zero"));
        }
        if self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(invalid("queue_capacity", "must be at most 65536"));
        }
        if self.write_timeout_ms == Some(0) {
            return Err(invalid(
                "write_timeout_ms",
                "must be greater than zero, or null to disable",
            ));
        }
        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// Complete configuration for the relay process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// `host:port`, or `:port` to listen on every interface
    pub listen_addr: String,

    pub session: SessionConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            session: SessionConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.session.validate()?;
        Ok(config)
    }

    /// Replace the listen address (command-line flags win over the file)
    pub fn with_listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = addr.into();
        self
    }

    /// Resolve `listen_addr` into a socket address
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        normalize_listen_addr(&self.listen_addr)
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(self.listen_addr.clone()))
    }
}

/// Turn `:8080` into `0.0.0.0:8080`; other forms are returned unchanged
pub fn normalize_listen_addr(addr: &str) -> String {
    match addr.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{}", port),
        None => addr.to_string(),
    }
}
