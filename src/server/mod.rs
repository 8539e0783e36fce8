//! Server module: the HTTP boundary around the hub
//!
//! This module provides a `ServerBuilder` that wires:
//! - the chat page and health routes
//! - the `/ws` upgrade endpoint feeding sessions into the hub

pub mod builder;
pub mod exposure;
pub mod host;

pub use builder::ServerBuilder;
pub use exposure::{PageExposure, WebSocketExposure};
pub use host::ServerHost;
