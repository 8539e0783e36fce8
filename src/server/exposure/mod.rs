//! Exposure modules for the transport-facing boundary
//!
//! Each exposure consumes a `ServerHost` and produces a Router.

pub mod page;
pub mod websocket;

pub use page::PageExposure;
pub use websocket::WebSocketExposure;
