//! Chat message envelope
//!
//! The envelope is the only data model shared by sessions and the hub. On
//! the wire it is a JSON object, one per text frame:
//!
//! ```json
//! {"data": "hello", "name": "alice", "time": "2024-05-01T10:00:00Z"}
//! ```
//!
//! `time` may be `null` or missing. Missing `data`/`name` decode as empty
//! strings. Anything that is not an object of that shape is rejected.

use super::error::ProtocolError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One chat message, immutable once constructed
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    data: String,

    #[serde(default)]
    name: String,

    #[serde(default, rename = "time")]
    timestamp: Option<DateTime<Utc>>,
}

impl Envelope {
    /// Create an envelope without a timestamp
    pub fn new(data: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            name: name.into(),
            timestamp: None,
        }
    }

    /// Create an envelope stamped with the current time
    pub fn stamped(data: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(data, name).with_timestamp(Utc::now())
    }

    /// Return a copy carrying the given timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Stamp with `now` only when the sender did not provide a time
    pub fn stamp_if_absent(self, now: DateTime<Utc>) -> Self {
        if self.timestamp.is_some() {
            self
        } else {
            self.with_timestamp(now)
        }
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    /// Decode one inbound frame payload
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(payload).map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))
    }

    /// Encode for one outbound text frame
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::EncodeFailed(e.to_string()))
    }
}
