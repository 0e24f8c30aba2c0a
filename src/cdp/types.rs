//! CDP (Chrome DevTools Protocol) type definitions
//!
//! This module defines the envelopes exchanged with the debuggee. Payloads stay
//! opaque `serde_json::Value`s; only the envelope shape is interpreted here.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::Open => "open",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Outbound command
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandEnvelope {
    /// Request ID
    pub id: u64,
    /// Method name (e.g., "Page.navigate")
    pub method: String,
    /// Method parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Session ID for flat-mode targets
    #[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Error object carried by a failed response
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RemoteError {
    /// Error code
    pub code: i64,
    /// Error message
    pub message: String,
    /// Additional error data
    #[serde(default)]
    pub data: Option<Value>,
}

impl From<RemoteError> for crate::Error {
    fn from(err: RemoteError) -> Self {
        crate::Error::RemoteCommand {
            code: err.code,
            message: err.message,
            data: err.data,
        }
    }
}

/// Inbound command response
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    /// Response ID (matches request ID)
    pub id: u64,
    /// Outcome: the result payload or the remote error
    pub outcome: std::result::Result<Value, RemoteError>,
    /// Session ID the response was routed from
    pub session_id: Option<String>,
}

/// Inbound event notification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    /// Event method (e.g., "Page.loadEventFired")
    pub method: String,
    /// Event parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Session ID for flat-mode targets
    #[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl EventEnvelope {
    /// Domain part of the method name ("Page" for "Page.loadEventFired")
    pub fn domain(&self) -> &str {
        self.method.split('.').next().unwrap_or_default()
    }

    /// Decode the parameters into a concrete event type. Absent params decode as `{}`.
    pub fn decode_params<T: DeserializeOwned>(&self) -> crate::Result<T> {
        let params = match &self.params {
            Some(Value::Null) | None => Value::Object(Default::default()),
            Some(params) => params.clone(),
        };
        Ok(serde_json::from_value(params)?)
    }
}

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Well-formed command response
    Response(ResponseEnvelope),
    /// Frame carried an id but its body could not be decoded
    MalformedResponse {
        /// Correlation id recovered from the frame
        id: u64,
        /// Why decoding failed
        reason: String,
    },
    /// Event notification
    Event(EventEnvelope),
}

/// A session-level protocol violation: a frame whose correlation id could not be determined
#[derive(Debug, Clone)]
pub struct ProtocolViolation {
    /// Why the frame was rejected
    pub reason: String,
    /// The offending frame, truncated for logging
    pub frame: String,
    /// When the frame was observed
    pub at: chrono::DateTime<chrono::Utc>,
}

/// A typed CDP command
pub trait Command: Serialize {
    /// Method name (e.g., "Page.navigate")
    const METHOD: &'static str;

    /// Result payload type
    type Response: DeserializeOwned;
}

/// A typed CDP event
pub trait Event: DeserializeOwned + Clone + Send + 'static {
    /// Method name (e.g., "Page.loadEventFired")
    const METHOD: &'static str;
}

/// Parameters for commands that take none
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct NoParams {}
