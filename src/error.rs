//! Unified error types for Chaser-CDP

use crate::cdp::types::SessionState;
use serde_json::Value;
use thiserror::Error;

/// Unified Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for Chaser-CDP
#[derive(Error, Debug)]
pub enum Error {
    /// The debuggee answered a command with an `error` object
    #[error("Remote command error {code}: {message}")]
    RemoteCommand {
        /// Error code as sent by the debuggee
        code: i64,
        /// Error message as sent by the debuggee
        message: String,
        /// Additional error data, if any
        data: Option<Value>,
    },

    /// Transport closed or failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Frame could not be decoded as a response or an event
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Command attempted while the session is not open
    #[error("Not connected: session is {0}")]
    NotConnected(SessionState),

    /// Caller-configured timeout elapsed
    #[error("Command {id} ({method}) timed out")]
    Timeout {
        /// Method of the abandoned command
        method: String,
        /// Correlation id of the abandoned command
        id: u64,
    },

    /// Script evaluated in the page threw
    #[error("Script execution failed: {0}")]
    ScriptExecutionFailed(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Endpoint discovery failed
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new transport error
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Error::Transport(msg.into())
    }

    /// Create a new protocol error
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Error::Protocol(msg.into())
    }

    /// Create a new discovery error
    pub fn discovery<S: Into<String>>(msg: S) -> Self {
        Error::Discovery(msg.into())
    }

    /// Create a new script execution failed error
    pub fn script_execution_failed<S: Into<String>>(msg: S) -> Self {
        Error::ScriptExecutionFailed(msg.into())
    }

    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Error::Configuration(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }

    /// Whether the error came from the transport going away
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Whether the error is a caller-side timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// Error code reported by the debuggee, if this is a remote command error
    pub fn remote_code(&self) -> Option<i64> {
        match self {
            Error::RemoteCommand { code, .. } => Some(*code),
            _ => None,
        }
    }
}
