//! Error handling for the session manager core

use crate::device::SessionKey;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Camera name not present in the caller-supplied config
    #[error("Not found: {0}")]
    NotFound(String),

    /// Connect + metadata fetch exceeded the connect timeout
    #[error("Timeout connecting to {0}")]
    ConnectTimeout(SessionKey),

    /// Connect failed (auth or network)
    #[error("Failed to connect to {key}: {reason}")]
    ConnectFailed { key: SessionKey, reason: String },

    /// Device command exceeded the command timeout
    #[error("Timeout {command} on {key}")]
    CommandTimeout { key: SessionKey, command: String },

    /// Device command failed
    #[error("Error {command} on {key}: {reason}")]
    CommandFailed {
        key: SessionKey,
        command: String,
        reason: String,
    },

    /// Underlying device protocol error, surfaced by capability impls
    #[error("Device error: {0}")]
    Device(String),

    /// Event sink publication error; only ever logged by the dispatcher
    #[error("Event sink error: {0}")]
    Sink(String),
}
