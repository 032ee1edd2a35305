//! Error types for the scoreboard sync client.

use thiserror::Error;

/// Errors that can occur when using the scoreboard sync client.
#[derive(Debug, Error)]
pub enum ScoreboardError {
    /// Failed to establish a connection to the relay.
    #[error("connect error: {0}")]
    Connect(String),

    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The client session has ended and can no longer accept commands.
    #[error("not connected to relay")]
    NotConnected,

    /// A configuration value was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for scoreboard client operations.
pub type Result<T> = std::result::Result<T, ScoreboardError>;
