//! Transport errors

use thiserror::Error;

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

/// MLLP transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to bind the listener
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to reach the remote endpoint
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O error on an established connection
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote endpoint did not reply within the deadline
    #[error("no response from {address} within {timeout_ms}ms")]
    ResponseTimeout { address: String, timeout_ms: u64 },

    /// The remote endpoint closed the connection mid-exchange
    #[error("connection to {address} closed before a complete reply arrived")]
    ConnectionClosed { address: String },

    /// The reply was not a parsable message
    #[error("invalid reply: {0}")]
    Protocol(#[from] hermes_protocol::ProtocolError),
}
