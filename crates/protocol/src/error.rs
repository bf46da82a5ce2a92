//! Protocol error types

use thiserror::Error;

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors that can occur while parsing or addressing messages
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Message text contained no segments
    #[error("message is empty")]
    EmptyMessage,

    /// A field path could not be parsed (expected e.g. `MSH-10` or `MSH-10.1`)
    #[error("invalid field path '{0}'")]
    InvalidPath(String),
}
