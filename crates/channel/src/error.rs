//! Channel configuration errors

use thiserror::Error;

/// Result type for channel configuration
pub type Result<T> = std::result::Result<T, ChannelError>;

/// Startup-time configuration errors; fatal for the channel, not the process
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel declared a source kind the engine does not implement
    #[error("channel '{channel}' declared an unsupported '{kind}' source")]
    UnsupportedSource {
        /// Channel name (or id)
        channel: String,
        /// Offending source kind
        kind: &'static str,
    },
}
