//! Engine startup errors
//!
//! Runtime step failures never surface here; they are reported per message
//! through logs and queue retry policy. These errors end engine startup.

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Fatal engine errors
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A channel's configuration was rejected
    #[error(transparent)]
    Channel(#[from] hermes_channel::ChannelError),

    /// A store backend could not be instantiated
    #[error(transparent)]
    Store(#[from] hermes_store::StoreError),

    /// A queue could not be declared or opened
    #[error(transparent)]
    Queue(#[from] hermes_queue::QueueError),

    /// A listener failed before reporting its bound address
    #[error("listener for channel '{channel}' failed to start")]
    ListenerFailed {
        /// Channel id
        channel: String,
    },
}
