//! Queue error types

use std::io;

use thiserror::Error;

/// Result type for queue operations
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors that can occur in the queueing subsystem
#[derive(Debug, Error)]
pub enum QueueError {
    /// Store I/O failure
    #[error("queue store I/O failed at '{path}': {source}")]
    Io {
        /// Filesystem path involved
        path: String,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// The durable index file did not contain a JSON array of strings
    #[error("invalid queue index at '{path}'")]
    InvalidIndex {
        /// Path of the offending index file
        path: String,
    },

    /// A task body could not be decoded from its durable form
    #[error("task '{id}' could not be decoded")]
    Undecodable {
        /// Task id
        id: String,
    },

    /// A task id was requested that the store does not hold
    #[error("task '{id}' not found")]
    TaskNotFound {
        /// Task id
        id: String,
    },

    /// A queue name was declared a second time
    #[error("queue '{name}' is already configured; queues are declared once and retrieved by name")]
    AlreadyConfigured {
        /// Queue name
        name: String,
    },

    /// Index serialization failure
    #[error("queue index serialization failed: {0}")]
    IndexEncoding(#[from] serde_json::Error),
}
