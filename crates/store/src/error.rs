//! Store error types

use std::io;

use thiserror::Error;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur while persisting messages
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend I/O failure
    #[error("store I/O failed at '{path}': {source}")]
    Io {
        /// Filesystem path involved
        path: String,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// A store step referenced a configuration the registry was never
    /// initialized with
    #[error("no store instance registered for config hash {hash}")]
    UnknownConfig {
        /// Structural hash of the missing configuration
        hash: String,
    },

    /// Configuration could not be serialized for hashing
    #[error("store config is not hashable: {0}")]
    Unhashable(#[from] serde_json::Error),
}
