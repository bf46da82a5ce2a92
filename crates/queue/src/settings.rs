//! Queue configuration and the durable-form codec

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Default pause between drain ticks
pub const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_secs(1);

/// Default per-task processing timeout
pub const DEFAULT_MAX_TIMEOUT: Duration = Duration::from_secs(10);

/// Which store a queue persists its tasks in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueBackend {
    /// Process-local; tasks are lost on exit
    Memory,
    /// One file per task under this directory plus an `index` order file;
    /// tasks survive restarts
    File {
        /// Queue-scoped directory
        path: PathBuf,
    },
}

/// Policy for one named queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSettings {
    /// Task storage
    pub backend: QueueBackend,
    /// Consecutive failures before a task is dropped; `None` retries forever
    pub max_retries: Option<u32>,
    /// Pause between drain ticks
    pub drain_interval: Duration,
    /// Move a failed task to the tail instead of retrying it at the head
    pub rotate: bool,
    /// Processing timeout per task; expiry counts as a failed attempt
    pub max_timeout: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            backend: QueueBackend::Memory,
            max_retries: None,
            drain_interval: DEFAULT_DRAIN_INTERVAL,
            rotate: false,
            max_timeout: DEFAULT_MAX_TIMEOUT,
        }
    }
}

impl QueueSettings {
    /// Settings with a file backend rooted at `path`.
    pub fn durable(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: QueueBackend::File { path: path.into() },
            ..Default::default()
        }
    }
}

/// Serializer/deserializer pair for a task's durable form.
///
/// The file backend stores whatever `encode` produces, one file per task;
/// `decode` returning `None` marks the payload as undecodable.
pub struct TaskCodec<T> {
    /// Render a task for storage
    pub encode: Arc<dyn Fn(&T) -> String + Send + Sync>,
    /// Read a task back; `None` if the payload is corrupt
    pub decode: Arc<dyn Fn(&str) -> Option<T> + Send + Sync>,
}

impl<T> Clone for TaskCodec<T> {
    fn clone(&self) -> Self {
        Self {
            encode: Arc::clone(&self.encode),
            decode: Arc::clone(&self.decode),
        }
    }
}

impl<T> TaskCodec<T> {
    /// Build a codec from explicit closures.
    pub fn new(
        encode: impl Fn(&T) -> String + Send + Sync + 'static,
        decode: impl Fn(&str) -> Option<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            encode: Arc::new(encode),
            decode: Arc::new(decode),
        }
    }
}

impl<T: Serialize + DeserializeOwned> TaskCodec<T> {
    /// The default JSON durable form.
    pub fn json() -> Self {
        Self::new(
            |task| serde_json::to_string(task).unwrap_or_default(),
            |text| serde_json::from_str(text).ok(),
        )
    }
}
