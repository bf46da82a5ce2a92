//! Persistence backend implementations

use std::path::PathBuf;

use async_trait::async_trait;
use hermes_protocol::Message;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::{Result, StoreError};

/// A live persistence backend.
///
/// `store` returns `Ok(true)` on success and `Ok(false)` when the backend
/// declined the message without an error; pipelines treat both the same as
/// a step outcome.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist one message.
    async fn store(&self, message: &Message) -> Result<bool>;
}

/// One file per message under a directory.
///
/// Files are named `<control-id>-<uuid>.<ext>` so repeated control ids never
/// overwrite each other.
pub struct FileStore {
    dir: PathBuf,
    extension: String,
}

impl FileStore {
    /// Create the store, making the target directory if needed.
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        Ok(Self {
            dir,
            extension: extension.into(),
        })
    }
}

#[async_trait]
impl MessageStore for FileStore {
    async fn store(&self, message: &Message) -> Result<bool> {
        let control_id = message.control_id().unwrap_or("msg");
        let name = format!("{}-{}.{}", control_id, Uuid::new_v4(), self.extension);
        let path = self.dir.join(name);

        tokio::fs::write(&path, message.to_string())
            .await
            .map_err(|source| StoreError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Ok(true)
    }
}

/// Process-local store that keeps messages in memory, in arrival order.
#[derive(Default)]
pub struct MemoryStore {
    messages: Mutex<Vec<Message>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored messages.
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// True when nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    /// Snapshot of stored messages.
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn store(&self, message: &Message) -> Result<bool> {
        self.messages.lock().push(message.clone());
        Ok(true)
    }
}
