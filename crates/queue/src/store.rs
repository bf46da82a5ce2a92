//! Task storage backends
//!
//! A [`QueueStore`] keeps two things in sync: the durable record set (one
//! payload per task id) and the FIFO order list. [`QueueStore::check`]
//! verifies they describe the same set of ids; the drain loop runs it
//! before every cycle and `push` runs it after every insert.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{QueueError, Result};
use crate::settings::TaskCodec;

/// Storage for one queue: payloads by id plus a FIFO order list.
#[async_trait]
pub trait QueueStore<T>: Send + Sync {
    /// Persist a task. Re-pushing an existing id replaces the payload
    /// without duplicating the order entry. Returns the balance check
    /// result after the insert.
    async fn push(&self, id: &str, task: &T) -> Result<bool>;

    /// Head of the order list, if any.
    async fn next(&self) -> Result<Option<String>>;

    /// Fetch a task body by id.
    async fn get(&self, id: &str) -> Result<T>;

    /// Remove a task's payload and order entry.
    async fn remove(&self, id: &str) -> Result<()>;

    /// Move the head of the order list to the tail.
    async fn rotate(&self) -> Result<()>;

    /// Number of queued tasks.
    async fn len(&self) -> Result<usize>;

    /// True when the record set and the order list agree.
    async fn check(&self) -> Result<bool>;

    /// Snapshot of the order list.
    async fn ids(&self) -> Result<Vec<String>>;
}

/// Process-local task storage: a map plus an order list.
pub struct MemoryQueueStore<T> {
    state: Mutex<MemoryState<T>>,
}

struct MemoryState<T> {
    tasks: HashMap<String, T>,
    order: Vec<String>,
}

impl<T> MemoryQueueStore<T> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                tasks: HashMap::new(),
                order: Vec::new(),
            }),
        }
    }
}

impl<T> Default for MemoryQueueStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> QueueStore<T> for MemoryQueueStore<T> {
    async fn push(&self, id: &str, task: &T) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.tasks.insert(id.to_owned(), task.clone()).is_none() {
            state.order.push(id.to_owned());
        }
        Ok(state.tasks.len() == state.order.len())
    }

    async fn next(&self) -> Result<Option<String>> {
        Ok(self.state.lock().await.order.first().cloned())
    }

    async fn get(&self, id: &str) -> Result<T> {
        self.state
            .lock()
            .await
            .tasks
            .get(id)
            .cloned()
            .ok_or_else(|| QueueError::TaskNotFound { id: id.to_owned() })
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.tasks.remove(id);
        state.order.retain(|i| i != id);
        Ok(())
    }

    async fn rotate(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.order.is_empty() {
            let head = state.order.remove(0);
            state.order.push(head);
        }
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.state.lock().await.order.len())
    }

    async fn check(&self) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state.tasks.len() == state.order.len()
            && state.order.iter().all(|id| state.tasks.contains_key(id)))
    }

    async fn ids(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().await.order.clone())
    }
}

/// Durable task storage: one file per task under `<root>/events/` plus an
/// `index` file holding the order list as a JSON array of strings.
///
/// Opening an existing directory re-reads the index, so tasks queued before
/// a restart are drained after it.
pub struct FileQueueStore<T> {
    root: PathBuf,
    codec: TaskCodec<T>,
    index: Mutex<Vec<String>>,
}

impl<T> FileQueueStore<T> {
    /// Open (or create) the store rooted at `root`.
    ///
    /// An existing `index` file that is not a JSON array of strings is a
    /// fatal initialization error for this queue.
    pub fn open(root: impl Into<PathBuf>, codec: TaskCodec<T>) -> Result<Self> {
        let root = root.into();
        let events = root.join("events");
        std::fs::create_dir_all(&events).map_err(|source| QueueError::Io {
            path: events.display().to_string(),
            source,
        })?;

        let index_path = root.join("index");
        let order = if index_path.exists() {
            let raw = std::fs::read_to_string(&index_path).map_err(|source| QueueError::Io {
                path: index_path.display().to_string(),
                source,
            })?;
            serde_json::from_str::<Vec<String>>(&raw).map_err(|_| QueueError::InvalidIndex {
                path: index_path.display().to_string(),
            })?
        } else {
            std::fs::write(&index_path, "[]").map_err(|source| QueueError::Io {
                path: index_path.display().to_string(),
                source,
            })?;
            Vec::new()
        };

        Ok(Self {
            root,
            codec,
            index: Mutex::new(order),
        })
    }

    fn event_path(&self, id: &str) -> PathBuf {
        self.root.join("events").join(id)
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("index")
    }

    async fn write_index(&self, order: &[String]) -> Result<()> {
        let raw = serde_json::to_vec(order)?;
        write_file(&self.index_path(), &raw).await
    }

    async fn event_count(&self) -> Result<usize> {
        let events = self.root.join("events");
        let mut entries =
            tokio::fs::read_dir(&events)
                .await
                .map_err(|source| QueueError::Io {
                    path: events.display().to_string(),
                    source,
                })?;
        let mut count = 0;
        while entries
            .next_entry()
            .await
            .map_err(|source| QueueError::Io {
                path: events.display().to_string(),
                source,
            })?
            .is_some()
        {
            count += 1;
        }
        Ok(count)
    }
}

async fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|source| QueueError::Io {
            path: path.display().to_string(),
            source,
        })
}

#[async_trait]
impl<T: Send + Sync> QueueStore<T> for FileQueueStore<T> {
    async fn push(&self, id: &str, task: &T) -> Result<bool> {
        let encoded = (self.codec.encode)(task);
        write_file(&self.event_path(id), encoded.as_bytes()).await?;

        let mut index = self.index.lock().await;
        if !index.iter().any(|i| i == id) {
            index.push(id.to_owned());
        }
        self.write_index(&index).await?;

        Ok(self.event_count().await? == index.len())
    }

    async fn next(&self) -> Result<Option<String>> {
        Ok(self.index.lock().await.first().cloned())
    }

    async fn get(&self, id: &str) -> Result<T> {
        let path = self.event_path(id);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| match source.kind() {
                std::io::ErrorKind::NotFound => QueueError::TaskNotFound { id: id.to_owned() },
                _ => QueueError::Io {
                    path: path.display().to_string(),
                    source,
                },
            })?;
        (self.codec.decode)(&raw).ok_or_else(|| QueueError::Undecodable { id: id.to_owned() })
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let path = self.event_path(id);
        // The event file may already be gone (a crash landed between the
        // file delete and the index write). The index entry is pruned
        // regardless, so an orphaned id can never wedge the head.
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(QueueError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        }

        let mut index = self.index.lock().await;
        index.retain(|i| i != id);
        self.write_index(&index).await
    }

    async fn rotate(&self) -> Result<()> {
        let mut index = self.index.lock().await;
        if !index.is_empty() {
            let head = index.remove(0);
            index.push(head);
        }
        self.write_index(&index).await
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.index.lock().await.len())
    }

    async fn check(&self) -> Result<bool> {
        let index = self.index.lock().await;
        Ok(self.event_count().await? == index.len())
    }

    async fn ids(&self) -> Result<Vec<String>> {
        Ok(self.index.lock().await.clone())
    }
}
