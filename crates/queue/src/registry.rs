//! Named queue registry
//!
//! At most one [`Queue`] exists per name within a process. Queues are
//! declared once (at engine startup, from the channel configuration) and
//! retrieved by name for pushing thereafter; declaring a name twice is a
//! hard error so a configuration change can never be silently ignored.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::{QueueError, Result};
use crate::queue::{IdExtractor, ProcessFn, Queue};
use crate::settings::{QueueSettings, TaskCodec};

/// Map of queue name to instance, for one task type. Owned by whoever
/// bootstraps the queues, typically the engine.
pub struct QueueRegistry<T> {
    queues: Mutex<HashMap<String, Queue<T>>>,
}

impl<T> Default for QueueRegistry<T> {
    fn default() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> QueueRegistry<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a new named queue.
    ///
    /// Fails with [`QueueError::AlreadyConfigured`] if the name is taken.
    pub fn declare(
        &self,
        name: impl Into<String>,
        settings: QueueSettings,
        codec: TaskCodec<T>,
        id_from: Option<IdExtractor<T>>,
        process: ProcessFn<T>,
    ) -> Result<Queue<T>> {
        let name = name.into();
        let mut queues = self.queues.lock();
        if queues.contains_key(&name) {
            return Err(QueueError::AlreadyConfigured { name });
        }

        let queue = Queue::new(name.clone(), settings, codec, id_from, process)?;
        queues.insert(name, queue.clone());
        Ok(queue)
    }

    /// Look up a declared queue.
    pub fn get(&self, name: &str) -> Option<Queue<T>> {
        self.queues.lock().get(name).cloned()
    }

    /// Number of declared queues.
    pub fn len(&self) -> usize {
        self.queues.lock().len()
    }

    /// True when no queue is declared.
    pub fn is_empty(&self) -> bool {
        self.queues.lock().is_empty()
    }

    /// Stop every queue's worker.
    pub async fn shutdown(&self) {
        let queues: Vec<Queue<T>> = self.queues.lock().values().cloned().collect();
        for queue in queues {
            queue.quit().await;
        }
    }
}
