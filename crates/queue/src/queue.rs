//! The drain-loop engine for one named queue
//!
//! One worker task per queue, one task in flight at a time. The worker
//! starts on the first push (or at construction when a durable store
//! resumes with leftover tasks) and stops when the store drains; the next
//! push starts it again.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::Result;
use crate::settings::{QueueBackend, QueueSettings, TaskCodec};
use crate::store::{FileQueueStore, MemoryQueueStore, QueueStore};

/// Boxed future returned by a processing function.
pub type TaskFuture = Pin<Box<dyn Future<Output = bool> + Send>>;

/// Processing function: consumes one task, resolves `true` on success.
pub type ProcessFn<T> = Arc<dyn Fn(T) -> TaskFuture + Send + Sync>;

/// Optional id derivation from task content (e.g. a control-id field).
pub type IdExtractor<T> = Arc<dyn Fn(&T) -> Option<String> + Send + Sync>;

/// Lifecycle events emitted by a queue, in processing order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    /// Task accepted and persisted
    Queued {
        /// Task id
        id: String,
    },
    /// Processing began for a task
    Started {
        /// Task id
        id: String,
    },
    /// The same head task came up again after a failure
    Retried {
        /// Task id
        id: String,
        /// Consecutive-failure count
        attempt: u32,
    },
    /// Processing resolved `true`; task removed
    Succeeded {
        /// Task id
        id: String,
    },
    /// Processing resolved `false`, errored, or timed out
    Failed {
        /// Task id
        id: String,
        /// True when the failure was the timeout, not the task itself
        timed_out: bool,
    },
    /// Retry ceiling exceeded; task removed without success
    Dropped {
        /// Task id
        id: String,
        /// Attempts consumed
        attempts: u32,
    },
    /// Store is empty; worker stopped
    Drained,
}

struct QueueInner<T> {
    name: String,
    settings: QueueSettings,
    store: Arc<dyn QueueStore<T>>,
    process: ProcessFn<T>,
    id_from: Option<IdExtractor<T>>,
    events: broadcast::Sender<QueueEvent>,
    running: AtomicBool,
    cancel: CancellationToken,
}

/// A named task queue. Cheap to clone; all clones share the worker.
pub struct Queue<T> {
    inner: Arc<QueueInner<T>>,
}

impl<T> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

// Manual impl: the processing and codec closures have no Debug.
impl<T> fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.inner.name)
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

impl<T: Send + Sync + 'static> Queue<T> {
    /// Construct a queue over the store selected by `settings.backend`.
    ///
    /// A durable store that resumes with leftover tasks starts draining
    /// immediately.
    pub fn new(
        name: impl Into<String>,
        settings: QueueSettings,
        codec: TaskCodec<T>,
        id_from: Option<IdExtractor<T>>,
        process: ProcessFn<T>,
    ) -> Result<Self>
    where
        T: Clone,
    {
        let store: Arc<dyn QueueStore<T>> = match &settings.backend {
            QueueBackend::Memory => Arc::new(MemoryQueueStore::new()),
            QueueBackend::File { path } => Arc::new(FileQueueStore::open(path, codec)?),
        };
        Ok(Self::with_store(name, settings, store, id_from, process))
    }

    /// Construct a queue over an explicit store (used by tests and by
    /// callers with custom storage).
    pub fn with_store(
        name: impl Into<String>,
        settings: QueueSettings,
        store: Arc<dyn QueueStore<T>>,
        id_from: Option<IdExtractor<T>>,
        process: ProcessFn<T>,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        let queue = Self {
            inner: Arc::new(QueueInner {
                name: name.into(),
                settings,
                store,
                process,
                id_from,
                events,
                running: AtomicBool::new(false),
                cancel: CancellationToken::new(),
            }),
        };
        queue.resume_if_pending();
        queue
    }

    /// Queue name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Settings this queue was declared with.
    pub fn settings(&self) -> &QueueSettings {
        &self.inner.settings
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    /// Number of queued tasks.
    pub async fn len(&self) -> Result<usize> {
        self.inner.store.len().await
    }

    /// True when no task is queued.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Snapshot of queued task ids in FIFO order.
    pub async fn pending_ids(&self) -> Result<Vec<String>> {
        self.inner.store.ids().await
    }

    /// Push one task. The id comes from the caller, then the configured
    /// extractor, then a generated UUID. Returns the task id.
    pub async fn push(&self, id: Option<String>, task: T) -> Result<String> {
        let id = id
            .or_else(|| self.inner.id_from.as_ref().and_then(|f| f(&task)))
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let balanced = self.inner.store.push(&id, &task).await?;
        if !balanced {
            tracing::warn!(
                queue = %self.inner.name,
                task = %id,
                "queue store unbalanced after push"
            );
        }

        let _ = self.inner.events.send(QueueEvent::Queued { id: id.clone() });
        tracing::debug!(queue = %self.inner.name, task = %id, "task queued");

        self.ensure_worker();
        Ok(id)
    }

    /// Stop the worker. Remaining tasks stay in the store: a file-backed
    /// queue resumes them at next startup, a memory-backed queue loses them
    /// with the process.
    pub async fn quit(&self) {
        self.inner.cancel.cancel();
        match self.inner.store.len().await {
            Ok(0) | Err(_) => {}
            Ok(remaining) => tracing::warn!(
                queue = %self.inner.name,
                remaining,
                "queue stopped with unprocessed tasks"
            ),
        }
    }

    /// Start the worker when a resumed durable store is non-empty.
    fn resume_if_pending(&self) {
        let queue = self.clone();
        tokio::spawn(async move {
            match queue.inner.store.len().await {
                Ok(n) if n > 0 => {
                    tracing::info!(
                        queue = %queue.inner.name,
                        pending = n,
                        "resuming queued tasks from durable store"
                    );
                    queue.ensure_worker();
                }
                _ => {}
            }
        });
    }

    fn ensure_worker(&self) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        // Single drain slot: only the caller that flips the flag spawns.
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(drain_loop(inner));
    }
}

/// One worker per queue. Processes the head task, then sleeps the drain
/// interval; exits when the store is empty or the queue is stopped. The
/// processing future is awaited to completion (bounded by `max_timeout`)
/// before the next tick, so two ticks can never run against the store
/// concurrently.
async fn drain_loop<T: Send + Sync + 'static>(inner: Arc<QueueInner<T>>) {
    let mut last_id: Option<String> = None;
    let mut attempt: u32 = 0;

    loop {
        if inner.cancel.is_cancelled() {
            inner.running.store(false, Ordering::SeqCst);
            return;
        }

        match inner.store.check().await {
            Ok(true) => {}
            Ok(false) => tracing::error!(
                queue = %inner.name,
                "queue store unbalanced: record set and order list disagree"
            ),
            Err(error) => tracing::error!(
                queue = %inner.name,
                %error,
                "queue balance check failed"
            ),
        }

        let head = match inner.store.next().await {
            Ok(head) => head,
            Err(error) => {
                tracing::error!(queue = %inner.name, %error, "failed to read queue head");
                None
            }
        };

        let Some(id) = head else {
            inner.running.store(false, Ordering::SeqCst);
            // A push may have landed between the empty read and the flag
            // flip; reclaim the slot instead of stranding the task.
            if matches!(inner.store.len().await, Ok(n) if n > 0)
                && !inner.running.swap(true, Ordering::SeqCst)
            {
                continue;
            }
            let _ = inner.events.send(QueueEvent::Drained);
            tracing::debug!(queue = %inner.name, "queue drained, worker stopping");
            return;
        };

        if last_id.as_deref() == Some(id.as_str()) {
            attempt += 1;
            let _ = inner.events.send(QueueEvent::Retried {
                id: id.clone(),
                attempt,
            });
        } else {
            attempt = 0;
            last_id = Some(id.clone());
        }

        if let Some(max) = inner.settings.max_retries {
            if attempt > max {
                tracing::warn!(
                    queue = %inner.name,
                    task = %id,
                    attempts = attempt,
                    "retry ceiling exceeded, dropping task"
                );
                if let Err(error) = inner.store.remove(&id).await {
                    tracing::error!(queue = %inner.name, task = %id, %error, "failed to drop task");
                }
                let _ = inner.events.send(QueueEvent::Dropped { id, attempts: attempt });
                last_id = None;
                continue;
            }
        }

        match inner.store.get(&id).await {
            Ok(task) => {
                let _ = inner.events.send(QueueEvent::Started { id: id.clone() });

                let outcome = timeout(inner.settings.max_timeout, (inner.process)(task)).await;
                let (succeeded, timed_out) = match outcome {
                    Ok(result) => (result, false),
                    Err(_) => (false, true),
                };

                if succeeded {
                    if let Err(error) = inner.store.remove(&id).await {
                        tracing::error!(
                            queue = %inner.name,
                            task = %id,
                            %error,
                            "failed to remove completed task"
                        );
                    }
                    let _ = inner.events.send(QueueEvent::Succeeded { id });
                    last_id = None;
                    continue;
                }

                if timed_out {
                    tracing::warn!(
                        queue = %inner.name,
                        task = %id,
                        timeout_ms = inner.settings.max_timeout.as_millis() as u64,
                        "task processing timed out"
                    );
                }
                let _ = inner.events.send(QueueEvent::Failed { id, timed_out });
                if inner.settings.rotate {
                    if let Err(error) = inner.store.rotate().await {
                        tracing::error!(queue = %inner.name, %error, "queue rotate failed");
                    }
                }
            }
            Err(error) => {
                // Unreadable payload: treat as a failed attempt so the
                // retry/rotate/drop policy applies.
                tracing::error!(queue = %inner.name, task = %id, %error, "failed to load task");
                let _ = inner.events.send(QueueEvent::Failed {
                    id,
                    timed_out: false,
                });
                if inner.settings.rotate {
                    if let Err(error) = inner.store.rotate().await {
                        tracing::error!(queue = %inner.name, %error, "queue rotate failed");
                    }
                }
            }
        }

        tokio::select! {
            _ = inner.cancel.cancelled() => {
                inner.running.store(false, Ordering::SeqCst);
                return;
            }
            _ = tokio::time::sleep(inner.settings.drain_interval) => {}
        }
    }
}
