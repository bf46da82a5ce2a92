//! Hermes Queue
//!
//! Named, independently scheduled task queues so that delivery to slow or
//! unreliable downstream systems does not block the inbound connection and,
//! with the file backend, survives process restarts.
//!
//! # Design
//!
//! A [`Queue`] is a single-worker drain loop over one [`QueueStore`]:
//!
//! - `push` persists the task (id from the caller, the configured
//!   extractor, or a generated UUID) and wakes the worker.
//! - The worker processes exactly one task at a time: fetch the head id,
//!   run the processing function under the configured timeout, then remove
//!   the task on success or retry/rotate/drop it per policy on failure.
//! - When the store is empty the worker stops; the next push restarts it.
//!
//! Lifecycle transitions are emitted as [`QueueEvent`]s on a broadcast
//! channel for observability and tests.
//!
//! The [`QueueRegistry`] holds at most one queue per name. Queues are
//! declared once at startup; re-declaring a name is a hard error rather
//! than a silent reuse that ignores the new configuration.

mod error;
mod queue;
mod registry;
mod settings;
mod store;

pub use error::{QueueError, Result};
pub use queue::{IdExtractor, ProcessFn, Queue, QueueEvent, TaskFuture};
pub use registry::QueueRegistry;
pub use settings::{QueueBackend, QueueSettings, TaskCodec};
pub use store::{FileQueueStore, MemoryQueueStore, QueueStore};

#[cfg(test)]
mod queue_test;
