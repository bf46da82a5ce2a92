//! Hermes Pipeline
//!
//! The engine that runs channels end to end:
//!
//! 1. a listener hands a parsed inbound message to the ingestion executor,
//!    which walks the channel's ack/filter/transform/store steps and either
//!    yields a working message or drops it as filtered;
//! 2. the route executor then runs every route concurrently, each an
//!    ordered sequence of filter/transform/store/forward steps, with
//!    route-level and forward-step queues deferring delivery;
//! 3. acknowledgments built during ingestion flow back to the source
//!    connection.
//!
//! [`Engine`] owns the per-process registries: one store instance per
//! distinct configuration, one queue per declared name, and the scoped
//! variable store behind every [`hermes_channel::MessageContext`].

mod engine;
mod error;
mod ingestion;
mod route;

pub use engine::Engine;
pub use error::{PipelineError, Result};
pub use ingestion::IngestOutcome;
