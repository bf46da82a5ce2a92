//! Hermes Channel
//!
//! The unit of configuration: one inbound connection, an ordered ingestion
//! pipeline, and zero or more routes. Channels are assembled by the caller
//! (a fluent builder or config loader) and normalized here before the
//! engine runs them:
//!
//! - every channel, step, and route ends up with a stable id; missing ids
//!   are generated at startup and logged when the channel is verbose;
//! - unsupported source kinds are rejected per channel at validation time,
//!   without taking down sibling channels.
//!
//! Filter and transform steps are opaque functions over the message value
//! and a [`MessageContext`] of scoped variables; the engine only dispatches
//! them.

mod context;
mod error;
mod model;

pub use context::{MessageContext, Scope, VariableStore};
pub use error::{ChannelError, Result};
pub use model::{
    Channel, FilterFn, FlowKind, FlowStep, ForwardConfig, IngestKind, IngestStep, Route,
    SourceConfig, SourceKind, TcpSourceConfig, TransformFn,
};

#[cfg(test)]
mod context_test;
