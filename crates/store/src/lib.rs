//! Hermes Store
//!
//! Pluggable message persistence behind one trait, plus the registry that
//! deduplicates backend instances across channels.
//!
//! # Design
//!
//! A `store` pipeline step carries a [`StoreConfig`] value. At startup the
//! engine scans every channel's ingestion and route step lists and eagerly
//! instantiates one backend per *structurally distinct* configuration, so
//! two channels writing to the same directory share one [`MessageStore`]
//! instance. Lookup is keyed by a SHA-256 hash over the config's canonical
//! JSON form, so structural equality is instance identity.
//!
//! Persistence failures are reported, never fatal: a pipeline treats a
//! failed store step as a `false` outcome and keeps going.

mod backend;
mod config;
mod error;
mod registry;

pub use backend::{FileStore, MemoryStore, MessageStore};
pub use config::{config_hash, StoreConfig};
pub use error::{Result, StoreError};
pub use registry::StoreRegistry;

#[cfg(test)]
mod registry_test;
