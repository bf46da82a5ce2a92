//! Store instance registry
//!
//! Resolves a [`StoreConfig`] to a live backend, one instance per distinct
//! configuration. The registry is populated once at startup from every
//! channel's step lists; `persist` only looks up and never creates an
//! instance implicitly.

use std::collections::HashMap;
use std::sync::Arc;

use hermes_protocol::Message;
use parking_lot::Mutex;

use crate::backend::{FileStore, MemoryStore, MessageStore};
use crate::config::{config_hash, StoreConfig};
use crate::error::{Result, StoreError};

/// Shared map of structural-hash → backend instance.
#[derive(Default)]
pub struct StoreRegistry {
    stores: Mutex<HashMap<String, Arc<dyn MessageStore>>>,
}

impl StoreRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Eagerly instantiate backends for every configuration, deduplicating
    /// structurally equal ones.
    pub fn init<'a>(configs: impl IntoIterator<Item = &'a StoreConfig>) -> Result<Self> {
        let registry = Self::new();
        for config in configs {
            registry.register(config)?;
        }
        Ok(registry)
    }

    /// Instantiate (or reuse) the backend for one configuration.
    pub fn register(&self, config: &StoreConfig) -> Result<Arc<dyn MessageStore>> {
        let hash = config_hash(config)?;

        let mut stores = self.stores.lock();
        if let Some(existing) = stores.get(&hash) {
            return Ok(Arc::clone(existing));
        }

        let instance: Arc<dyn MessageStore> = match config {
            StoreConfig::File { path, extension } => {
                Arc::new(FileStore::new(path, extension.clone())?)
            }
            StoreConfig::Memory => Arc::new(MemoryStore::new()),
        };

        tracing::debug!(config = ?config, hash = %hash, "registered store instance");
        stores.insert(hash, Arc::clone(&instance));
        Ok(instance)
    }

    /// Look up the live instance for a configuration. Never creates one.
    pub fn resolve(&self, config: &StoreConfig) -> Result<Option<Arc<dyn MessageStore>>> {
        let hash = config_hash(config)?;
        Ok(self.stores.lock().get(&hash).cloned())
    }

    /// Persist a message through the instance registered for `config`.
    ///
    /// Fails with [`StoreError::UnknownConfig`] when the registry was never
    /// initialized with this configuration.
    pub async fn persist(&self, config: &StoreConfig, message: &Message) -> Result<bool> {
        let hash = config_hash(config)?;
        let store = self
            .stores
            .lock()
            .get(&hash)
            .cloned()
            .ok_or(StoreError::UnknownConfig { hash })?;
        store.store(message).await
    }

    /// Number of distinct instances.
    pub fn len(&self) -> usize {
        self.stores.lock().len()
    }

    /// True when no instance is registered.
    pub fn is_empty(&self) -> bool {
        self.stores.lock().is_empty()
    }
}
