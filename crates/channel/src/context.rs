//! Per-message variable context
//!
//! Filter and transform steps get a [`MessageContext`] alongside the
//! message: four key-value scopes with different lifetimes.
//!
//! - `Global` lives as long as the engine;
//! - `Channel` lives as long as the owning channel;
//! - `Route` lives for one route traversal of one message;
//! - `Message` lives for one message's traversal of the whole pipeline.
//!
//! The engine constructs one context per inbound message and derives a
//! route-scoped view per route with [`MessageContext::with_route`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

type VarMap = Arc<Mutex<HashMap<String, Value>>>;

/// Which scope a variable lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// One message's traversal
    Message,
    /// The owning channel, across messages
    Channel,
    /// One route traversal of one message
    Route,
    /// The whole engine
    Global,
}

/// Engine-lifetime variable storage: the global map plus one map per
/// channel id. Message and route maps are created per traversal and never
/// live here.
#[derive(Default)]
pub struct VariableStore {
    globals: VarMap,
    channels: Mutex<HashMap<String, VarMap>>,
}

impl VariableStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn channel_vars(&self, channel_id: &str) -> VarMap {
        let mut channels = self.channels.lock();
        Arc::clone(
            channels
                .entry(channel_id.to_string())
                .or_insert_with(VarMap::default),
        )
    }
}

/// The variable view handed to filter and transform steps.
///
/// Cloning shares every scope; [`with_route`](Self::with_route) shares all
/// but the route scope, which starts fresh.
#[derive(Clone)]
pub struct MessageContext {
    message_id: String,
    channel_id: String,
    route_id: Option<String>,
    globals: VarMap,
    channel_vars: VarMap,
    route_vars: VarMap,
    message_vars: VarMap,
}

impl MessageContext {
    /// Context for one message entering `channel_id`'s pipeline.
    pub fn new(
        store: &VariableStore,
        channel_id: impl Into<String>,
        message_id: impl Into<String>,
    ) -> Self {
        let channel_id = channel_id.into();
        Self {
            message_id: message_id.into(),
            globals: Arc::clone(&store.globals),
            channel_vars: store.channel_vars(&channel_id),
            channel_id,
            route_id: None,
            route_vars: VarMap::default(),
            message_vars: VarMap::default(),
        }
    }

    /// Derive the context for one route traversal: same message, channel,
    /// and global scopes, fresh route scope.
    #[must_use]
    pub fn with_route(&self, route_id: impl Into<String>) -> Self {
        let mut context = self.clone();
        context.route_id = Some(route_id.into());
        context.route_vars = VarMap::default();
        context
    }

    /// The message id this context is keyed by.
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// The owning channel's id.
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// The route id, inside a route traversal.
    pub fn route_id(&self) -> Option<&str> {
        self.route_id.as_deref()
    }

    fn scope_vars(&self, scope: Scope) -> &VarMap {
        match scope {
            Scope::Message => &self.message_vars,
            Scope::Channel => &self.channel_vars,
            Scope::Route => &self.route_vars,
            Scope::Global => &self.globals,
        }
    }

    /// Read a variable.
    pub fn get(&self, scope: Scope, key: &str) -> Option<Value> {
        if scope == Scope::Route && self.route_id.is_none() {
            tracing::warn!(key, "route variable read outside a route traversal");
            return None;
        }
        self.scope_vars(scope).lock().get(key).cloned()
    }

    /// Write a variable.
    pub fn set(&self, scope: Scope, key: impl Into<String>, value: Value) {
        let key = key.into();
        if scope == Scope::Route && self.route_id.is_none() {
            tracing::warn!(key = %key, "route variable written outside a route traversal");
            return;
        }
        self.scope_vars(scope).lock().insert(key, value);
    }
}
