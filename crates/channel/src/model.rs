//! Channel data model

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use hermes_protocol::{AckConfig, Delimiters, Message};
use hermes_queue::QueueSettings;
use hermes_store::StoreConfig;
use uuid::Uuid;

use crate::context::MessageContext;
use crate::error::{ChannelError, Result};

/// Predicate over the current message; `false` filters the message out.
pub type FilterFn = Arc<dyn Fn(&Message, &MessageContext) -> bool + Send + Sync>;

/// Pure rewrite of the current message.
pub type TransformFn = Arc<dyn Fn(Message, &MessageContext) -> Message + Send + Sync>;

/// Inbound TCP listener settings.
#[derive(Debug, Clone)]
pub struct TcpSourceConfig {
    /// Bind host
    pub host: String,
    /// Listen port
    pub port: u16,
    /// Framing bytes for this listener
    pub delimiters: Delimiters,
}

impl TcpSourceConfig {
    /// Listener on `host:port` with default MLLP framing.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            delimiters: Delimiters::default(),
        }
    }

    /// The socket address to bind to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Transport kind of a channel's inbound connection.
///
/// Only `Tcp` is implemented; the other kinds exist so a channel declaring
/// one fails validation with a clear error instead of starting half-broken.
#[derive(Debug, Clone)]
pub enum SourceKind {
    /// MLLP-framed TCP listener
    Tcp(TcpSourceConfig),
    /// File reader source (not implemented)
    File(PathBuf),
    /// Database poller source (not implemented)
    Db(String),
}

/// A channel's inbound connection plus its optional inbound queue.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Transport
    pub kind: SourceKind,
    /// When set, inbound messages are acknowledged after being queued and
    /// ingested out-of-band by the queue worker
    pub queue: Option<QueueSettings>,
}

impl SourceConfig {
    /// TCP source without an inbound queue.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            kind: SourceKind::Tcp(TcpSourceConfig::new(host, port)),
            queue: None,
        }
    }

    /// Attach an inbound queue.
    #[must_use]
    pub fn with_queue(mut self, queue: QueueSettings) -> Self {
        self.queue = Some(queue);
        self
    }
}

/// Outbound TCP destination for a `forward` step.
#[derive(Debug, Clone)]
pub struct ForwardConfig {
    /// Destination host
    pub host: String,
    /// Destination port
    pub port: u16,
    /// Framing bytes for the outbound connection
    pub delimiters: Delimiters,
    /// How long to wait for the framed reply
    pub response_timeout: Duration,
}

impl ForwardConfig {
    /// Destination with default framing and a 10 second reply timeout.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            delimiters: Delimiters::default(),
            response_timeout: Duration::from_secs(10),
        }
    }

    /// The socket address to connect to.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Set the reply timeout.
    #[must_use]
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }
}

/// What an ingestion step does.
#[derive(Clone)]
pub enum IngestKind {
    /// Build and deliver an acknowledgment
    Ack(AckConfig),
    /// Drop the message when the predicate returns false
    Filter(FilterFn),
    /// Replace the working message
    Transform(TransformFn),
    /// Persist the message through the store registry
    Store(StoreConfig),
}

impl fmt::Debug for IngestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ack(config) => f.debug_tuple("Ack").field(config).finish(),
            Self::Filter(_) => f.write_str("Filter(<fn>)"),
            Self::Transform(_) => f.write_str("Transform(<fn>)"),
            Self::Store(config) => f.debug_tuple("Store").field(config).finish(),
        }
    }
}

/// One ordered ingestion step.
#[derive(Debug, Clone)]
pub struct IngestStep {
    /// Stable id; generated at normalization when empty
    pub id: Option<String>,
    /// Optional display name
    pub name: Option<String>,
    /// What the step does
    pub kind: IngestKind,
}

impl IngestStep {
    fn new(kind: IngestKind) -> Self {
        Self {
            id: None,
            name: None,
            kind,
        }
    }

    /// Acknowledgment step.
    pub fn ack(config: AckConfig) -> Self {
        Self::new(IngestKind::Ack(config))
    }

    /// Filter step.
    pub fn filter(
        f: impl Fn(&Message, &MessageContext) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::new(IngestKind::Filter(Arc::new(f)))
    }

    /// Transform step.
    pub fn transform(
        f: impl Fn(Message, &MessageContext) -> Message + Send + Sync + 'static,
    ) -> Self {
        Self::new(IngestKind::Transform(Arc::new(f)))
    }

    /// Persistence step.
    pub fn store(config: StoreConfig) -> Self {
        Self::new(IngestKind::Store(config))
    }

    /// Set an explicit id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set a display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// What a route flow step does: the ingestion step kinds plus `forward`.
#[derive(Clone)]
pub enum FlowKind {
    /// Drop the message when the predicate returns false
    Filter(FilterFn),
    /// Replace the working message
    Transform(TransformFn),
    /// Persist the message through the store registry
    Store(StoreConfig),
    /// Send to a downstream TCP destination and continue with its reply
    Forward(ForwardConfig),
}

impl fmt::Debug for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filter(_) => f.write_str("Filter(<fn>)"),
            Self::Transform(_) => f.write_str("Transform(<fn>)"),
            Self::Store(config) => f.debug_tuple("Store").field(config).finish(),
            Self::Forward(config) => f.debug_tuple("Forward").field(config).finish(),
        }
    }
}

/// One ordered route flow step.
#[derive(Debug, Clone)]
pub struct FlowStep {
    /// Stable id; generated at normalization when empty
    pub id: Option<String>,
    /// Optional display name
    pub name: Option<String>,
    /// What the step does
    pub kind: FlowKind,
    /// When set, a `forward` step is deferred onto its own queue
    pub queue: Option<QueueSettings>,
}

impl FlowStep {
    fn new(kind: FlowKind) -> Self {
        Self {
            id: None,
            name: None,
            kind,
            queue: None,
        }
    }

    /// Filter step.
    pub fn filter(
        f: impl Fn(&Message, &MessageContext) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::new(FlowKind::Filter(Arc::new(f)))
    }

    /// Transform step.
    pub fn transform(
        f: impl Fn(Message, &MessageContext) -> Message + Send + Sync + 'static,
    ) -> Self {
        Self::new(FlowKind::Transform(Arc::new(f)))
    }

    /// Persistence step.
    pub fn store(config: StoreConfig) -> Self {
        Self::new(FlowKind::Store(config))
    }

    /// Forwarding step.
    pub fn forward(config: ForwardConfig) -> Self {
        Self::new(FlowKind::Forward(config))
    }

    /// Set an explicit id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set a display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Defer this step onto its own queue.
    #[must_use]
    pub fn with_queue(mut self, queue: QueueSettings) -> Self {
        self.queue = Some(queue);
        self
    }
}

/// An independent ordered pipeline run after ingestion.
#[derive(Debug, Clone, Default)]
pub struct Route {
    /// Stable id; generated at normalization when empty
    pub id: Option<String>,
    /// Optional display name
    pub name: Option<String>,
    /// When set, the whole route is deferred onto a queue
    pub queue: Option<QueueSettings>,
    /// Ordered flow steps
    pub flows: Vec<FlowStep>,
}

impl Route {
    /// Route over the given steps.
    pub fn new(flows: Vec<FlowStep>) -> Self {
        Self {
            flows,
            ..Default::default()
        }
    }

    /// Set an explicit id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set a display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Defer the whole route onto a queue.
    #[must_use]
    pub fn with_queue(mut self, queue: QueueSettings) -> Self {
        self.queue = Some(queue);
        self
    }
}

/// One configured channel: identity, inbound connection, ingestion
/// pipeline, routes.
#[derive(Debug, Clone)]
pub struct Channel {
    /// Stable id; generated at normalization when empty
    pub id: Option<String>,
    /// Display name
    pub name: String,
    /// Log per-message detail for this channel
    pub verbose: bool,
    /// Inbound connection
    pub source: SourceConfig,
    /// Ordered ingestion steps
    pub ingestion: Vec<IngestStep>,
    /// Independent routes run after ingestion
    pub routes: Vec<Route>,
}

impl Channel {
    /// New channel; ingestion and routes start empty.
    pub fn new(name: impl Into<String>, source: SourceConfig) -> Self {
        Self {
            id: None,
            name: name.into(),
            verbose: false,
            source,
            ingestion: Vec::new(),
            routes: Vec::new(),
        }
    }

    /// Set an explicit id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Enable per-message logging.
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Append an ingestion step.
    #[must_use]
    pub fn ingest(mut self, step: IngestStep) -> Self {
        self.ingestion.push(step);
        self
    }

    /// Append a route.
    #[must_use]
    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    /// The channel id after normalization.
    ///
    /// Normalized channels always carry one; before normalization this
    /// falls back to the name.
    pub fn id_str(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }

    /// Backfill missing channel/step/route ids with generated ones.
    ///
    /// Idempotent: ids that are already set are kept. Assignments are
    /// logged when the channel is verbose.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        let verbose = self.verbose;
        let name = self.name.clone();

        if self.id.is_none() {
            let id = generate_id();
            if verbose {
                tracing::debug!(channel = %name, %id, "channel had no id, assigned one");
            }
            self.id = Some(id);
        }

        for step in &mut self.ingestion {
            if step.id.is_none() {
                let id = generate_id();
                if verbose {
                    tracing::debug!(channel = %name, flow = %id, "ingestion step had no id, assigned one");
                }
                step.id = Some(id);
            }
        }

        for route in &mut self.routes {
            if route.id.is_none() {
                let id = generate_id();
                if verbose {
                    tracing::debug!(channel = %name, route = %id, "route had no id, assigned one");
                }
                route.id = Some(id);
            }
            for flow in &mut route.flows {
                if flow.id.is_none() {
                    let id = generate_id();
                    if verbose {
                        tracing::debug!(channel = %name, flow = %id, "route step had no id, assigned one");
                    }
                    flow.id = Some(id);
                }
            }
        }

        self
    }

    /// Reject configurations the engine cannot run.
    pub fn validate(&self) -> Result<()> {
        match &self.source.kind {
            SourceKind::Tcp(_) => Ok(()),
            SourceKind::File(_) => Err(ChannelError::UnsupportedSource {
                channel: self.name.clone(),
                kind: "file",
            }),
            SourceKind::Db(_) => Err(ChannelError::UnsupportedSource {
                channel: self.name.clone(),
                kind: "db",
            }),
        }
    }

    /// Every store configuration reachable from this channel's steps, in
    /// order of appearance. Duplicates are fine, the registry dedups.
    pub fn store_configs(&self) -> Vec<&StoreConfig> {
        let mut configs = Vec::new();
        for step in &self.ingestion {
            if let IngestKind::Store(config) = &step.kind {
                configs.push(config);
            }
        }
        for route in &self.routes {
            for flow in &route.flows {
                if let FlowKind::Store(config) = &flow.kind {
                    configs.push(config);
                }
            }
        }
        configs
    }
}

fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
