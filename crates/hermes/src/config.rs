//! TOML configuration
//!
//! Declares the parts of a deployment that are data: listeners, ack
//! policies, stores, forwards, and queue settings. Filter and transform
//! steps are code and are attached programmatically through the library
//! API; a config-only deployment is a store-and-forward engine.
//!
//! # Example
//!
//! ```toml
//! [log]
//! level = "info"
//!
//! [[channels]]
//! name = "adt-in"
//!
//! [channels.source]
//! host = "0.0.0.0"
//! port = 5555
//!
//! [channels.ack]
//! application = "hermes"
//!
//! [channels.store]
//! kind = "file"
//! path = "data/adt"
//!
//! [[channels.routes]]
//! name = "to-lab"
//!
//! [[channels.routes.forwards]]
//! host = "lab.internal"
//! port = 6000
//!
//! [channels.routes.forwards.queue]
//! dir = "data/queues/to-lab"
//! max_retries = 10
//! rotate = true
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use hermes_channel::{Channel, FlowStep, ForwardConfig, IngestStep, Route, SourceConfig};
use hermes_protocol::AckConfig;
use hermes_queue::{QueueBackend, QueueSettings};
use hermes_store::StoreConfig;
use serde::Deserialize;
use thiserror::Error;

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur when loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A channel has no name
    #[error("channel {index} is missing a name")]
    UnnamedChannel { index: usize },

    /// Two channels listen on the same port
    #[error("port {port} is used by channels: {channels}")]
    DuplicatePort { port: u16, channels: String },
}

/// Log level
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// The tracing filter directive for this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable console output (default)
    #[default]
    Console,
    /// JSON structured logging
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: LogLevel,
    /// Output format (console, json)
    pub format: LogFormat,
}

/// Queue settings in config form. Fields omit to the engine defaults.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    /// Durable queue directory; omit for an in-memory queue
    pub dir: Option<PathBuf>,
    /// Consecutive failures before a task is dropped; omit to retry forever
    pub max_retries: Option<u32>,
    /// Pause between drain ticks, in milliseconds
    pub drain_interval_ms: Option<u64>,
    /// Move a failed task to the tail instead of retrying at the head
    pub rotate: Option<bool>,
    /// Per-task processing timeout, in milliseconds
    pub max_timeout_ms: Option<u64>,
}

impl QueueConfig {
    fn settings(&self) -> QueueSettings {
        let mut settings = QueueSettings::default();
        if let Some(dir) = &self.dir {
            settings.backend = QueueBackend::File { path: dir.clone() };
        }
        settings.max_retries = self.max_retries;
        if let Some(ms) = self.drain_interval_ms {
            settings.drain_interval = Duration::from_millis(ms);
        }
        if let Some(rotate) = self.rotate {
            settings.rotate = rotate;
        }
        if let Some(ms) = self.max_timeout_ms {
            settings.max_timeout = Duration::from_millis(ms);
        }
        settings
    }
}

/// A channel's inbound listener
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSection {
    /// Bind host
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port
    pub port: u16,
    /// Inbound queue; messages are acked on accept and ingested later
    pub queue: Option<QueueConfig>,
}

fn default_host() -> String {
    "0.0.0.0".into()
}

/// Ack policy in config form
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AckSection {
    /// Sending application (`MSH-3`)
    pub application: Option<String>,
    /// Sending facility (`MSH-4`)
    pub organization: Option<String>,
    /// `MSA-1` response code
    pub response_code: Option<String>,
    /// Free text appended as `MSA-3`
    pub text: Option<String>,
}

impl AckSection {
    fn ack_config(&self) -> AckConfig {
        AckConfig {
            application: self.application.clone(),
            organization: self.organization.clone(),
            response_code: self.response_code.clone(),
            text: self.text.clone(),
            mutator: None,
        }
    }
}

/// One outbound forward inside a route
#[derive(Debug, Clone, Deserialize)]
pub struct ForwardSection {
    /// Destination host
    pub host: String,
    /// Destination port
    pub port: u16,
    /// Reply deadline, in milliseconds
    pub response_timeout_ms: Option<u64>,
    /// Defer delivery onto a queue
    pub queue: Option<QueueConfig>,
}

/// One route: an ordered list of forwards, optionally store-first
#[derive(Debug, Clone, Deserialize)]
pub struct RouteSection {
    /// Stable route id
    pub id: Option<String>,
    /// Display name
    pub name: Option<String>,
    /// Defer the whole route onto a queue
    pub queue: Option<QueueConfig>,
    /// Persist the message before forwarding
    pub store: Option<StoreConfig>,
    /// Outbound destinations, in order
    #[serde(default)]
    pub forwards: Vec<ForwardSection>,
}

/// One channel definition
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelSection {
    /// Stable channel id
    pub id: Option<String>,
    /// Channel name
    pub name: String,
    /// Per-message logging for this channel
    #[serde(default)]
    pub verbose: bool,
    /// Inbound listener
    pub source: SourceSection,
    /// Reply policy; omit to stay silent
    pub ack: Option<AckSection>,
    /// Persist each inbound message
    pub store: Option<StoreConfig>,
    /// Routes run after ingestion
    #[serde(default)]
    pub routes: Vec<RouteSection>,
}

impl ChannelSection {
    fn channel(&self) -> Channel {
        let mut source = SourceConfig::tcp(self.source.host.clone(), self.source.port);
        if let Some(queue) = &self.source.queue {
            source = source.with_queue(queue.settings());
        }

        let mut channel = Channel::new(self.name.clone(), source).verbose(self.verbose);
        if let Some(id) = &self.id {
            channel = channel.with_id(id.clone());
        }
        if let Some(ack) = &self.ack {
            channel = channel.ingest(IngestStep::ack(ack.ack_config()));
        }
        if let Some(store) = &self.store {
            channel = channel.ingest(IngestStep::store(store.clone()));
        }

        for section in &self.routes {
            let mut flows = Vec::new();
            if let Some(store) = &section.store {
                flows.push(FlowStep::store(store.clone()));
            }
            for forward in &section.forwards {
                let mut config = ForwardConfig::new(forward.host.clone(), forward.port);
                if let Some(ms) = forward.response_timeout_ms {
                    config = config.with_response_timeout(Duration::from_millis(ms));
                }
                let mut step = FlowStep::forward(config);
                if let Some(queue) = &forward.queue {
                    step = step.with_queue(queue.settings());
                }
                flows.push(step);
            }

            let mut route = Route::new(flows);
            if let Some(id) = &section.id {
                route = route.with_id(id.clone());
            }
            if let Some(name) = &section.name {
                route = route.with_name(name.clone());
            }
            if let Some(queue) = &section.queue {
                route = route.with_queue(queue.settings());
            }
            channel = channel.route(route);
        }

        channel
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,
    /// Channel definitions
    pub channels: Vec<ChannelSection>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_str(&contents)
    }

    /// The engine channels this configuration declares.
    pub fn channels(&self) -> Vec<Channel> {
        self.channels.iter().map(ChannelSection::channel).collect()
    }

    fn validate(&self) -> Result<()> {
        let mut by_port: HashMap<u16, Vec<&str>> = HashMap::new();
        for (index, channel) in self.channels.iter().enumerate() {
            if channel.name.is_empty() {
                return Err(ConfigError::UnnamedChannel { index });
            }
            // Port 0 binds an ephemeral port, so several channels may use it.
            if channel.source.port != 0 {
                by_port
                    .entry(channel.source.port)
                    .or_default()
                    .push(&channel.name);
            }
        }
        for (port, channels) in by_port {
            if channels.len() > 1 {
                return Err(ConfigError::DuplicatePort {
                    port,
                    channels: channels.join(", "),
                });
            }
        }
        Ok(())
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}
