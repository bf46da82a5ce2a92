//! The engine: channel startup and per-message dispatch
//!
//! [`Engine::new`] normalizes and validates every channel, instantiates one
//! store backend per distinct configuration, and declares every queue the
//! channels name (source, route, forward). Declaring happens exactly once;
//! two channels claiming the same queue name is a startup error.
//!
//! [`Engine::start`] then binds one MLLP listener per channel. Each inbound
//! message runs ingestion on the connection task (the ack written back
//! comes out of the ack step) while routing continues in the background,
//! so a slow downstream never stalls the source connection.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use hermes_channel::{Channel, FlowKind, MessageContext, SourceKind, VariableStore};
use hermes_protocol::Message;
use hermes_queue::{IdExtractor, ProcessFn, QueueRegistry, TaskCodec};
use hermes_store::StoreRegistry;
use hermes_transport::{MessageHandler, MllpServer, MllpServerConfig};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::ingestion::{run_ingestion, IngestOutcome};
use crate::route::{forward, queued_placeholder, run_flows, run_routes, FlowOutcome};

/// The per-process registries every executor works against.
pub(crate) struct Shared {
    pub(crate) stores: StoreRegistry,
    pub(crate) queues: QueueRegistry<Message>,
    pub(crate) variables: VariableStore,
}

pub(crate) fn source_queue_name(channel_id: &str) -> String {
    format!("{channel_id}.source")
}

pub(crate) fn route_queue_name(channel_id: &str, route_id: &str) -> String {
    format!("{channel_id}.route.{route_id}")
}

pub(crate) fn forward_queue_name(channel_id: &str, flow_id: &str, index: usize) -> String {
    format!("{channel_id}.{flow_id}.tcp.{index}")
}

/// The durable form of a queued message is its wire text.
fn message_codec() -> TaskCodec<Message> {
    TaskCodec::new(
        |message: &Message| message.to_string(),
        |text| Message::parse(text).ok(),
    )
}

/// Queue task ids come from the message's control id when it has one.
fn control_id_extractor() -> IdExtractor<Message> {
    Arc::new(|message: &Message| message.control_id().map(String::from))
}

fn message_id_of(message: &Message) -> String {
    message
        .control_id()
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Outcome of one full pipeline run (ingestion plus routes).
pub(crate) struct Processed {
    /// The ack built by the ingestion ack step, if the channel has one.
    pub(crate) ack: Option<Message>,
    /// True when the message finished: fully routed, or filtered. False
    /// means at least one route did not complete.
    pub(crate) done: bool,
}

/// Run ingestion and then all routes, awaiting route completion.
///
/// Used by the source-queue worker, where the boolean gates the retry
/// policy: a filtered message is finished work, not a failure.
pub(crate) async fn process_message(
    shared: &Arc<Shared>,
    channel: &Arc<Channel>,
    message: Message,
) -> Processed {
    let message_id = message_id_of(&message);
    let context = MessageContext::new(&shared.variables, channel.id_str(), &message_id);

    let mut ack = None;
    match run_ingestion(shared, channel, message, &context, &mut |a| ack = Some(a)).await {
        IngestOutcome::Filtered => Processed { ack, done: true },
        IngestOutcome::Message(message) => {
            let done = run_routes(shared, channel, &message, &context).await;
            if !done {
                tracing::warn!(
                    channel = %channel.name,
                    message = %message_id,
                    "one or more routes did not complete"
                );
            } else if channel.verbose {
                tracing::debug!(channel = %channel.name, message = %message_id, "message routed");
            }
            Processed { ack, done }
        }
    }
}

/// Per-channel connection handler: parse, ingest, reply, route.
struct ChannelHandler {
    shared: Arc<Shared>,
    channel: Arc<Channel>,
}

#[async_trait]
impl MessageHandler for ChannelHandler {
    async fn handle(&self, payload: Bytes, peer: SocketAddr) -> Option<Message> {
        let text = String::from_utf8_lossy(&payload);
        let message = match Message::parse(&text) {
            Ok(message) => message,
            Err(error) => {
                // Keep the connection; only this message is lost.
                tracing::error!(
                    channel = %self.channel.name,
                    peer = %peer,
                    %error,
                    "inbound message failed to parse"
                );
                return None;
            }
        };

        if self.channel.verbose {
            tracing::debug!(
                channel = %self.channel.name,
                peer = %peer,
                control_id = ?message.control_id(),
                "message received"
            );
        }

        // With an inbound queue the connection only accepts: the ack says
        // queued, and the queue worker ingests and routes later.
        if self.channel.source.queue.is_some() {
            let name = source_queue_name(self.channel.id_str());
            let Some(queue) = self.shared.queues.get(&name) else {
                tracing::error!(queue = %name, "source queue was never declared");
                return None;
            };
            return match queue.push(None, message.clone()).await {
                Ok(_) => Some(queued_placeholder(&message)),
                Err(error) => {
                    tracing::error!(queue = %name, %error, "failed to queue inbound message");
                    None
                }
            };
        }

        let message_id = message_id_of(&message);
        let context = MessageContext::new(&self.shared.variables, self.channel.id_str(), &message_id);

        let mut ack = None;
        let outcome = run_ingestion(
            &self.shared,
            &self.channel,
            message,
            &context,
            &mut |a| ack = Some(a),
        )
        .await;

        match outcome {
            IngestOutcome::Filtered => ack,
            IngestOutcome::Message(message) => {
                // Routes run behind the reply so the source is never held
                // hostage by a downstream.
                let shared = Arc::clone(&self.shared);
                let channel = Arc::clone(&self.channel);
                tokio::spawn(async move {
                    let routed = run_routes(&shared, &channel, &message, &context).await;
                    if !routed {
                        tracing::warn!(
                            channel = %channel.name,
                            message = %message_id,
                            "one or more routes did not complete"
                        );
                    } else if channel.verbose {
                        tracing::debug!(channel = %channel.name, message = %message_id, "message routed");
                    }
                });
                ack
            }
        }
    }
}

/// The running integration engine.
pub struct Engine {
    channels: Vec<Arc<Channel>>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
}

impl Engine {
    /// Build an engine from channel definitions.
    ///
    /// Channels are normalized (missing ids backfilled) and validated; a
    /// channel with an unsupported source is logged and dropped without
    /// affecting its siblings. Store backends and queues are created here,
    /// so a durable queue's leftover tasks start draining immediately.
    pub fn new(channels: Vec<Channel>) -> Result<Self> {
        let mut kept = Vec::new();
        for channel in channels {
            let channel = channel.normalized();
            if let Err(error) = channel.validate() {
                tracing::error!(channel = %channel.name, %error, "channel rejected");
                continue;
            }
            kept.push(Arc::new(channel));
        }

        let stores = StoreRegistry::init(kept.iter().flat_map(|c| c.store_configs()))?;
        let shared = Arc::new(Shared {
            stores,
            queues: QueueRegistry::new(),
            variables: VariableStore::new(),
        });

        let engine = Self {
            channels: kept,
            shared,
            cancel: CancellationToken::new(),
        };
        engine.declare_queues()?;
        Ok(engine)
    }

    /// Ids of the channels the engine accepted.
    pub fn channel_ids(&self) -> Vec<String> {
        self.channels
            .iter()
            .map(|c| c.id_str().to_string())
            .collect()
    }

    /// Token cancelled by [`shutdown`](Self::shutdown).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Bind one listener per channel.
    ///
    /// Returns the bound address per channel id (meaningful when a channel
    /// binds port 0). Listeners run until [`shutdown`](Self::shutdown).
    pub async fn start(&self) -> Result<HashMap<String, SocketAddr>> {
        let mut bound = HashMap::new();

        for channel in &self.channels {
            // validate() already rejected everything else.
            let SourceKind::Tcp(tcp) = &channel.source.kind else {
                continue;
            };

            let config = MllpServerConfig::new(channel.id_str(), &tcp.host, tcp.port)
                .with_delimiters(tcp.delimiters);
            let handler = Arc::new(ChannelHandler {
                shared: Arc::clone(&self.shared),
                channel: Arc::clone(channel),
            });
            let server = MllpServer::new(config, handler);

            let (tx, rx) = tokio::sync::oneshot::channel();
            let cancel = self.cancel.clone();
            let name = channel.name.clone();
            tokio::spawn(async move {
                if let Err(error) = server.run_with_bound_addr(cancel, tx).await {
                    tracing::error!(channel = %name, %error, "listener failed");
                }
            });

            let addr = rx.await.map_err(|_| PipelineError::ListenerFailed {
                channel: channel.id_str().to_string(),
            })?;
            bound.insert(channel.id_str().to_string(), addr);
        }

        Ok(bound)
    }

    /// Stop every listener and queue worker.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.shared.queues.shutdown().await;
        tracing::info!("engine stopped");
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    fn declare_queues(&self) -> Result<()> {
        for channel in &self.channels {
            if let Some(settings) = &channel.source.queue {
                let name = source_queue_name(channel.id_str());
                let shared = Arc::clone(&self.shared);
                let chan = Arc::clone(channel);
                let process: ProcessFn<Message> = Arc::new(move |message| {
                    let shared = Arc::clone(&shared);
                    let chan = Arc::clone(&chan);
                    Box::pin(async move { process_message(&shared, &chan, message).await.done })
                });
                self.shared.queues.declare(
                    name,
                    settings.clone(),
                    message_codec(),
                    Some(control_id_extractor()),
                    process,
                )?;
            }

            for route in &channel.routes {
                if let Some(settings) = &route.queue {
                    let route_id = route.id.as_deref().unwrap_or_default();
                    let name = route_queue_name(channel.id_str(), route_id);
                    let shared = Arc::clone(&self.shared);
                    let chan = Arc::clone(channel);
                    let rt = route.clone();
                    let process: ProcessFn<Message> = Arc::new(move |message| {
                        let shared = Arc::clone(&shared);
                        let chan = Arc::clone(&chan);
                        let rt = rt.clone();
                        Box::pin(async move {
                            let context =
                                MessageContext::new(&shared.variables, chan.id_str(), message_id_of(&message))
                                    .with_route(rt.id.as_deref().unwrap_or_default());
                            // Filtered messages and failed stores are
                            // finished work; only a failed forward or a
                            // missing queue earns a retry.
                            !matches!(
                                run_flows(&shared, &chan, &rt, message, &context).await,
                                FlowOutcome::Failed
                            )
                        })
                    });
                    self.shared.queues.declare(
                        name,
                        settings.clone(),
                        message_codec(),
                        Some(control_id_extractor()),
                        process,
                    )?;
                }

                for (index, step) in route.flows.iter().enumerate() {
                    let Some(settings) = &step.queue else {
                        continue;
                    };
                    let flow_id = step.id.as_deref().unwrap_or_default();
                    match &step.kind {
                        FlowKind::Forward(config) => {
                            let name = forward_queue_name(channel.id_str(), flow_id, index);
                            let config = config.clone();
                            let process: ProcessFn<Message> = Arc::new(move |message| {
                                let config = config.clone();
                                Box::pin(async move {
                                    match forward(&config, &message).await {
                                        Ok(_) => true,
                                        Err(error) => {
                                            tracing::warn!(
                                                destination = %config.address(),
                                                %error,
                                                "queued forward failed"
                                            );
                                            false
                                        }
                                    }
                                })
                            });
                            self.shared.queues.declare(
                                name,
                                settings.clone(),
                                message_codec(),
                                Some(control_id_extractor()),
                                process,
                            )?;
                        }
                        _ => {
                            tracing::warn!(
                                channel = %channel.name,
                                flow = %flow_id,
                                "queue setting on a non-forward step is ignored"
                            );
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
