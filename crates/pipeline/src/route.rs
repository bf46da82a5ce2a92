//! Route pipeline executor
//!
//! Runs every route of a channel concurrently and aggregates success with a
//! logical AND: all routes always execute, one filtered or failed route
//! only marks the message as not fully routed.
//!
//! A route (or a forward step) with a queue defers its work: the push is
//! the success, delivery happens on the queue's worker under its retry
//! policy.

use std::sync::Arc;

use hermes_channel::{Channel, FlowKind, ForwardConfig, MessageContext, Route};
use hermes_protocol::{build_ack, AckConfig, Message};
use hermes_transport::MllpClient;
use tokio::task::JoinSet;

use crate::engine::{forward_queue_name, route_queue_name, Shared};

/// How one route's step walk ended.
#[derive(Debug)]
pub(crate) enum FlowOutcome {
    /// Every step ran and succeeded; carries the final working message.
    Completed(Message),
    /// A filter predicate stopped the walk.
    Filtered,
    /// Every step ran but a store did not persist. The route is not fully
    /// succeeded; there is nothing left to retry.
    StoreFailed,
    /// A step failed (forward error, missing queue).
    Failed,
}

/// Run every route; true only if all of them fully succeeded.
pub(crate) async fn run_routes(
    shared: &Arc<Shared>,
    channel: &Arc<Channel>,
    message: &Message,
    context: &MessageContext,
) -> bool {
    let mut tasks = JoinSet::new();
    for route in &channel.routes {
        let shared = Arc::clone(shared);
        let channel = Arc::clone(channel);
        let route = route.clone();
        let message = message.clone();
        let context = context.clone();
        tasks.spawn(async move { run_route(&shared, &channel, &route, message, &context).await });
    }

    let mut all_succeeded = true;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(succeeded) => all_succeeded &= succeeded,
            Err(error) => {
                tracing::error!(channel = %channel.name, %error, "route task panicked");
                all_succeeded = false;
            }
        }
    }
    all_succeeded
}

/// Run one route to a success boolean.
///
/// A queued route returns true as soon as the message is accepted by its
/// queue; a filtered route returns false without being an error.
pub(crate) async fn run_route(
    shared: &Arc<Shared>,
    channel: &Arc<Channel>,
    route: &Route,
    message: Message,
    context: &MessageContext,
) -> bool {
    let route_id = route.id.as_deref().unwrap_or_default();

    if route.queue.is_some() {
        let name = route_queue_name(channel.id_str(), route_id);
        let Some(queue) = shared.queues.get(&name) else {
            tracing::error!(queue = %name, "route queue was never declared");
            return false;
        };
        return match queue.push(None, message).await {
            Ok(task) => {
                tracing::debug!(queue = %name, task = %task, "route deferred to queue");
                true
            }
            Err(error) => {
                tracing::error!(queue = %name, %error, "failed to queue route");
                false
            }
        };
    }

    let context = context.with_route(route_id);
    matches!(
        run_flows(shared, channel, route, message, &context).await,
        FlowOutcome::Completed(_)
    )
}

/// Walk a route's steps in order against the working message.
pub(crate) async fn run_flows(
    shared: &Arc<Shared>,
    channel: &Arc<Channel>,
    route: &Route,
    mut message: Message,
    context: &MessageContext,
) -> FlowOutcome {
    let route_id = route.id.as_deref().unwrap_or_default();
    let mut store_failed = false;

    for (index, step) in route.flows.iter().enumerate() {
        let flow = step.id.as_deref().unwrap_or_default();

        match &step.kind {
            FlowKind::Filter(predicate) => {
                if !predicate(&message, context) {
                    tracing::debug!(
                        channel = %channel.name,
                        route = %route_id,
                        flow = %flow,
                        message = %context.message_id(),
                        "message filtered"
                    );
                    return FlowOutcome::Filtered;
                }
            }
            FlowKind::Transform(transform) => {
                if channel.verbose {
                    tracing::trace!(channel = %channel.name, flow = %flow, before = %message, "transforming");
                }
                message = transform(message, context);
                if channel.verbose {
                    tracing::trace!(channel = %channel.name, flow = %flow, after = %message, "transformed");
                }
            }
            // A store failure does not stop the walk, but it does cost the
            // route its fully-succeeded status.
            FlowKind::Store(config) => match shared.stores.persist(config, &message).await {
                Ok(true) => {
                    tracing::debug!(channel = %channel.name, route = %route_id, flow = %flow, "message persisted");
                }
                Ok(false) => {
                    tracing::warn!(channel = %channel.name, route = %route_id, flow = %flow, "store declined the message");
                    store_failed = true;
                }
                Err(error) => {
                    tracing::error!(channel = %channel.name, route = %route_id, flow = %flow, %error, "persistence failed");
                    store_failed = true;
                }
            },
            FlowKind::Forward(config) => {
                if step.queue.is_some() {
                    let name = forward_queue_name(channel.id_str(), flow, index);
                    let Some(queue) = shared.queues.get(&name) else {
                        tracing::error!(queue = %name, "forward queue was never declared");
                        return FlowOutcome::Failed;
                    };
                    match queue.push(None, message.clone()).await {
                        Ok(task) => {
                            tracing::debug!(queue = %name, task = %task, "forward deferred to queue");
                        }
                        Err(error) => {
                            tracing::error!(queue = %name, %error, "failed to queue forward");
                            return FlowOutcome::Failed;
                        }
                    }
                    // Later steps still need a working value; stand in a
                    // placeholder ack for the reply that will arrive on
                    // the queue's schedule.
                    message = queued_placeholder(&message);
                } else {
                    match forward(config, &message).await {
                        Ok(reply) => message = reply,
                        Err(error) => {
                            tracing::error!(
                                channel = %channel.name,
                                route = %route_id,
                                flow = %flow,
                                destination = %config.address(),
                                %error,
                                "forward failed"
                            );
                            return FlowOutcome::Failed;
                        }
                    }
                }
            }
        }
    }

    if store_failed {
        FlowOutcome::StoreFailed
    } else {
        FlowOutcome::Completed(message)
    }
}

/// Send one message to a downstream endpoint and return its reply.
pub(crate) async fn forward(
    config: &ForwardConfig,
    message: &Message,
) -> hermes_transport::Result<Message> {
    let mut client = MllpClient::connect(config.address(), config.delimiters).await?;
    client.send(message, config.response_timeout).await
}

/// The stand-in acknowledgment for a queued forward or queued source.
pub(crate) fn queued_placeholder(message: &Message) -> Message {
    let config = AckConfig {
        text: Some("Queued".into()),
        ..Default::default()
    };
    build_ack(message, &config, false)
}
