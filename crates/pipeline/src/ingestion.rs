//! Ingestion pipeline executor
//!
//! Walks a channel's ingestion steps in order against one inbound message,
//! carrying the filtered flag. Acks are handed to the caller's sink the
//! moment the ack step runs and fire even for a filtered message; a store
//! failure is logged and the walk continues. Filter, transform and store
//! steps are skipped once the message is filtered.

use std::sync::Arc;

use hermes_channel::{Channel, IngestKind, MessageContext};
use hermes_protocol::{build_ack, Message};

use crate::engine::Shared;

/// Result of one ingestion run.
#[derive(Debug)]
pub enum IngestOutcome {
    /// The message survived every step, possibly transformed.
    Message(Message),
    /// A filter predicate dropped the message; routing must not run.
    Filtered,
}

pub(crate) async fn run_ingestion(
    shared: &Arc<Shared>,
    channel: &Channel,
    mut message: Message,
    context: &MessageContext,
    ack_sink: &mut (dyn FnMut(Message) + Send),
) -> IngestOutcome {
    let mut filtered = false;

    for step in &channel.ingestion {
        let flow = step.id.as_deref().unwrap_or_default();

        match &step.kind {
            IngestKind::Ack(config) => {
                let ack = build_ack(&message, config, filtered);
                if channel.verbose {
                    tracing::debug!(
                        channel = %channel.name,
                        flow = %flow,
                        filtered,
                        "acknowledgment built"
                    );
                }
                ack_sink(ack);
            }
            IngestKind::Filter(predicate) => {
                if !filtered && !predicate(&message, context) {
                    filtered = true;
                    tracing::debug!(
                        channel = %channel.name,
                        flow = %flow,
                        message = %context.message_id(),
                        "message filtered"
                    );
                }
            }
            IngestKind::Transform(transform) => {
                if !filtered {
                    if channel.verbose {
                        tracing::trace!(channel = %channel.name, flow = %flow, before = %message, "transforming");
                    }
                    message = transform(message, context);
                    if channel.verbose {
                        tracing::trace!(channel = %channel.name, flow = %flow, after = %message, "transformed");
                    }
                }
            }
            IngestKind::Store(config) => {
                if !filtered {
                    match shared.stores.persist(config, &message).await {
                        Ok(true) => {
                            tracing::debug!(channel = %channel.name, flow = %flow, "message persisted");
                        }
                        Ok(false) => {
                            tracing::warn!(channel = %channel.name, flow = %flow, "store declined the message");
                        }
                        Err(error) => {
                            // Persistence failures do not stop ingestion.
                            tracing::error!(channel = %channel.name, flow = %flow, %error, "persistence failed");
                        }
                    }
                }
            }
        }
    }

    if filtered {
        IngestOutcome::Filtered
    } else {
        IngestOutcome::Message(message)
    }
}
