//! Response protocol handler
//!
//! Decodes one worker reply and routes it to the assembly engine or the
//! error path. The relay never retries.

use crate::assembly::{AssemblyReport, MediaAssembler};
use crate::delivery::ChatDelivery;
use crate::protocol::{decode_reply, WorkerReply};
use crate::registry::{ConnectionId, ConnectionRegistry};
use std::sync::Arc;
use tracing::{error, info, warn};

/// What happened to a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Media or text was handed to the assembly engine.
    Delivered(AssemblyReport),
    /// An error reply was relayed to the chat.
    ErrorRelayed,
    /// Valid JSON of an unknown shape; ignored.
    Unsupported,
    /// No chat context is recorded for the connection; reply discarded.
    Undeliverable,
    /// The payload could not be decoded; reply discarded.
    Malformed,
}

/// Handles replies arriving on worker connections.
pub struct ResponseHandler {
    registry: Arc<ConnectionRegistry>,
    assembler: Arc<MediaAssembler>,
    delivery: Arc<dyn ChatDelivery>,
}

impl ResponseHandler {
    /// Create a handler.
    #[must_use]
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        assembler: Arc<MediaAssembler>,
        delivery: Arc<dyn ChatDelivery>,
    ) -> Self {
        Self {
            registry,
            assembler,
            delivery,
        }
    }

    /// Processes one raw reply from connection `id`.
    pub async fn handle(&self, id: ConnectionId, raw: &str) -> HandleOutcome {
        let reply = match decode_reply(raw) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(connection = %id, error = %e, "Failed to decode worker reply");
                return HandleOutcome::Malformed;
            }
        };

        if reply == WorkerReply::Unsupported {
            warn!(connection = %id, "Unsupported reply from worker");
            return HandleOutcome::Unsupported;
        }

        let Some(context) = self.registry.resolve(id).await else {
            warn!(connection = %id, "Reply without chat context, discarding");
            return HandleOutcome::Undeliverable;
        };

        match reply {
            WorkerReply::Media(items) => {
                info!(connection = %id, chat_id = context.chat_id, items = items.len(), "Media reply received");
                let report = self.assembler.deliver(&context, items).await;
                HandleOutcome::Delivered(report)
            }
            WorkerReply::Error { message, details } => {
                warn!(
                    connection = %id,
                    chat_id = context.chat_id,
                    details = details.as_deref().unwrap_or_default(),
                    "Worker reported error: {message}"
                );
                if let Err(e) = self.delivery.send_text(context.chat_id, &message).await {
                    error!(chat_id = context.chat_id, error = %e, "Failed to relay worker error");
                }
                HandleOutcome::ErrorRelayed
            }
            WorkerReply::Unsupported => HandleOutcome::Unsupported,
        }
    }
}
