//! Dispatch router
//!
//! Hands an extracted link to the worker registered for its platform.

use crate::error::RelayError;
use crate::links::ExtractedLink;
use crate::registry::{ChatContext, ConnectionId, ConnectionRegistry};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of a dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The link was queued for this connection.
    Sent(ConnectionId),
    /// No open worker serves the platform; the link was dropped.
    NoWorker,
}

/// Routes links to registered workers.
pub struct DispatchRouter {
    registry: Arc<ConnectionRegistry>,
}

impl DispatchRouter {
    /// Create a router over `registry`.
    #[must_use]
    pub const fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Sends `link` to the first open worker for its platform.
    ///
    /// The chat context is recorded before the link is sent, replacing any
    /// context still pending on that connection.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::ConnectionGone` if the selected worker disappeared
    /// between lookup and send.
    pub async fn dispatch(
        &self,
        link: &ExtractedLink,
        context: ChatContext,
    ) -> Result<DispatchOutcome, RelayError> {
        let platform = link.platform.tag();

        let Some(id) = self.registry.lookup(platform).await else {
            info!(platform, url = %link.url, "No worker registered for platform, dropping link");
            return Ok(DispatchOutcome::NoWorker);
        };

        let chat_id = context.chat_id;
        if !self.registry.record_context(id, context).await {
            return Err(RelayError::ConnectionGone(id));
        }
        self.registry.send(id, link.url.clone()).await?;

        debug!(connection = %id, chat_id, platform, "Link dispatched");
        Ok(DispatchOutcome::Sent(id))
    }
}
