//! Relay connection
//!
//! Registers with the relay, feeds every received link into the request queue
//! and writes results back in the order the links arrived. Reconnects after a
//! fixed delay whenever the session ends.

use crate::error::WorkerError;
use crate::queue::{RequestQueue, ResolveResult};
use crate::resolver::ResolveError;
use futures_util::{SinkExt, StreamExt};
use owndl_core::protocol::{registration_message, ResultMessage};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Error text for links the resolver found nothing for.
pub const CONTENT_NOT_FOUND: &str = "Content wasn't found";
/// Error text for failed resolutions.
pub const PROCESSING_FAILED: &str = "Error processing request";

/// Converts a queue outcome into the message sent back to the relay.
#[must_use]
pub fn result_message(result: ResolveResult) -> ResultMessage {
    match result {
        Ok(items) => ResultMessage::media(&items),
        Err(ResolveError::NoMedia) => ResultMessage::Error {
            error: CONTENT_NOT_FOUND.to_string(),
            details: None,
        },
        Err(e) => ResultMessage::Error {
            error: PROCESSING_FAILED.to_string(),
            details: Some(e.to_string()),
        },
    }
}

/// Worker side of the relay channel.
pub struct WorkerConnection {
    url: String,
    platform: String,
    queue: RequestQueue,
    reconnect_delay: Duration,
}

impl WorkerConnection {
    /// Create a connection for `platform` to the relay at `url`.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        platform: impl Into<String>,
        queue: RequestQueue,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            url: url.into(),
            platform: platform.into(),
            queue,
            reconnect_delay,
        }
    }

    /// Runs sessions until `shutdown` is cancelled, reconnecting in between.
    pub async fn run(&self, shutdown: CancellationToken) {
        loop {
            match self.session(&shutdown).await {
                Ok(()) => info!(url = %self.url, "Disconnected from relay"),
                Err(e) => warn!(url = %self.url, error = %e, "Relay session failed"),
            }

            if shutdown.is_cancelled() {
                break;
            }

            info!(
                delay_secs = self.reconnect_delay.as_secs(),
                "Reconnecting to relay after delay"
            );
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }
        info!("Worker connection stopped");
    }

    /// One connected session: register, then serve links until the relay
    /// goes away.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError` on connect, read, write or encode failures.
    pub async fn session(&self, shutdown: &CancellationToken) -> Result<(), WorkerError> {
        let (ws_stream, _) = connect_async(self.url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();

        write
            .send(Message::Text(registration_message(&self.platform).into()))
            .await?;
        info!(url = %self.url, platform = %self.platform, "Connected to relay");

        let (pending_tx, mut pending_rx) =
            mpsc::unbounded_channel::<(String, oneshot::Receiver<ResolveResult>)>();

        let reader = async {
            while let Some(frame) = read.next().await {
                match frame? {
                    Message::Text(text) => {
                        let link = text.as_str().trim().to_string();
                        if link.is_empty() {
                            continue;
                        }
                        info!(link = %link, "Received link");
                        let receiver = self.queue.enqueue(link.clone());
                        if pending_tx.send((link, receiver)).is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Ok::<(), WorkerError>(())
        };

        let forwarder = async {
            while let Some((link, receiver)) = pending_rx.recv().await {
                let result = receiver.await.unwrap_or(Err(ResolveError::QueueClosed));
                let payload = serde_json::to_string(&result_message(result))?;
                debug!(link = %link, bytes = payload.len(), "Sending result");
                write.send(Message::Text(payload.into())).await?;
            }
            Ok::<(), WorkerError>(())
        };

        tokio::select! {
            result = reader => result,
            result = forwarder => result,
            () = shutdown.cancelled() => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use owndl_core::protocol::{MediaItem, MediaSource};

    #[test]
    fn test_result_message_mapping() {
        let ok = result_message(Ok(vec![MediaItem::Photo(MediaSource::Remote(
            "https://img/1.jpg".to_string(),
        ))]));
        assert!(matches!(ok, ResultMessage::Media { ref media } if media.len() == 1));

        let not_found = result_message(Err(ResolveError::NoMedia));
        assert_eq!(
            not_found,
            ResultMessage::Error {
                error: CONTENT_NOT_FOUND.to_string(),
                details: None,
            }
        );

        let failed = result_message(Err(ResolveError::Status(500)));
        assert_eq!(
            failed,
            ResultMessage::Error {
                error: PROCESSING_FAILED.to_string(),
                details: Some("Resolver returned status 500".to_string()),
            }
        );
    }
}
