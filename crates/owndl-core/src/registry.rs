//! Connection registry
//!
//! Tracks every registered worker connection, its platform, its outbound
//! channel and the chat context it is currently resolving. All state lives in
//! one private table behind a single lock.

use crate::error::RelayError;
use crate::protocol::{parse_registration, ProtocolError};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

/// Opaque, monotonically increasing connection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Chat a worker is currently resolving a link for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatContext {
    /// Destination chat.
    pub chat_id: i64,
    /// Display name used in the attribution signature.
    pub sender: String,
    /// Id of the message that carried the link.
    pub message_id: i32,
}

/// Channel feeding a connection's writer task.
pub type Outbound = mpsc::UnboundedSender<String>;

struct WorkerEntry {
    platform: String,
    outbound: Outbound,
    context: Option<ChatContext>,
}

/// Registry of connected workers.
///
/// Ids are allocated in increasing order, so iterating the table yields
/// connections in registration order.
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    workers: RwLock<BTreeMap<ConnectionId, WorkerEntry>>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            workers: RwLock::new(BTreeMap::new()),
        }
    }

    /// Registers a worker from its first message.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::InvalidRegistration` for a malformed message;
    /// nothing is stored in that case.
    pub async fn register(
        &self,
        registration: &str,
        outbound: Outbound,
    ) -> Result<ConnectionId, ProtocolError> {
        let platform = parse_registration(registration)?;
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));

        {
            let mut workers = self.workers.write().await;
            workers.insert(
                id,
                WorkerEntry {
                    platform: platform.clone(),
                    outbound,
                    context: None,
                },
            );
        }

        info!(connection = %id, platform = %platform, "Worker registered");
        Ok(id)
    }

    /// Overwrites the chat context of a connection.
    ///
    /// Returns `false` if the connection is not registered.
    pub async fn record_context(&self, id: ConnectionId, context: ChatContext) -> bool {
        let mut workers = self.workers.write().await;
        match workers.get_mut(&id) {
            Some(entry) => {
                if let Some(previous) = entry.context.replace(context) {
                    debug!(
                        connection = %id,
                        previous_chat_id = previous.chat_id,
                        "Overwriting pending chat context"
                    );
                }
                true
            }
            None => false,
        }
    }

    /// Returns the first open connection registered for `platform`.
    pub async fn lookup(&self, platform: &str) -> Option<ConnectionId> {
        let workers = self.workers.read().await;
        workers
            .iter()
            .find(|(_, entry)| entry.platform == platform && !entry.outbound.is_closed())
            .map(|(id, _)| *id)
    }

    /// Returns the chat context of a connection.
    pub async fn resolve(&self, id: ConnectionId) -> Option<ChatContext> {
        let workers = self.workers.read().await;
        workers.get(&id).and_then(|entry| entry.context.clone())
    }

    /// Returns the platform a connection registered with.
    pub async fn platform(&self, id: ConnectionId) -> Option<String> {
        let workers = self.workers.read().await;
        workers.get(&id).map(|entry| entry.platform.clone())
    }

    /// Queues a text frame for a connection's writer.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::ConnectionGone` if the connection is unknown or its
    /// writer has stopped.
    pub async fn send(&self, id: ConnectionId, payload: String) -> Result<(), RelayError> {
        let workers = self.workers.read().await;
        let entry = workers.get(&id).ok_or(RelayError::ConnectionGone(id))?;
        entry
            .outbound
            .send(payload)
            .map_err(|_| RelayError::ConnectionGone(id))
    }

    /// Removes a connection and all its state.
    ///
    /// Returns the platform it was registered for.
    pub async fn remove(&self, id: ConnectionId) -> Option<String> {
        let removed = {
            let mut workers = self.workers.write().await;
            workers.remove(&id)
        };

        removed.map(|entry| {
            info!(connection = %id, platform = %entry.platform, "Worker removed");
            entry.platform
        })
    }

    /// Number of registered connections.
    pub async fn len(&self) -> usize {
        self.workers.read().await.len()
    }

    /// Returns `true` when no worker is registered.
    pub async fn is_empty(&self) -> bool {
        self.workers.read().await.is_empty()
    }
}
