use crate::protocol::ProtocolError;
use crate::registry::ConnectionId;
use thiserror::Error;

/// Errors raised by the relay endpoint and registry.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Socket level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Target connection is no longer registered or its writer has stopped.
    #[error("Connection {0} is gone")]
    ConnectionGone(ConnectionId),
    /// Worker broke the protocol.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
