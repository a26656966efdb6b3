use thiserror::Error;

/// Errors that end a relay session.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Connecting, reading or writing the WebSocket failed.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    /// A result message could not be serialized.
    #[error("Failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),
}
