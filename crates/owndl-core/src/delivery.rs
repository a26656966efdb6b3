//! Chat delivery interface
//!
//! The assembly engine talks to the chat platform only through
//! [`ChatDelivery`].

use crate::protocol::MediaSource;
use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a delivery backend.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The platform rejected or failed the request.
    #[error("Delivery request failed: {0}")]
    Request(String),
    /// A remote media URL could not be parsed.
    #[error("Invalid media URL: {0}")]
    InvalidUrl(String),
    /// A local file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// "Working on it" indicator shown before a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatAction {
    /// Preparing a text reply
    Typing,
    /// Uploading photos
    UploadPhoto,
    /// Uploading a video
    UploadVideo,
}

/// Kind of an outbound media element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Still image
    Photo,
    /// Video clip
    Video,
}

/// One element of an outbound media group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMedia {
    /// Photo or video.
    pub kind: MediaKind,
    /// Remote URL or local file.
    pub source: MediaSource,
    /// Caption, only ever set on the first element of the first group.
    pub caption: Option<String>,
}

/// Chat platform client used for all outbound traffic.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatDelivery: Send + Sync {
    /// Sends a plain text message.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError` if the platform call fails.
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError>;

    /// Sends one media group and returns the number of delivered messages.
    ///
    /// Zero means the platform accepted the call but returned nothing.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError` if the platform call fails.
    async fn send_media_group(
        &self,
        chat_id: i64,
        media: Vec<OutboundMedia>,
    ) -> Result<usize, DeliveryError>;

    /// Shows a chat action indicator.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError` if the platform call fails.
    async fn send_chat_action(&self, chat_id: i64, action: ChatAction)
        -> Result<(), DeliveryError>;
}
