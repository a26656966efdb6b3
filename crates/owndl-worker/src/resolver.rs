//! Third-party resolver client
//!
//! The resolver turns a post URL into direct media links. Responses are
//! expected as `{"data": {"images": [...], "play": "..."}}`.

use async_trait::async_trait;
use owndl_core::config::MAX_MEDIA_PER_GROUP;
use owndl_core::protocol::{MediaItem, MediaSource};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const RESOLVER_TIMEOUT_SECS: u64 = 30;

/// Resolution failures.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The HTTP request itself failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Non-success HTTP status.
    #[error("Resolver returned status {0}")]
    Status(u16),
    /// Body was empty or not the expected JSON.
    #[error("Invalid resolver payload: {0}")]
    InvalidPayload(String),
    /// The response carried neither images nor a playable URL.
    #[error("No usable media in resolver response")]
    NoMedia,
    /// The request queue stopped before answering.
    #[error("Request queue is closed")]
    QueueClosed,
}

/// Resolves a post URL into media items.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve one link.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError` if the call fails or yields no usable media.
    async fn resolve(&self, url: &str) -> Result<Vec<MediaItem>, ResolveError>;
}

/// Media fields of a resolver response.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ResolvedPayload {
    /// Slideshow image URLs.
    #[serde(default)]
    pub images: Vec<String>,
    /// Playable video URL.
    #[serde(default, alias = "play_url")]
    pub play: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    data: Option<ResolvedPayload>,
}

/// Maps a resolver payload to media items.
///
/// A non-empty image list wins over the playable URL and is capped at one
/// media group.
///
/// # Errors
///
/// Returns `ResolveError::NoMedia` when neither field is usable.
pub fn classify(payload: ResolvedPayload) -> Result<Vec<MediaItem>, ResolveError> {
    let images: Vec<MediaItem> = payload
        .images
        .into_iter()
        .filter(|url| !url.is_empty())
        .take(MAX_MEDIA_PER_GROUP)
        .map(|url| MediaItem::Photo(MediaSource::Remote(url)))
        .collect();
    if !images.is_empty() {
        return Ok(images);
    }

    match payload.play {
        Some(url) if !url.is_empty() => Ok(vec![MediaItem::Video(MediaSource::from_url(&url))]),
        _ => Err(ResolveError::NoMedia),
    }
}

/// Parses a raw resolver body.
///
/// # Errors
///
/// Returns `ResolveError::InvalidPayload` for empty or malformed bodies and
/// `ResolveError::NoMedia` when the payload has nothing usable.
pub fn parse_response(body: &str) -> Result<Vec<MediaItem>, ResolveError> {
    if body.trim().is_empty() {
        return Err(ResolveError::InvalidPayload("empty body".to_string()));
    }
    let envelope: Envelope =
        serde_json::from_str(body).map_err(|e| ResolveError::InvalidPayload(e.to_string()))?;
    let payload = envelope
        .data
        .ok_or_else(|| ResolveError::InvalidPayload("missing data field".to_string()))?;
    classify(payload)
}

/// HTTP resolver client.
pub struct HttpResolver {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpResolver {
    /// Create a client for `endpoint` with the default request timeout.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError::Http` if the HTTP client cannot be built.
    pub fn new(endpoint: &str) -> Result<Self, ResolveError> {
        Self::with_timeout(endpoint, Duration::from_secs(RESOLVER_TIMEOUT_SECS))
    }

    /// Create a client for `endpoint` whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError::Http` if the HTTP client cannot be built.
    pub fn with_timeout(endpoint: &str, timeout: Duration) -> Result<Self, ResolveError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl Resolver for HttpResolver {
    async fn resolve(&self, url: &str) -> Result<Vec<MediaItem>, ResolveError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("url", url)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        debug!(url, bytes = body.len(), "Resolver responded");
        parse_response(&body)
    }
}
