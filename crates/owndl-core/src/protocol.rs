//! Relay/worker wire protocol
//!
//! Registration handshake, dispatch payloads and worker result messages.
//! Worker replies are decoded once into [`WorkerReply`] and never re-parsed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

/// Prefix of the registration message a worker sends first.
pub const REGISTRATION_PREFIX: &str = "platform:";
/// URL scheme workers use for files written to the shared download folder.
pub const LOCAL_FILE_SCHEME: &str = "file://";

/// Protocol violations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// First message was not a valid `platform:<name>` registration.
    #[error("Invalid registration: {0}")]
    InvalidRegistration(String),
    /// Reply was not valid JSON or had an unusable shape.
    #[error("Malformed reply: {0}")]
    Malformed(String),
}

/// Parses a registration message into a lower-cased platform tag.
///
/// # Errors
///
/// Returns `ProtocolError::InvalidRegistration` if the prefix is missing or
/// the platform name is empty.
pub fn parse_registration(message: &str) -> Result<String, ProtocolError> {
    let trimmed = message.trim();
    let head = trimmed.get(..REGISTRATION_PREFIX.len()).unwrap_or_default();
    if !head.eq_ignore_ascii_case(REGISTRATION_PREFIX) {
        return Err(ProtocolError::InvalidRegistration(truncate_for_log(trimmed)));
    }

    let name = trimmed[REGISTRATION_PREFIX.len()..]
        .split(':')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();

    if name.is_empty() {
        return Err(ProtocolError::InvalidRegistration(truncate_for_log(trimmed)));
    }
    Ok(name)
}

/// Builds the registration message for `platform`.
#[must_use]
pub fn registration_message(platform: &str) -> String {
    format!("{REGISTRATION_PREFIX}{platform}")
}

fn truncate_for_log(s: &str) -> String {
    s.chars().take(64).collect()
}

/// Where a media item's bytes live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// Publicly fetchable URL.
    Remote(String),
    /// File in the shared download folder.
    Local(PathBuf),
}

impl MediaSource {
    /// Classifies a worker URL; `file://` URLs become local paths.
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        let head = url.get(..LOCAL_FILE_SCHEME.len()).unwrap_or_default();
        if head.eq_ignore_ascii_case(LOCAL_FILE_SCHEME) {
            Self::Local(PathBuf::from(&url[LOCAL_FILE_SCHEME.len()..]))
        } else {
            Self::Remote(url.to_string())
        }
    }

    /// Returns the local path for local sources.
    #[must_use]
    pub fn local_path(&self) -> Option<&PathBuf> {
        match self {
            Self::Local(path) => Some(path),
            Self::Remote(_) => None,
        }
    }

    /// Renders the source back into its wire URL.
    #[must_use]
    pub fn to_url(&self) -> String {
        match self {
            Self::Remote(url) => url.clone(),
            Self::Local(path) => format!("{LOCAL_FILE_SCHEME}{}", path.display()),
        }
    }
}

/// A decoded media or text item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaItem {
    /// Still image.
    Photo(MediaSource),
    /// Video clip.
    Video(MediaSource),
    /// Free text accompanying the media.
    Text(String),
}

impl MediaItem {
    /// Returns the source for photo and video items.
    #[must_use]
    pub const fn source(&self) -> Option<&MediaSource> {
        match self {
            Self::Photo(source) | Self::Video(source) => Some(source),
            Self::Text(_) => None,
        }
    }
}

/// Wire form of a media element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireMedia {
    /// `{"type":"photo","url":...}`
    Photo {
        /// Remote or `file://` URL
        url: String,
    },
    /// `{"type":"video","url":...}`
    Video {
        /// Remote or `file://` URL
        url: String,
    },
    /// `{"type":"text","content":...}`
    Text {
        /// Text body
        content: String,
    },
}

impl From<&MediaItem> for WireMedia {
    fn from(item: &MediaItem) -> Self {
        match item {
            MediaItem::Photo(source) => Self::Photo {
                url: source.to_url(),
            },
            MediaItem::Video(source) => Self::Video {
                url: source.to_url(),
            },
            MediaItem::Text(content) => Self::Text {
                content: content.clone(),
            },
        }
    }
}

impl WireMedia {
    fn into_item(self) -> Option<MediaItem> {
        match self {
            Self::Photo { url } if !url.is_empty() => {
                Some(MediaItem::Photo(MediaSource::from_url(&url)))
            }
            Self::Video { url } if !url.is_empty() => {
                Some(MediaItem::Video(MediaSource::from_url(&url)))
            }
            Self::Text { content } => Some(MediaItem::Text(content)),
            _ => None,
        }
    }
}

/// Result message a worker sends back for one dispatched link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultMessage {
    /// Resolved media.
    Media {
        /// Items in delivery order
        media: Vec<WireMedia>,
    },
    /// Resolution failure.
    Error {
        /// User-facing message
        error: String,
        /// Diagnostic details, logged only
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
}

impl ResultMessage {
    /// Builds a media result from decoded items.
    #[must_use]
    pub fn media(items: &[MediaItem]) -> Self {
        Self::Media {
            media: items.iter().map(WireMedia::from).collect(),
        }
    }
}

/// A worker reply, decoded exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerReply {
    /// Media batch to assemble.
    Media(Vec<MediaItem>),
    /// Failure to relay verbatim to the chat.
    Error {
        /// Message shown to the user
        message: String,
        /// Optional diagnostic details
        details: Option<String>,
    },
    /// Valid JSON of an unknown shape.
    Unsupported,
}

/// Decodes a raw worker reply.
///
/// Unknown media element types and elements missing their field are skipped.
///
/// # Errors
///
/// Returns `ProtocolError::Malformed` for invalid JSON or a non-string
/// `error` field.
pub fn decode_reply(raw: &str) -> Result<WorkerReply, ProtocolError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let Value::Object(mut fields) = value else {
        return Ok(WorkerReply::Unsupported);
    };

    if let Some(Value::Array(elements)) = fields.remove("media") {
        let items = elements
            .into_iter()
            .filter_map(|element| match serde_json::from_value::<WireMedia>(element) {
                Ok(wire) => wire.into_item(),
                Err(e) => {
                    debug!(error = %e, "Skipping unusable media element");
                    None
                }
            })
            .collect();
        return Ok(WorkerReply::Media(items));
    }

    match fields.remove("error") {
        Some(Value::String(message)) => {
            let details = match fields.remove("details") {
                Some(Value::String(s)) => Some(s),
                Some(Value::Null) | None => None,
                Some(other) => Some(other.to_string()),
            };
            Ok(WorkerReply::Error { message, details })
        }
        Some(other) => Err(ProtocolError::Malformed(format!(
            "error field is not a string: {other}"
        ))),
        None => Ok(WorkerReply::Unsupported),
    }
}
