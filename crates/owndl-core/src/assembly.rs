//! Media assembly engine
//!
//! Turns a decoded worker reply into chat deliveries: media groups capped at
//! the surface limits, one attribution caption on the very first item, text
//! overflow sent after the media, and cleanup of local files once their group
//! was delivered.

use crate::config::DeliveryLimits;
use crate::delivery::{ChatAction, ChatDelivery, MediaKind, OutboundMedia};
use crate::preferences::PreferenceStore;
use crate::protocol::{MediaItem, MediaSource};
use crate::registry::ChatContext;
use crate::utils::{file_name, remove_file_if_exists, split_caption, split_text};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Notice sent when local files arrive but only the official API is available.
pub const LOCAL_UPLOAD_UNAVAILABLE: &str =
    "Error: Downloading this content is not possible without a local Telegram server.";

/// Notice sent for a local file that vanished before delivery.
#[must_use]
pub fn file_not_found_notice(name: &str) -> String {
    format!("Error: File not found: {name}")
}

/// Builds the attribution text for a delivery.
///
/// Text and signature are joined by a blank line; with the signature off only
/// the text remains. Returns `None` when there is nothing to show.
#[must_use]
pub fn compose_attribution(text: Option<&str>, sender: &str, signature: bool) -> Option<String> {
    let text = text.filter(|t| !t.is_empty());
    match (text, signature) {
        (Some(text), true) => Some(format!("{text}\n\nSent by {sender}")),
        (Some(text), false) => Some(text.to_string()),
        (None, true) => Some(format!("Sent by {sender}")),
        (None, false) => None,
    }
}

/// Summary of one assembly run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblyReport {
    /// Media groups the platform confirmed.
    pub batches_sent: usize,
    /// Media groups that failed or came back empty.
    pub batches_failed: usize,
    /// Local files removed after delivery.
    pub files_deleted: usize,
    /// Text messages delivered (captions overflow or text-only replies).
    pub text_messages: usize,
    /// Error notices sent to the chat.
    pub notices: usize,
}

struct Prepared {
    media: Vec<OutboundMedia>,
    text: Option<String>,
    rejected_local: bool,
}

/// Delivers decoded worker replies to a chat.
pub struct MediaAssembler {
    delivery: Arc<dyn ChatDelivery>,
    preferences: Arc<dyn PreferenceStore>,
    limits: DeliveryLimits,
    local_uploads: bool,
}

impl MediaAssembler {
    /// Create an assembler.
    ///
    /// `local_uploads` tells whether the delivery backend accepts local files.
    #[must_use]
    pub fn new(
        delivery: Arc<dyn ChatDelivery>,
        preferences: Arc<dyn PreferenceStore>,
        limits: DeliveryLimits,
        local_uploads: bool,
    ) -> Self {
        Self {
            delivery,
            preferences,
            limits,
            local_uploads,
        }
    }

    /// Delivers `items` to the chat of `context`.
    ///
    /// Failures are logged and never abort the remaining deliveries.
    pub async fn deliver(&self, context: &ChatContext, items: Vec<MediaItem>) -> AssemblyReport {
        let mut report = AssemblyReport::default();
        let chat_id = context.chat_id;
        let signature = self.preferences.signature_enabled(chat_id).await;
        let prepared = self.prepare(chat_id, items, &mut report).await;

        if prepared.media.is_empty() {
            if prepared.rejected_local {
                self.notify(chat_id, LOCAL_UPLOAD_UNAVAILABLE, &mut report)
                    .await;
            }
            if prepared.text.as_deref().is_some_and(|t| !t.is_empty()) {
                let body =
                    compose_attribution(prepared.text.as_deref(), &context.sender, signature)
                        .unwrap_or_default();
                self.action(chat_id, ChatAction::Typing).await;
                self.send_chunks(chat_id, &body, &mut report).await;
            }
            return report;
        }

        let first_action = match prepared.media.first().map(|m| m.kind) {
            Some(MediaKind::Video) => ChatAction::UploadVideo,
            _ => ChatAction::UploadPhoto,
        };
        self.action(chat_id, first_action).await;

        if prepared.rejected_local {
            self.notify(chat_id, LOCAL_UPLOAD_UNAVAILABLE, &mut report)
                .await;
        }

        let attribution =
            compose_attribution(prepared.text.as_deref(), &context.sender, signature);
        let (caption, leftover) = match attribution {
            Some(text) => {
                let (caption, leftover) = split_caption(&text, self.limits.max_caption_len);
                (Some(caption), leftover)
            }
            None => (None, None),
        };

        let deletable = self
            .send_batches(chat_id, prepared.media, caption, &mut report)
            .await;

        if let Some(leftover) = leftover {
            self.send_chunks(chat_id, &leftover, &mut report).await;
        }

        report.files_deleted = delete_files(&deletable).await;
        info!(
            chat_id,
            batches_sent = report.batches_sent,
            batches_failed = report.batches_failed,
            files_deleted = report.files_deleted,
            "Media delivered"
        );
        report
    }

    async fn prepare(
        &self,
        chat_id: i64,
        items: Vec<MediaItem>,
        report: &mut AssemblyReport,
    ) -> Prepared {
        let mut prepared = Prepared {
            media: Vec::new(),
            text: None,
            rejected_local: false,
        };

        for item in items {
            let (kind, source) = match item {
                MediaItem::Text(content) => {
                    // Last text item wins
                    prepared.text = Some(content);
                    continue;
                }
                MediaItem::Photo(source) => (MediaKind::Photo, source),
                MediaItem::Video(source) => (MediaKind::Video, source),
            };

            if let MediaSource::Local(path) = &source {
                if !self.local_uploads {
                    debug!(chat_id, path = %path.display(), "Dropping local item, no local backend");
                    prepared.rejected_local = true;
                    continue;
                }
                if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                    warn!(chat_id, path = %path.display(), "Local file not found");
                    let notice = file_not_found_notice(&file_name(path));
                    self.notify(chat_id, &notice, report).await;
                    continue;
                }
            }

            prepared.media.push(OutboundMedia {
                kind,
                source,
                caption: None,
            });
        }

        prepared
    }

    /// Sends media groups in order and returns the local files of every group
    /// the platform confirmed.
    async fn send_batches(
        &self,
        chat_id: i64,
        media: Vec<OutboundMedia>,
        caption: Option<String>,
        report: &mut AssemblyReport,
    ) -> Vec<PathBuf> {
        let group_size = self.limits.max_media_per_group.max(1);
        let mut deletable = Vec::new();
        let mut caption = caption;

        for (index, batch) in media.chunks(group_size).enumerate() {
            let mut batch = batch.to_vec();
            if let Some(first) = batch.first_mut() {
                first.caption = caption.take();
            }
            let locals: Vec<PathBuf> = batch
                .iter()
                .filter_map(|m| m.source.local_path().cloned())
                .collect();

            match self.delivery.send_media_group(chat_id, batch).await {
                Ok(count) if count > 0 => {
                    report.batches_sent += 1;
                    deletable.extend(locals);
                }
                Ok(_) => {
                    report.batches_failed += 1;
                    warn!(chat_id, batch = index, "Media group returned no messages, keeping files");
                }
                Err(e) => {
                    report.batches_failed += 1;
                    error!(chat_id, batch = index, error = %e, "Failed to send media group");
                }
            }
        }

        deletable
    }

    async fn send_chunks(&self, chat_id: i64, text: &str, report: &mut AssemblyReport) {
        for chunk in split_text(text, self.limits.max_text_len) {
            if let Err(e) = self.delivery.send_text(chat_id, &chunk).await {
                error!(chat_id, error = %e, "Failed to send text, dropping remaining chunks");
                return;
            }
            report.text_messages += 1;
        }
    }

    async fn notify(&self, chat_id: i64, notice: &str, report: &mut AssemblyReport) {
        match self.delivery.send_text(chat_id, notice).await {
            Ok(()) => report.notices += 1,
            Err(e) => warn!(chat_id, error = %e, "Failed to send notice"),
        }
    }

    async fn action(&self, chat_id: i64, action: ChatAction) {
        if let Err(e) = self.delivery.send_chat_action(chat_id, action).await {
            debug!(chat_id, error = %e, "Failed to send chat action");
        }
    }
}

async fn delete_files(paths: &[PathBuf]) -> usize {
    let mut deleted = 0;
    for path in paths {
        match remove_file_if_exists(path).await {
            Ok(true) => deleted += 1,
            Ok(false) => debug!(path = %path.display(), "File already gone"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete file"),
        }
    }
    deleted
}
