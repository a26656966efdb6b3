use async_trait::async_trait;
use owndl_core::delivery::{ChatAction, ChatDelivery, DeliveryError, MediaKind, OutboundMedia};
use owndl_core::protocol::MediaSource;
use teloxide::prelude::*;
use teloxide::types::{InputFile, InputMedia, InputMediaPhoto, InputMediaVideo};
use tracing::debug;

/// Delivers messages through a teloxide [`Bot`].
///
/// No call is ever retried; a failed request is reported to the caller.
#[derive(Clone)]
pub struct TelegramDelivery {
    bot: Bot,
}

impl TelegramDelivery {
    /// Wrap a configured bot.
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

/// Builds the upload handle for a media source.
///
/// # Errors
///
/// Returns `DeliveryError::InvalidUrl` if a remote URL cannot be parsed.
pub fn to_input_file(source: &MediaSource) -> Result<InputFile, DeliveryError> {
    match source {
        MediaSource::Remote(url) => reqwest::Url::parse(url)
            .map(InputFile::url)
            .map_err(|e| DeliveryError::InvalidUrl(format!("{url}: {e}"))),
        MediaSource::Local(path) => Ok(InputFile::file(path.clone())),
    }
}

/// Converts one outbound element into a Bot API media group entry.
///
/// # Errors
///
/// Returns `DeliveryError::InvalidUrl` if a remote URL cannot be parsed.
pub fn to_input_media(media: &OutboundMedia) -> Result<InputMedia, DeliveryError> {
    let file = to_input_file(&media.source)?;
    Ok(match media.kind {
        MediaKind::Photo => {
            let mut photo = InputMediaPhoto::new(file);
            if let Some(caption) = &media.caption {
                photo = photo.caption(caption.clone());
            }
            InputMedia::Photo(photo)
        }
        MediaKind::Video => {
            let mut video = InputMediaVideo::new(file);
            if let Some(caption) = &media.caption {
                video = video.caption(caption.clone());
            }
            InputMedia::Video(video)
        }
    })
}

const fn to_telegram_action(action: ChatAction) -> teloxide::types::ChatAction {
    match action {
        ChatAction::Typing => teloxide::types::ChatAction::Typing,
        ChatAction::UploadPhoto => teloxide::types::ChatAction::UploadPhoto,
        ChatAction::UploadVideo => teloxide::types::ChatAction::UploadVideo,
    }
}

fn request_error(e: &teloxide::RequestError) -> DeliveryError {
    DeliveryError::Request(e.to_string())
}

#[async_trait]
impl ChatDelivery for TelegramDelivery {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .await
            .map_err(|e| request_error(&e))?;
        Ok(())
    }

    async fn send_media_group(
        &self,
        chat_id: i64,
        media: Vec<OutboundMedia>,
    ) -> Result<usize, DeliveryError> {
        let group = media
            .iter()
            .map(to_input_media)
            .collect::<Result<Vec<_>, _>>()?;

        let messages = self
            .bot
            .send_media_group(ChatId(chat_id), group)
            .await
            .map_err(|e| request_error(&e))?;

        debug!(chat_id, delivered = messages.len(), "Media group sent");
        Ok(messages.len())
    }

    async fn send_chat_action(
        &self,
        chat_id: i64,
        action: ChatAction,
    ) -> Result<(), DeliveryError> {
        self.bot
            .send_chat_action(ChatId(chat_id), to_telegram_action(action))
            .await
            .map_err(|e| request_error(&e))?;
        Ok(())
    }
}
