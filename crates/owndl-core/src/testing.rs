//! Testing helpers and mock utilities.
//!
//! Provides a recording chat delivery and canned preference mocks.

use crate::delivery::{ChatAction, ChatDelivery, DeliveryError, OutboundMedia};
use crate::preferences::MockPreferenceStore;
use crate::registry::ChatContext;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// One call observed by [`RecordingDelivery`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    /// `send_text`
    Text(i64, String),
    /// `send_media_group`
    Group(i64, Vec<OutboundMedia>),
    /// `send_chat_action`
    Action(i64, ChatAction),
}

/// Chat delivery that records every call in order.
///
/// Media group calls succeed with the group size unless results were queued
/// with [`RecordingDelivery::push_group_result`].
#[derive(Default)]
pub struct RecordingDelivery {
    sent: Mutex<Vec<Sent>>,
    group_results: Mutex<VecDeque<Result<usize, String>>>,
    fail_text: Mutex<bool>,
}

impl RecordingDelivery {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the next `send_media_group` call.
    pub fn push_group_result(&self, result: Result<usize, String>) {
        if let Ok(mut results) = self.group_results.lock() {
            results.push_back(result);
        }
    }

    /// Make every `send_text` call fail.
    pub fn fail_text(&self) {
        if let Ok(mut flag) = self.fail_text.lock() {
            *flag = true;
        }
    }

    /// All recorded calls.
    #[must_use]
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Recorded text bodies.
    #[must_use]
    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text(_, text) => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Recorded media groups.
    #[must_use]
    pub fn groups(&self) -> Vec<Vec<OutboundMedia>> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Group(_, media) => Some(media),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Sent) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(call);
        }
    }
}

#[async_trait]
impl ChatDelivery for RecordingDelivery {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError> {
        self.record(Sent::Text(chat_id, text.to_string()));
        if self.fail_text.lock().map(|f| *f).unwrap_or(false) {
            return Err(DeliveryError::Request("text rejected".to_string()));
        }
        Ok(())
    }

    async fn send_media_group(
        &self,
        chat_id: i64,
        media: Vec<OutboundMedia>,
    ) -> Result<usize, DeliveryError> {
        let size = media.len();
        self.record(Sent::Group(chat_id, media));
        let queued = self
            .group_results
            .lock()
            .ok()
            .and_then(|mut results| results.pop_front());
        match queued {
            Some(Ok(count)) => Ok(count),
            Some(Err(message)) => Err(DeliveryError::Request(message)),
            None => Ok(size),
        }
    }

    async fn send_chat_action(
        &self,
        chat_id: i64,
        action: ChatAction,
    ) -> Result<(), DeliveryError> {
        self.record(Sent::Action(chat_id, action));
        Ok(())
    }
}

/// Create a preference mock that always reports `enabled`.
#[must_use]
pub fn mock_preferences(enabled: bool) -> MockPreferenceStore {
    let mut mock = MockPreferenceStore::new();
    mock.expect_signature_enabled().returning(move |_| enabled);
    mock.expect_toggle_signature().returning(move |_| Ok(!enabled));
    mock
}

/// Chat context used across tests.
#[must_use]
pub fn chat_context(chat_id: i64, sender: &str) -> ChatContext {
    ChatContext {
        chat_id,
        sender: sender.to_string(),
        message_id: 1,
    }
}
