//! Per-chat signature preferences
//!
//! The signature toggle lives in a JSON file shaped as
//! `[{"id": <chat>, "is_active": <bool>}]`. Reads go through an in-memory
//! cache, toggles rewrite the whole file.

use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Preference store errors.
#[derive(Debug, Error)]
pub enum PreferenceError {
    /// Reading or writing the settings file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The settings file is not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Access to the per-chat signature toggle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Whether the "Sent by" signature is enabled for a chat (default `true`).
    async fn signature_enabled(&self, chat_id: i64) -> bool;

    /// Toggles the signature for a chat and returns the new state.
    ///
    /// A chat without a stored preference is recorded as enabled.
    ///
    /// # Errors
    ///
    /// Returns `PreferenceError` if the settings file cannot be read or written.
    async fn toggle_signature(&self, chat_id: i64) -> Result<bool, PreferenceError>;
}

/// One row of the settings file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStatus {
    /// Chat id
    pub id: i64,
    /// Signature enabled
    pub is_active: bool,
}

/// JSON file backed [`PreferenceStore`].
pub struct JsonPreferenceStore {
    path: PathBuf,
    cache: Cache<i64, bool>,
    write_lock: Mutex<()>,
}

impl JsonPreferenceStore {
    /// Create a store over `path`; the file is created on the first toggle.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_idle(Duration::from_secs(60 * 60)) // 1 hour
            .build();

        Self {
            path: path.into(),
            cache,
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<UserStatus>, PreferenceError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, statuses: &[UserStatus]) -> Result<(), PreferenceError> {
        let body = serde_json::to_vec_pretty(statuses)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, body).await?;
        Ok(())
    }
}

#[async_trait]
impl PreferenceStore for JsonPreferenceStore {
    async fn signature_enabled(&self, chat_id: i64) -> bool {
        if let Some(active) = self.cache.get(&chat_id).await {
            return active;
        }

        // Filling the cache under the write lock keeps a toggle from being
        // overwritten by a read that loaded the file before it
        let _guard = self.write_lock.lock().await;
        if let Some(active) = self.cache.get(&chat_id).await {
            return active;
        }

        match self.load().await {
            Ok(statuses) => {
                let active = statuses
                    .iter()
                    .find(|s| s.id == chat_id)
                    .map_or(true, |s| s.is_active);
                self.cache.insert(chat_id, active).await;
                active
            }
            Err(e) => {
                warn!(chat_id, error = %e, "Failed to read preferences, using default");
                true
            }
        }
    }

    async fn toggle_signature(&self, chat_id: i64) -> Result<bool, PreferenceError> {
        let _guard = self.write_lock.lock().await;

        let mut statuses = self.load().await?;
        let active = match statuses.iter_mut().find(|s| s.id == chat_id) {
            Some(status) => {
                status.is_active = !status.is_active;
                status.is_active
            }
            None => {
                statuses.push(UserStatus {
                    id: chat_id,
                    is_active: true,
                });
                true
            }
        };

        self.save(&statuses).await?;
        self.cache.insert(chat_id, active).await;
        debug!(chat_id, active, "Signature preference updated");
        Ok(active)
    }
}
