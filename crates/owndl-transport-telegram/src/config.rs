//! Telegram transport settings.

use config::ConfigError;
use owndl_core::config::RelaySettings;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Host of the local Bot API server when `TGSERVER_HOST` is not set.
pub const DEFAULT_TGSERVER_HOST: &str = "localhost";
/// Port of the local Bot API server when `TGSERVER_PORT` is not set.
pub const DEFAULT_TGSERVER_PORT: u16 = 8081;
/// How long the local server `getMe` check may take.
pub const LOCAL_SERVER_TIMEOUT: Duration = Duration::from_secs(5);

/// Telegram transport settings loaded from environment variables.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct TelegramSettings {
    /// Telegram Bot API token.
    pub telegram_bot_token: String,
    /// Local Bot API server host.
    pub tgserver_host: Option<String>,
    /// Local Bot API server port.
    pub tgserver_port: Option<u16>,
}

impl TelegramSettings {
    /// Create new settings by loading from environment and files.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        owndl_core::config::build_config()?.try_deserialize()
    }

    /// Base URL of the local Bot API server to try first.
    #[must_use]
    pub fn local_api_url(&self) -> String {
        let host = self
            .tgserver_host
            .as_deref()
            .filter(|h| !h.trim().is_empty())
            .unwrap_or(DEFAULT_TGSERVER_HOST);
        let port = self.tgserver_port.unwrap_or(DEFAULT_TGSERVER_PORT);
        format!("http://{host}:{port}/")
    }
}

/// Combined settings used by the Telegram transport layer.
#[derive(Clone)]
pub struct BotSettings {
    /// Relay settings shared with the core.
    pub relay: Arc<RelaySettings>,
    /// Telegram-specific settings.
    pub telegram: Arc<TelegramSettings>,
}

impl BotSettings {
    /// Create a new combined settings bundle.
    #[must_use]
    pub fn new(relay: RelaySettings, telegram: TelegramSettings) -> Self {
        Self {
            relay: Arc::new(relay),
            telegram: Arc::new(telegram),
        }
    }
}
