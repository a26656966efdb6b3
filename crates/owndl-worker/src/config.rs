//! Worker configuration
//!
//! Loaded through the same layered sources as the relay.

use crate::queue::QueueSettings;
use config::ConfigError;
use owndl_core::config::{build_config, is_running_in_docker, DEFAULT_RELAY_PORT};
use serde::Deserialize;
use std::time::Duration;

/// Politeness delay before each resolver call.
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 1000;
/// Retries after the first failed resolver call.
pub const DEFAULT_MAX_RETRIES: usize = 3;
/// Base delay between retries; grows linearly with the attempt number.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 2000;
/// Pause before reconnecting to the relay.
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 7;

/// Worker settings.
#[derive(Debug, Deserialize, Clone)]
pub struct WorkerSettings {
    /// Platform tag announced on registration (`tiktok`, `instagram`, ...).
    pub platform: String,
    /// Relay host; defaults to `tgbot` in a container, `localhost` otherwise.
    pub server_host: Option<String>,
    /// Relay port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Resolver API endpoint.
    pub resolver_url: String,
    /// Politeness delay in milliseconds.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    /// Retry budget.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Base retry delay in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Reconnect delay in seconds.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

const fn default_port() -> u16 {
    DEFAULT_RELAY_PORT
}

const fn default_request_delay_ms() -> u64 {
    DEFAULT_REQUEST_DELAY_MS
}

const fn default_max_retries() -> usize {
    DEFAULT_MAX_RETRIES
}

const fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

const fn default_reconnect_delay_secs() -> u64 {
    DEFAULT_RECONNECT_DELAY_SECS
}

impl WorkerSettings {
    /// Create new settings by loading from environment and files.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or a required key is missing.
    pub fn new() -> Result<Self, ConfigError> {
        build_config()?.try_deserialize()
    }

    /// Relay WebSocket URL.
    #[must_use]
    pub fn websocket_url(&self) -> String {
        let host = self.server_host.clone().unwrap_or_else(|| {
            if is_running_in_docker() {
                "tgbot".to_string()
            } else {
                "localhost".to_string()
            }
        });
        format!("ws://{host}:{}", self.port)
    }

    /// Lower-cased platform tag.
    #[must_use]
    pub fn platform_tag(&self) -> String {
        self.platform.trim().to_lowercase()
    }

    /// Queue timing derived from the settings.
    #[must_use]
    pub const fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            request_delay: Duration::from_millis(self.request_delay_ms),
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    /// Pause between reconnect attempts.
    #[must_use]
    pub const fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(server_host: Option<&str>) -> WorkerSettings {
        WorkerSettings {
            platform: " TikTok ".to_string(),
            server_host: server_host.map(str::to_string),
            port: 9000,
            resolver_url: "https://resolver.example/api".to_string(),
            request_delay_ms: DEFAULT_REQUEST_DELAY_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            reconnect_delay_secs: DEFAULT_RECONNECT_DELAY_SECS,
        }
    }

    #[test]
    fn test_websocket_url_uses_configured_host() {
        assert_eq!(settings(Some("relay")).websocket_url(), "ws://relay:9000");
    }

    #[test]
    fn test_platform_tag_is_normalized() {
        assert_eq!(settings(None).platform_tag(), "tiktok");
    }

    #[test]
    fn test_queue_settings_defaults() {
        let queue = settings(None).queue_settings();
        assert_eq!(queue.request_delay, Duration::from_secs(1));
        assert_eq!(queue.max_retries, 3);
        assert_eq!(queue.retry_delay, Duration::from_secs(2));
        assert_eq!(settings(None).reconnect_delay(), Duration::from_secs(7));
    }
}
