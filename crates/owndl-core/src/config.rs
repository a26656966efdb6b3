//! Configuration and settings management
//!
//! Loads relay settings from config files and environment variables and
//! defines the delivery limits of the chat surface.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Maximum number of media items in one media group.
pub const MAX_MEDIA_PER_GROUP: usize = 10;
/// Maximum caption length for media messages (UTF-16 code units).
pub const MAX_CAPTION_LENGTH: usize = 1024;
/// Maximum length of a plain text message (UTF-16 code units).
pub const MAX_TEXT_LENGTH: usize = 4096;

/// Port the relay listens on when `PORT` is not set.
pub const DEFAULT_RELAY_PORT: u16 = 8098;
/// Files older than this are removed by the janitor (30 minutes).
pub const DEFAULT_STALE_FILE_TIMEOUT_SECS: u64 = 1800;
/// Janitor sweep interval (5 minutes).
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 300;
/// Preference file used when `SETTINGS_FILE` is not set.
pub const DEFAULT_SETTINGS_FILE: &str = "settings.json";

/// Build the layered configuration source shared by all binaries.
///
/// Order: `config/default`, `config/{RUN_MODE}`, `config/local`, `APP__*`
/// environment variables, then plain environment variables.
///
/// # Errors
///
/// Returns a `ConfigError` if a source cannot be read or merged.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Local overrides, not checked into git
        .add_source(File::with_name("config/local").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        // Environment::default() maps UPPER_SNAKE_CASE to snake_case keys
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

/// Limits of the destination messaging surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryLimits {
    /// Media items per outbound group.
    pub max_media_per_group: usize,
    /// Caption length ceiling for the first media item.
    pub max_caption_len: usize,
    /// Plain text message ceiling.
    pub max_text_len: usize,
}

impl Default for DeliveryLimits {
    fn default() -> Self {
        Self {
            max_media_per_group: MAX_MEDIA_PER_GROUP,
            max_caption_len: MAX_CAPTION_LENGTH,
            max_text_len: MAX_TEXT_LENGTH,
        }
    }
}

/// Relay settings loaded from environment variables.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RelaySettings {
    /// WebSocket port for downloader workers.
    #[serde(default = "default_port")]
    pub port: u16,
    /// JSON file holding per-chat signature preferences.
    #[serde(default = "default_settings_file")]
    pub settings_file: PathBuf,
    /// Directory workers drop local media into; enables the janitor when set.
    pub download_folder: Option<PathBuf>,
    /// Age after which a file in `download_folder` is considered stale.
    #[serde(default = "default_stale_file_timeout_secs")]
    pub stale_file_timeout_secs: u64,
    /// Interval between janitor sweeps.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

const fn default_port() -> u16 {
    DEFAULT_RELAY_PORT
}

fn default_settings_file() -> PathBuf {
    PathBuf::from(DEFAULT_SETTINGS_FILE)
}

const fn default_stale_file_timeout_secs() -> u64 {
    DEFAULT_STALE_FILE_TIMEOUT_SECS
}

const fn default_cleanup_interval_secs() -> u64 {
    DEFAULT_CLEANUP_INTERVAL_SECS
}

impl RelaySettings {
    /// Create new settings by loading from environment and files.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        build_config()?.try_deserialize()
    }

    /// Address the relay binds to.
    ///
    /// Inside a container the relay listens on all interfaces, otherwise on
    /// loopback only.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        let ip = if is_running_in_docker() {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        } else {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        };
        SocketAddr::new(ip, self.port)
    }

    /// Stale age threshold for the janitor.
    #[must_use]
    pub const fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_file_timeout_secs)
    }

    /// Sweep interval for the janitor.
    #[must_use]
    pub const fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// Returns `true` when the process runs inside a Docker container.
#[must_use]
pub fn is_running_in_docker() -> bool {
    Path::new("/.dockerenv").exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_relay_settings_env_loading() -> Result<(), Box<dyn std::error::Error>> {
        env::set_var("STALE_FILE_TIMEOUT_SECS", "60");
        env::set_var("DOWNLOAD_FOLDER", "/tmp/owndl-downloads");

        let settings = RelaySettings::new()?;
        assert_eq!(settings.stale_file_timeout_secs, 60);
        assert_eq!(
            settings.download_folder,
            Some(PathBuf::from("/tmp/owndl-downloads"))
        );
        assert_eq!(settings.cleanup_interval_secs, DEFAULT_CLEANUP_INTERVAL_SECS);
        assert_eq!(settings.settings_file, PathBuf::from(DEFAULT_SETTINGS_FILE));

        env::remove_var("STALE_FILE_TIMEOUT_SECS");
        env::remove_var("DOWNLOAD_FOLDER");
        Ok(())
    }

    #[test]
    fn test_default_limits() {
        let limits = DeliveryLimits::default();
        assert_eq!(limits.max_media_per_group, 10);
        assert_eq!(limits.max_caption_len, 1024);
        assert_eq!(limits.max_text_len, 4096);
    }
}
