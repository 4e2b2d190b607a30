//! Client configuration
//!
//! Sources, later ones winning: built-in defaults, an optional
//! `tradebot.{toml,yaml,json}` file, then `TRADEBOT_*` environment
//! variables (nested keys use `__`, e.g. `TRADEBOT_RETRY__MAX_ATTEMPTS`).

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::api::{RefreshFailurePolicy, RetryPolicy};
use crate::repository::PagingConfig;

/// Upper bound for `notification_retention_days` (ten years)
pub const MAX_RETENTION_DAYS: i64 = 3650;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// REST base URL, e.g. `https://api.example.com/v1`
    pub api_base_url: String,
    /// Live channel URL (`ws://` or `wss://`)
    pub ws_url: String,
    /// Where the token file, key file, cache and preferences live
    pub data_dir: PathBuf,
    /// Hex AES-256 key for the token file; generated into `data_dir` if unset
    pub secrets_key: Option<String>,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub retry: RetryPolicy,
    pub paging: PagingConfig,
    pub refresh_failure_policy: RefreshFailurePolicy,
    /// Local notifications older than this are pruned at startup
    pub notification_retention_days: i64,
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000/v1".to_string(),
            ws_url: "ws://localhost:3000/v1/ws".to_string(),
            data_dir: default_data_dir(),
            secrets_key: None,
            connect_timeout_secs: 30,
            request_timeout_secs: 30,
            retry: RetryPolicy::default(),
            paging: PagingConfig::default(),
            refresh_failure_policy: RefreshFailurePolicy::default(),
            notification_retention_days: 30,
            log_level: "info".to_string(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tradebot")
}

impl ClientConfig {
    /// Load from `file` (or `./tradebot.*` when `None`) and the environment
    pub fn load(file: Option<&Path>) -> anyhow::Result<Self> {
        let file_source = match file {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("tradebot").required(false),
        };

        let settings = config::Config::builder()
            .add_source(file_source)
            .add_source(
                config::Environment::with_prefix("TRADEBOT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;

        let config: ClientConfig = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let api = Url::parse(&self.api_base_url)
            .with_context(|| format!("api_base_url is not a URL: {}", self.api_base_url))?;
        if !matches!(api.scheme(), "http" | "https") {
            anyhow::bail!("api_base_url must be http(s), got {}", api.scheme());
        }

        let ws = Url::parse(&self.ws_url)
            .with_context(|| format!("ws_url is not a URL: {}", self.ws_url))?;
        if !matches!(ws.scheme(), "ws" | "wss") {
            anyhow::bail!("ws_url must be ws(s), got {}", ws.scheme());
        }

        if self.paging.page_size == 0 {
            anyhow::bail!("paging.page_size must be positive");
        }
        if self.paging.initial_load_size < self.paging.page_size {
            anyhow::bail!("paging.initial_load_size must be at least one page");
        }
        if !(1..=MAX_RETENTION_DAYS).contains(&self.notification_retention_days) {
            anyhow::bail!(
                "notification_retention_days must be between 1 and {}, got {}",
                MAX_RETENTION_DAYS,
                self.notification_retention_days
            );
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn token_path(&self) -> PathBuf {
        self.data_dir.join("session.bin")
    }

    pub fn key_path(&self) -> PathBuf {
        self.data_dir.join("session.key")
    }

    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join("cache.db")
    }

    pub fn preferences_path(&self) -> PathBuf {
        self.data_dir.join("notification_prefs.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ClientConfig::default();
        config.validate().unwrap();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.paging.page_size, 20);
        assert_eq!(config.refresh_failure_policy, RefreshFailurePolicy::ClearTokens);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
api_base_url = "https://api.example.com/v1"
ws_url = "wss://api.example.com/v1/ws"
refresh_failure_policy = "keep_tokens"

[retry]
max_attempts = 5
"#
        )
        .unwrap();

        let config = ClientConfig::load(Some(&path)).unwrap();
        assert_eq!(config.api_base_url, "https://api.example.com/v1");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.refresh_failure_policy, RefreshFailurePolicy::KeepTokens);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_rejects_wrong_schemes() {
        let config = ClientConfig {
            ws_url: "http://localhost/ws".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_retention() {
        for days in [0, -5, MAX_RETENTION_DAYS + 1, 200_000_000, i64::MAX] {
            let config = ClientConfig {
                notification_retention_days: days,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "{} days accepted", days);
        }

        let ten_years = ClientConfig {
            notification_retention_days: MAX_RETENTION_DAYS,
            ..Default::default()
        };
        ten_years.validate().unwrap();
    }
}
