//! Tracker configuration

use eyre::{eyre, Result, WrapErr};
use hyperclient_rs::{ClientConfig, RetryConfig, TrackerSettings};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;

const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;

/// Tracker configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Source, destination and hub chains
    #[serde(flatten)]
    pub client: ClientConfig,

    /// Poll interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Retries per chain read after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_max_retries() -> u32 {
    RetryConfig::default().max_retries
}

impl Config {
    /// Load configuration from environment
    pub fn load() -> Result<Self> {
        // Try to load .env file
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded .env from {:?}", path);
        }

        let client = ClientConfig::from_env()?;

        let config = Self {
            client,
            poll_interval_ms: parse_env("POLL_INTERVAL_MS")?.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            max_retries: parse_env("RPC_MAX_RETRIES")?.unwrap_or_else(default_max_retries),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .wrap_err_with(|| format!("Invalid config {}", path.display()))?;
        config.client.validate()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would poll endpoints without pause
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(eyre!("POLL_INTERVAL_MS must be positive"));
        }
        Ok(())
    }

    /// Engine settings derived from this configuration
    pub fn settings(&self) -> TrackerSettings {
        TrackerSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            retry: RetryConfig {
                max_retries: self.max_retries,
                ..RetryConfig::default()
            },
        }
    }
}

/// Parse an optional numeric variable; a present but invalid value is an error
fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| eyre!("Invalid {}: {}", key, value)),
        _ => Ok(None),
    }
}
