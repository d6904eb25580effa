//! Configuration loading.
//!
//! An immutable document consumed once at bringup (§6). Loading order:
//! `--config` CLI flag, else `CONFIG_FILE` env var, else `config.toml` in the
//! working directory. Missing required keys are a fatal deserialization
//! error; unknown keys are ignored.

mod defaults;

pub use defaults::*;

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub version: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecoderConfig {
    pub executable: String,
    #[serde(default)]
    pub command_args: String,
    #[serde(default = "default_decoder_host")]
    pub host: String,
    #[serde(default = "default_decoder_port")]
    pub port: u16,
    #[serde(default = "default_connect_timeout_secs")]
    pub timeout: u64,
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub url: String,
    pub status_url: String,
    pub client_id: i64,
    pub secret_key: String,
    pub bearer_token: String,
    #[serde(default = "default_api_timeout_secs")]
    pub timeout: u64,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_file")]
    pub file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CyclesConfig {
    #[serde(default = "default_parser_interval_secs")]
    pub parser_interval: u64,
    #[serde(default = "default_analyser_interval_secs")]
    pub analyser_interval: u64,
    #[serde(default = "default_sender_interval_secs")]
    pub sender_interval: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_ntp_sync_interval_secs")]
    pub ntp_sync_interval: u64,
    #[serde(default = "default_correlation_window_secs")]
    pub correlation_window: u64,
    #[serde(default = "default_stale_threshold_secs")]
    pub stale_threshold: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub decoder: DecoderConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cycles: CyclesConfig,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            file: default_database_file(),
        }
    }
}

impl Default for CyclesConfig {
    fn default() -> Self {
        Self {
            parser_interval: default_parser_interval_secs(),
            analyser_interval: default_analyser_interval_secs(),
            sender_interval: default_sender_interval_secs(),
            batch_size: default_batch_size(),
            ntp_sync_interval: default_ntp_sync_interval_secs(),
            correlation_window: default_correlation_window_secs(),
            stale_threshold: default_stale_threshold_secs(),
        }
    }
}

impl Config {
    /// Load from an explicit path, falling back to `CONFIG_FILE` then
    /// `config.toml` in the working directory.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = match explicit_path {
            Some(p) => p.to_path_buf(),
            None => match std::env::var("CONFIG_FILE") {
                Ok(p) => Path::new(&p).to_path_buf(),
                Err(_) => Path::new("config.toml").to_path_buf(),
            },
        };

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file at {}", path.display()))?;

        let config: Config = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file at {}", path.display()))?;

        Ok(config)
    }
}
