//! Configuration management for VeriCite

use crate::crypto::DIGEST_HEX_LEN;
use crate::error::{ChainError, Result};
use crate::miner::DEFAULT_DIFFICULTY;
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ledger: LedgerConfig,
    pub storage: StorageConfig,
    pub api: ApiConfig,
    pub miner: MinerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,
    /// Upper bound on hashes per mining attempt; unbounded when absent.
    #[serde(default)]
    pub max_attempts: Option<u64>,
    /// Put an entry back at the head of the queue when its block is not appended.
    #[serde(default = "default_true")]
    pub requeue_on_failure: bool,
    #[serde(default = "default_true")]
    pub verify_on_load: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            max_attempts: None,
            requeue_on_failure: true,
            verify_on_load: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Json,
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_chain_path")]
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_chain_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_api_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinerConfig {
    /// Mine queued entries in the background instead of only on request.
    #[serde(default)]
    pub auto_mine: bool,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            auto_mine: false,
            interval_ms: default_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_difficulty() -> u32 {
    DEFAULT_DIFFICULTY
}

fn default_true() -> bool {
    true
}

fn default_chain_path() -> String {
    "vericite_chain.json".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    3000
}

fn default_interval_ms() -> u64 {
    2000
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate critical values
    pub fn validate(&self) -> Result<()> {
        if self.storage.backend != StorageBackend::Memory && self.storage.path.is_empty() {
            return Err(ChainError::Config("storage.path must be set".to_string()));
        }
        if self.ledger.difficulty as usize > DIGEST_HEX_LEN {
            return Err(ChainError::Config(format!(
                "ledger.difficulty must be at most {}",
                DIGEST_HEX_LEN
            )));
        }
        Ok(())
    }
}

/// Loads `config.toml` from the working directory.
pub fn load_config() -> Result<Config> {
    load_config_from(DEFAULT_CONFIG_PATH)
}

/// Loads configuration from `path`, falling back to defaults when the file is
/// absent. `PORT` in the environment overrides `api.port`.
pub fn load_config_from(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let mut config = if path.exists() {
        let config_str = fs::read_to_string(path)?;
        Config::from_toml_str(&config_str)?
    } else {
        Config::default()
    };

    if let Ok(port) = std::env::var("PORT") {
        config.api.port = port
            .parse()
            .map_err(|_| ChainError::Config(format!("PORT is not a valid port: {}", port)))?;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.ledger.difficulty, 3);
        assert_eq!(config.ledger.max_attempts, None);
        assert!(config.ledger.requeue_on_failure);
        assert!(config.ledger.verify_on_load);
        assert_eq!(config.storage.backend, StorageBackend::Json);
        assert_eq!(config.storage.path, "vericite_chain.json");
        assert_eq!(config.api.port, 3000);
        assert!(!config.miner.auto_mine);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::from_toml_str(
            r#"
            [ledger]
            difficulty = 2
            max_attempts = 500000
            requeue_on_failure = false

            [storage]
            backend = "sqlite"
            path = "data/chain.db"

            [miner]
            auto_mine = true
            "#,
        )
        .unwrap();

        assert_eq!(config.ledger.difficulty, 2);
        assert_eq!(config.ledger.max_attempts, Some(500_000));
        assert!(!config.ledger.requeue_on_failure);
        assert!(config.ledger.verify_on_load);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.storage.path, "data/chain.db");
        assert!(config.miner.auto_mine);
        assert_eq!(config.miner.interval_ms, 2000);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            Config::from_toml_str("[ledger]\ndifficulty = 65"),
            Err(ChainError::Config(_))
        ));
        assert!(matches!(
            Config::from_toml_str("[storage]\npath = \"\""),
            Err(ChainError::Config(_))
        ));
        assert!(matches!(
            Config::from_toml_str("[storage]\nbackend = \"redis\""),
            Err(ChainError::Config(_))
        ));
    }
}
