//! Configuration file management.
//!
//! The configuration is a TOML file, `ora.toml` in the working directory
//! unless `ORA_CONFIG` or `--config` names another path. Every section is
//! optional and falls back to its defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ora_crypto::PrivateKey;
use ora_graph::builder::{ModelConfig, OriginConfig};
use ora_types::Address;
use serde::{Deserialize, Serialize};

/// Environment variable overriding the private key in the file.
pub const PRIVATE_KEY_ENV: &str = "ORA_PRIVATE_KEY";

/// Complete configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ethereum: EthereumConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub feeder: FeederConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub origins: Vec<OriginConfig>,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
    #[serde(default)]
    pub log: LogConfig,
}

/// Ethereum node access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EthereumConfig {
    /// JSON-RPC endpoint. Empty = no client; contract origins and relays
    /// are unavailable.
    #[serde(default)]
    pub rpc_url: String,
    /// Hex feed key used to sign data points.
    #[serde(default)]
    pub private_key: String,
    /// Account sending relay transactions. Defaults to the key's address.
    #[serde(default)]
    pub from: Option<Address>,
    #[serde(default = "default_rpc_timeout_secs")]
    pub timeout_secs: u64,
}

/// In-process transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Messages buffered per subscriber before new ones are dropped.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeederConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub data_models: Vec<String>,
    #[serde(default = "default_max_prec")]
    pub max_price_prec: u8,
    #[serde(default = "default_max_prec")]
    pub max_volume_prec: u8,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Data models accepted from feeds.
    #[serde(default)]
    pub data_models: Vec<String>,
    /// Feeds accepted. Empty = any feed.
    #[serde(default)]
    pub feeds: Vec<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub median: Vec<MedianRelayConfig>,
    #[serde(default)]
    pub scribe: Vec<ScribeRelayConfig>,
    #[serde(default)]
    pub opscribe: Vec<ScribeRelayConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedianRelayConfig {
    pub data_model: String,
    pub contract: Address,
    /// Minimum spread in percent that triggers an update.
    pub spread: f64,
    pub expiration_secs: u64,
    /// Feeds whose signed prices may be submitted.
    #[serde(default)]
    pub feeds: Vec<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScribeRelayConfig {
    pub data_model: String,
    pub contract: Address,
    pub spread: f64,
    pub expiration_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level: "trace" | "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions

fn default_rpc_timeout_secs() -> u64 {
    10
}

fn default_queue_size() -> usize {
    ora_transport::local::DEFAULT_QUEUE_SIZE
}

fn default_interval_secs() -> u64 {
    60
}

fn default_max_prec() -> u8 {
    ora_types::PRICE_PRECISION
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EthereumConfig {
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            private_key: String::new(),
            from: None,
            timeout_secs: default_rpc_timeout_secs(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            queue_size: default_queue_size(),
        }
    }
}

impl Default for FeederConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_interval_secs(),
            data_models: Vec::new(),
            max_price_prec: default_max_prec(),
            max_volume_prec: default_max_prec(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            median: Vec::new(),
            scribe: Vec::new(),
            opscribe: Vec::new(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl EthereumConfig {
    /// The feed key, from `ORA_PRIVATE_KEY` or the file.
    pub fn key(&self) -> anyhow::Result<Option<PrivateKey>> {
        let hex = std::env::var(PRIVATE_KEY_ENV).unwrap_or_else(|_| self.private_key.clone());
        if hex.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(PrivateKey::from_hex(&hex)?))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RelayConfig {
    pub fn is_empty(&self) -> bool {
        self.median.is_empty() && self.scribe.is_empty() && self.opscribe.is_empty()
    }
}

impl Config {
    /// Load the configuration from `path`, or from the default location.
    ///
    /// Falls back to defaults if no path is given and the default file does
    /// not exist.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::config_path(), false),
        };
        if !path.exists() {
            if required {
                anyhow::bail!("config file {} does not exist", path.display());
            }
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would only fail later at runtime.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.feeder.enabled && self.feeder.data_models.is_empty() {
            anyhow::bail!("feeder is enabled but feeder.data_models is empty");
        }
        if self.feeder.interval_secs == 0 || self.relay.interval_secs == 0 {
            anyhow::bail!("intervals must be at least one second");
        }
        if !self.relay.is_empty() && self.ethereum.rpc_url.is_empty() {
            anyhow::bail!("relays need ethereum.rpc_url");
        }
        for m in &self.relay.median {
            if m.feeds.is_empty() {
                anyhow::bail!("median relay for {} has no feeds", m.data_model);
            }
        }
        Ok(())
    }

    /// Data models the stores accept: the configured ones plus every model
    /// a relay submits.
    pub fn store_models(&self) -> Vec<String> {
        let mut models = self.store.data_models.clone();
        let relayed = self
            .relay
            .median
            .iter()
            .map(|m| &m.data_model)
            .chain(self.relay.scribe.iter().map(|s| &s.data_model))
            .chain(self.relay.opscribe.iter().map(|s| &s.data_model));
        for model in relayed {
            if !models.contains(model) {
                models.push(model.clone());
            }
        }
        models
    }

    /// Get the config file path.
    fn config_path() -> PathBuf {
        std::env::var("ORA_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("ora.toml"))
    }
}
