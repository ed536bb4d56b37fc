//! Wallet configuration management

use crate::error::{Result, WalletError};
use crate::types::Network;
use crate::vault::{DEFAULT_KDF_ITERATIONS, VaultSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Wallet configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct WalletConfig {
    pub vault: VaultConfig,
    pub persistence: PersistenceConfig,
    pub clusters: Vec<ClusterConfig>,
    pub extension: ExtensionConfig,
    pub logging: LoggingConfig,
}

impl WalletConfig {
    /// Load from the default location, falling back to defaults when absent.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: WalletConfig =
            toml::from_str(contents).map_err(|e| WalletError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents =
            toml::to_string_pretty(self).map_err(|e| WalletError::Config(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// `<config dir>/wallet-core/config.toml`
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .ok_or_else(|| WalletError::Config("could not find config directory".to_string()))?;
        Ok(dir.join("wallet-core").join("config.toml"))
    }

    /// RPC endpoint for `network`, honoring cluster overrides.
    pub fn endpoint(&self, network: Network) -> String {
        self.clusters
            .iter()
            .find(|c| c.network == network)
            .map(|c| c.url.clone())
            .unwrap_or_else(|| network.default_endpoint().to_string())
    }

    pub fn vault_settings(&self) -> VaultSettings {
        VaultSettings {
            kdf_iterations: self.vault.kdf_iterations,
            wallet_index: self.vault.wallet_index,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.vault.kdf_iterations == 0 {
            return Err(WalletError::Config(
                "vault.kdfIterations must be positive".to_string(),
            ));
        }
        if self.persistence.interval_secs == 0 {
            return Err(WalletError::Config(
                "persistence.intervalSecs must be positive".to_string(),
            ));
        }
        for cluster in &self.clusters {
            url::Url::parse(&cluster.url).map_err(|e| {
                WalletError::Config(format!("invalid url for {}: {}", cluster.network, e))
            })?;
        }
        Ok(())
    }
}

/// Vault configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct VaultConfig {
    /// PBKDF2 iterations for newly sealed wallets
    pub kdf_iterations: u32,
    /// Wallet level of the derivation path
    pub wallet_index: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
            wallet_index: 0,
        }
    }
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PersistenceConfig {
    /// Vault record path; `None` uses the data directory
    pub path: Option<PathBuf>,
    /// Seconds between save attempts
    pub interval_secs: u64,
}

impl PersistenceConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Resolved record path.
    pub fn resolve_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        let dir = dirs::data_dir()
            .ok_or_else(|| WalletError::Config("could not find data directory".to_string()))?;
        Ok(dir.join("wallet-core").join("vault.json"))
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            path: None,
            interval_secs: 5,
        }
    }
}

/// RPC endpoint override for one network
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterConfig {
    pub network: Network,
    pub url: String,
}

/// Identity of the extension's own UI
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ExtensionConfig {
    /// Connections from this extension id are trusted
    pub id: String,
}

/// Log output format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    /// Parse a `LOG_FORMAT` value.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "json" => Some(LogFormat::Json),
            "pretty" | "text" => Some(LogFormat::Pretty),
            _ => None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, `RUST_LOG` overrides it
    pub filter: String,
    pub format: LogFormat,
}

impl LoggingConfig {
    /// Apply the `LOG_FORMAT` environment override.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(format) = std::env::var("LOG_FORMAT")
            .ok()
            .and_then(|v| LogFormat::parse(&v))
        {
            self.format = format;
        }
        self
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
