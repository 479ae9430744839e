//! Configuration for the token-credit verification service.

use crate::catalog::{default_bundles, Bundle, Catalog};
use crate::ledger::{Address, Commitment, JsonRpcLedgerConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output.
    #[default]
    Pretty,
    /// JSON lines.
    Json,
}

/// Verification service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Root directory for service data (the credit store lives here).
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// HTTP listen address.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Treasury address payments must be sent to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treasury: Option<String>,

    /// Replay cache capacity.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format.
    #[serde(default)]
    pub log_format: LogFormat,

    /// Ledger RPC configuration.
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Bundles on offer.
    #[serde(default = "default_bundles")]
    pub bundles: Vec<Bundle>,
}

/// Ledger RPC configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Commitment used for reads.
    #[serde(default)]
    pub commitment: Commitment,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            listen: default_listen(),
            treasury: None,
            cache_capacity: default_cache_capacity(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            ledger: LedgerConfig::default(),
            bundles: default_bundles(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            commitment: Commitment::default(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_root_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "token-credit")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".token-credit"))
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8787))
}

fn default_rpc_url() -> String {
    "https://api.mainnet-beta.solana.com".to_string()
}

const fn default_request_timeout() -> u64 {
    30
}

const fn default_cache_capacity() -> usize {
    10_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl LedgerConfig {
    /// Client configuration for [`crate::ledger::JsonRpcLedger`].
    #[must_use]
    pub fn client_config(&self) -> JsonRpcLedgerConfig {
        JsonRpcLedgerConfig {
            url: self.rpc_url.clone(),
            commitment: self.commitment,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Serialization(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Parsed treasury address.
    ///
    /// # Errors
    ///
    /// Returns an error if no treasury is configured or it is not a valid address.
    pub fn treasury_address(&self) -> crate::Result<Address> {
        let raw = self
            .treasury
            .as_deref()
            .ok_or_else(|| crate::Error::Config("treasury address not configured".to_string()))?;
        raw.parse()
            .map_err(|e| crate::Error::Config(format!("invalid treasury address {raw}: {e}")))
    }

    /// Validated bundle catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured bundles are invalid.
    pub fn catalog(&self) -> crate::Result<Catalog> {
        Catalog::new(self.bundles.clone())
    }

    /// Location of the credit store.
    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.root_dir.join("credits")
    }
}
