//! Command-line interface definition.

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use token_credit::ledger::Commitment;
use token_credit::{LogFormat, ServiceConfig};

/// Verifies on-chain SOL payments and credits purchased units exactly once.
#[derive(Parser, Debug)]
#[command(name = "token-credit")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Root directory for service data.
    #[arg(long, env = "TOKEN_CREDIT_ROOT_DIR")]
    pub root_dir: Option<PathBuf>,

    /// HTTP listen address.
    #[arg(long, short, env = "TOKEN_CREDIT_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Solana JSON-RPC endpoint.
    #[arg(long, env = "TOKEN_CREDIT_RPC_URL")]
    pub rpc_url: Option<String>,

    /// Commitment used for ledger reads.
    #[arg(long, value_enum, env = "TOKEN_CREDIT_COMMITMENT")]
    pub commitment: Option<CliCommitment>,

    /// Treasury address payments must be sent to.
    #[arg(long, short, env = "TOKEN_CREDIT_TREASURY")]
    pub treasury: Option<String>,

    /// Replay cache capacity.
    #[arg(long, env = "TOKEN_CREDIT_CACHE_CAPACITY")]
    pub cache_capacity: Option<usize>,

    /// Log level (`RUST_LOG` takes precedence).
    #[arg(long, env = "TOKEN_CREDIT_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Log output format.
    #[arg(long, value_enum, env = "TOKEN_CREDIT_LOG_FORMAT")]
    pub log_format: Option<CliLogFormat>,

    /// Path to configuration file.
    #[arg(long, short, env = "TOKEN_CREDIT_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Commitment CLI enum.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliCommitment {
    /// Seen by the node.
    Processed,
    /// Voted on by a supermajority.
    Confirmed,
    /// Rooted.
    Finalized,
}

/// Log format CLI enum.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliLogFormat {
    /// Human-readable output.
    Pretty,
    /// JSON lines.
    Json,
}

impl Cli {
    /// Convert CLI arguments into a `ServiceConfig`.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded.
    pub fn into_config(self) -> color_eyre::Result<ServiceConfig> {
        // Start with default config or load from file
        let mut config = if let Some(ref path) = self.config {
            ServiceConfig::from_file(path)?
        } else {
            ServiceConfig::default()
        };

        // Flags override the file
        if let Some(root_dir) = self.root_dir {
            config.root_dir = root_dir;
        }
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(rpc_url) = self.rpc_url {
            config.ledger.rpc_url = rpc_url;
        }
        if let Some(commitment) = self.commitment {
            config.ledger.commitment = commitment.into();
        }
        if let Some(treasury) = self.treasury {
            config.treasury = Some(treasury);
        }
        if let Some(capacity) = self.cache_capacity {
            config.cache_capacity = capacity;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.log_format = format.into();
        }

        Ok(config)
    }
}

impl From<CliCommitment> for Commitment {
    fn from(c: CliCommitment) -> Self {
        match c {
            CliCommitment::Processed => Self::Processed,
            CliCommitment::Confirmed => Self::Confirmed,
            CliCommitment::Finalized => Self::Finalized,
        }
    }
}

impl From<CliLogFormat> for LogFormat {
    fn from(f: CliLogFormat) -> Self {
        match f {
            CliLogFormat::Pretty => Self::Pretty,
            CliLogFormat::Json => Self::Json,
        }
    }
}
