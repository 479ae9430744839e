//! Payer agent.
//!
//! Drives one purchase at a time from bundle selection to credited units:
//!
//! ```text
//! idle ─▶ building ─▶ signing ─▶ submitting ─▶ confirming ─▶ verifying ─▶ success
//!  ▲         │           │            │                          │
//!  │         ▼           │            ▼                          ▼
//!  └──── (refused) ◀─────┘          error ◀──────────────────── error (+signature)
//! ```
//!
//! Confirmation polling is advisory. Whatever the poll saw, the agent asks the
//! verification service, which re-derives the truth from the ledger; once a
//! signature exists every failure carries it so the user can recover.

mod agent;
mod client;
mod error;
pub mod messages;
mod signer;
mod state;

pub use agent::{PayerAgent, PurchaseOutcome};
pub use client::{HttpVerificationClient, Rejection, RejectionKind, VerificationClient};
pub use error::{MissingDependency, PurchaseError};
pub use signer::{SignError, Signer};
pub use state::{InvalidTransition, PurchaseAttempt, PurchaseState};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Payer agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayerConfig {
    /// Ledger JSON-RPC endpoint. Purchases are unavailable without one.
    #[serde(default)]
    pub rpc_url: Option<String>,

    /// Treasury address payments are sent to.
    #[serde(default)]
    pub recipient: Option<String>,

    /// Base URL of the verification service.
    #[serde(default = "default_verify_url")]
    pub verify_url: String,

    /// Confirmation poll interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Ceiling on confirmation polling in seconds.
    #[serde(default = "default_confirm_timeout_secs")]
    pub confirm_timeout_secs: u64,

    /// Wait before retrying a failed verification, in seconds.
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,

    /// Lamports kept aside for network fees when checking funds.
    #[serde(default = "default_fee_reserve_lamports")]
    pub fee_reserve_lamports: u64,

    /// HTTP timeout for ledger and verification requests, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for PayerConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            recipient: None,
            verify_url: default_verify_url(),
            poll_interval_ms: default_poll_interval_ms(),
            confirm_timeout_secs: default_confirm_timeout_secs(),
            grace_period_secs: default_grace_period_secs(),
            fee_reserve_lamports: default_fee_reserve_lamports(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl PayerConfig {
    /// Interval between confirmation polls.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Total time allowed for confirmation polling.
    #[must_use]
    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    /// Wait before the verification retry.
    #[must_use]
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    /// HTTP request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_verify_url() -> String {
    "http://127.0.0.1:8787".to_string()
}

const fn default_poll_interval_ms() -> u64 {
    2_000
}

const fn default_confirm_timeout_secs() -> u64 {
    90
}

const fn default_grace_period_secs() -> u64 {
    3
}

const fn default_fee_reserve_lamports() -> u64 {
    1_000_000
}

const fn default_request_timeout_secs() -> u64 {
    30
}
