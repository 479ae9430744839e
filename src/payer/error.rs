//! Purchase failures as seen by the payer.

use crate::ledger::{format_sol, LedgerError, Signature};
use crate::payer::client::RejectionKind;
use std::fmt;
use thiserror::Error;

/// A dependency the agent needs before it can start a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingDependency {
    /// No wallet identity is connected.
    Wallet,
    /// No treasury address is configured.
    Recipient,
    /// No ledger RPC endpoint is configured.
    RpcEndpoint,
}

impl fmt::Display for MissingDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Wallet => "wallet",
            Self::Recipient => "recipient address",
            Self::RpcEndpoint => "RPC endpoint",
        })
    }
}

/// Why a purchase did not complete.
///
/// Errors raised before a signature exists are safe to retry from scratch.
/// Errors raised after it carry the signature: funds may have moved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PurchaseError {
    /// A required dependency is missing. Not retryable until configured.
    #[error("service unavailable: no {missing}")]
    ServiceUnavailable {
        /// What is missing.
        missing: MissingDependency,
    },

    /// The payer cannot cover the price plus the fee reserve.
    #[error(
        "insufficient funds: required {} SOL, available {} SOL",
        format_sol(*required),
        format_sol(*available)
    )]
    InsufficientFunds {
        /// Bundle price in lamports.
        required: u64,
        /// Payer balance in lamports.
        available: u64,
        /// Fee reserve that must remain on top of the price.
        fee_reserve: u64,
    },

    /// The bundle is not in the catalog.
    #[error("unknown bundle: {0}")]
    UnknownBundle(String),

    /// The transfer could not be built or submitted; no signature exists.
    #[error("submission failed: {0}")]
    SubmissionFailed(LedgerError),

    /// Verification failed twice for a submitted transaction.
    #[error("verification of {signature} failed ({kind}): {detail}")]
    VerificationFailed {
        /// Signature of the submitted transfer.
        signature: Signature,
        /// Rejection reported by the service.
        kind: RejectionKind,
        /// Service-provided detail.
        detail: String,
    },

    /// Anything else.
    #[error("{0}")]
    Unknown(String),
}

impl PurchaseError {
    /// Signature of the submitted transfer, when one exists.
    #[must_use]
    pub fn signature(&self) -> Option<&Signature> {
        match self {
            Self::VerificationFailed { signature, .. } => Some(signature),
            _ => None,
        }
    }
}
