//! User-facing text for purchase failures.
//!
//! Known ledger conditions get a friendly sentence; anything unrecognised is
//! passed through close to verbatim rather than hidden.

use crate::ledger::{format_sol, LedgerError};
use crate::payer::client::RejectionKind;
use crate::payer::error::{MissingDependency, PurchaseError};

/// Text for a ledger failure.
#[must_use]
pub fn ledger_message(error: &LedgerError) -> String {
    match error {
        LedgerError::InsufficientFundsForFee => {
            "Insufficient SOL balance to cover the payment and network fee.".to_string()
        }
        LedgerError::CheckpointExpired => {
            "The transaction expired before it was processed. Please try again.".to_string()
        }
        LedgerError::SimulationFailed(_) => {
            "The transaction was rejected during simulation. Please check your balance and try again."
                .to_string()
        }
        LedgerError::Transport(_) => {
            "Could not reach the Solana network. Please check your connection and try again."
                .to_string()
        }
        LedgerError::Rpc { message, .. } | LedgerError::InvalidResponse(message) => {
            message.clone()
        }
    }
}

/// Text for a failed purchase.
#[must_use]
pub fn purchase_message(error: &PurchaseError) -> String {
    match error {
        PurchaseError::ServiceUnavailable { missing } => match missing {
            MissingDependency::Wallet => "Please connect your wallet first.".to_string(),
            MissingDependency::Recipient | MissingDependency::RpcEndpoint => {
                format!("Payment service is not configured (missing {missing}).")
            }
        },
        PurchaseError::InsufficientFunds {
            required,
            available,
            ..
        } => format!(
            "Insufficient balance. Required: {} SOL, Available: {} SOL",
            format_sol(*required),
            format_sol(*available)
        ),
        PurchaseError::UnknownBundle(id) => format!("Bundle {id} is not available."),
        PurchaseError::SubmissionFailed(e) => ledger_message(e),
        PurchaseError::VerificationFailed {
            signature, kind, ..
        } => format!(
            "{} Transaction signature: {signature}. Keep it for support.",
            rejection_summary(*kind)
        ),
        PurchaseError::Unknown(message) => message.clone(),
    }
}

fn rejection_summary(kind: RejectionKind) -> &'static str {
    match kind {
        RejectionKind::NotFound => "Payment sent but not yet visible on the network.",
        RejectionKind::OnChainError => "The transaction failed on-chain.",
        RejectionKind::MismatchedTransaction => {
            "The transaction does not match this purchase."
        }
        RejectionKind::UnknownBundle => "The service does not offer this bundle.",
        RejectionKind::LedgerUnavailable
        | RejectionKind::Storage
        | RejectionKind::Unreachable
        | RejectionKind::Other => "Payment sent but verification could not complete.",
    }
}
