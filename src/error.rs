//! Error types for token-credit.

use crate::ledger::LedgerError;
use crate::payer::PurchaseError;
use crate::payment::VerificationError;
use crate::store::StoreError;
use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the service layer.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credit store error.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// Ledger RPC error.
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Payment verification error.
    #[error("Verification error: {0}")]
    Verification(#[from] VerificationError),

    /// Purchase error.
    #[error("Purchase error: {0}")]
    Purchase(#[from] PurchaseError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}
