//! Signing interface.
//!
//! The agent never holds a key. A wallet implements [`Signer`] and decides,
//! possibly after asking the user, whether to sign.

use crate::ledger::{Address, SignedTransaction, UnsignedTransfer};
use async_trait::async_trait;
use thiserror::Error;

/// Why a transfer was not signed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignError {
    /// The user declined. Not a failure: the purchase quietly returns to idle.
    #[error("signature request refused")]
    UserRefused,

    /// The wallet could not sign.
    #[error("signing failed: {0}")]
    Failed(String),
}

/// A wallet able to sign transfers for one identity.
#[async_trait]
pub trait Signer: Send + Sync {
    /// The connected account, if any.
    fn identity(&self) -> Option<Address>;

    /// Sign `transfer`, which pays from [`Signer::identity`].
    async fn sign(&self, transfer: UnsignedTransfer) -> Result<SignedTransaction, SignError>;
}
