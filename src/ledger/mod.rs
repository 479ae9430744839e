//! Ledger RPC boundary.
//!
//! Everything the engine knows about the chain arrives through [`LedgerRpc`].
//! The ledger is treated as an oracle that is fallible, latent and possibly
//! inconsistent between calls (a node may lag behind its peers), so every
//! method returns a typed [`LedgerError`]. Provider error text is classified
//! exactly once, in [`JsonRpcLedger`]; code above this module matches on
//! variants, never on strings.

mod memory;
mod rpc;

pub use memory::InMemoryLedger;
pub use rpc::{JsonRpcLedger, JsonRpcLedgerConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lamports in one SOL.
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Render lamports as a trimmed SOL decimal (`180_000_000` → `"0.18"`).
#[must_use]
pub fn format_sol(lamports: u64) -> String {
    let whole = lamports / LAMPORTS_PER_SOL;
    let frac = lamports % LAMPORTS_PER_SOL;
    if frac == 0 {
        return whole.to_string();
    }
    let digits = format!("{frac:09}");
    format!("{whole}.{}", digits.trim_end_matches('0'))
}

/// Error parsing a base58 key or signature.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Input is not base58.
    #[error("not valid base58: {0}")]
    Base58(String),

    /// Input decoded to the wrong number of bytes.
    #[error("expected {expected} bytes, got {actual}")]
    Length {
        /// Required byte length.
        expected: usize,
        /// Decoded byte length.
        actual: usize,
    },
}

fn decode_base58(s: &str, expected: usize) -> Result<(), ParseError> {
    let bytes = bs58::decode(s)
        .into_vec()
        .map_err(|e| ParseError::Base58(e.to_string()))?;
    if bytes.len() != expected {
        return Err(ParseError::Length {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

macro_rules! base58_newtype {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Decoded length in bytes.
            pub const LEN: usize = $len;

            /// Build from raw bytes.
            #[must_use]
            pub fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bs58::encode(bytes).into_string())
            }

            /// The base58 text form.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                decode_base58(s, $len)?;
                Ok(Self(s.to_string()))
            }
        }

        impl TryFrom<String> for $name {
            type Error = ParseError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                decode_base58(&s, $len)?;
                Ok(Self(s))
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

base58_newtype!(
    /// A ledger account address (base58, 32 bytes).
    Address,
    32
);

base58_newtype!(
    /// A transaction signature (base58, 64 bytes). Globally unique per transaction.
    Signature,
    64
);

/// Commitment level of a transaction as reported by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    /// Seen by the node, may still be rolled back.
    Processed,
    /// Voted on by a supermajority.
    #[default]
    Confirmed,
    /// Rooted; cannot be rolled back.
    Finalized,
}

impl Commitment {
    /// Wire name used by the JSON-RPC API.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Confirmed => "confirmed",
            Self::Finalized => "finalized",
        }
    }
}

/// Status of a known signature. An unknown signature has no status at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureStatus {
    /// Commitment reached so far.
    pub confirmation: Commitment,
    /// The ledger recorded an execution error for this transaction.
    pub failed: bool,
}

impl SignatureStatus {
    /// Confirmed or finalized with no on-chain error.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        !self.failed && self.confirmation >= Commitment::Confirmed
    }

    /// Confirmed or finalized with an on-chain error.
    ///
    /// A failure seen only at `processed` may still be dropped with its fork.
    #[must_use]
    pub fn has_failed(&self) -> bool {
        self.failed && self.confirmation >= Commitment::Confirmed
    }
}

/// Recent ledger checkpoint ("blockhash") bounding a transaction's validity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The blockhash stamped into the transaction.
    pub blockhash: String,
    /// Last block height at which a transaction using it is accepted.
    pub last_valid_block_height: u64,
}

/// A native-currency transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Debited account.
    pub sender: Address,
    /// Credited account.
    pub recipient: Address,
    /// Amount moved, in lamports.
    pub lamports: u64,
}

/// The ledger's view of a landed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTransaction {
    /// Transaction signature.
    pub signature: Signature,
    /// Executed without an on-chain error.
    pub success: bool,
    /// The native transfer it carries, if any.
    pub transfer: Option<Transfer>,
}

/// A transfer waiting to be signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransfer {
    /// Fee payer and sender.
    pub payer: Address,
    /// Treasury receiving the payment.
    pub recipient: Address,
    /// Amount in lamports.
    pub lamports: u64,
    /// Checkpoint stamped into the message.
    pub checkpoint: Checkpoint,
}

/// A transfer signed by the wallet, ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    /// What was signed.
    pub transfer: UnsignedTransfer,
    /// The payer's signature, which is also the transaction id.
    pub signature: Signature,
    /// Serialized transaction as produced by the signer.
    pub wire: Vec<u8>,
}

/// Typed ledger failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Network failure or timeout talking to the RPC node.
    #[error("ledger unreachable: {0}")]
    Transport(String),

    /// The payer cannot cover the transfer plus fees.
    #[error("insufficient funds for transfer and fee")]
    InsufficientFundsForFee,

    /// The checkpoint stamped into the transaction is no longer valid.
    #[error("checkpoint expired")]
    CheckpointExpired,

    /// Preflight simulation rejected the transaction.
    #[error("transaction simulation failed: {0}")]
    SimulationFailed(String),

    /// Any other RPC error.
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Provider message.
        message: String,
    },

    /// The node answered with something we could not interpret.
    #[error("invalid ledger response: {0}")]
    InvalidResponse(String),
}

impl LedgerError {
    /// Whether retrying the same call later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Rpc { .. })
    }
}

/// Read/write RPC surface of the ledger.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Balance of `address` in lamports.
    async fn get_balance(&self, address: &Address) -> Result<u64, LedgerError>;

    /// A recently observed checkpoint.
    async fn latest_checkpoint(&self) -> Result<Checkpoint, LedgerError>;

    /// Submit a signed transaction, returning its signature.
    async fn submit_transaction(&self, tx: &SignedTransaction) -> Result<Signature, LedgerError>;

    /// Status per signature, `None` where the ledger has not seen it.
    async fn signature_statuses(
        &self,
        signatures: &[Signature],
    ) -> Result<Vec<Option<SignatureStatus>>, LedgerError>;

    /// Fetch a landed transaction; `None` if the ledger does not know it (yet).
    async fn get_transaction(
        &self,
        signature: &Signature,
    ) -> Result<Option<LedgerTransaction>, LedgerError>;
}
