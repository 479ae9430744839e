//! Durable credit store.
//!
//! Two sled trees hold everything the verification service persists:
//!
//! | Tree        | Key                 | Value                              |
//! |-------------|---------------------|------------------------------------|
//! | `processed` | signature (UTF-8)   | MessagePack `ProcessedSignature`   |
//! | `balances`  | address (UTF-8)     | units (8B BE)                      |
//!
//! The only write path is [`CreditStore::record_credit`], which inserts the
//! signature record and increments the payer's balance inside one sled
//! transaction spanning both trees. A balance never moves without its
//! signature record, and a signature is never recorded twice.

use crate::ledger::{Address, Signature};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};
use sled::{Db, Transactional, Tree};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Errors from the credit store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying sled failure.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// A stored value could not be encoded or decoded.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Crediting would overflow the balance counter.
    #[error("balance overflow for {0}")]
    BalanceOverflow(Address),
}

/// Durable record of a credited signature. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedSignature {
    /// The ledger transaction signature (primary key).
    pub signature: Signature,
    /// Account that paid and was credited.
    pub payer: Address,
    /// Bundle that was bought.
    pub bundle_id: String,
    /// Units added to the payer's balance.
    pub units_credited: u64,
    /// When the credit was committed.
    pub processed_at: DateTime<Utc>,
}

/// Result of [`CreditStore::record_credit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreditOutcome {
    /// This call inserted the record and incremented the balance.
    Credited(ProcessedSignature),
    /// The signature was already recorded; nothing changed.
    AlreadyProcessed(ProcessedSignature),
}

impl CreditOutcome {
    /// The record now stored for the signature.
    #[must_use]
    pub fn record(&self) -> &ProcessedSignature {
        match self {
            Self::Credited(record) | Self::AlreadyProcessed(record) => record,
        }
    }
}

/// Durable signature guard and balance ledger.
#[derive(Debug, Clone)]
pub struct CreditStore {
    db: Db,
    processed: Tree,
    balances: Tree,
}

impl CreditStore {
    /// Open or create a store at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if sled cannot open the database.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::from_db(sled::open(path)?)
    }

    /// Open a throwaway store that is removed on drop.
    ///
    /// # Errors
    ///
    /// Returns an error if sled cannot create the database.
    pub fn open_temporary() -> Result<Self, StoreError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self, StoreError> {
        let processed = db.open_tree("processed")?;
        let balances = db.open_tree("balances")?;
        Ok(Self {
            db,
            processed,
            balances,
        })
    }

    /// Look up a processed signature.
    ///
    /// # Errors
    ///
    /// Returns an error on storage or decoding failure.
    pub fn processed(&self, signature: &Signature) -> Result<Option<ProcessedSignature>, StoreError> {
        self.processed
            .get(signature.as_str())?
            .map(|raw| decode_record(&raw))
            .transpose()
    }

    /// Units held by `address`; zero when the address has no history.
    ///
    /// # Errors
    ///
    /// Returns an error on storage or decoding failure.
    pub fn balance(&self, address: &Address) -> Result<u64, StoreError> {
        self.balances
            .get(address.as_str())?
            .map_or(Ok(0), |raw| decode_units(&raw))
    }

    /// Number of processed signatures.
    #[must_use]
    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    /// Insert `record` if its signature is absent and credit its units, as
    /// one atomic transaction, then flush to disk.
    ///
    /// Concurrent calls for the same signature serialize inside sled: exactly
    /// one observes [`CreditOutcome::Credited`], the rest observe
    /// [`CreditOutcome::AlreadyProcessed`] with the winner's record.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure or balance overflow; nothing is
    /// written in that case.
    pub async fn record_credit(
        &self,
        record: ProcessedSignature,
    ) -> Result<CreditOutcome, StoreError> {
        let encoded = rmp_serde::to_vec_named(&record)
            .map_err(|e| StoreError::Encoding(e.to_string()))?;

        let outcome = (&self.processed, &self.balances).transaction(
            |(processed, balances)| -> ConflictableTransactionResult<CreditOutcome, StoreError> {
                if let Some(existing) = insert_if_absent(processed, &record.signature, &encoded)? {
                    return Ok(CreditOutcome::AlreadyProcessed(existing));
                }
                increment(balances, &record.payer, record.units_credited)?;
                Ok(CreditOutcome::Credited(record.clone()))
            },
        );

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(TransactionError::Abort(e)) => return Err(e),
            Err(TransactionError::Storage(e)) => return Err(StoreError::Sled(e)),
        };

        if matches!(outcome, CreditOutcome::Credited(_)) {
            self.db.flush_async().await?;
            debug!(
                "Recorded credit of {} units for {} ({})",
                record.units_credited, record.payer, record.signature
            );
        }

        Ok(outcome)
    }
}

/// Check-and-insert on the signature guard. Returns the existing record when
/// the signature is already present.
fn insert_if_absent(
    processed: &TransactionalTree,
    signature: &Signature,
    encoded: &[u8],
) -> ConflictableTransactionResult<Option<ProcessedSignature>, StoreError> {
    if let Some(raw) = processed.get(signature.as_str())? {
        return decode_record(&raw)
            .map(Some)
            .map_err(ConflictableTransactionError::Abort);
    }
    processed.insert(signature.as_str(), encoded)?;
    Ok(None)
}

/// Checked increment of a balance counter.
fn increment(
    balances: &TransactionalTree,
    address: &Address,
    units: u64,
) -> ConflictableTransactionResult<u64, StoreError> {
    let current = match balances.get(address.as_str())? {
        Some(raw) => decode_units(&raw).map_err(ConflictableTransactionError::Abort)?,
        None => 0,
    };
    let next = current
        .checked_add(units)
        .ok_or_else(|| ConflictableTransactionError::Abort(StoreError::BalanceOverflow(address.clone())))?;
    balances.insert(address.as_str(), next.to_be_bytes().to_vec())?;
    Ok(next)
}

fn decode_record(raw: &[u8]) -> Result<ProcessedSignature, StoreError> {
    rmp_serde::from_slice(raw).map_err(|e| StoreError::Encoding(e.to_string()))
}

fn decode_units(raw: &[u8]) -> Result<u64, StoreError> {
    let bytes: [u8; 8] = raw
        .try_into()
        .map_err(|_| StoreError::Encoding(format!("balance has {} bytes, expected 8", raw.len())))?;
    Ok(u64::from_be_bytes(bytes))
}
