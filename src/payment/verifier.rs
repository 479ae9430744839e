//! Payment verifier: independent ledger check plus idempotent credit.
//!
//! This is the one place a ledger read is treated as authoritative. The payer's
//! own confirmation polling is advisory; whatever it observed, the credit only
//! happens after this verifier has fetched the transaction itself and matched
//! it against the payer, the treasury and the bundle's exact price.

use crate::catalog::{Bundle, Catalog};
use crate::event::{ServiceEvent, ServiceEventsSender};
use crate::ledger::{Address, LedgerError, LedgerRpc, Signature};
use crate::payment::cache::{CacheStats, ReplayCache};
use crate::payment::locks::SignatureLocks;
use crate::store::{CreditOutcome, CreditStore, ProcessedSignature, StoreError};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Configuration for the payment verifier.
#[derive(Debug, Clone)]
pub struct PaymentVerifierConfig {
    /// Address every payment must be sent to.
    pub treasury: Address,
    /// Replay cache capacity (number of signatures).
    pub cache_capacity: usize,
}

/// Units credited for a verified signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credit {
    /// Units added for this signature (now or by an earlier call).
    pub units_credited: u64,
    /// The signature had already been processed; nothing changed this time.
    pub replayed: bool,
}

/// How a landed transaction differs from the claimed purchase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Mismatch {
    /// No native transfer in the transaction.
    #[error("transaction carries no SOL transfer")]
    NoTransfer,

    /// Paid from another account.
    #[error("sender is {actual}, expected {expected}")]
    Sender {
        /// Claimed payer.
        expected: Address,
        /// Sender on the ledger.
        actual: Address,
    },

    /// Paid to another account.
    #[error("recipient is {actual}, expected treasury {expected}")]
    Recipient {
        /// Configured treasury.
        expected: Address,
        /// Recipient on the ledger.
        actual: Address,
    },

    /// Paid the wrong amount.
    #[error("amount is {actual} lamports, expected {expected}")]
    Amount {
        /// Bundle price.
        expected: u64,
        /// Amount on the ledger.
        actual: u64,
    },
}

/// Why a verification call failed. No failure creates a signature record.
#[derive(Debug, Error)]
pub enum VerificationError {
    /// The requested tier is not in the catalog.
    #[error("unknown bundle: {0}")]
    UnknownBundle(String),

    /// The ledger does not know the signature (yet); retry later.
    #[error("transaction {0} not found on the ledger")]
    NotFound(Signature),

    /// The ledger recorded the transaction as failed.
    #[error("transaction {0} failed on-chain")]
    OnChainError(Signature),

    /// The transaction does not pay for this purchase.
    #[error("transaction does not match the purchase: {0}")]
    MismatchedTransaction(Mismatch),

    /// The ledger could not be queried; retry later.
    #[error("ledger lookup failed: {0}")]
    Ledger(#[from] LedgerError),

    /// The credit store failed.
    #[error("credit store failure: {0}")]
    Store(#[from] StoreError),
}

impl VerificationError {
    /// Stable machine-readable kind, used on the wire.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownBundle(_) => "unknown_bundle",
            Self::NotFound(_) => "not_found",
            Self::OnChainError(_) => "on_chain_error",
            Self::MismatchedTransaction(_) => "mismatched_transaction",
            Self::Ledger(_) => "ledger_unavailable",
            Self::Store(_) => "storage",
        }
    }
}

/// Verification service core.
///
/// Combines:
/// 1. LRU replay cache for recently processed signatures
/// 2. Per-signature locks so duplicate calls queue instead of racing
/// 3. Independent ledger fetch and validation
/// 4. Atomic insert-signature + increment-balance in the credit store
pub struct PaymentVerifier {
    config: PaymentVerifierConfig,
    catalog: Arc<Catalog>,
    ledger: Arc<dyn LedgerRpc>,
    store: CreditStore,
    cache: ReplayCache,
    locks: SignatureLocks,
    events: Option<ServiceEventsSender>,
}

impl PaymentVerifier {
    /// Create a new payment verifier.
    #[must_use]
    pub fn new(
        config: PaymentVerifierConfig,
        catalog: Arc<Catalog>,
        ledger: Arc<dyn LedgerRpc>,
        store: CreditStore,
    ) -> Self {
        info!(
            "Payment verifier initialized (treasury={}, cache_capacity={}, bundles={})",
            config.treasury,
            config.cache_capacity,
            catalog.bundles().len()
        );

        Self {
            cache: ReplayCache::with_capacity(config.cache_capacity),
            locks: SignatureLocks::new(),
            config,
            catalog,
            ledger,
            store,
            events: None,
        }
    }

    /// Publish credit/replay/rejection events on `events`.
    #[must_use]
    pub fn with_events(mut self, events: ServiceEventsSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Verify a claimed payment and credit the payer exactly once.
    ///
    /// 1. Replay: if the signature is already processed, return its recorded
    ///    units without touching the ledger or the balance
    /// 2. Fetch the transaction from the ledger
    /// 3. Match sender, treasury recipient and exact bundle price
    /// 4. Insert the signature record and increment the balance atomically
    ///
    /// # Errors
    ///
    /// * [`VerificationError::NotFound`] - not (yet) on the ledger
    /// * [`VerificationError::OnChainError`] - landed but failed
    /// * [`VerificationError::MismatchedTransaction`] - pays for something else
    /// * [`VerificationError::UnknownBundle`], [`VerificationError::Ledger`],
    ///   [`VerificationError::Store`]
    pub async fn verify(
        &self,
        payer: &Address,
        signature: &Signature,
        bundle_id: &str,
    ) -> Result<Credit, VerificationError> {
        if let Some(record) = self.cache.get(signature) {
            return Ok(self.replay(&record));
        }

        let _guard = self.locks.lock(signature).await;

        let result = self.verify_locked(payer, signature, bundle_id).await;
        if let Err(e) = &result {
            warn!("Verification of {signature} for {payer} rejected: {e}");
            self.emit(ServiceEvent::Rejected {
                signature: signature.clone(),
                reason: e.to_string(),
            });
        }
        result
    }

    async fn verify_locked(
        &self,
        payer: &Address,
        signature: &Signature,
        bundle_id: &str,
    ) -> Result<Credit, VerificationError> {
        // A queued duplicate finds the winner's record here
        if let Some(record) = self.store.processed(signature)? {
            self.cache.insert(record.clone());
            return Ok(self.replay(&record));
        }

        let bundle = self
            .catalog
            .get(bundle_id)
            .ok_or_else(|| VerificationError::UnknownBundle(bundle_id.to_string()))?;

        self.check_transaction(payer, signature, bundle).await?;

        let record = ProcessedSignature {
            signature: signature.clone(),
            payer: payer.clone(),
            bundle_id: bundle.id.clone(),
            units_credited: bundle.units,
            processed_at: Utc::now(),
        };

        match self.store.record_credit(record).await? {
            CreditOutcome::Credited(record) => {
                info!(
                    "Credited {} units to {} for {} ({})",
                    record.units_credited, record.payer, record.bundle_id, record.signature
                );
                self.emit(ServiceEvent::Credited {
                    signature: record.signature.clone(),
                    payer: record.payer.clone(),
                    units: record.units_credited,
                });
                let units_credited = record.units_credited;
                self.cache.insert(record);
                Ok(Credit {
                    units_credited,
                    replayed: false,
                })
            }
            CreditOutcome::AlreadyProcessed(record) => {
                self.cache.insert(record.clone());
                Ok(self.replay(&record))
            }
        }
    }

    async fn check_transaction(
        &self,
        payer: &Address,
        signature: &Signature,
        bundle: &Bundle,
    ) -> Result<(), VerificationError> {
        let tx = self
            .ledger
            .get_transaction(signature)
            .await?
            .ok_or_else(|| VerificationError::NotFound(signature.clone()))?;

        if !tx.success {
            return Err(VerificationError::OnChainError(signature.clone()));
        }

        let transfer = tx
            .transfer
            .ok_or(VerificationError::MismatchedTransaction(Mismatch::NoTransfer))?;

        let mismatch = if transfer.sender != *payer {
            Some(Mismatch::Sender {
                expected: payer.clone(),
                actual: transfer.sender,
            })
        } else if transfer.recipient != self.config.treasury {
            Some(Mismatch::Recipient {
                expected: self.config.treasury.clone(),
                actual: transfer.recipient,
            })
        } else if transfer.lamports != bundle.price_lamports {
            Some(Mismatch::Amount {
                expected: bundle.price_lamports,
                actual: transfer.lamports,
            })
        } else {
            None
        };

        mismatch.map_or(Ok(()), |m| Err(VerificationError::MismatchedTransaction(m)))
    }

    fn replay(&self, record: &ProcessedSignature) -> Credit {
        debug!(
            "Signature {} already processed ({} units)",
            record.signature, record.units_credited
        );
        self.emit(ServiceEvent::Replayed {
            signature: record.signature.clone(),
        });
        Credit {
            units_credited: record.units_credited,
            replayed: true,
        }
    }

    fn emit(&self, event: ServiceEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    /// Units held by `address`; zero for an address with no history.
    ///
    /// # Errors
    ///
    /// Returns an error only if the credit store cannot be read.
    pub fn balance(&self, address: &Address) -> Result<u64, VerificationError> {
        Ok(self.store.balance(address)?)
    }

    /// The bundle catalog.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Treasury address payments must target.
    #[must_use]
    pub fn treasury(&self) -> &Address {
        &self.config.treasury
    }

    /// Number of signatures credited so far.
    #[must_use]
    pub fn processed_count(&self) -> usize {
        self.store.processed_count()
    }

    /// Replay cache statistics.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
