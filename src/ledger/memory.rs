//! In-process ledger.
//!
//! Keeps balances, a moving checkpoint and landed transactions in memory and
//! applies transfers on submission. Knobs let callers reproduce the quirks of
//! a real RPC provider: statuses that lag or never show up, transient polling
//! errors, transactions that are not yet visible to `getTransaction`, and
//! rejected submissions.

use super::{
    Address, Checkpoint, Commitment, LedgerError, LedgerRpc, LedgerTransaction, Signature,
    SignatureStatus, SignedTransaction, Transfer,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

/// Default per-transaction fee (lamports).
const DEFAULT_FEE: u64 = 5_000;

/// Blocks a checkpoint stays valid for.
const CHECKPOINT_LIFETIME: u64 = 150;

struct Landed {
    tx: LedgerTransaction,
    status_polls: u32,
}

struct State {
    balances: HashMap<Address, u64>,
    block_height: u64,
    fee: u64,
    transactions: HashMap<Signature, Landed>,
    /// Polls before a landed transaction reports `confirmed`; `None` = never.
    confirm_after: Option<u32>,
    submit_failures: Vec<LedgerError>,
    status_failures: u32,
    hidden: HashMap<Signature, u32>,
    transaction_fetches: u64,
}

/// A ledger that lives entirely in memory.
pub struct InMemoryLedger {
    state: Mutex<State>,
}

impl InMemoryLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                balances: HashMap::new(),
                block_height: 1,
                fee: DEFAULT_FEE,
                transactions: HashMap::new(),
                confirm_after: Some(1),
                submit_failures: Vec::new(),
                status_failures: 0,
                hidden: HashMap::new(),
                transaction_fetches: 0,
            }),
        }
    }

    /// Set the fee charged per submitted transaction.
    #[must_use]
    pub fn with_fee(self, fee: u64) -> Self {
        self.state.lock().fee = fee;
        self
    }

    /// Add lamports to an account.
    pub fn fund(&self, address: &Address, lamports: u64) {
        let mut state = self.state.lock();
        let balance = state.balances.entry(address.clone()).or_default();
        *balance = balance.saturating_add(lamports);
    }

    /// Current balance of an account.
    #[must_use]
    pub fn balance_of(&self, address: &Address) -> u64 {
        self.state.lock().balances.get(address).copied().unwrap_or(0)
    }

    /// Number of status polls before a landed transaction reports confirmed.
    /// `None` keeps every transaction at `processed` forever.
    pub fn confirm_after(&self, polls: Option<u32>) {
        self.state.lock().confirm_after = polls;
    }

    /// Reject the next submission with `error`.
    pub fn fail_next_submit(&self, error: LedgerError) {
        self.state.lock().submit_failures.push(error);
    }

    /// Fail the next `count` status queries with a transport error.
    pub fn fail_status_polls(&self, count: u32) {
        self.state.lock().status_failures = count;
    }

    /// Make the next `fetches` lookups of `signature` report it as unknown.
    pub fn hide_transaction(&self, signature: &Signature, fetches: u32) {
        self.state.lock().hidden.insert(signature.clone(), fetches);
    }

    /// Record an arbitrary landed transaction without moving funds.
    pub fn insert_transaction(&self, tx: LedgerTransaction) {
        self.state.lock().transactions.insert(
            tx.signature.clone(),
            Landed {
                tx,
                status_polls: 0,
            },
        );
    }

    /// Produce a new block, expiring checkpoints older than their lifetime.
    pub fn advance_blocks(&self, blocks: u64) {
        self.state.lock().block_height += blocks;
    }

    /// How many times `get_transaction` has been called.
    #[must_use]
    pub fn transaction_fetches(&self) -> u64 {
        self.state.lock().transaction_fetches
    }

    fn blockhash_at(height: u64) -> String {
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&height.to_le_bytes());
        bs58::encode(bytes).into_string()
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerRpc for InMemoryLedger {
    async fn get_balance(&self, address: &Address) -> Result<u64, LedgerError> {
        Ok(self.balance_of(address))
    }

    async fn latest_checkpoint(&self) -> Result<Checkpoint, LedgerError> {
        let height = self.state.lock().block_height;
        Ok(Checkpoint {
            blockhash: Self::blockhash_at(height),
            last_valid_block_height: height + CHECKPOINT_LIFETIME,
        })
    }

    async fn submit_transaction(&self, tx: &SignedTransaction) -> Result<Signature, LedgerError> {
        let mut state = self.state.lock();

        if !state.submit_failures.is_empty() {
            return Err(state.submit_failures.remove(0));
        }

        if state.transactions.contains_key(&tx.signature) {
            return Ok(tx.signature.clone());
        }

        let transfer = &tx.transfer;
        if transfer.checkpoint.last_valid_block_height < state.block_height {
            return Err(LedgerError::CheckpointExpired);
        }

        let fee = state.fee;
        let debit = transfer
            .lamports
            .checked_add(fee)
            .ok_or(LedgerError::InsufficientFundsForFee)?;
        let available = state.balances.get(&transfer.payer).copied().unwrap_or(0);
        if available < debit {
            return Err(LedgerError::InsufficientFundsForFee);
        }

        state.balances.insert(transfer.payer.clone(), available - debit);
        let credited = state.balances.entry(transfer.recipient.clone()).or_default();
        *credited = credited.saturating_add(transfer.lamports);

        state.transactions.insert(
            tx.signature.clone(),
            Landed {
                tx: LedgerTransaction {
                    signature: tx.signature.clone(),
                    success: true,
                    transfer: Some(Transfer {
                        sender: transfer.payer.clone(),
                        recipient: transfer.recipient.clone(),
                        lamports: transfer.lamports,
                    }),
                },
                status_polls: 0,
            },
        );

        debug!("In-memory ledger landed {}", tx.signature);
        Ok(tx.signature.clone())
    }

    async fn signature_statuses(
        &self,
        signatures: &[Signature],
    ) -> Result<Vec<Option<SignatureStatus>>, LedgerError> {
        let mut state = self.state.lock();

        if state.status_failures > 0 {
            state.status_failures -= 1;
            return Err(LedgerError::Transport("connection reset".to_string()));
        }

        let confirm_after = state.confirm_after;
        Ok(signatures
            .iter()
            .map(|signature| {
                state.transactions.get_mut(signature).map(|landed| {
                    landed.status_polls = landed.status_polls.saturating_add(1);
                    let confirmed = confirm_after.is_some_and(|n| landed.status_polls >= n);
                    SignatureStatus {
                        confirmation: if confirmed {
                            Commitment::Finalized
                        } else {
                            Commitment::Processed
                        },
                        failed: !landed.tx.success,
                    }
                })
            })
            .collect())
    }

    async fn get_transaction(
        &self,
        signature: &Signature,
    ) -> Result<Option<LedgerTransaction>, LedgerError> {
        let mut state = self.state.lock();
        state.transaction_fetches += 1;

        if let Some(remaining) = state.hidden.get_mut(signature) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(None);
            }
        }

        Ok(state
            .transactions
            .get(signature)
            .map(|landed| landed.tx.clone()))
    }
}
