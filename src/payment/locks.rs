//! Per-signature mutual exclusion.
//!
//! Duplicate verification calls for one signature queue behind each other so
//! only the first performs the ledger fetch; calls for different signatures
//! never contend. Table entries disappear once nobody holds or awaits them.

use crate::ledger::Signature;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

type Slot = Arc<tokio::sync::Mutex<()>>;

/// Table of per-signature async locks.
#[derive(Default)]
pub struct SignatureLocks {
    table: Mutex<HashMap<Signature, Slot>>,
}

/// Holds the lock for one signature until dropped.
pub struct SignatureGuard<'a> {
    locks: &'a SignatureLocks,
    signature: Signature,
    guard: Option<OwnedMutexGuard<()>>,
}

impl SignatureLocks {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `signature`.
    pub async fn lock(&self, signature: &Signature) -> SignatureGuard<'_> {
        let slot = Arc::clone(self.table.lock().entry(signature.clone()).or_default());
        let guard = slot.lock_owned().await;
        SignatureGuard {
            locks: self,
            signature: signature.clone(),
            guard: Some(guard),
        }
    }

    /// Number of signatures currently locked or awaited.
    #[must_use]
    pub fn active(&self) -> usize {
        self.table.lock().len()
    }
}

impl Drop for SignatureGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut table = self.locks.table.lock();
        // Only the table's own handle left: no holder, no waiter
        if table
            .get(&self.signature)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            table.remove(&self.signature);
        }
    }
}
