//! Transaction pool (mempool) for pending transactions
//!
//! Keeps accepted transactions in arrival order together with an index of
//! the outputs they spend, so a transaction spending an already-spent output
//! is caught as a double-spend and handed to the notification subsystem.

use crate::core::{OutPoint, TransactionRef, TxId};
use crate::doublespend::{DoubleSpendHandler, ValidationState};
use crate::network::NodeId;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Default maximum mempool transaction count
pub const DEFAULT_MEMPOOL_SIZE: usize = 10000;

// =============================================================================
// Error Types
// =============================================================================

/// Mempool errors
#[derive(Error, Debug)]
pub enum MempoolError {
    #[error("Transaction already exists")]
    DuplicateTransaction,
    #[error("Transaction has no inputs")]
    NoInputs,
    #[error("Double spend conflicting with {} mempool transaction(s)", .conflicts.len())]
    DoubleSpend { conflicts: Vec<TransactionRef> },
    #[error("Mempool full")]
    MempoolFull,
}

// =============================================================================
// Mempool
// =============================================================================

/// Memory pool for pending transactions
#[derive(Debug)]
pub struct Mempool {
    /// Transactions indexed by ID
    entries: HashMap<TxId, TransactionRef>,
    /// Transaction IDs in order of arrival
    by_time: Vec<TxId>,
    /// Spent outpoint -> spending transaction
    spent: HashMap<OutPoint, TxId>,
    /// Maximum pool size
    max_size: usize,
}

impl Mempool {
    /// Create a new mempool
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMPOOL_SIZE)
    }

    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            by_time: Vec::new(),
            spent: HashMap::new(),
            max_size,
        }
    }

    /// Add a transaction, rejecting it if it conflicts with the pool
    pub fn add_transaction(&mut self, tx: TransactionRef) -> Result<(), MempoolError> {
        let txid = tx.txid();
        if self.entries.contains_key(&txid) {
            return Err(MempoolError::DuplicateTransaction);
        }
        if tx.inputs.is_empty() {
            return Err(MempoolError::NoInputs);
        }

        let conflicts = self.find_conflicting_txs(&tx);
        if !conflicts.is_empty() {
            return Err(MempoolError::DoubleSpend { conflicts });
        }

        if self.entries.len() >= self.max_size {
            return Err(MempoolError::MempoolFull);
        }

        for input in &tx.inputs {
            self.spent.insert(input.prevout, txid);
        }
        self.by_time.push(txid);
        self.entries.insert(txid, tx);
        Ok(())
    }

    /// Add a transaction received from `peer`, reporting any double-spend
    /// to `handler`
    pub fn accept_transaction(
        &mut self,
        tx: TransactionRef,
        state: &ValidationState,
        peer: NodeId,
        handler: &DoubleSpendHandler,
    ) -> Result<(), MempoolError> {
        let result = self.add_transaction(tx.clone());
        if let Err(MempoolError::DoubleSpend { conflicts }) = &result {
            log::debug!(
                "Transaction {} from peer {} double-spends {} mempool transaction(s)",
                tx.txid(),
                peer,
                conflicts.len()
            );
            handler.handle_double_spend(tx, conflicts.clone(), state, peer);
        }
        result
    }

    /// Pool transactions spending any output `tx` spends, in arrival order
    pub fn find_conflicting_txs(&self, tx: &TransactionRef) -> Vec<TransactionRef> {
        let conflicting: HashSet<TxId> = tx
            .inputs
            .iter()
            .filter_map(|input| self.spent.get(&input.prevout).copied())
            .collect();
        if conflicting.is_empty() {
            return Vec::new();
        }

        self.by_time
            .iter()
            .filter(|id| conflicting.contains(id))
            .filter_map(|id| self.entries.get(id).cloned())
            .collect()
    }

    /// Remove a transaction from the pool
    pub fn remove_transaction(&mut self, txid: &TxId) -> Option<TransactionRef> {
        let tx = self.entries.remove(txid)?;
        self.by_time.retain(|id| id != txid);
        for input in &tx.inputs {
            if self.spent.get(&input.prevout) == Some(txid) {
                self.spent.remove(&input.prevout);
            }
        }
        Some(tx)
    }

    pub fn get(&self, txid: &TxId) -> Option<TransactionRef> {
        self.entries.get(txid).cloned()
    }

    pub fn contains(&self, txid: &TxId) -> bool {
        self.entries.contains_key(txid)
    }

    /// Transactions in arrival order
    pub fn transactions(&self) -> Vec<TransactionRef> {
        self.by_time
            .iter()
            .filter_map(|id| self.entries.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
