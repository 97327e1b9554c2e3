//! Bounded record of transactions we already notified about
//!
//! Entries carry a monotonically increasing insertion index; once the ledger
//! grows past its capacity the oldest entries are evicted first.

use crate::core::TxId;
use std::collections::{HashMap, VecDeque};

#[derive(Debug)]
pub struct NotifiedTxnLedger {
    /// txid -> insertion index
    entries: HashMap<TxId, u64>,
    /// Insertion order (front = oldest)
    order: VecDeque<TxId>,
    next_index: u64,
    capacity: usize,
}

impl NotifiedTxnLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            next_index: 0,
            capacity,
        }
    }

    pub fn contains(&self, txid: &TxId) -> bool {
        self.entries.contains_key(txid)
    }

    /// Record `txid`; a no-op if it is already present
    pub fn record(&mut self, txid: TxId) {
        if self.entries.contains_key(&txid) {
            return;
        }

        self.entries.insert(txid, self.next_index);
        self.order.push_back(txid);
        self.next_index += 1;

        while self.entries.len() > self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    /// Insertion index assigned to `txid`
    pub fn index_of(&self, txid: &TxId) -> Option<u64> {
        self.entries.get(txid).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
