//! Memory-bounded FIFO of detected double-spend attempts

use crate::core::TransactionRef;
use crate::doublespend::NodeId;
use std::collections::VecDeque;

/// A detected double-spend waiting for processing
#[derive(Debug, Clone)]
pub struct DoubleSpendEvent {
    /// The newly received transaction that double-spends
    pub double_spend_txn: TransactionRef,
    /// Mempool transactions it conflicts with
    pub conflicting_txns: Vec<TransactionRef>,
    /// Scripts were already verified during mempool acceptance
    pub scripts_already_checked: bool,
    /// Peer that relayed `double_spend_txn`
    pub sender_peer: NodeId,
    pub approx_memory_bytes: usize,
}

impl DoubleSpendEvent {
    pub fn new(
        double_spend_txn: TransactionRef,
        conflicting_txns: Vec<TransactionRef>,
        scripts_already_checked: bool,
        sender_peer: NodeId,
    ) -> Self {
        let approx_memory_bytes = std::mem::size_of::<Self>()
            + double_spend_txn.serialized_size()
            + conflicting_txns
                .iter()
                .map(|tx| tx.serialized_size())
                .sum::<usize>();

        Self {
            double_spend_txn,
            conflicting_txns,
            scripts_already_checked,
            sender_peer,
            approx_memory_bytes,
        }
    }
}

/// Pending events plus their tracked memory footprint
#[derive(Debug)]
pub struct SubmissionQueue {
    events: VecDeque<DoubleSpendEvent>,
    memory_bytes: usize,
    max_memory_bytes: usize,
}

impl SubmissionQueue {
    pub fn new(max_memory_bytes: usize) -> Self {
        Self {
            events: VecDeque::new(),
            memory_bytes: 0,
            max_memory_bytes,
        }
    }

    /// Append `event` unless it would exceed the memory ceiling
    pub fn enqueue(&mut self, event: DoubleSpendEvent) -> bool {
        let needed = self.memory_bytes.saturating_add(event.approx_memory_bytes);
        if needed > self.max_memory_bytes {
            log::warn!(
                "Double-spend queue full ({} of {} bytes), dropping event for txn {} from peer {}",
                self.memory_bytes,
                self.max_memory_bytes,
                event.double_spend_txn.txid(),
                event.sender_peer
            );
            return false;
        }

        self.memory_bytes = needed;
        self.events.push_back(event);
        true
    }

    /// Pop the oldest event
    pub fn dequeue_front(&mut self) -> Option<DoubleSpendEvent> {
        let event = self.events.pop_front()?;
        self.release(&event);
        Some(event)
    }

    /// Take back the most recently queued event
    pub fn pop_back(&mut self) -> Option<DoubleSpendEvent> {
        let event = self.events.pop_back()?;
        self.release(&event);
        Some(event)
    }

    fn release(&mut self, event: &DoubleSpendEvent) {
        match self.memory_bytes.checked_sub(event.approx_memory_bytes) {
            Some(remaining) => self.memory_bytes = remaining,
            None => {
                log::warn!(
                    "Double-spend queue memory underflow ({} < {}), resetting to 0",
                    self.memory_bytes,
                    event.approx_memory_bytes
                );
                self.memory_bytes = 0;
            }
        }
    }

    pub fn memory_bytes(&self) -> usize {
        self.memory_bytes
    }

    pub fn max_memory_bytes(&self) -> usize {
        self.max_memory_bytes
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
