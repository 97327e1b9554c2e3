//! Per-peer suspension of non-standard double-spend validation
//!
//! Peers whose double-spend proofs repeatedly hit the validation deadline are
//! suspended: for a fixed window, their double-spends are only checked for
//! standard inputs.

use crate::doublespend::counter::{DecayingCounter, MAX_TRACKED_RECORDS};
use crate::doublespend::NodeId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Cancellations tolerated before a peer is suspended
pub const SUSPENSION_MAX_LEVEL: u64 = 10;

/// How quickly the cancellation count drains
pub const SUSPENSION_DRAIN_INTERVAL: Duration = Duration::from_secs(60);

/// Length of a suspension once triggered
pub const SUSPENSION_DURATION: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
struct SuspensionRecord {
    counter: DecayingCounter,
    suspended_until: Option<Instant>,
}

impl SuspensionRecord {
    fn is_suspended_at(&self, now: Instant) -> bool {
        self.suspended_until.map(|until| now < until).unwrap_or(false)
    }
}

/// Tracks validation cancellations per peer
#[derive(Debug, Default)]
pub struct SuspensionTracker {
    records: HashMap<NodeId, SuspensionRecord>,
}

impl SuspensionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a cancelled validation for `peer`
    ///
    /// Returns true only on the transition into overflow, which is also when
    /// the suspension window is armed.
    pub fn record_cancellation_at(&mut self, peer: NodeId, now: Instant) -> bool {
        if self.records.len() >= MAX_TRACKED_RECORDS && !self.records.contains_key(&peer) {
            self.sweep(now);
        }

        let record = self.records.entry(peer).or_insert_with(|| SuspensionRecord {
            counter: DecayingCounter::new_at(
                SUSPENSION_MAX_LEVEL,
                1,
                SUSPENSION_DRAIN_INTERVAL,
                now,
            ),
            suspended_until: None,
        });

        let was_overflowing = record.counter.overflowing_at(now);
        record.counter.increment_at(now);
        let started = !was_overflowing && record.counter.overflowing_at(now);
        if started {
            record.suspended_until = Some(now + SUSPENSION_DURATION);
        }
        started
    }

    pub fn record_cancellation(&mut self, peer: NodeId) -> bool {
        self.record_cancellation_at(peer, Instant::now())
    }

    pub fn is_suspended_at(&self, peer: NodeId, now: Instant) -> bool {
        self.records
            .get(&peer)
            .map(|r| r.is_suspended_at(now))
            .unwrap_or(false)
    }

    pub fn is_suspended(&self, peer: NodeId) -> bool {
        self.is_suspended_at(peer, Instant::now())
    }

    /// Drop records that have drained and carry no active suspension
    pub fn sweep(&mut self, now: Instant) {
        self.records
            .retain(|_, r| !r.counter.is_idle_at(now) || r.is_suspended_at(now));
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
