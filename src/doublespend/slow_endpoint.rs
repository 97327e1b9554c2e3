//! Slow endpoint detection
//!
//! Endpoints that time out more often than the configured hourly rate are
//! treated as slow and only contacted from the slow worker pool.

use crate::doublespend::counter::{DecayingCounter, MAX_TRACKED_RECORDS};
use std::collections::HashMap;
use std::time::{Duration, Instant};

const ONE_HOUR: Duration = Duration::from_secs(60 * 60);

/// Per-endpoint timeout counters
#[derive(Debug)]
pub struct SlowEndpointTracker {
    records: HashMap<String, DecayingCounter>,
    timeouts_per_hour: u32,
}

impl SlowEndpointTracker {
    pub fn new(timeouts_per_hour: u32) -> Self {
        Self {
            records: HashMap::new(),
            timeouts_per_hour: timeouts_per_hour.max(1),
        }
    }

    /// One timeout drains every `60 minutes / rate`
    pub fn drain_interval(&self) -> Duration {
        ONE_HOUR / self.timeouts_per_hour
    }

    pub fn record_timeout_at(&mut self, addr: &str, now: Instant) {
        if self.records.len() >= MAX_TRACKED_RECORDS && !self.records.contains_key(addr) {
            self.sweep(now);
        }

        let max_level = self.timeouts_per_hour as u64;
        let drain = self.drain_interval();
        self.records
            .entry(addr.to_string())
            .or_insert_with(|| DecayingCounter::new_at(max_level, 1, drain, now))
            .increment_at(now);
    }

    pub fn record_timeout(&mut self, addr: &str) {
        self.record_timeout_at(addr, Instant::now())
    }

    pub fn is_slow_at(&self, addr: &str, now: Instant) -> bool {
        self.records
            .get(addr)
            .map(|c| c.overflowing_at(now))
            .unwrap_or(false)
    }

    pub fn is_slow(&self, addr: &str) -> bool {
        self.is_slow_at(addr, Instant::now())
    }

    /// Drop endpoints whose counters have drained
    pub fn sweep(&mut self, now: Instant) {
        self.records.retain(|_, c| !c.is_idle_at(now));
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
