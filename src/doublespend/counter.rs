//! Leaky-bucket rate counter
//!
//! Rises by `step` on every event and drains by `step` for each full
//! `drain_interval` that passes. Used both for peer misbehavior and for
//! endpoint slowness.

use std::time::{Duration, Instant};

/// Records above which trackers sweep idle entries on insert
pub const MAX_TRACKED_RECORDS: usize = 10_000;

/// Generic decaying counter
#[derive(Debug, Clone)]
pub struct DecayingCounter {
    level: u64,
    max_level: u64,
    step: u64,
    drain_interval: Duration,
    last_update: Instant,
}

impl DecayingCounter {
    pub fn new(max_level: u64, step: u64, drain_interval: Duration) -> Self {
        Self::new_at(max_level, step, drain_interval, Instant::now())
    }

    pub fn new_at(max_level: u64, step: u64, drain_interval: Duration, now: Instant) -> Self {
        Self {
            level: 0,
            max_level,
            step: step.max(1),
            drain_interval,
            last_update: now,
        }
    }

    /// Number of whole drain intervals between `last_update` and `now`
    fn elapsed_intervals(&self, now: Instant) -> u64 {
        if self.drain_interval.is_zero() {
            return u64::MAX;
        }
        let elapsed = now.saturating_duration_since(self.last_update);
        (elapsed.as_nanos() / self.drain_interval.as_nanos()).min(u64::MAX as u128) as u64
    }

    /// Level after applying decay up to `now`, without mutating
    pub fn level_at(&self, now: Instant) -> u64 {
        let drained = self.elapsed_intervals(now).saturating_mul(self.step);
        self.level.saturating_sub(drained)
    }

    pub fn level(&self) -> u64 {
        self.level_at(Instant::now())
    }

    pub fn max_level(&self) -> u64 {
        self.max_level
    }

    fn decay(&mut self, now: Instant) {
        let intervals = self.elapsed_intervals(now);
        if intervals == 0 {
            return;
        }
        self.level = self.level_at(now);
        if self.level == 0 || intervals == u64::MAX {
            self.last_update = now;
        } else {
            // Keep the partial interval so decay stays on schedule
            let advance = self.drain_interval.saturating_mul(intervals.min(u32::MAX as u64) as u32);
            self.last_update = self.last_update.checked_add(advance).unwrap_or(now).min(now);
        }
    }

    /// Decay for elapsed time, then add one step
    pub fn increment_at(&mut self, now: Instant) {
        self.decay(now);
        if self.level == 0 {
            self.last_update = now;
        }
        self.level = self.level.saturating_add(self.step);
    }

    pub fn increment(&mut self) {
        self.increment_at(Instant::now())
    }

    pub fn overflowing_at(&self, now: Instant) -> bool {
        self.level_at(now) >= self.max_level
    }

    pub fn overflowing(&self) -> bool {
        self.overflowing_at(Instant::now())
    }

    /// True when the counter has fully drained
    pub fn is_idle_at(&self, now: Instant) -> bool {
        self.level_at(now) == 0
    }
}
