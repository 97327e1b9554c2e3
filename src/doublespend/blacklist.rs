//! Time-expiring deny-list for notification endpoints

use std::collections::HashMap;
use std::time::Instant;

/// Endpoints that violated the notification protocol
#[derive(Debug)]
pub struct EndpointBlacklist {
    entries: HashMap<String, Instant>,
    capacity: usize,
}

impl EndpointBlacklist {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity,
        }
    }

    /// Blacklist `addr` until `expiry`, replacing any earlier entry
    pub fn add_at(&mut self, addr: &str, expiry: Instant, now: Instant) {
        if self.capacity == 0 {
            return;
        }

        if !self.entries.contains_key(addr) && self.entries.len() >= self.capacity {
            self.purge_expired(now);
            if self.entries.len() >= self.capacity {
                let soonest = self
                    .entries
                    .iter()
                    .min_by_key(|(_, expiry)| **expiry)
                    .map(|(addr, _)| addr.clone());
                if let Some(victim) = soonest {
                    self.entries.remove(&victim);
                }
            }
        }

        self.entries.insert(addr.to_string(), expiry);
    }

    pub fn add(&mut self, addr: &str, expiry: Instant) {
        self.add_at(addr, expiry, Instant::now())
    }

    /// Expired entries count as absent
    pub fn is_blacklisted_at(&self, addr: &str, now: Instant) -> bool {
        self.entries
            .get(addr)
            .map(|expiry| now < *expiry)
            .unwrap_or(false)
    }

    pub fn is_blacklisted(&self, addr: &str) -> bool {
        self.is_blacklisted_at(addr, Instant::now())
    }

    pub fn purge_expired(&mut self, now: Instant) {
        self.entries.retain(|_, expiry| now < *expiry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
