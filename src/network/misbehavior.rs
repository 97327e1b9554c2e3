//! Peer misbehavior scoring
//!
//! Collects ban scores for remote peers. Disconnecting banned peers is the
//! connection manager's job; this only keeps the books.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Identifier of a connected peer
pub type NodeId = i64;

/// Score at which a peer is banned
pub const BAN_SCORE: u32 = 100;

/// How long a ban lasts
pub const DEFAULT_BAN_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Sink for misbehavior reports
pub trait PeerMisbehavior: Send + Sync {
    /// Raise `peer`'s ban score by `score`
    fn misbehaving(&self, peer: NodeId, score: u32, reason: &str);
}

/// Ban record for one peer
#[derive(Debug, Clone)]
pub struct BanEntry {
    pub until: Instant,
    pub reason: String,
}

#[derive(Debug, Default)]
struct Books {
    scores: HashMap<NodeId, u32>,
    bans: HashMap<NodeId, BanEntry>,
}

/// In-memory ban score accounting
#[derive(Debug)]
pub struct MisbehaviorTracker {
    books: RwLock<Books>,
    ban_duration: Duration,
}

impl MisbehaviorTracker {
    pub fn new() -> Self {
        Self::with_ban_duration(DEFAULT_BAN_DURATION)
    }

    pub fn with_ban_duration(ban_duration: Duration) -> Self {
        Self {
            books: RwLock::new(Books::default()),
            ban_duration,
        }
    }

    pub fn score(&self, peer: NodeId) -> u32 {
        self.books.read().scores.get(&peer).copied().unwrap_or(0)
    }

    pub fn is_banned_at(&self, peer: NodeId, now: Instant) -> bool {
        self.books
            .read()
            .bans
            .get(&peer)
            .map(|ban| now < ban.until)
            .unwrap_or(false)
    }

    pub fn is_banned(&self, peer: NodeId) -> bool {
        self.is_banned_at(peer, Instant::now())
    }

    pub fn ban_entry(&self, peer: NodeId) -> Option<BanEntry> {
        self.books.read().bans.get(&peer).cloned()
    }

    /// Forget a disconnected peer's score; bans are kept
    pub fn remove_peer(&self, peer: NodeId) {
        self.books.write().scores.remove(&peer);
    }

    /// Drop expired bans
    pub fn prune_bans(&self, now: Instant) {
        self.books.write().bans.retain(|_, ban| now < ban.until);
    }
}

impl Default for MisbehaviorTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerMisbehavior for MisbehaviorTracker {
    fn misbehaving(&self, peer: NodeId, score: u32, reason: &str) {
        let mut books = self.books.write();
        let total = books.scores.entry(peer).or_insert(0);
        let before = *total;
        *total = total.saturating_add(score);
        let after = *total;

        if before < BAN_SCORE && after >= BAN_SCORE {
            log::warn!("Banning peer {} (score {}): {}", peer, after, reason);
            books.bans.insert(
                peer,
                BanEntry {
                    until: Instant::now() + self.ban_duration,
                    reason: reason.to_string(),
                },
            );
        } else {
            log::info!(
                "Peer {} misbehaving ({} -> {}): {}",
                peer,
                before,
                after,
                reason
            );
        }
    }
}
