//! Peer-facing networking concerns
//!
//! Only the pieces the double-spend subsystem talks to live here:
//! - Peer identifiers
//! - Misbehavior scoring and banning

pub mod misbehavior;

pub use misbehavior::{
    BanEntry, MisbehaviorTracker, NodeId, PeerMisbehavior, BAN_SCORE, DEFAULT_BAN_DURATION,
};
