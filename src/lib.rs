//! DSNT node: double-spend attempt notifications for a Bitcoin node
//!
//! When two transactions compete for the same output, the node checks
//! whether either one opted in to notifications with a DSNT output, verifies
//! the double-spend's script and sends the conflicting transaction as proof
//! to the endpoints listed in that output.
//!
//! This crate provides:
//! - Bitcoin transaction and script primitives
//! - A mempool that detects double-spends
//! - Peer misbehavior scoring
//! - The notification subsystem: bounded queueing, fast/slow worker pools,
//!   deadline-bounded script checks, endpoint blacklisting and slow-endpoint
//!   detection
//!
//! # Example
//!
//! ```rust
//! use dsnt_node::doublespend::DsCallbackMsg;
//!
//! // Ask to be notified at 10.0.0.1 about double-spends of input 0
//! let msg = DsCallbackMsg::new(vec!["10.0.0.1".parse().unwrap()], vec![0]);
//! let script = msg.output_script().unwrap();
//!
//! let decoded = DsCallbackMsg::decode(script.dsnt_payload().unwrap()).unwrap();
//! assert_eq!(decoded, msg);
//! ```

pub mod cli;
pub mod core;
pub mod crypto;
pub mod doublespend;
pub mod mining;
pub mod network;

// Re-export commonly used types
pub use core::{
    ChainParams, Coin, CoinsView, MemoryCoinsView, OutPoint, Script, Transaction, TransactionRef,
    TxId, TxIn, TxOut,
};
pub use doublespend::{
    DoubleSpendConfig, DoubleSpendHandler, DsCallbackMsg, HttpTransport, NotificationLevel,
    ScriptInterpreter, ValidationState,
};
pub use mining::Mempool;
pub use network::{MisbehaviorTracker, NodeId, PeerMisbehavior};
