//! Core node components
//!
//! This module contains the fundamental building blocks:
//! - Consensus encoding (CompactSize varints)
//! - Transactions (Bitcoin serialization and ids)
//! - Script system (templates, DSNT outputs, verification flags)
//! - UTXO snapshot access
//! - Chain parameters

pub mod coins;
pub mod encode;
pub mod params;
pub mod script;
pub mod transaction;

pub use coins::{Coin, CoinsView, MemoryCoinsView};
pub use encode::{EncodeError, Reader};
pub use params::{ChainParams, MAINNET_GENESIS_HEIGHT, REGTEST_GENESIS_HEIGHT};
pub use script::{
    Instruction, Script, ScriptError, ScriptType, ScriptVerifyFlags, DSNT_PROTOCOL_ID,
};
pub use transaction::{
    OutPoint, Transaction, TransactionRef, TxId, TxIn, TxOut, SEQUENCE_FINAL, TX_VERSION,
};
