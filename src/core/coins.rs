//! UTXO snapshot access
//!
//! The double-spend subsystem never owns the UTXO set; it reads coins through
//! the [`CoinsView`] trait. [`MemoryCoinsView`] is a simple in-memory view.

use crate::core::transaction::{OutPoint, Transaction, TxOut};
use parking_lot::RwLock;
use std::collections::HashMap;

/// An unspent output together with the height it was mined at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coin {
    pub output: TxOut,
    pub height: u32,
    pub is_coinbase: bool,
}

impl Coin {
    pub fn new(output: TxOut, height: u32) -> Self {
        Self {
            output,
            height,
            is_coinbase: false,
        }
    }
}

/// Read access to a UTXO snapshot
pub trait CoinsView: Send + Sync {
    /// Look up an unspent coin
    fn get_coin(&self, outpoint: &OutPoint) -> Option<Coin>;

    /// Height of the current chain tip
    fn tip_height(&self) -> u32;
}

/// In-memory UTXO view
#[derive(Debug, Default)]
pub struct MemoryCoinsView {
    coins: RwLock<HashMap<OutPoint, Coin>>,
    tip_height: RwLock<u32>,
}

impl MemoryCoinsView {
    pub fn new(tip_height: u32) -> Self {
        Self {
            coins: RwLock::new(HashMap::new()),
            tip_height: RwLock::new(tip_height),
        }
    }

    pub fn add_coin(&self, outpoint: OutPoint, coin: Coin) {
        self.coins.write().insert(outpoint, coin);
    }

    /// Add every output of `tx` as a coin mined at `height`
    pub fn add_transaction(&self, tx: &Transaction, height: u32) {
        let mut coins = self.coins.write();
        for (vout, output) in tx.outputs.iter().enumerate() {
            coins.insert(
                OutPoint::new(tx.txid(), vout as u32),
                Coin::new(output.clone(), height),
            );
        }
    }

    pub fn spend_coin(&self, outpoint: &OutPoint) -> Option<Coin> {
        self.coins.write().remove(outpoint)
    }

    pub fn set_tip_height(&self, height: u32) {
        *self.tip_height.write() = height;
    }

    pub fn len(&self) -> usize {
        self.coins.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.coins.read().is_empty()
    }
}

impl CoinsView for MemoryCoinsView {
    fn get_coin(&self, outpoint: &OutPoint) -> Option<Coin> {
        self.coins.read().get(outpoint).cloned()
    }

    fn tip_height(&self) -> u32 {
        *self.tip_height.read()
    }
}
