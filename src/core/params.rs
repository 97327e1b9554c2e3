//! Chain parameters relevant to script verification

use crate::core::script::ScriptVerifyFlags;
use serde::{Deserialize, Serialize};

/// Height at which Genesis rules activate on mainnet
pub const MAINNET_GENESIS_HEIGHT: u32 = 620_538;

/// Height at which Genesis rules activate on regtest
pub const REGTEST_GENESIS_HEIGHT: u32 = 10_000;

/// Per-network consensus parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    pub genesis_activation_height: u32,
}

impl ChainParams {
    pub fn mainnet() -> Self {
        Self {
            genesis_activation_height: MAINNET_GENESIS_HEIGHT,
        }
    }

    pub fn regtest() -> Self {
        Self {
            genesis_activation_height: REGTEST_GENESIS_HEIGHT,
        }
    }

    /// Whether a coin mined at `coin_height` was created under Genesis rules
    pub fn is_utxo_after_genesis(&self, coin_height: u32) -> bool {
        coin_height >= self.genesis_activation_height
    }

    /// Verification flags for spending a coin in a block at `spend_height`
    pub fn script_flags(&self, spend_height: u32, coin_height: u32) -> ScriptVerifyFlags {
        let mut flags = ScriptVerifyFlags::standard();
        if spend_height >= self.genesis_activation_height {
            flags |= ScriptVerifyFlags::GENESIS;
        }
        if self.is_utxo_after_genesis(coin_height) {
            flags |= ScriptVerifyFlags::UTXO_AFTER_GENESIS;
        }
        flags
    }
}

impl Default for ChainParams {
    fn default() -> Self {
        Self::mainnet()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_around_activation() {
        let params = ChainParams::regtest();

        let before = params.script_flags(REGTEST_GENESIS_HEIGHT - 1, 5);
        assert!(!before.contains(ScriptVerifyFlags::GENESIS));
        assert!(!before.contains(ScriptVerifyFlags::UTXO_AFTER_GENESIS));

        let after = params.script_flags(REGTEST_GENESIS_HEIGHT, REGTEST_GENESIS_HEIGHT);
        assert!(after.contains(ScriptVerifyFlags::GENESIS));
        assert!(after.contains(ScriptVerifyFlags::UTXO_AFTER_GENESIS));
    }
}
