//! Notification candidate resolution
//!
//! Given a mempool transaction and the transaction that double-spends it,
//! works out which of the two asked to be notified, which of its inputs was
//! double-spent, and the locking script of the coin that must be checked.

use crate::core::{ChainParams, CoinsView, OutPoint, Script, ScriptType, TransactionRef};
use crate::doublespend::callback::{CallbackError, DsCallbackMsg};
use std::sync::Arc;
use thiserror::Error;

/// Resolution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Callback message rejected: {0}")]
    Callback(#[from] CallbackError),
    #[error("Missing coin for {0}")]
    MissingCoin(OutPoint),
}

/// Locking script and context of the coin being double-spent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDetails {
    pub script_pubkey: Script,
    pub amount: i64,
    pub coin_height: u32,
    /// Height of the block the spend would be mined in
    pub spend_height: u32,
    pub script_type: ScriptType,
    pub is_standard: bool,
}

/// Everything needed to validate and report one double-spent input
#[derive(Debug, Clone)]
pub struct NotificationCandidate {
    /// Transaction carrying the DSNT output
    pub ds_enabled_txn: TransactionRef,
    pub ds_enabled_input: u32,
    /// The other transaction, sent as proof
    pub conflicting_txn: TransactionRef,
    pub conflicting_input: u32,
    /// Index of the contested input within the double-spend transaction
    pub double_spend_input: u32,
    pub callback_message: DsCallbackMsg,
    pub script_details: ScriptDetails,
}

/// Resolves notification candidates against a UTXO snapshot
#[derive(Clone)]
pub struct NotificationResolver {
    coins: Arc<dyn CoinsView>,
    params: ChainParams,
}

impl NotificationResolver {
    pub fn new(coins: Arc<dyn CoinsView>, params: ChainParams) -> Self {
        Self { coins, params }
    }

    /// Resolve a candidate, logging and swallowing message errors
    pub fn resolve(
        &self,
        mempool_txn: &TransactionRef,
        double_spend_txn: &TransactionRef,
        std_inputs_only: bool,
    ) -> Option<NotificationCandidate> {
        match self.try_resolve(mempool_txn, double_spend_txn, std_inputs_only) {
            Ok(candidate) => candidate,
            Err(e) => {
                log::debug!(
                    "Ignoring double-spend of {} by {}: {}",
                    mempool_txn.txid(),
                    double_spend_txn.txid(),
                    e
                );
                None
            }
        }
    }

    pub fn try_resolve(
        &self,
        mempool_txn: &TransactionRef,
        double_spend_txn: &TransactionRef,
        std_inputs_only: bool,
    ) -> Result<Option<NotificationCandidate>, ResolveError> {
        // Prefer the transaction already in the mempool
        let (enabled, other, payload, enabled_is_ds) = if let Some(p) = dsnt_payload(mempool_txn)
        {
            (mempool_txn, double_spend_txn, p, false)
        } else if let Some(p) = dsnt_payload(double_spend_txn) {
            (double_spend_txn, mempool_txn, p, true)
        } else {
            return Ok(None);
        };

        let callback_message = DsCallbackMsg::decode(payload)?;

        let candidate_inputs: Vec<u32> = if callback_message.inputs.is_empty() {
            (0..enabled.inputs.len() as u32).collect()
        } else {
            callback_message.inputs.clone()
        };

        for enabled_index in candidate_inputs {
            let Some(enabled_input) = enabled.inputs.get(enabled_index as usize) else {
                log::debug!(
                    "Callback message of {} names missing input {}",
                    enabled.txid(),
                    enabled_index
                );
                continue;
            };

            for (other_index, other_input) in other.inputs.iter().enumerate() {
                if other_input.prevout != enabled_input.prevout {
                    continue;
                }

                let double_spend_input = if enabled_is_ds {
                    enabled_index
                } else {
                    other_index as u32
                };

                let script_details = match self.script_details(&enabled_input.prevout) {
                    Ok(details) => details,
                    Err(e) => {
                        log::error!(
                            "Cannot resolve double-spend of {} input {}: {}",
                            double_spend_txn.txid(),
                            double_spend_input,
                            e
                        );
                        continue;
                    }
                };

                if std_inputs_only && !script_details.is_standard {
                    continue;
                }

                return Ok(Some(NotificationCandidate {
                    ds_enabled_txn: enabled.clone(),
                    ds_enabled_input: enabled_index,
                    conflicting_txn: other.clone(),
                    conflicting_input: other_index as u32,
                    double_spend_input,
                    callback_message,
                    script_details,
                }));
            }
        }

        Ok(None)
    }

    /// Fetch the coin spent by `prevout` from the UTXO snapshot
    pub fn script_details(&self, prevout: &OutPoint) -> Result<ScriptDetails, ResolveError> {
        let coin = self
            .coins
            .get_coin(prevout)
            .ok_or(ResolveError::MissingCoin(*prevout))?;

        let script_type = coin.output.script_pubkey.script_type();
        let after_genesis = self.params.is_utxo_after_genesis(coin.height);

        Ok(ScriptDetails {
            amount: coin.output.value,
            coin_height: coin.height,
            spend_height: self.coins.tip_height().saturating_add(1),
            is_standard: script_type.is_standard(after_genesis),
            script_type,
            script_pubkey: coin.output.script_pubkey,
        })
    }
}

/// First DSNT payload among the transaction's outputs
fn dsnt_payload(tx: &TransactionRef) -> Option<&[u8]> {
    tx.outputs
        .iter()
        .find_map(|output| output.script_pubkey.dsnt_payload())
}
