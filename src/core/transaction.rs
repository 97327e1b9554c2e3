//! Transaction handling for the node
//!
//! Bitcoin transactions in their consensus serialization. The transaction id
//! is the double SHA-256 of that serialization, displayed byte-reversed.

use crate::core::encode::{
    compact_size_len, write_compact_size, write_var_bytes, EncodeError, Reader,
};
use crate::core::script::Script;
use crate::crypto::double_sha256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

// =============================================================================
// Constants
// =============================================================================

/// Current transaction version
pub const TX_VERSION: i32 = 2;

/// Sequence number that disables locktime
pub const SEQUENCE_FINAL: u32 = 0xFFFF_FFFF;

/// Shared, immutable transaction handle
pub type TransactionRef = Arc<Transaction>;

// =============================================================================
// Transaction Id
// =============================================================================

/// 32-byte transaction id, stored in internal (hash) byte order
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxId([u8; 32]);

impl TxId {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex in display order (reversed), as used by RPC and endpoints
    pub fn to_hex(&self) -> String {
        let mut bytes = self.0;
        bytes.reverse();
        hex::encode(bytes)
    }
}

impl FromStr for TxId {
    type Err = EncodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decoded = hex::decode(s).map_err(|e| EncodeError::InvalidHex(e.to_string()))?;
        let mut bytes: [u8; 32] = decoded
            .try_into()
            .map_err(|_| EncodeError::InvalidHex(format!("expected 32 bytes: {}", s)))?;
        bytes.reverse();
        Ok(Self(bytes))
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", self.to_hex())
    }
}

impl Serialize for TxId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TxId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Transaction Input / Output
// =============================================================================

/// Reference to a previous transaction output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: TxId,
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: TxId, vout: u32) -> Self {
        Self { txid, vout }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

/// Transaction input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    /// Output being spent
    pub prevout: OutPoint,
    /// Unlocking script
    pub script_sig: Script,
    pub sequence: u32,
}

impl TxIn {
    pub fn new(prevout: OutPoint, script_sig: Script) -> Self {
        Self {
            prevout,
            script_sig,
            sequence: SEQUENCE_FINAL,
        }
    }
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    /// Amount in satoshis
    pub value: i64,
    /// Locking script
    pub script_pubkey: Script,
}

impl TxOut {
    pub fn new(value: i64, script_pubkey: Script) -> Self {
        Self {
            value,
            script_pubkey,
        }
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// A transaction with its id cached at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
    txid: TxId,
}

impl Transaction {
    pub fn new(version: i32, inputs: Vec<TxIn>, outputs: Vec<TxOut>, lock_time: u32) -> Self {
        let mut tx = Self {
            version,
            inputs,
            outputs,
            lock_time,
            txid: TxId::default(),
        };
        tx.txid = TxId(double_sha256(&tx.to_bytes()));
        tx
    }

    pub fn txid(&self) -> TxId {
        self.txid
    }

    /// Consensus serialization
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.serialized_size());
        out.extend_from_slice(&self.version.to_le_bytes());

        write_compact_size(&mut out, self.inputs.len() as u64);
        for input in &self.inputs {
            out.extend_from_slice(input.prevout.txid.as_bytes());
            out.extend_from_slice(&input.prevout.vout.to_le_bytes());
            write_var_bytes(&mut out, input.script_sig.as_bytes());
            out.extend_from_slice(&input.sequence.to_le_bytes());
        }

        write_compact_size(&mut out, self.outputs.len() as u64);
        for output in &self.outputs {
            out.extend_from_slice(&output.value.to_le_bytes());
            write_var_bytes(&mut out, output.script_pubkey.as_bytes());
        }

        out.extend_from_slice(&self.lock_time.to_le_bytes());
        out
    }

    /// Decode a consensus-serialized transaction, rejecting trailing bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, EncodeError> {
        let mut reader = Reader::new(data);
        let version = reader.read_i32_le()?;

        let input_count = reader.read_length()?;
        let mut inputs = Vec::with_capacity(input_count.min(1024));
        for _ in 0..input_count {
            let txid = TxId(reader.read_array()?);
            let vout = reader.read_u32_le()?;
            let script_sig = Script::from_bytes(reader.read_var_bytes()?.to_vec());
            let sequence = reader.read_u32_le()?;
            inputs.push(TxIn {
                prevout: OutPoint::new(txid, vout),
                script_sig,
                sequence,
            });
        }

        let output_count = reader.read_length()?;
        let mut outputs = Vec::with_capacity(output_count.min(1024));
        for _ in 0..output_count {
            let value = reader.read_i64_le()?;
            let script_pubkey = Script::from_bytes(reader.read_var_bytes()?.to_vec());
            outputs.push(TxOut::new(value, script_pubkey));
        }

        let lock_time = reader.read_u32_le()?;
        reader.finish()?;

        Ok(Self::new(version, inputs, outputs, lock_time))
    }

    pub fn from_hex(s: &str) -> Result<Self, EncodeError> {
        let bytes = hex::decode(s).map_err(|e| EncodeError::InvalidHex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Size of the consensus serialization in bytes
    pub fn serialized_size(&self) -> usize {
        let inputs: usize = self
            .inputs
            .iter()
            .map(|i| 32 + 4 + compact_size_len(i.script_sig.len() as u64) + i.script_sig.len() + 4)
            .sum();
        let outputs: usize = self
            .outputs
            .iter()
            .map(|o| 8 + compact_size_len(o.script_pubkey.len() as u64) + o.script_pubkey.len())
            .sum();

        4 + compact_size_len(self.inputs.len() as u64)
            + inputs
            + compact_size_len(self.outputs.len() as u64)
            + outputs
            + 4
    }

    /// Index of the input spending `prevout`, if any
    pub fn find_input(&self, prevout: &OutPoint) -> Option<usize> {
        self.inputs.iter().position(|i| &i.prevout == prevout)
    }

    /// Check if this transaction spends any of the same outputs as `other`
    pub fn conflicts_with(&self, other: &Transaction) -> bool {
        self.inputs
            .iter()
            .any(|i| other.find_input(&i.prevout).is_some())
    }
}

// =============================================================================
// Tests
// =============================================================================
