//! Script System for output locking conditions
//!
//! Byte-level Bitcoin scripts: instruction parsing, standard template
//! classification, recognition of double-spend notification (DSNT) outputs,
//! and the verification flag set handed to the script interpreter.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// Opcodes
// =============================================================================

pub const OP_0: u8 = 0x00;
pub const OP_FALSE: u8 = OP_0;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1NEGATE: u8 = 0x4f;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKMULTISIG: u8 = 0xae;

/// Protocol identifier pushed after `OP_FALSE OP_RETURN` in a DSNT output
pub const DSNT_PROTOCOL_ID: [u8; 4] = *b"dsnt";

/// Maximum number of public keys in a standard bare multisig
pub const MAX_STANDARD_MULTISIG_KEYS: u8 = 3;

// =============================================================================
// Script Errors
// =============================================================================

/// Script-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("Push data runs past end of script")]
    TruncatedPush,
    #[error("Script evaluated to false")]
    EvalFalse,
    #[error("Script verification failed: {0}")]
    VerifyFailed(String),
    #[error("Script execution cancelled")]
    Cancelled,
}

impl ScriptError {
    /// True when execution stopped on a deadline or policy limit rather
    /// than on a failing script
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ScriptError::Cancelled)
    }
}

// =============================================================================
// Script
// =============================================================================

/// A serialized script
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Script(Vec<u8>);

/// A single parsed script element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction<'a> {
    /// Data push (including `OP_0`, which pushes an empty vector)
    Push(&'a [u8]),
    /// Any non-push opcode
    Op(u8),
}

impl Script {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        Ok(Self(hex::decode(s)?))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Append a bare opcode
    pub fn push_opcode(mut self, op: u8) -> Self {
        self.0.push(op);
        self
    }

    /// Append a data push using the smallest encoding
    pub fn push_slice(mut self, data: &[u8]) -> Self {
        match data.len() {
            0 => self.0.push(OP_0),
            len @ 1..=0x4b => self.0.push(len as u8),
            len @ 0x4c..=0xff => {
                self.0.push(OP_PUSHDATA1);
                self.0.push(len as u8);
            }
            len @ 0x100..=0xffff => {
                self.0.push(OP_PUSHDATA2);
                self.0.extend_from_slice(&(len as u16).to_le_bytes());
            }
            len => {
                self.0.push(OP_PUSHDATA4);
                self.0.extend_from_slice(&(len as u32).to_le_bytes());
            }
        }
        self.0.extend_from_slice(data);
        self
    }

    /// Iterate over the script's instructions
    pub fn instructions(&self) -> Instructions<'_> {
        Instructions {
            data: &self.0,
            pos: 0,
        }
    }

    /// Standard pay-to-public-key-hash script
    pub fn p2pkh(pubkey_hash: &[u8; 20]) -> Self {
        Script::new()
            .push_opcode(OP_DUP)
            .push_opcode(OP_HASH160)
            .push_slice(pubkey_hash)
            .push_opcode(OP_EQUALVERIFY)
            .push_opcode(OP_CHECKSIG)
    }

    /// True when the script consists only of data pushes
    pub fn is_push_only(&self) -> bool {
        self.instructions()
            .all(|ins| matches!(ins, Ok(Instruction::Push(_))))
    }

    /// Returns the callback message payload if this is a DSNT output
    ///
    /// Pattern: `OP_FALSE OP_RETURN <"dsnt"> <message>`; further pushes
    /// after the message are tolerated.
    pub fn dsnt_payload(&self) -> Option<&[u8]> {
        let mut it = self.instructions();
        match (it.next(), it.next(), it.next(), it.next()) {
            (
                Some(Ok(Instruction::Push(empty))),
                Some(Ok(Instruction::Op(OP_RETURN))),
                Some(Ok(Instruction::Push(id))),
                Some(Ok(Instruction::Push(msg))),
            ) if empty.is_empty() && id == DSNT_PROTOCOL_ID && !msg.is_empty() => Some(msg),
            _ => None,
        }
    }

    /// Classify against the standard output templates
    pub fn script_type(&self) -> ScriptType {
        let bytes = &self.0;

        if bytes.len() == 25
            && bytes[0] == OP_DUP
            && bytes[1] == OP_HASH160
            && bytes[2] == 20
            && bytes[23] == OP_EQUALVERIFY
            && bytes[24] == OP_CHECKSIG
        {
            return ScriptType::PubKeyHash;
        }

        if bytes.len() == 23 && bytes[0] == OP_HASH160 && bytes[1] == 20 && bytes[22] == OP_EQUAL
        {
            return ScriptType::ScriptHash;
        }

        let ins: Vec<_> = match self.instructions().collect::<Result<Vec<_>, _>>() {
            Ok(ins) => ins,
            Err(_) => return ScriptType::NonStandard,
        };

        match ins.as_slice() {
            [Instruction::Push(key), Instruction::Op(OP_CHECKSIG)] if is_pubkey(key) => {
                ScriptType::PubKey
            }
            [Instruction::Op(OP_RETURN), rest @ ..]
                if rest.iter().all(|i| matches!(i, Instruction::Push(_))) =>
            {
                ScriptType::NullData
            }
            [Instruction::Push(empty), Instruction::Op(OP_RETURN), rest @ ..]
                if empty.is_empty()
                    && rest.iter().all(|i| matches!(i, Instruction::Push(_))) =>
            {
                ScriptType::NullData
            }
            [
                Instruction::Op(m),
                keys @ ..,
                Instruction::Op(n),
                Instruction::Op(OP_CHECKMULTISIG),
            ] => classify_multisig(*m, keys, *n),
            _ => ScriptType::NonStandard,
        }
    }
}

fn is_pubkey(data: &[u8]) -> bool {
    match data.len() {
        33 => data[0] == 0x02 || data[0] == 0x03,
        65 => data[0] == 0x04,
        _ => false,
    }
}

fn small_int(op: u8) -> Option<u8> {
    (OP_1..=OP_16).contains(&op).then(|| op - OP_1 + 1)
}

fn classify_multisig(m: u8, keys: &[Instruction<'_>], n: u8) -> ScriptType {
    let (Some(required), Some(total)) = (small_int(m), small_int(n)) else {
        return ScriptType::NonStandard;
    };
    let all_keys = keys
        .iter()
        .all(|i| matches!(i, Instruction::Push(k) if is_pubkey(k)));
    if !all_keys
        || keys.len() != total as usize
        || required > total
        || total > MAX_STANDARD_MULTISIG_KEYS
    {
        return ScriptType::NonStandard;
    }
    ScriptType::MultiSig { required, total }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Script({})", self.to_hex())
    }
}

/// Iterator over script instructions
pub struct Instructions<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Instructions<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], ScriptError> {
        if self.data.len() - self.pos < len {
            self.pos = self.data.len();
            return Err(ScriptError::TruncatedPush);
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn take_len(&mut self, width: usize) -> Result<usize, ScriptError> {
        let raw = self.take(width)?;
        let mut buf = [0u8; 4];
        buf[..width].copy_from_slice(raw);
        Ok(u32::from_le_bytes(buf) as usize)
    }
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Result<Instruction<'a>, ScriptError>;

    fn next(&mut self) -> Option<Self::Item> {
        let op = *self.data.get(self.pos)?;
        self.pos += 1;

        let len = match op {
            OP_0 => return Some(Ok(Instruction::Push(&[]))),
            1..=0x4b => Ok(op as usize),
            OP_PUSHDATA1 => self.take_len(1),
            OP_PUSHDATA2 => self.take_len(2),
            OP_PUSHDATA4 => self.take_len(4),
            _ => return Some(Ok(Instruction::Op(op))),
        };

        Some(len.and_then(|len| self.take(len)).map(Instruction::Push))
    }
}

// =============================================================================
// Script Types
// =============================================================================

/// The standard template a locking script matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptType {
    /// `<pubkey> OP_CHECKSIG`
    PubKey,
    /// `OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG`
    PubKeyHash,
    /// `OP_HASH160 <20> OP_EQUAL`
    ScriptHash,
    /// Bare M-of-N multisig
    MultiSig { required: u8, total: u8 },
    /// Provably unspendable data carrier
    NullData,
    NonStandard,
}

impl ScriptType {
    /// Standardness of a coin's script
    ///
    /// P2SH outputs created after Genesis activation are not standard.
    pub fn is_standard(&self, utxo_after_genesis: bool) -> bool {
        match self {
            ScriptType::NonStandard => false,
            ScriptType::ScriptHash => !utxo_after_genesis,
            _ => true,
        }
    }

    /// Get the script type name
    pub fn type_name(&self) -> &'static str {
        match self {
            ScriptType::PubKey => "pubkey",
            ScriptType::PubKeyHash => "pubkeyhash",
            ScriptType::ScriptHash => "scripthash",
            ScriptType::MultiSig { .. } => "multisig",
            ScriptType::NullData => "nulldata",
            ScriptType::NonStandard => "nonstandard",
        }
    }
}

// =============================================================================
// Verification Flags
// =============================================================================

bitflags! {
    /// Flags controlling script verification
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ScriptVerifyFlags: u32 {
        const P2SH = 1 << 0;
        const STRICTENC = 1 << 1;
        const DERSIG = 1 << 2;
        const LOW_S = 1 << 3;
        const NULLDUMMY = 1 << 4;
        const MINIMALDATA = 1 << 6;
        const DISCOURAGE_UPGRADABLE_NOPS = 1 << 7;
        const CLEANSTACK = 1 << 8;
        const CHECKLOCKTIMEVERIFY = 1 << 9;
        const CHECKSEQUENCEVERIFY = 1 << 10;
        const SIGHASH_FORKID = 1 << 16;
        const GENESIS = 1 << 18;
        const UTXO_AFTER_GENESIS = 1 << 19;
    }
}

impl ScriptVerifyFlags {
    /// Flags every block must satisfy
    pub fn mandatory() -> Self {
        ScriptVerifyFlags::P2SH | ScriptVerifyFlags::STRICTENC | ScriptVerifyFlags::SIGHASH_FORKID
    }

    /// Additional policy flags applied to unconfirmed transactions
    pub fn standard() -> Self {
        Self::mandatory()
            | ScriptVerifyFlags::DERSIG
            | ScriptVerifyFlags::LOW_S
            | ScriptVerifyFlags::NULLDUMMY
            | ScriptVerifyFlags::MINIMALDATA
            | ScriptVerifyFlags::DISCOURAGE_UPGRADABLE_NOPS
            | ScriptVerifyFlags::CLEANSTACK
            | ScriptVerifyFlags::CHECKLOCKTIMEVERIFY
            | ScriptVerifyFlags::CHECKSEQUENCEVERIFY
    }
}

// =============================================================================
// Tests
// =============================================================================
