//! Double-spend notification callback message
//!
//! The payload of a DSNT output tells us where to send proofs and which
//! inputs the owner cares about.
//!
//! Layout:
//! - 1 byte: bits 0-4 protocol version, bit 7 set when addresses are IPv6
//! - CompactSize address count (at least one), then 4 or 16 bytes each
//! - CompactSize input count, then each input index as a CompactSize

use crate::core::encode::{write_compact_size, EncodeError, Reader};
use crate::core::script::{Script, DSNT_PROTOCOL_ID, OP_FALSE, OP_RETURN};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;

/// The only callback protocol version we understand
pub const SUPPORTED_VERSION: u8 = 1;

const VERSION_MASK: u8 = 0x1f;
const IPV6_FLAG: u8 = 0x80;

/// Callback message errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallbackError {
    #[error("Unsupported callback protocol version {0}")]
    UnsupportedVersion(u8),
    #[error("Malformed callback message: {0}")]
    Malformed(String),
    #[error("Mixed IPv4 and IPv6 callback addresses")]
    MixedAddressFamilies,
}

impl From<EncodeError> for CallbackError {
    fn from(e: EncodeError) -> Self {
        CallbackError::Malformed(e.to_string())
    }
}

/// Decoded callback message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsCallbackMsg {
    pub version: u8,
    /// Endpoints to notify
    pub addresses: Vec<IpAddr>,
    /// Inputs of interest; empty means all inputs
    pub inputs: Vec<u32>,
}

impl DsCallbackMsg {
    pub fn new(addresses: Vec<IpAddr>, inputs: Vec<u32>) -> Self {
        Self {
            version: SUPPORTED_VERSION,
            addresses,
            inputs,
        }
    }

    /// Decode a message; the version is checked before anything else
    pub fn decode(data: &[u8]) -> Result<Self, CallbackError> {
        let mut reader = Reader::new(data);
        let header = reader.read_u8()?;
        let version = header & VERSION_MASK;
        if version > SUPPORTED_VERSION {
            return Err(CallbackError::UnsupportedVersion(version));
        }
        if version == 0 {
            return Err(CallbackError::Malformed("version 0".to_string()));
        }
        let ipv6 = header & IPV6_FLAG != 0;

        let address_count = reader.read_length()?;
        if address_count == 0 {
            return Err(CallbackError::Malformed("no callback addresses".to_string()));
        }
        let mut addresses = Vec::with_capacity(address_count.min(16));
        for _ in 0..address_count {
            let addr = if ipv6 {
                IpAddr::V6(Ipv6Addr::from(reader.read_array::<16>()?))
            } else {
                IpAddr::V4(Ipv4Addr::from(reader.read_array::<4>()?))
            };
            addresses.push(addr);
        }

        let input_count = reader.read_length()?;
        let mut inputs = Vec::with_capacity(input_count.min(256));
        for _ in 0..input_count {
            let index = reader.read_compact_size()?;
            let index = u32::try_from(index)
                .map_err(|_| CallbackError::Malformed(format!("input index {}", index)))?;
            inputs.push(index);
        }

        reader.finish()?;

        Ok(Self {
            version,
            addresses,
            inputs,
        })
    }

    /// Encode the message; all addresses must share one family
    pub fn encode(&self) -> Result<Vec<u8>, CallbackError> {
        let ipv6 = matches!(self.addresses.first(), Some(IpAddr::V6(_)));
        if self.addresses.iter().any(|a| a.is_ipv6() != ipv6) {
            return Err(CallbackError::MixedAddressFamilies);
        }

        let mut out = Vec::new();
        let flag = if ipv6 { IPV6_FLAG } else { 0 };
        out.push((self.version & VERSION_MASK) | flag);

        write_compact_size(&mut out, self.addresses.len() as u64);
        for addr in &self.addresses {
            match addr {
                IpAddr::V4(v4) => out.extend_from_slice(&v4.octets()),
                IpAddr::V6(v6) => out.extend_from_slice(&v6.octets()),
            }
        }

        write_compact_size(&mut out, self.inputs.len() as u64);
        for input in &self.inputs {
            write_compact_size(&mut out, *input as u64);
        }
        Ok(out)
    }

    /// A complete DSNT output script carrying this message
    pub fn output_script(&self) -> Result<Script, CallbackError> {
        Ok(Script::new()
            .push_opcode(OP_FALSE)
            .push_opcode(OP_RETURN)
            .push_slice(&DSNT_PROTOCOL_ID)
            .push_slice(&self.encode()?))
    }
}
