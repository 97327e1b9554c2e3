//! Bitcoin consensus encoding primitives
//!
//! CompactSize varints plus a small cursor-based reader used by the
//! transaction and callback-message decoders.

use thiserror::Error;

/// Largest CompactSize value we accept when decoding a length prefix
pub const MAX_COMPACT_SIZE: u64 = 0x0200_0000;

/// Encoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Unexpected end of data: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },
    #[error("Non-canonical CompactSize encoding")]
    NonCanonicalVarInt,
    #[error("CompactSize too large: {0}")]
    OversizedVarInt(u64),
    #[error("Trailing data: {0} bytes")]
    TrailingData(usize),
    #[error("Invalid hex: {0}")]
    InvalidHex(String),
}

/// Append a CompactSize varint
pub fn write_compact_size(out: &mut Vec<u8>, value: u64) {
    match value {
        0..=0xfc => out.push(value as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

/// Number of bytes a CompactSize varint occupies
pub fn compact_size_len(value: u64) -> usize {
    match value {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

/// Append a length-prefixed byte string
pub fn write_var_bytes(out: &mut Vec<u8>, data: &[u8]) {
    write_compact_size(out, data.len() as u64);
    out.extend_from_slice(data);
}

/// Cursor over a byte slice
#[derive(Debug)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], EncodeError> {
        if self.remaining() < len {
            return Err(EncodeError::UnexpectedEof {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], EncodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, EncodeError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16, EncodeError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, EncodeError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32_le(&mut self) -> Result<i32, EncodeError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64_le(&mut self) -> Result<u64, EncodeError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64_le(&mut self) -> Result<i64, EncodeError> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    /// Read a CompactSize varint, rejecting non-canonical forms
    pub fn read_compact_size(&mut self) -> Result<u64, EncodeError> {
        let value = match self.read_u8()? {
            0xfd => {
                let v = self.read_u16_le()? as u64;
                if v < 0xfd {
                    return Err(EncodeError::NonCanonicalVarInt);
                }
                v
            }
            0xfe => {
                let v = self.read_u32_le()? as u64;
                if v < 0x1_0000 {
                    return Err(EncodeError::NonCanonicalVarInt);
                }
                v
            }
            0xff => {
                let v = self.read_u64_le()?;
                if v < 0x1_0000_0000 {
                    return Err(EncodeError::NonCanonicalVarInt);
                }
                v
            }
            small => small as u64,
        };
        Ok(value)
    }

    /// Read a CompactSize used as a length/count prefix
    pub fn read_length(&mut self) -> Result<usize, EncodeError> {
        let len = self.read_compact_size()?;
        if len > MAX_COMPACT_SIZE {
            return Err(EncodeError::OversizedVarInt(len));
        }
        Ok(len as usize)
    }

    pub fn read_var_bytes(&mut self) -> Result<&'a [u8], EncodeError> {
        let len = self.read_length()?;
        self.read_bytes(len)
    }

    /// Fail unless every byte was consumed
    pub fn finish(self) -> Result<(), EncodeError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(EncodeError::TrailingData(n)),
        }
    }
}
