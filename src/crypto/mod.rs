//! Cryptographic utilities
//!
//! This module provides SHA-256 hashing used for transaction ids.

pub mod hash;

pub use hash::{double_sha256, sha256, sha256_hex};
