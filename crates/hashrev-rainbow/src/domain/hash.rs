//! Hash function implementations
//!
//! This module provides the digest used to walk chains, target hash parsing
//! (full and truncated widths) and the reduction function of the rainbow
//! table algorithm.

use crate::constants::{
    DIGEST_HEX_LEN, REDUCTION_STRATEGIES, ROTATION_BITS, TRUNCATED_HEX_LEN, TRUNCATED_HEX_OFFSET,
};
use crate::domain::charset::Alphabet;
use std::fmt;
use thiserror::Error;

/// Calculate the digest of a plaintext as a 128-bit integer
#[inline]
pub fn gen_hash(plaintext: &str) -> u128 {
    u128::from_be_bytes(md5::compute(plaintext.as_bytes()).0)
}

/// Render a digest as 32 lowercase hex digits
pub fn digest_to_hex(digest: u128) -> String {
    format!("{:032x}", digest)
}

/// Calculate the hex digest of a plaintext
pub fn gen_hash_hex(plaintext: &str) -> String {
    digest_to_hex(gen_hash(plaintext))
}

/// Parse a full-width hex digest
pub fn parse_digest(hex: &str) -> Result<u128, HashFormatError> {
    if hex.len() != DIGEST_HEX_LEN {
        return Err(HashFormatError::InvalidLength(hex.len()));
    }
    // from_str_radix would also take a leading '+'
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(HashFormatError::InvalidHex(hex.to_string()));
    }
    u128::from_str_radix(hex, 16).map_err(|_| HashFormatError::InvalidHex(hex.to_string()))
}

/// The truncated form of a digest (hex digits 8..24)
#[inline]
pub fn truncate_digest(digest: u128) -> u64 {
    let shift = (DIGEST_HEX_LEN - TRUNCATED_HEX_OFFSET - TRUNCATED_HEX_LEN) * 4;
    (digest >> shift) as u64
}

/// Target hash format errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashFormatError {
    #[error("invalid hash length {0}: expected 32 or 16 hex digits")]
    InvalidLength(usize),
    #[error("hash contains non-hex characters: {0}")]
    InvalidHex(String),
}

/// Hash being reversed, at either accepted width
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetHash {
    /// Full 32-digit digest
    Full(u128),
    /// Truncated 16-digit digest
    Truncated(u64),
}

impl TargetHash {
    /// Parse a user supplied hash (case-insensitive)
    pub fn parse(input: &str) -> Result<Self, HashFormatError> {
        let trimmed = input.trim();
        if !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(HashFormatError::InvalidHex(trimmed.to_string()));
        }
        match trimmed.len() {
            DIGEST_HEX_LEN => parse_digest(trimmed).map(Self::Full),
            TRUNCATED_HEX_LEN => u64::from_str_radix(trimmed, 16)
                .map(Self::Truncated)
                .map_err(|_| HashFormatError::InvalidHex(trimmed.to_string())),
            len => Err(HashFormatError::InvalidLength(len)),
        }
    }

    /// Check a full digest against this target at the target's width
    #[inline]
    pub fn matches(&self, digest: u128) -> bool {
        match *self {
            Self::Full(target) => target == digest,
            Self::Truncated(target) => target == truncate_digest(digest),
        }
    }

    /// Integer value fed into the reduction function
    #[inline]
    pub fn value(&self) -> u128 {
        match *self {
            Self::Full(v) => v,
            Self::Truncated(v) => v as u128,
        }
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, Self::Truncated(_))
    }
}

impl fmt::Display for TargetHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(v) => write!(f, "{:032x}", v),
            Self::Truncated(v) => write!(f, "{:016x}", v),
        }
    }
}

/// Normalize a plaintext length range (min >= 1, max >= min)
#[inline]
pub fn normalize_lengths(min_len: usize, max_len: usize) -> (usize, usize) {
    let min_len = min_len.max(1);
    (min_len, max_len.max(min_len))
}

/// Mix the chain position into the hash value
///
/// The variant id selects one of five strategies (`variant % 5`).
/// Arithmetic wraps at 128 bits, so tables built with unbounded big-integer
/// mixing are not interchangeable with these.
#[inline]
fn mix(hash: u128, position: u32, variant: u32) -> u128 {
    let position = position as u128;
    match variant % REDUCTION_STRATEGIES {
        0 => hash.wrapping_add(position),
        1 => hash ^ position,
        2 => hash.wrapping_mul(position + 1),
        3 => hash.wrapping_add(variant as u128) ^ position,
        _ => hash.rotate_left((position % ROTATION_BITS as u128) as u32),
    }
}

/// Reduce a hash value to a plaintext
///
/// The essence of rainbow tables: the chain position is mixed into the
/// reduction so the same hash yields different plaintexts at different
/// depths. Output length lies in `[min_len, max_len]` and every character
/// comes from `alphabet`. When the mixed integer runs out of entropy it is
/// re-seeded from the digest of `"{index}{hash}{position}"`.
pub fn reduce_hash(
    hash: u128,
    position: u32,
    variant: u32,
    min_len: usize,
    max_len: usize,
    alphabet: &Alphabet,
) -> String {
    let (min_len, max_len) = normalize_lengths(min_len, max_len);
    let mut h = mix(hash, position, variant);

    let span = (max_len - min_len + 1) as u128;
    let length = min_len + (h % span) as usize;

    let radix = alphabet.len() as u128;
    let mut out = String::with_capacity(length);
    for i in 0..length {
        out.push(alphabet.symbol((h % radix) as usize));
        h /= radix;

        if h < radix {
            h = gen_hash(&format!("{}{:032x}{}", i, hash, position));
        }
    }
    out
}
