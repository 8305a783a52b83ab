//! Chain table file format definitions
//!
//! A table file is a 64-byte header followed by variable-length chain
//! records (see `infra::table_io`).

use crate::constants::{FILE_FORMAT_VERSION, FILE_HEADER_SIZE, TABLE_MAGIC};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Table file header metadata
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TableHeader {
    /// File format version
    pub version: u16,
    /// Number of chain records following the header
    pub chain_count: u64,
    /// Creation timestamp (Unix epoch seconds)
    pub created_at: u64,
}

impl TableHeader {
    pub fn new(chain_count: u64) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Self {
            version: FILE_FORMAT_VERSION,
            chain_count,
            created_at,
        }
    }

    /// Serialize header to bytes (64 bytes)
    pub fn to_bytes(&self) -> [u8; FILE_HEADER_SIZE] {
        let mut buf = [0u8; FILE_HEADER_SIZE];

        buf[0..8].copy_from_slice(&TABLE_MAGIC);
        buf[8..10].copy_from_slice(&self.version.to_le_bytes());
        // 10..16 reserved
        buf[16..24].copy_from_slice(&self.chain_count.to_le_bytes());
        buf[24..32].copy_from_slice(&self.created_at.to_le_bytes());
        // 32..64 reserved

        buf
    }

    /// Deserialize header from bytes
    pub fn from_bytes(buf: &[u8; FILE_HEADER_SIZE]) -> Result<Self, TableFormatError> {
        if buf[0..8] != TABLE_MAGIC {
            return Err(TableFormatError::InvalidMagic);
        }

        let version = u16::from_le_bytes([buf[8], buf[9]]);
        if version != FILE_FORMAT_VERSION {
            return Err(TableFormatError::UnsupportedVersion(version));
        }

        let mut count = [0u8; 8];
        count.copy_from_slice(&buf[16..24]);
        let mut created = [0u8; 8];
        created.copy_from_slice(&buf[24..32]);

        Ok(Self {
            version,
            chain_count: u64::from_le_bytes(count),
            created_at: u64::from_le_bytes(created),
        })
    }
}

/// Table format errors
#[derive(Debug, Error)]
pub enum TableFormatError {
    #[error("invalid file format: not a chain table file")]
    InvalidMagic,
    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u16),
    #[error("truncated table: header declares {expected} chains, found {found}")]
    Truncated { expected: u64, found: u64 },
    #[error("chain record {index} has a non UTF-8 string field")]
    InvalidString { index: u64 },
    #[error("chain record {index} field is too long ({len} bytes)")]
    FieldTooLong { index: u64, len: usize },
    #[error("chain record {index} plaintext length {len} does not fit in 32 bits")]
    LengthOutOfRange { index: u64, len: usize },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
