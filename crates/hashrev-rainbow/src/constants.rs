//! Rainbow table related constants

use std::time::Duration;

// =============================================================================
// Digest parameters
// =============================================================================

/// Hex width of a full MD5 digest
pub const DIGEST_HEX_LEN: usize = 32;

/// Hex width of the truncated ("16-character") digest form
pub const TRUNCATED_HEX_LEN: usize = 16;

/// Offset (in hex digits) of the truncated form inside the full digest
pub const TRUNCATED_HEX_OFFSET: usize = 8;

// =============================================================================
// Reduction function parameters
// =============================================================================

/// Number of distinct mixing strategies (variant ids are taken modulo this)
pub const REDUCTION_STRATEGIES: u32 = 5;

/// Rotation period of the bit-rotation strategy
pub const ROTATION_BITS: u32 = 128;

// =============================================================================
// Chain generation defaults
// =============================================================================

/// Chains generated when a request asks for zero or fewer
pub const DEFAULT_CHAIN_COUNT: usize = 10;

/// Chain length used when a request asks for zero
pub const DEFAULT_CHAIN_LENGTH: u32 = 1000;

/// Minimum plaintext length used when a request asks for zero
pub const DEFAULT_MIN_LENGTH: usize = 3;

/// Extra length added to min when max is missing or smaller than min
pub const DEFAULT_LENGTH_SPREAD: usize = 5;

// =============================================================================
// Task progress
// =============================================================================

/// Progress when the direct end-hash phase starts
pub const PROGRESS_DIRECT_START: u8 = 10;

/// Progress once direct candidates are known
pub const PROGRESS_DIRECT_CANDIDATES: u8 = 20;

/// Progress when the exhaustive reversal phase starts
pub const PROGRESS_REVERSAL_START: u8 = 30;

/// Progress ceiling of the reversal ramp
pub const PROGRESS_REVERSAL_END: u8 = 90;

/// Progress of every terminal task
pub const PROGRESS_DONE: u8 = 100;

/// Progress delta that forces a durable write
pub const SIGNIFICANT_PROGRESS_DELTA: u8 = 5;

/// Minimum spacing between unforced durable writes of one task
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(5);

// =============================================================================
// File format
// =============================================================================

/// Magic bytes of a chain table file
pub const TABLE_MAGIC: [u8; 8] = *b"HREVCHN\0";

/// Current chain table file format version
pub const FILE_FORMAT_VERSION: u16 = 1;

/// Size of the chain table file header
pub const FILE_HEADER_SIZE: usize = 64;
