//! Chain operations implementation
//!
//! This module provides the persisted chain record and the functions for
//! chain generation, verification and position-by-position replay.

use crate::domain::charset::{Alphabet, CharsetSelector};
use crate::domain::hash::{HashFormatError, TargetHash, gen_hash, parse_digest, reduce_hash};
use serde::{Deserialize, Serialize};

/// Persisted chain record
///
/// Invariant: `end_hash == hash_chain(start_plaintext, ..)` for the record's
/// own parameters. Records are immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    pub id: u64,
    pub chain_length: u32,
    pub start_plaintext: String,
    /// Final hash as 32 lowercase hex digits
    pub end_hash: String,
    pub reduction_variant: u32,
    pub charset_selector: CharsetSelector,
    pub min_length: usize,
    pub max_length: usize,
    /// Custom alphabet; overrides `charset_selector` when non-empty
    pub charset_range: String,
}

impl Chain {
    /// Chain walking parameters of this record
    pub fn params(&self) -> ChainParams {
        ChainParams::new(
            self.chain_length,
            self.reduction_variant,
            self.min_length,
            self.max_length,
            Alphabet::resolve(self.charset_selector, &self.charset_range),
        )
    }

    /// Parsed end hash
    pub fn end_digest(&self) -> Result<u128, HashFormatError> {
        parse_digest(&self.end_hash)
    }
}

/// Chain fields before the store assigns an id
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChain {
    pub chain_length: u32,
    pub start_plaintext: String,
    pub end_hash: String,
    pub reduction_variant: u32,
    pub charset_selector: CharsetSelector,
    pub min_length: usize,
    pub max_length: usize,
    pub charset_range: String,
}

impl NewChain {
    pub fn with_id(self, id: u64) -> Chain {
        Chain {
            id,
            chain_length: self.chain_length,
            start_plaintext: self.start_plaintext,
            end_hash: self.end_hash,
            reduction_variant: self.reduction_variant,
            charset_selector: self.charset_selector,
            min_length: self.min_length,
            max_length: self.max_length,
            charset_range: self.charset_range,
        }
    }
}

/// Parameters that define how a chain is walked
///
/// Chains sharing identical parameters belong to the same table.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChainParams {
    /// Number of hash evaluations (always >= 1)
    pub chain_length: u32,
    pub variant: u32,
    pub min_len: usize,
    pub max_len: usize,
    pub alphabet: Alphabet,
}

impl ChainParams {
    pub fn new(
        chain_length: u32,
        variant: u32,
        min_len: usize,
        max_len: usize,
        alphabet: Alphabet,
    ) -> Self {
        Self {
            chain_length: chain_length.max(1),
            variant,
            min_len,
            max_len,
            alphabet,
        }
    }

    /// Reduce a hash at the given chain position
    #[inline]
    pub fn reduce(&self, hash: u128, position: u32) -> String {
        reduce_hash(
            hash,
            position,
            self.variant,
            self.min_len,
            self.max_len,
            &self.alphabet,
        )
    }
}

/// Compute the end hash of a chain
///
/// Starting from `start`, evaluate `chain_length` hashes with a reduction
/// between consecutive hashes (`chain_length - 1` reductions).
pub fn hash_chain(start: &str, params: &ChainParams) -> u128 {
    hash_chain_from(start, 0, params)
}

/// Compute the end hash of a chain entered at `position`
///
/// `plaintext` is taken to sit at `position`; hashes are evaluated for
/// positions `position..chain_length` with reductions keyed by their own
/// position, so the result equals the stored end hash whenever `plaintext`
/// really lies on the chain at `position`.
pub fn hash_chain_from(plaintext: &str, position: u32, params: &ChainParams) -> u128 {
    let last = params.chain_length - 1;
    let mut hash = gen_hash(plaintext);

    for n in position..last {
        let next = params.reduce(hash, n);
        hash = gen_hash(&next);
    }

    hash
}

/// Verify a chain record by re-deriving its end hash
pub fn verify_chain(start: &str, end_hash: u128, params: &ChainParams) -> bool {
    hash_chain(start, params) == end_hash
}

/// Verify a persisted chain record
pub fn verify_record(chain: &Chain) -> bool {
    match chain.end_digest() {
        Ok(end) => verify_chain(&chain.start_plaintext, end, &chain.params()),
        Err(_) => false,
    }
}

/// Replay a chain from its start and return the plaintext whose hash
/// matches the target
///
/// Every position is rebuilt from the start plaintext instead of trusting the
/// stored end hash. `until` bounds the replay (inclusive) so callers that
/// know where the target must sit can stop early.
pub fn lookup_hash(
    target: &TargetHash,
    start: &str,
    params: &ChainParams,
    until: Option<u32>,
) -> Option<String> {
    let last = until.map_or(params.chain_length - 1, |u| u.min(params.chain_length - 1));
    let mut plaintext = start.to_string();

    for n in 0..=last {
        let hash = gen_hash(&plaintext);
        if target.matches(hash) {
            return Some(plaintext);
        }
        if n < last {
            plaintext = params.reduce(hash, n);
        }
    }

    None
}

/// Enumerate every plaintext of a chain
///
/// Returns `chain_length` plaintexts, the first being `start`.
pub fn enumerate_chain(start: &str, params: &ChainParams) -> Vec<String> {
    let mut plaintexts = Vec::with_capacity(params.chain_length as usize);
    let mut current = start.to_string();

    for n in 0..params.chain_length {
        let hash = gen_hash(&current);
        let next = if n + 1 < params.chain_length {
            Some(params.reduce(hash, n))
        } else {
            None
        };
        plaintexts.push(current);
        match next {
            Some(p) => current = p,
            None => break,
        }
    }

    plaintexts
}
