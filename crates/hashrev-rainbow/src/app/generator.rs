//! Chain generation workflow
//!
//! This module provides functions for generating chains and persisting them
//! into a chain store.

use crate::app::config::EngineConfig;
use crate::app::error::ServiceResult;
use crate::domain::chain::{Chain, ChainParams, NewChain, hash_chain};
use crate::domain::charset::{Alphabet, CharsetSelector};
use crate::domain::hash::{digest_to_hex, parse_digest};
use crate::infra::store::ChainStore;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Parameters of a generation request
///
/// Zero values mean "use the configured default"; see [`GenerateRequest::normalized`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub count: usize,
    pub chain_length: u32,
    pub reduction_variant: u32,
    pub charset_selector: CharsetSelector,
    pub charset_range: String,
    pub min_length: usize,
    pub max_length: usize,
}

impl GenerateRequest {
    /// Replace missing values with defaults
    ///
    /// `max_length` falls back to `min_length + spread` when unset or
    /// smaller than `min_length`.
    pub fn normalized(mut self, config: &EngineConfig) -> Self {
        if self.count == 0 {
            self.count = config.default_chain_count;
        }
        if self.chain_length == 0 {
            self.chain_length = config.default_chain_length;
        }
        if self.min_length == 0 {
            self.min_length = config.default_min_length;
        }
        if self.max_length < self.min_length {
            self.max_length = self.min_length + config.default_length_spread;
        }
        self
    }

    pub fn alphabet(&self) -> Alphabet {
        Alphabet::resolve(self.charset_selector, &self.charset_range)
    }

    pub fn params(&self) -> ChainParams {
        ChainParams::new(
            self.chain_length,
            self.reduction_variant,
            self.min_length,
            self.max_length,
            self.alphabet(),
        )
    }

    /// Chain record for a start plaintext, with its end hash computed
    pub fn build_chain(&self, start_plaintext: String) -> NewChain {
        let end = hash_chain(&start_plaintext, &self.params());
        self.chain_record(start_plaintext, digest_to_hex(end))
    }

    fn chain_record(&self, start_plaintext: String, end_hash: String) -> NewChain {
        NewChain {
            chain_length: self.chain_length.max(1),
            start_plaintext,
            end_hash,
            reduction_variant: self.reduction_variant,
            charset_selector: self.charset_selector,
            min_length: self.min_length,
            max_length: self.max_length,
            charset_range: self.charset_range.clone(),
        }
    }
}

/// Random plaintext of `length` symbols drawn from `alphabet`
pub fn random_plaintext<R: Rng + ?Sized>(rng: &mut R, length: usize, alphabet: &Alphabet) -> String {
    (0..length)
        .map(|_| alphabet.symbol(rng.gen_range(0..alphabet.len())))
        .collect()
}

/// Generate `request.count` chains from random start plaintexts
///
/// The request is used as given; normalize it first.
pub fn generate_chains(request: &GenerateRequest) -> Vec<NewChain> {
    generate_chains_with_progress(request, |_, _| {})
}

/// Generate chains with progress callback
///
/// Chains are computed in parallel using rayon; the callback receives
/// `(completed, total)` from the worker threads.
pub fn generate_chains_with_progress<F>(request: &GenerateRequest, on_progress: F) -> Vec<NewChain>
where
    F: Fn(usize, usize) + Sync,
{
    let alphabet = request.alphabet();
    let params = request.params();
    let total = request.count;
    let done = AtomicUsize::new(0);
    let report_every = (total / 100).max(1);

    let chains = (0..total)
        .into_par_iter()
        .map_init(rand::thread_rng, |rng, _| {
            let start = random_plaintext(rng, request.min_length.max(1), &alphabet);
            let end = hash_chain(&start, &params);
            let completed = done.fetch_add(1, Ordering::Relaxed) + 1;
            if completed % report_every == 0 {
                on_progress(completed, total);
            }
            request.chain_record(start, digest_to_hex(end))
        })
        .collect();

    on_progress(total, total);
    chains
}

/// Generate chains from given start plaintexts
pub fn generate_chains_from(starts: &[String], request: &GenerateRequest) -> Vec<NewChain> {
    starts
        .par_iter()
        .map(|start| request.build_chain(start.clone()))
        .collect()
}

/// Persist generated chains, returning how many were stored
///
/// A failed insert is logged and skipped.
pub fn store_chains(store: &dyn ChainStore, chains: Vec<NewChain>) -> usize {
    let mut stored = 0;
    for chain in chains {
        match store.create(chain) {
            Ok(_) => stored += 1,
            Err(e) => tracing::warn!(error = %e, "Failed to store generated chain"),
        }
    }
    stored
}

/// Normalize, generate and persist a batch of chains
pub fn generate_into(
    store: &dyn ChainStore,
    request: GenerateRequest,
    config: &EngineConfig,
) -> usize {
    let request = request.normalized(config);
    let chains = generate_chains(&request);
    let stored = store_chains(store, chains);

    tracing::info!(
        requested = request.count,
        stored,
        chain_length = request.chain_length,
        variant = request.reduction_variant,
        "Generated chains"
    );
    stored
}

/// Insert a single chain
///
/// An empty start plaintext is replaced by a random one of `min_length`; a
/// missing end hash is computed. A supplied end hash must be a full digest.
pub fn add_chain(
    store: &dyn ChainStore,
    request: GenerateRequest,
    start_plaintext: &str,
    end_hash: Option<&str>,
    config: &EngineConfig,
) -> ServiceResult<Chain> {
    let request = GenerateRequest {
        count: 1,
        ..request
    }
    .normalized(config);

    let start = if start_plaintext.is_empty() {
        random_plaintext(&mut rand::thread_rng(), request.min_length, &request.alphabet())
    } else {
        start_plaintext.to_string()
    };

    let chain = match end_hash.filter(|h| !h.is_empty()) {
        Some(hex) => {
            let end = parse_digest(hex)?;
            request.chain_record(start, digest_to_hex(end))
        }
        None => request.build_chain(start),
    };

    let chain = store.create(chain)?;
    tracing::info!(chain_id = chain.id, "Added chain");
    Ok(chain)
}
