//! Lookup workflow implementation
//!
//! A lookup runs in two phases:
//!
//! 1. Direct match: chains whose end hash equals the target are replayed
//!    from their start, confirming the target lies on them.
//! 2. Full reversal: for every table (chains sharing walking parameters)
//!    and every chain position `i`, the target is reduced at `i` and walked
//!    to the chain end. A hit in the table's end-hash index is an alarm; it
//!    is resolved by checking the candidate's hash and replaying the
//!    matching chains from their start. A truncated target has no full
//!    digest to reduce, so every chain of the table is replayed instead.
//!
//! Every reported plaintext is confirmed by recomputing its hash, so false
//! alarms never surface. The engine reports its steps to a `SearchObserver`
//! and polls it for cancellation between steps.

use crate::constants::{PROGRESS_REVERSAL_END, PROGRESS_REVERSAL_START};
use crate::domain::FastMap;
use crate::domain::chain::{Chain, ChainParams, hash_chain_from, lookup_hash};
use crate::domain::hash::{TargetHash, gen_hash};
use crate::infra::store::ChainStore;

/// Final result of a lookup
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LookupOutcome {
    Found(String),
    /// Both phases finished without a confirmed plaintext
    NotFound,
    Cancelled,
}

impl LookupOutcome {
    pub fn plaintext(&self) -> Option<&str> {
        match self {
            Self::Found(p) => Some(p),
            _ => None,
        }
    }
}

/// Step reported by the engine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchEvent {
    DirectStarted,
    DirectCandidates { count: usize },
    /// One direct-match candidate was replayed
    ChainReplayed { index: usize },
    ReversalStarted { total_tables: usize },
    /// One position of one table was reduced and walked to the end
    ReductionAttempted,
    TableScanned {
        index: usize,
        total_tables: usize,
        chains: usize,
    },
}

/// Receives engine events and answers cancellation polls
pub trait SearchObserver {
    fn is_cancelled(&self) -> bool {
        false
    }

    fn on_event(&self, _event: SearchEvent) {}
}

/// Observer that ignores everything
pub struct NoopObserver;

impl SearchObserver for NoopObserver {}

struct Cancelled;

/// Chains sharing one set of walking parameters, indexed by end digest
pub struct ChainTable {
    params: ChainParams,
    by_end: FastMap<u128, Vec<String>>,
    chains: usize,
}

impl ChainTable {
    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.chains
    }

    pub fn is_empty(&self) -> bool {
        self.chains == 0
    }

    /// Start plaintexts of the chains ending in `end`
    pub fn starts(&self, end: u128) -> &[String] {
        self.by_end.get(&end).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Group chains into tables, in order of first appearance
///
/// Chains with a malformed end hash cannot be matched and are skipped.
pub fn build_tables(chains: &[Chain]) -> Vec<ChainTable> {
    let mut slots: FastMap<ChainParams, usize> = FastMap::default();
    let mut tables: Vec<ChainTable> = Vec::new();

    for chain in chains {
        let end = match chain.end_digest() {
            Ok(end) => end,
            Err(e) => {
                tracing::warn!(chain_id = chain.id, error = %e, "Skipping chain with malformed end hash");
                continue;
            }
        };

        let params = chain.params();
        let slot = *slots.entry(params.clone()).or_insert_with(|| {
            tables.push(ChainTable {
                params,
                by_end: FastMap::default(),
                chains: 0,
            });
            tables.len() - 1
        });

        let table = &mut tables[slot];
        table
            .by_end
            .entry(end)
            .or_default()
            .push(chain.start_plaintext.clone());
        table.chains += 1;
    }

    tables
}

/// Progress percentage once `index` (0-based) of `total_tables` is scanned
pub fn progress_for_table(index: usize, total_tables: usize) -> u8 {
    if total_tables == 0 {
        return PROGRESS_REVERSAL_END;
    }
    let span = (PROGRESS_REVERSAL_END - PROGRESS_REVERSAL_START) as usize;
    let done = (index + 1).min(total_tables);
    PROGRESS_REVERSAL_START + (span * done / total_tables) as u8
}

/// Reverse a hash against the chains held by a store
///
/// Storage errors never fail the lookup: a failed candidate query skips the
/// direct phase and a failed chain listing leaves nothing to reverse.
pub fn search_hash(
    target: &TargetHash,
    store: &dyn ChainStore,
    observer: &dyn SearchObserver,
) -> LookupOutcome {
    let candidates = || {
        store.find_by_end_hash(target).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Direct-match query failed");
            Vec::new()
        })
    };
    let tables = || {
        let chains = store.find_all().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Chain listing failed");
            Vec::new()
        });
        build_tables(&chains)
    };

    let outcome = run(target, observer, candidates, tables);

    match outcome {
        Ok(Some(plaintext)) => LookupOutcome::Found(plaintext),
        Ok(None) => LookupOutcome::NotFound,
        Err(Cancelled) => LookupOutcome::Cancelled,
    }
}

/// Reverse a hash against an in-memory chain list
pub fn lookup(target: &TargetHash, chains: &[Chain]) -> Option<String> {
    let outcome = run(
        target,
        &NoopObserver,
        || {
            chains
                .iter()
                .filter(|c| c.end_digest().is_ok_and(|end| target.matches(end)))
                .cloned()
                .collect()
        },
        || build_tables(chains),
    );
    outcome.ok().flatten()
}

fn run(
    target: &TargetHash,
    observer: &dyn SearchObserver,
    candidates: impl FnOnce() -> Vec<Chain>,
    tables: impl FnOnce() -> Vec<ChainTable>,
) -> Result<Option<String>, Cancelled> {
    checkpoint(observer)?;
    observer.on_event(SearchEvent::DirectStarted);

    let candidates = candidates();
    observer.on_event(SearchEvent::DirectCandidates {
        count: candidates.len(),
    });
    if let Some(plaintext) = search_direct(target, &candidates, observer)? {
        tracing::debug!(%target, "Direct match confirmed");
        return Ok(Some(plaintext));
    }

    checkpoint(observer)?;
    let tables = tables();
    observer.on_event(SearchEvent::ReversalStarted {
        total_tables: tables.len(),
    });

    for (index, table) in tables.iter().enumerate() {
        checkpoint(observer)?;
        let found = search_table(target, table, observer)?;
        observer.on_event(SearchEvent::TableScanned {
            index,
            total_tables: tables.len(),
            chains: table.len(),
        });
        if found.is_some() {
            tracing::debug!(%target, table = index, "Reversal match confirmed");
            return Ok(found);
        }
    }

    Ok(None)
}

fn checkpoint(observer: &dyn SearchObserver) -> Result<(), Cancelled> {
    if observer.is_cancelled() {
        Err(Cancelled)
    } else {
        Ok(())
    }
}

/// Phase 1: replay chains whose end hash matches the target
fn search_direct(
    target: &TargetHash,
    candidates: &[Chain],
    observer: &dyn SearchObserver,
) -> Result<Option<String>, Cancelled> {
    for (index, chain) in candidates.iter().enumerate() {
        checkpoint(observer)?;
        let found = lookup_hash(target, &chain.start_plaintext, &chain.params(), None);
        observer.on_event(SearchEvent::ChainReplayed { index });
        if found.is_some() {
            return Ok(found);
        }
    }
    Ok(None)
}

/// Phase 2 for one table: try every position the target could occupy
fn search_table(
    target: &TargetHash,
    table: &ChainTable,
    observer: &dyn SearchObserver,
) -> Result<Option<String>, Cancelled> {
    if target.is_truncated() {
        return replay_table(target, table, observer);
    }
    let params = &table.params;

    for position in 0..params.chain_length - 1 {
        checkpoint(observer)?;
        observer.on_event(SearchEvent::ReductionAttempted);

        let candidate = params.reduce(target.value(), position);
        let end = hash_chain_from(&candidate, position + 1, params);
        let starts = table.starts(end);
        if starts.is_empty() {
            continue;
        }

        if target.matches(gen_hash(&candidate)) {
            return Ok(Some(candidate));
        }
        for start in starts {
            if let Some(plaintext) = lookup_hash(target, start, params, None) {
                return Ok(Some(plaintext));
            }
        }
        tracing::debug!(position, "False alarm");
    }

    Ok(None)
}

/// Phase 2 for a truncated target: replay every chain of the table
fn replay_table(
    target: &TargetHash,
    table: &ChainTable,
    observer: &dyn SearchObserver,
) -> Result<Option<String>, Cancelled> {
    for start in table.by_end.values().flatten() {
        checkpoint(observer)?;
        if let Some(plaintext) = lookup_hash(target, start, &table.params, None) {
            return Ok(Some(plaintext));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chain::{enumerate_chain, hash_chain};
    use crate::domain::charset::{Alphabet, CharsetSelector};
    use crate::domain::hash::{digest_to_hex, gen_hash_hex};
    use std::cell::{Cell, RefCell};

    fn chain(id: u64, start: &str, chain_length: u32, variant: u32) -> Chain {
        let params = ChainParams::new(chain_length, variant, 3, 3, Alphabet::new("0123456789"));
        Chain {
            id,
            chain_length,
            start_plaintext: start.into(),
            end_hash: digest_to_hex(hash_chain(start, &params)),
            reduction_variant: variant,
            charset_selector: CharsetSelector::Digits,
            min_length: 3,
            max_length: 3,
            charset_range: String::new(),
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: RefCell<Vec<SearchEvent>>,
        cancel_after: Option<usize>,
        polls: Cell<usize>,
    }

    impl SearchObserver for Recorder {
        fn is_cancelled(&self) -> bool {
            self.polls.set(self.polls.get() + 1);
            self.cancel_after.is_some_and(|n| self.polls.get() > n)
        }

        fn on_event(&self, event: SearchEvent) {
            self.events.borrow_mut().push(event);
        }
    }

    #[test]
    fn test_build_tables_groups_by_params() {
        let chains = vec![
            chain(1, "111", 10, 0),
            chain(2, "222", 10, 0),
            chain(3, "333", 10, 1),
            chain(4, "444", 20, 0),
        ];
        let tables = build_tables(&chains);
        assert_eq!(tables.len(), 3);
        assert_eq!(tables[0].len(), 2);
        assert_eq!(tables[1].params().variant, 1);
        assert_eq!(tables[2].params().chain_length, 20);
    }

    #[test]
    fn test_build_tables_skips_malformed() {
        let mut bad = chain(1, "111", 10, 0);
        bad.end_hash = "zz".into();
        assert!(build_tables(&[bad]).is_empty());
    }

    #[test]
    fn test_progress_for_table() {
        assert_eq!(progress_for_table(0, 1), 90);
        assert_eq!(progress_for_table(0, 2), 60);
        assert_eq!(progress_for_table(1, 2), 90);
        assert_eq!(progress_for_table(0, 0), 90);
    }

    #[test]
    fn test_lookup_finds_every_chain_plaintext() {
        let chains = vec![chain(1, "123", 12, 0), chain(2, "987", 12, 2)];
        for c in &chains {
            for plaintext in enumerate_chain(&c.start_plaintext, &c.params()) {
                let target = TargetHash::parse(&gen_hash_hex(&plaintext)).unwrap();
                let found = lookup(&target, &chains).expect("plaintext on chain must be found");
                assert_eq!(gen_hash(&found), gen_hash(&plaintext));
            }
        }
    }

    #[test]
    fn test_lookup_unknown_hash() {
        let chains = vec![chain(1, "123", 12, 0)];
        let target = TargetHash::parse(&gen_hash_hex("not on any chain")).unwrap();
        assert_eq!(lookup(&target, &chains), None);
    }

    #[test]
    fn test_lookup_empty_chains() {
        let target = TargetHash::parse(&gen_hash_hex("abc")).unwrap();
        assert_eq!(lookup(&target, &[]), None);
    }

    #[test]
    fn test_events_for_exhausted_search() {
        let chains = vec![chain(1, "123", 4, 0), chain(2, "456", 6, 0)];
        let store = crate::infra::memory_store::MemoryChainStore::from_chains(chains);
        let target = TargetHash::parse(&gen_hash_hex("definitely absent")).unwrap();
        let recorder = Recorder::default();

        assert_eq!(search_hash(&target, &store, &recorder), LookupOutcome::NotFound);

        let events = recorder.events.into_inner();
        assert_eq!(events[0], SearchEvent::DirectStarted);
        assert_eq!(events[1], SearchEvent::DirectCandidates { count: 0 });
        assert_eq!(events[2], SearchEvent::ReversalStarted { total_tables: 2 });
        let attempts = events
            .iter()
            .filter(|e| **e == SearchEvent::ReductionAttempted)
            .count();
        assert_eq!(attempts, 3 + 5);
        assert_eq!(
            events.last(),
            Some(&SearchEvent::TableScanned {
                index: 1,
                total_tables: 2,
                chains: 1
            })
        );
    }

    #[test]
    fn test_cancel_before_start() {
        let store = crate::infra::memory_store::MemoryChainStore::from_chains(vec![chain(
            1, "123", 50, 0,
        )]);
        let target = TargetHash::parse(&gen_hash_hex("123")).unwrap();
        let recorder = Recorder {
            cancel_after: Some(0),
            ..Default::default()
        };

        assert_eq!(search_hash(&target, &store, &recorder), LookupOutcome::Cancelled);
        assert!(recorder.events.borrow().is_empty());
    }

    #[test]
    fn test_cancel_mid_reversal() {
        let store = crate::infra::memory_store::MemoryChainStore::from_chains(vec![chain(
            1, "123", 500, 0,
        )]);
        let target = TargetHash::parse(&gen_hash_hex("absent")).unwrap();
        let recorder = Recorder {
            cancel_after: Some(10),
            ..Default::default()
        };

        assert_eq!(search_hash(&target, &store, &recorder), LookupOutcome::Cancelled);
        let attempts = recorder
            .events
            .borrow()
            .iter()
            .filter(|e| **e == SearchEvent::ReductionAttempted)
            .count();
        assert!(attempts < 499);
    }

    #[test]
    fn test_truncated_target_found_at_every_position() {
        let chains = vec![chain(1, "123", 12, 0), chain(2, "987", 12, 2)];

        for c in &chains {
            for plaintext in enumerate_chain(&c.start_plaintext, &c.params()) {
                let truncated = TargetHash::parse(&gen_hash_hex(&plaintext)[8..24]).unwrap();
                let found = lookup(&truncated, &chains)
                    .unwrap_or_else(|| panic!("missed {:?} by truncated hash", plaintext));
                assert!(truncated.matches(gen_hash(&found)));
            }
        }
    }

    #[test]
    fn test_truncated_replay_honours_cancellation() {
        let chains = vec![chain(1, "123", 12, 0), chain(2, "456", 12, 0)];
        let miss = TargetHash::parse(&gen_hash_hex("nowhere")[8..24]).unwrap();
        let observer = Recorder {
            cancel_after: Some(3),
            ..Default::default()
        };

        let outcome = run(
            &miss,
            &observer,
            Vec::new,
            || build_tables(&chains),
        );
        assert!(outcome.is_err());
    }
}
