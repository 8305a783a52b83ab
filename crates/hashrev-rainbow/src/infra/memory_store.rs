//! In-memory store implementations
//!
//! Chains are indexed by end digest at both widths so direct matches are
//! O(1). Task bookkeeping lives in `TaskTable`, shared with the file-backed
//! task store.

use crate::domain::chain::{Chain, NewChain};
use crate::domain::hash::{TargetHash, gen_hash, truncate_digest};
use crate::domain::task::{LookupTask, NewTask, TaskDetail, TaskId, TaskStatus};
use crate::domain::{FastMap, FastSet};
use crate::infra::store::{ChainStore, PlaintextStore, StoreError, StoreResult, TaskStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError, RwLock};

// =============================================================================
// Chains
// =============================================================================

#[derive(Default)]
struct ChainIndex {
    chains: Vec<Chain>,
    by_end: FastMap<u128, Vec<usize>>,
    by_truncated: FastMap<u64, Vec<usize>>,
    next_id: u64,
}

impl ChainIndex {
    fn push(&mut self, chain: Chain) {
        let slot = self.chains.len();
        self.next_id = self.next_id.max(chain.id + 1);

        if let Err(e) = chain.end_digest() {
            tracing::warn!(chain_id = chain.id, error = %e, "Chain has malformed end hash, not indexed");
        }
        self.chains.push(chain);
        self.index(slot);
    }

    fn index(&mut self, slot: usize) {
        if let Ok(end) = self.chains[slot].end_digest() {
            self.by_end.entry(end).or_default().push(slot);
            self.by_truncated
                .entry(truncate_digest(end))
                .or_default()
                .push(slot);
        }
    }

    /// Remove a chain by id; slots shift, so both indexes are rebuilt
    fn remove(&mut self, id: u64) -> Option<Chain> {
        let position = self.chains.iter().position(|c| c.id == id)?;
        let removed = self.chains.remove(position);

        self.by_end.clear();
        self.by_truncated.clear();
        for slot in 0..self.chains.len() {
            self.index(slot);
        }
        Some(removed)
    }

    fn slots(&self, target: &TargetHash) -> &[usize] {
        let slots = match *target {
            TargetHash::Full(v) => self.by_end.get(&v),
            TargetHash::Truncated(v) => self.by_truncated.get(&v),
        };
        slots.map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Chain store held in memory
#[derive(Default)]
pub struct MemoryChainStore {
    inner: RwLock<ChainIndex>,
}

impl MemoryChainStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from already persisted chains (ids are kept)
    pub fn from_chains(chains: impl IntoIterator<Item = Chain>) -> Self {
        let mut index = ChainIndex::default();
        for chain in chains {
            index.push(chain);
        }
        Self {
            inner: RwLock::new(index),
        }
    }

    /// Snapshot of every chain, in insertion order
    pub fn chains(&self) -> Vec<Chain> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .chains
            .clone()
    }
}

impl ChainStore for MemoryChainStore {
    fn find_by_end_hash(&self, target: &TargetHash) -> StoreResult<Vec<Chain>> {
        let index = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(index
            .slots(target)
            .iter()
            .map(|&slot| index.chains[slot].clone())
            .collect())
    }

    fn find_all(&self) -> StoreResult<Vec<Chain>> {
        Ok(self.chains())
    }

    fn create(&self, chain: NewChain) -> StoreResult<Chain> {
        let mut index = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let id = index.next_id.max(1);
        let chain = chain.with_id(id);
        index.push(chain.clone());
        Ok(chain)
    }

    fn delete(&self, id: u64) -> StoreResult<()> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    fn count(&self) -> StoreResult<usize> {
        Ok(self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .chains
            .len())
    }
}

// =============================================================================
// Tasks
// =============================================================================

/// Task records and detail counters
///
/// Serializable so file-backed stores can snapshot it as a whole.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TaskTable {
    tasks: BTreeMap<TaskId, LookupTask>,
    details: BTreeMap<TaskId, TaskDetail>,
    next_id: TaskId,
}

impl TaskTable {
    pub fn create_task(&mut self, task: NewTask) -> StoreResult<LookupTask> {
        if let Some(running) = self
            .tasks
            .values()
            .find(|t| t.user_id == task.user_id && t.status == TaskStatus::InProgress)
        {
            return Err(StoreError::Conflict {
                user_id: task.user_id,
                task_id: running.id,
            });
        }

        self.next_id = self.next_id.max(1);
        let id = self.next_id;
        self.next_id += 1;

        let task = task.with_id(id);
        self.tasks.insert(id, task.clone());
        Ok(task)
    }

    pub fn update_task(&mut self, task: &LookupTask) -> StoreResult<()> {
        let slot = self.tasks.get_mut(&task.id).ok_or(StoreError::NotFound)?;
        *slot = task.clone();
        Ok(())
    }

    pub fn find_task(&self, id: TaskId) -> Option<LookupTask> {
        self.tasks.get(&id).cloned()
    }

    pub fn find_in_progress(&self) -> Vec<LookupTask> {
        self.tasks
            .values()
            .filter(|t| t.status == TaskStatus::InProgress)
            .cloned()
            .collect()
    }

    pub fn upsert_detail(&mut self, detail: &TaskDetail) {
        self.details.insert(detail.task_id, detail.clone());
    }

    pub fn find_detail(&self, id: TaskId) -> Option<TaskDetail> {
        self.details.get(&id).cloned()
    }
}

/// Task store held in memory
#[derive(Default)]
pub struct MemoryTaskStore {
    table: Mutex<TaskTable>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> std::sync::MutexGuard<'_, TaskTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TaskStore for MemoryTaskStore {
    fn create_task(&self, task: NewTask) -> StoreResult<LookupTask> {
        self.table().create_task(task)
    }

    fn update_task(&self, task: &LookupTask) -> StoreResult<()> {
        self.table().update_task(task)
    }

    fn find_task(&self, id: TaskId) -> StoreResult<Option<LookupTask>> {
        Ok(self.table().find_task(id))
    }

    fn find_in_progress(&self) -> StoreResult<Vec<LookupTask>> {
        Ok(self.table().find_in_progress())
    }

    fn upsert_detail(&self, detail: &TaskDetail) -> StoreResult<()> {
        self.table().upsert_detail(detail);
        Ok(())
    }

    fn find_detail(&self, id: TaskId) -> StoreResult<Option<TaskDetail>> {
        Ok(self.table().find_detail(id))
    }
}

// =============================================================================
// Plaintext dictionary
// =============================================================================

#[derive(Default)]
struct Dictionary {
    by_digest: FastMap<u128, String>,
    by_truncated: FastMap<u64, String>,
    seen: FastSet<String>,
}

/// Dictionary of reversed digests held in memory
#[derive(Default)]
pub struct MemoryPlaintextStore {
    inner: RwLock<Dictionary>,
}

impl MemoryPlaintextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .seen
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PlaintextStore for MemoryPlaintextStore {
    fn find_plaintext(&self, target: &TargetHash) -> StoreResult<Option<String>> {
        let dict = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let hit = match *target {
            TargetHash::Full(v) => dict.by_digest.get(&v),
            TargetHash::Truncated(v) => dict.by_truncated.get(&v),
        };
        Ok(hit.cloned())
    }

    fn remember(&self, plaintext: &str) -> StoreResult<()> {
        let mut dict = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if !dict.seen.insert(plaintext.to_string()) {
            return Ok(());
        }
        let digest = gen_hash(plaintext);
        dict.by_digest.insert(digest, plaintext.to_string());
        dict.by_truncated
            .insert(truncate_digest(digest), plaintext.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::charset::CharsetSelector;
    use crate::domain::hash::gen_hash_hex;

    fn new_chain(start: &str, end_hash: String) -> NewChain {
        NewChain {
            chain_length: 1,
            start_plaintext: start.into(),
            end_hash,
            reduction_variant: 0,
            charset_selector: CharsetSelector::Digits,
            min_length: 3,
            max_length: 3,
            charset_range: String::new(),
        }
    }

    #[test]
    fn test_chain_store_assigns_ids() {
        let store = MemoryChainStore::new();
        let a = store.create(new_chain("111", gen_hash_hex("111"))).unwrap();
        let b = store.create(new_chain("222", gen_hash_hex("222"))).unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_chain_store_find_by_end_hash_both_widths() {
        let store = MemoryChainStore::new();
        let end = gen_hash_hex("111");
        store.create(new_chain("111", end.clone())).unwrap();
        store.create(new_chain("222", gen_hash_hex("222"))).unwrap();

        let full = TargetHash::parse(&end).unwrap();
        let found = store.find_by_end_hash(&full).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].start_plaintext, "111");

        let truncated = TargetHash::parse(&end[8..24]).unwrap();
        assert_eq!(store.find_by_end_hash(&truncated).unwrap().len(), 1);

        let miss = TargetHash::parse(&gen_hash_hex("333")).unwrap();
        assert!(store.find_by_end_hash(&miss).unwrap().is_empty());
    }

    #[test]
    fn test_chain_store_keeps_malformed_records_unindexed() {
        let store = MemoryChainStore::new();
        store.create(new_chain("111", "garbage".into())).unwrap();
        assert_eq!(store.find_all().unwrap().len(), 1);
    }

    #[test]
    fn test_chain_store_from_chains_continues_ids() {
        let chain = new_chain("111", gen_hash_hex("111")).with_id(41);
        let store = MemoryChainStore::from_chains(vec![chain]);
        let next = store.create(new_chain("222", gen_hash_hex("222"))).unwrap();
        assert_eq!(next.id, 42);
    }

    #[test]
    fn test_chain_store_delete_reindexes() {
        let store = MemoryChainStore::new();
        let first_end = gen_hash_hex("111");
        let last_end = gen_hash_hex("333");
        let first = store.create(new_chain("111", first_end.clone())).unwrap();
        store.create(new_chain("222", gen_hash_hex("222"))).unwrap();
        let last = store.create(new_chain("333", last_end.clone())).unwrap();

        store.delete(first.id).unwrap();
        assert_eq!(store.count().unwrap(), 2);
        let gone = TargetHash::parse(&first_end).unwrap();
        assert!(store.find_by_end_hash(&gone).unwrap().is_empty());

        // Chains after the removed slot are still found at both widths
        let full = TargetHash::parse(&last_end).unwrap();
        let truncated = TargetHash::parse(&last_end[8..24]).unwrap();
        assert_eq!(store.find_by_end_hash(&full).unwrap()[0].id, last.id);
        assert_eq!(store.find_by_end_hash(&truncated).unwrap()[0].id, last.id);

        // Ids are not reused
        let next = store.create(new_chain("444", gen_hash_hex("444"))).unwrap();
        assert_eq!(next.id, last.id + 1);
    }

    #[test]
    fn test_chain_store_delete_missing() {
        let store = MemoryChainStore::new();
        let chain = store.create(new_chain("111", gen_hash_hex("111"))).unwrap();
        assert!(matches!(store.delete(chain.id + 1), Err(StoreError::NotFound)));
        store.delete(chain.id).unwrap();
        assert!(matches!(store.delete(chain.id), Err(StoreError::NotFound)));
    }

    #[test]
    fn test_task_store_one_in_progress_per_user() {
        let store = MemoryTaskStore::new();
        let first = store.create_task(NewTask::in_progress(1, "aa")).unwrap();

        let err = store.create_task(NewTask::in_progress(1, "bb")).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict { user_id: 1, task_id } if task_id == first.id
        ));

        // Another user is unaffected
        assert!(store.create_task(NewTask::in_progress(2, "cc")).is_ok());

        // Once terminal, the user may start again
        let mut done = first.clone();
        done.status = TaskStatus::Failed;
        store.update_task(&done).unwrap();
        assert!(store.create_task(NewTask::in_progress(1, "dd")).is_ok());
    }

    #[test]
    fn test_task_store_update_missing() {
        let store = MemoryTaskStore::new();
        let ghost = NewTask::in_progress(1, "aa").with_id(99);
        assert!(matches!(store.update_task(&ghost), Err(StoreError::NotFound)));
    }

    #[test]
    fn test_task_store_detail_upsert() {
        let store = MemoryTaskStore::new();
        let mut detail = TaskDetail::new(5);
        store.upsert_detail(&detail).unwrap();
        detail.chains_searched = 10;
        store.upsert_detail(&detail).unwrap();
        assert_eq!(store.find_detail(5).unwrap().unwrap().chains_searched, 10);
        assert!(store.find_detail(6).unwrap().is_none());
    }

    #[test]
    fn test_plaintext_store_both_widths() {
        let store = MemoryPlaintextStore::new();
        store.remember("hello").unwrap();
        store.remember("hello").unwrap();
        assert_eq!(store.len(), 1);

        let hex = gen_hash_hex("hello");
        let full = TargetHash::parse(&hex).unwrap();
        let truncated = TargetHash::parse(&hex[8..24]).unwrap();
        assert_eq!(store.find_plaintext(&full).unwrap().as_deref(), Some("hello"));
        assert_eq!(
            store.find_plaintext(&truncated).unwrap().as_deref(),
            Some("hello")
        );
    }
}
