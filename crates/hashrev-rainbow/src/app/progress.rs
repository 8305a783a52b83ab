//! Task progress manager
//!
//! Keeps an in-memory mirror of every running lookup, applies progress
//! updates with a throttled write-through to the task store, and owns the
//! per-task cancellation flags.
//!
//! Lock layout: the mirror map, the cancellation flags and the last-flush
//! times each sit behind their own lock and are only held for a map access,
//! never across store I/O. Every snapshot taken under the mirror lock carries
//! a sequence number; durable writes of one task are serialised by that
//! task's writer lock, and a snapshot older than the last one written is
//! dropped. A slow write for one task therefore never stalls readers,
//! cancellation or writes of any other task.

use crate::constants::PROGRESS_DONE;
use crate::domain::task::{TaskId, TaskProgress, TaskStatus};
use crate::domain::{FastMap, FastSet};
use crate::infra::store::TaskStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Decides when a progress change is written to the task store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    significant_delta: u8,
    interval: Duration,
}

impl FlushPolicy {
    pub fn new(significant_delta: u8, interval: Duration) -> Self {
        Self {
            significant_delta,
            interval,
        }
    }

    /// A write is forced on a status change, a significant progress jump
    /// or reaching 100%
    pub fn is_forced(&self, before: (TaskStatus, u8), after: (TaskStatus, u8)) -> bool {
        before.0 != after.0
            || after.1.abs_diff(before.1) >= self.significant_delta
            || after.1 == PROGRESS_DONE
    }

    /// Forced writes always pass; otherwise at most one write per interval
    pub fn should_flush(
        &self,
        before: (TaskStatus, u8),
        after: (TaskStatus, u8),
        last_flush: Option<Instant>,
        now: Instant,
    ) -> bool {
        self.is_forced(before, after)
            || last_flush.is_none_or(|at| now.saturating_duration_since(at) >= self.interval)
    }
}

/// Snapshot queued for a durable write
struct Pending {
    seq: u64,
    snapshot: TaskProgress,
}

/// In-memory task progress with throttled persistence
pub struct TaskProgressManager {
    tasks: RwLock<FastMap<TaskId, TaskProgress>>,
    cancelled: RwLock<FastSet<TaskId>>,
    last_flush: Mutex<FastMap<TaskId, Instant>>,
    /// Per-task writer locks, holding the sequence of the last snapshot written
    writers: Mutex<FastMap<TaskId, Arc<Mutex<u64>>>>,
    next_seq: AtomicU64,
    policy: FlushPolicy,
    store: Arc<dyn TaskStore>,
}

impl TaskProgressManager {
    pub fn new(store: Arc<dyn TaskStore>, policy: FlushPolicy) -> Self {
        Self {
            tasks: RwLock::new(FastMap::default()),
            cancelled: RwLock::new(FastSet::default()),
            last_flush: Mutex::new(FastMap::default()),
            writers: Mutex::new(FastMap::default()),
            next_seq: AtomicU64::new(1),
            policy,
            store,
        }
    }

    pub fn policy(&self) -> FlushPolicy {
        self.policy
    }

    /// Start tracking a task and write its current state through
    pub fn register(&self, progress: TaskProgress) {
        self.register_at(progress, Instant::now());
    }

    pub fn register_at(&self, progress: TaskProgress, now: Instant) {
        let id = progress.id();
        let pending = {
            let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
            let pending = self.stamp(&progress);
            tasks.insert(id, progress);
            self.last_flush
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(id, now);
            pending
        };
        self.persist(pending);
    }

    /// Snapshot of a tracked task
    pub fn read(&self, id: TaskId) -> Option<TaskProgress> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn is_tracked(&self, id: TaskId) -> bool {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    /// Ids of every tracked task
    pub fn tracked_ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self
            .tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Apply a mutation to a tracked task
    ///
    /// Returns `false` when the task is not tracked or already terminal; a
    /// terminal task never changes again. Progress never decreases and is
    /// capped at 100.
    pub fn update(&self, id: TaskId, mutate: impl FnOnce(&mut TaskProgress)) -> bool {
        self.update_at(id, Instant::now(), mutate)
    }

    pub fn update_at(
        &self,
        id: TaskId,
        now: Instant,
        mutate: impl FnOnce(&mut TaskProgress),
    ) -> bool {
        let pending = {
            let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
            let Some(entry) = tasks.get_mut(&id) else {
                return false;
            };
            if entry.task.status.is_terminal() {
                return false;
            }

            let before = (entry.task.status, entry.task.progress);
            mutate(entry);
            entry.task.id = id;
            entry.detail.task_id = id;
            entry.task.progress = entry.task.progress.clamp(before.1, PROGRESS_DONE);
            let after = (entry.task.status, entry.task.progress);

            let mut last_flush = self
                .last_flush
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let flush = self
                .policy
                .should_flush(before, after, last_flush.get(&id).copied(), now);
            if flush {
                last_flush.insert(id, now);
            }
            flush.then(|| self.stamp(entry))
        };

        if let Some(pending) = pending {
            self.persist(pending);
        }

        true
    }

    /// Move a tracked, non-terminal task to a terminal state at 100%
    pub fn complete(&self, id: TaskId, status: TaskStatus, plaintext: Option<String>) -> bool {
        self.update(id, |p| {
            p.task.status = status;
            p.task.progress = PROGRESS_DONE;
            if let Some(plaintext) = plaintext {
                p.task.plaintext = plaintext;
            }
        })
    }

    /// Cancel a tracked task: raise its flag and fail it at 100%
    ///
    /// The flag is raised before the mirror is touched, so the worker sees
    /// it at its next checkpoint whatever else is in flight. Returns `false`
    /// when the task is not tracked or already terminal.
    pub fn cancel(&self, id: TaskId) -> bool {
        self.request_cancel(id);
        let applied = self.complete(id, TaskStatus::Failed, None);
        if !self.is_tracked(id) {
            self.cancelled
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
        }
        applied
    }

    /// Raise the cancellation flag
    pub fn request_cancel(&self, id: TaskId) {
        self.cancelled
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
    }

    pub fn is_cancelled(&self, id: TaskId) -> bool {
        self.cancelled
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&id)
    }

    /// Stop tracking a task and drop its flag and flush bookkeeping
    pub fn remove(&self, id: TaskId) -> Option<TaskProgress> {
        let removed = self
            .tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        self.cancelled
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        self.last_flush
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        self.writers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        removed
    }

    /// Number a snapshot; called with the mirror lock held so numbers follow
    /// the order of mirror states
    fn stamp(&self, snapshot: &TaskProgress) -> Pending {
        Pending {
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            snapshot: snapshot.clone(),
        }
    }

    fn writer(&self, id: TaskId) -> Arc<Mutex<u64>> {
        let mut writers = self.writers.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(writers.entry(id).or_default())
    }

    // Storage failures are logged; the in-memory mirror stays authoritative
    // until the next successful write.
    fn persist(&self, pending: Pending) {
        let Pending { seq, snapshot } = pending;
        let id = snapshot.id();
        let writer = self.writer(id);
        let mut written = writer.lock().unwrap_or_else(PoisonError::into_inner);
        if seq <= *written {
            tracing::debug!(task_id = id, seq, "Dropped stale progress snapshot");
            return;
        }

        if let Err(e) = self.store.update_task(&snapshot.task) {
            tracing::warn!(task_id = id, error = %e, "Failed to persist task progress");
        }
        if let Err(e) = self.store.upsert_detail(&snapshot.detail) {
            tracing::warn!(task_id = id, error = %e, "Failed to persist task detail");
        }
        tracing::debug!(
            task_id = id,
            progress = snapshot.task.progress,
            status = ?snapshot.task.status,
            "Flushed task progress"
        );
        *written = seq;
        drop(written);

        if !self.is_tracked(id) {
            self.writers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::NewTask;
    use crate::domain::task::{LookupTask, TaskDetail};
    use crate::infra::memory_store::MemoryTaskStore;
    use crate::infra::store::StoreResult;
    use std::sync::atomic::AtomicBool;
    use std::sync::mpsc;

    const SECOND: Duration = Duration::from_secs(1);

    fn setup() -> (Arc<MemoryTaskStore>, TaskProgressManager, TaskId) {
        let store = Arc::new(MemoryTaskStore::new());
        let task = store.create_task(NewTask::in_progress(1, "ab")).unwrap();
        let manager = TaskProgressManager::new(store.clone(), FlushPolicy::new(5, 5 * SECOND));
        (store, manager, task.id)
    }

    fn durable_progress(store: &MemoryTaskStore, id: TaskId) -> u8 {
        store.find_task(id).unwrap().unwrap().progress
    }

    #[test]
    fn test_policy_forced_writes() {
        let policy = FlushPolicy::new(5, 5 * SECOND);
        let running = TaskStatus::InProgress;

        assert!(policy.is_forced((running, 10), (TaskStatus::Failed, 10)));
        assert!(policy.is_forced((running, 10), (running, 15)));
        assert!(policy.is_forced((running, 99), (running, 100)));
        assert!(!policy.is_forced((running, 10), (running, 14)));
    }

    #[test]
    fn test_policy_interval() {
        let policy = FlushPolicy::new(5, 5 * SECOND);
        let running = TaskStatus::InProgress;
        let start = Instant::now();

        assert!(policy.should_flush((running, 1), (running, 2), None, start));
        assert!(!policy.should_flush((running, 1), (running, 2), Some(start), start + SECOND));
        assert!(policy.should_flush((running, 1), (running, 2), Some(start), start + 5 * SECOND));
    }

    #[test]
    fn test_register_persists() {
        let (store, manager, id) = setup();
        let mut task = store.find_task(id).unwrap().unwrap();
        task.progress = 3;
        manager.register(TaskProgress::new(task));

        assert_eq!(manager.read(id).unwrap().task.progress, 3);
        assert_eq!(durable_progress(&store, id), 3);
        assert!(store.find_detail(id).unwrap().is_some());
    }

    #[test]
    fn test_small_updates_are_throttled() {
        let (store, manager, id) = setup();
        let start = Instant::now();
        manager.register_at(TaskProgress::new(store.find_task(id).unwrap().unwrap()), start);

        assert!(manager.update_at(id, start + SECOND, |p| p.task.progress = 2));
        assert_eq!(manager.read(id).unwrap().task.progress, 2);
        assert_eq!(durable_progress(&store, id), 0);

        // Interval elapsed
        assert!(manager.update_at(id, start + 6 * SECOND, |p| p.task.progress = 3));
        assert_eq!(durable_progress(&store, id), 3);
    }

    #[test]
    fn test_significant_update_is_written() {
        let (store, manager, id) = setup();
        let start = Instant::now();
        manager.register_at(TaskProgress::new(store.find_task(id).unwrap().unwrap()), start);

        manager.update_at(id, start, |p| p.task.progress = 10);
        assert_eq!(durable_progress(&store, id), 10);
    }

    #[test]
    fn test_progress_never_decreases() {
        let (store, manager, id) = setup();
        manager.register(TaskProgress::new(store.find_task(id).unwrap().unwrap()));

        manager.update(id, |p| p.task.progress = 40);
        manager.update(id, |p| p.task.progress = 20);
        assert_eq!(manager.read(id).unwrap().task.progress, 40);

        manager.update(id, |p| p.task.progress = 250);
        assert_eq!(manager.read(id).unwrap().task.progress, 100);
    }

    #[test]
    fn test_terminal_task_is_frozen() {
        let (store, manager, id) = setup();
        manager.register(TaskProgress::new(store.find_task(id).unwrap().unwrap()));

        assert!(manager.complete(id, TaskStatus::Failed, None));
        assert!(!manager.complete(id, TaskStatus::Success, Some("x".into())));
        assert!(!manager.update(id, |p| p.detail.chains_searched = 9));

        let progress = manager.read(id).unwrap();
        assert_eq!(progress.task.status, TaskStatus::Failed);
        assert_eq!(progress.task.progress, 100);
        assert_eq!(progress.detail.chains_searched, 0);

        let durable = store.find_task(id).unwrap().unwrap();
        assert_eq!(durable.status, TaskStatus::Failed);
        assert_eq!(durable.progress, 100);
    }

    #[test]
    fn test_cancel_tracked_task() {
        let (store, manager, id) = setup();
        manager.register(TaskProgress::new(store.find_task(id).unwrap().unwrap()));

        assert!(manager.cancel(id));
        assert!(manager.is_cancelled(id));
        assert_eq!(store.find_task(id).unwrap().unwrap().status, TaskStatus::Failed);

        // Second cancel finds a terminal task
        assert!(!manager.cancel(id));
        assert!(!manager.cancel(999));
        assert!(!manager.is_cancelled(999));
    }

    #[test]
    fn test_update_unknown_task() {
        let (_, manager, _) = setup();
        assert!(!manager.update(999, |p| p.task.progress = 1));
    }

    #[test]
    fn test_cancel_flags_and_remove() {
        let (store, manager, id) = setup();
        manager.register(TaskProgress::new(store.find_task(id).unwrap().unwrap()));

        assert!(!manager.is_cancelled(id));
        manager.request_cancel(id);
        assert!(manager.is_cancelled(id));

        assert!(manager.remove(id).is_some());
        assert!(!manager.is_cancelled(id));
        assert!(!manager.is_tracked(id));
        assert!(manager.tracked_ids().is_empty());
    }

    #[test]
    fn test_concurrent_updates_stay_monotonic() {
        let (store, manager, id) = setup();
        manager.register(TaskProgress::new(store.find_task(id).unwrap().unwrap()));
        let manager = Arc::new(manager);

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let manager = Arc::clone(&manager);
                std::thread::spawn(move || {
                    for step in 0..50u8 {
                        manager.update(id, |p| {
                            p.task.progress = step + w;
                            p.detail.reduction_attempts += 1;
                        });
                    }
                })
            })
            .collect();

        let mut last = 0;
        for _ in 0..200 {
            let progress = manager.read(id).unwrap().task.progress;
            assert!(progress >= last);
            last = progress;
        }
        for writer in writers {
            writer.join().unwrap();
        }

        assert_eq!(manager.read(id).unwrap().detail.reduction_attempts, 200);
    }

    #[test]
    fn test_stale_snapshot_is_dropped() {
        let (store, manager, id) = setup();
        let task = store.find_task(id).unwrap().unwrap();
        manager.register(TaskProgress::new(task.clone()));

        let mut older = TaskProgress::new(task.clone());
        older.task.progress = 20;
        let older = manager.stamp(&older);
        let mut newer = TaskProgress::new(task);
        newer.task.progress = 30;
        let newer = manager.stamp(&newer);

        manager.persist(newer);
        manager.persist(older);
        assert_eq!(durable_progress(&store, id), 30);
    }

    /// Task store whose writes for one task block until released
    struct GatedStore {
        inner: MemoryTaskStore,
        gated: AtomicU64,
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
        timed_out: AtomicBool,
    }

    impl TaskStore for GatedStore {
        fn create_task(&self, task: NewTask) -> StoreResult<LookupTask> {
            self.inner.create_task(task)
        }

        fn update_task(&self, task: &LookupTask) -> StoreResult<()> {
            if task.id == self.gated.load(Ordering::SeqCst) {
                let _ = self.entered.lock().unwrap().send(());
                let released = self.release.lock().unwrap().recv_timeout(3 * SECOND);
                if released.is_err() {
                    self.timed_out.store(true, Ordering::SeqCst);
                }
            }
            self.inner.update_task(task)
        }

        fn find_task(&self, id: TaskId) -> StoreResult<Option<LookupTask>> {
            self.inner.find_task(id)
        }

        fn find_in_progress(&self) -> StoreResult<Vec<LookupTask>> {
            self.inner.find_in_progress()
        }

        fn upsert_detail(&self, detail: &TaskDetail) -> StoreResult<()> {
            self.inner.upsert_detail(detail)
        }

        fn find_detail(&self, id: TaskId) -> StoreResult<Option<TaskDetail>> {
            self.inner.find_detail(id)
        }
    }

    #[test]
    fn test_slow_write_does_not_block_other_tasks() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let store = Arc::new(GatedStore {
            inner: MemoryTaskStore::new(),
            gated: AtomicU64::new(0),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
            timed_out: AtomicBool::new(false),
        });
        let a = store.create_task(NewTask::in_progress(1, "aa")).unwrap();
        let b = store.create_task(NewTask::in_progress(2, "bb")).unwrap();
        let manager = Arc::new(TaskProgressManager::new(
            store.clone(),
            FlushPolicy::new(5, 5 * SECOND),
        ));
        manager.register(TaskProgress::new(a.clone()));
        manager.register(TaskProgress::new(b.clone()));
        store.gated.store(a.id, Ordering::SeqCst);

        let slow = {
            let manager = Arc::clone(&manager);
            std::thread::spawn(move || manager.update(a.id, |p| p.task.progress = 50))
        };
        entered_rx.recv().unwrap();

        // Task a's durable write is in flight
        assert_eq!(manager.read(a.id).unwrap().task.progress, 50);
        assert!(manager.is_tracked(b.id));
        assert!(manager.update(b.id, |p| p.task.progress = 40));
        assert!(manager.cancel(b.id));
        assert!(manager.is_cancelled(b.id));
        assert_eq!(
            store.find_task(b.id).unwrap().unwrap().status,
            TaskStatus::Failed
        );

        release_tx.send(()).unwrap();
        assert!(slow.join().unwrap());
        assert!(!store.timed_out.load(Ordering::SeqCst));
        assert_eq!(durable_progress(&store.inner, a.id), 50);
    }
}
