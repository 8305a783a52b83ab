//! Lookup service
//!
//! Entry point used by the request layer: starts tracked lookups on
//! background blocking workers, answers status queries, cancels and
//! force-finishes tasks, resumes unfinished tasks after a restart and
//! exposes chain generation.

use crate::app::config::EngineConfig;
use crate::app::coverage::{TableStats, table_stats};
use crate::app::error::{ServiceError, ServiceResult};
use crate::app::generator::{self, GenerateRequest};
use crate::app::progress::TaskProgressManager;
use crate::app::searcher::{
    LookupOutcome, SearchEvent, SearchObserver, progress_for_table, search_hash,
};
use crate::constants::{
    PROGRESS_DIRECT_CANDIDATES, PROGRESS_DIRECT_START, PROGRESS_DONE, PROGRESS_REVERSAL_START,
};
use crate::domain::chain::Chain;
use crate::domain::hash::TargetHash;
use crate::domain::task::{NewTask, TaskId, TaskProgress, TaskStatus, TaskStatusView, UserId};
use crate::infra::store::{ChainStore, PlaintextStore, StoreError, TaskStore};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Tracked hash lookups over a chain store
pub struct LookupService {
    chains: Arc<dyn ChainStore>,
    tasks: Arc<dyn TaskStore>,
    plaintexts: Arc<dyn PlaintextStore>,
    progress: Arc<TaskProgressManager>,
    config: EngineConfig,
    runtime: Handle,
}

impl LookupService {
    /// Create a service bound to the current tokio runtime
    pub fn new(
        chains: Arc<dyn ChainStore>,
        tasks: Arc<dyn TaskStore>,
        plaintexts: Arc<dyn PlaintextStore>,
        config: EngineConfig,
    ) -> ServiceResult<Self> {
        let runtime = Handle::try_current()?;
        Ok(Self::with_runtime(chains, tasks, plaintexts, config, runtime))
    }

    pub fn with_runtime(
        chains: Arc<dyn ChainStore>,
        tasks: Arc<dyn TaskStore>,
        plaintexts: Arc<dyn PlaintextStore>,
        config: EngineConfig,
        runtime: Handle,
    ) -> Self {
        let progress = Arc::new(TaskProgressManager::new(
            Arc::clone(&tasks),
            config.flush_policy(),
        ));
        Self {
            chains,
            tasks,
            plaintexts,
            progress,
            config,
            runtime,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn progress(&self) -> &Arc<TaskProgressManager> {
        &self.progress
    }

    /// Start reversing `target_hash` for a user
    ///
    /// The hash is validated synchronously. Digests already in the plaintext
    /// dictionary complete immediately; anything else is searched on a
    /// background worker. Fails with `TaskAlreadyRunning` while the user owns
    /// an in-progress task.
    pub fn start_lookup(&self, user_id: UserId, target_hash: &str) -> ServiceResult<LookupHandle> {
        let target = TargetHash::parse(target_hash)?;

        if let Some(plaintext) = self.plaintexts.find_plaintext(&target)? {
            let task = self.tasks.create_task(NewTask {
                user_id,
                target_hash: target.to_string(),
                progress: PROGRESS_DONE,
                status: TaskStatus::Success,
                plaintext: plaintext.clone(),
            })?;
            tracing::info!(task_id = task.id, user_id, %target, "Lookup answered from known plaintexts");
            return Ok(LookupHandle::ready(
                task.id,
                Arc::clone(&self.progress),
                LookupOutcome::Found(plaintext),
            ));
        }

        let task = self
            .tasks
            .create_task(NewTask::in_progress(user_id, target.to_string()))?;
        let task_id = task.id;
        tracing::info!(task_id, user_id, %target, "Lookup started");

        self.progress.register(TaskProgress::new(task));
        Ok(self.spawn(task_id, target))
    }

    /// Current status of a task
    ///
    /// Served from the in-memory mirror while the lookup runs, from the task
    /// store afterwards.
    pub fn status(&self, task_id: TaskId) -> ServiceResult<TaskStatusView> {
        if let Some(progress) = self.progress.read(task_id) {
            return Ok(progress.into());
        }

        let task = self
            .tasks
            .find_task(task_id)?
            .ok_or(ServiceError::TaskNotFound(task_id))?;
        let detail = self.tasks.find_detail(task_id)?;
        Ok(TaskProgress::with_detail(task, detail).into())
    }

    /// Cancel a running lookup
    ///
    /// The task turns `Failed` at 100% right away; the worker stops at its
    /// next checkpoint. A task stored as in progress without a running
    /// lookup gives `TaskOrphaned`; `finish` or `recover` deal with those.
    pub fn cancel(&self, task_id: TaskId) -> ServiceResult<()> {
        if self.progress.cancel(task_id) {
            tracing::info!(task_id, "Lookup cancelled");
            return Ok(());
        }
        Err(self.inactive_error(task_id))
    }

    /// Force-terminate an in-progress task
    ///
    /// Works like `cancel` for running lookups and also fails tasks that are
    /// only known to the task store.
    pub fn finish(&self, task_id: TaskId) -> ServiceResult<()> {
        if self.progress.cancel(task_id) {
            tracing::info!(task_id, "Lookup finished by request");
            return Ok(());
        }

        let mut task = self
            .tasks
            .find_task(task_id)?
            .ok_or(ServiceError::TaskNotFound(task_id))?;
        if task.status != TaskStatus::InProgress {
            return Err(ServiceError::TaskNotInProgress(task_id));
        }

        task.status = TaskStatus::Failed;
        task.progress = PROGRESS_DONE;
        self.tasks.update_task(&task)?;
        tracing::info!(task_id, "Stored task finished by request");
        Ok(())
    }

    /// Resume every task left in progress by a previous run
    ///
    /// Each task gets its in-memory mirror back (with any stored counters)
    /// and a fresh lookup from the beginning. Tasks whose stored hash no
    /// longer parses are failed.
    pub fn recover(&self) -> ServiceResult<Vec<LookupHandle>> {
        let unfinished = self.tasks.find_in_progress()?;
        let mut handles = Vec::with_capacity(unfinished.len());

        for mut task in unfinished {
            if self.progress.is_tracked(task.id) {
                continue;
            }

            let target = match TargetHash::parse(&task.target_hash) {
                Ok(target) => target,
                Err(e) => {
                    tracing::warn!(task_id = task.id, error = %e, "Stored task has invalid hash, failing it");
                    task.status = TaskStatus::Failed;
                    task.progress = PROGRESS_DONE;
                    if let Err(e) = self.tasks.update_task(&task) {
                        tracing::warn!(task_id = task.id, error = %e, "Failed to persist task");
                    }
                    continue;
                }
            };

            let detail = self.tasks.find_detail(task.id).unwrap_or_else(|e| {
                tracing::warn!(task_id = task.id, error = %e, "Failed to load task detail");
                None
            });

            let task_id = task.id;
            self.progress.register(TaskProgress::with_detail(task, detail));
            handles.push(self.spawn(task_id, target));
        }

        tracing::info!(count = handles.len(), "Recovered unfinished lookups");
        Ok(handles)
    }

    /// Generate and persist chains, returning how many were stored
    pub fn generate_chains(&self, request: GenerateRequest) -> usize {
        generator::generate_into(self.chains.as_ref(), request, &self.config)
    }

    /// Insert a single chain
    pub fn add_chain(
        &self,
        request: GenerateRequest,
        start_plaintext: &str,
        end_hash: Option<&str>,
    ) -> ServiceResult<Chain> {
        generator::add_chain(
            self.chains.as_ref(),
            request,
            start_plaintext,
            end_hash,
            &self.config,
        )
    }

    /// Remove a chain from the store
    pub fn delete_chain(&self, chain_id: u64) -> ServiceResult<()> {
        match self.chains.delete(chain_id) {
            Ok(()) => {
                tracing::info!(chain_id, "Chain deleted");
                Ok(())
            }
            Err(StoreError::NotFound) => Err(ServiceError::ChainNotFound(chain_id)),
            Err(e) => Err(e.into()),
        }
    }

    pub fn table_stats(&self) -> ServiceResult<TableStats> {
        Ok(table_stats(&self.chains.find_all()?))
    }

    fn inactive_error(&self, task_id: TaskId) -> ServiceError {
        match self.tasks.find_task(task_id) {
            Ok(Some(task)) if task.status == TaskStatus::InProgress => {
                ServiceError::TaskOrphaned(task_id)
            }
            Ok(Some(_)) => ServiceError::TaskNotInProgress(task_id),
            Ok(None) => ServiceError::TaskNotFound(task_id),
            Err(e) => e.into(),
        }
    }

    fn spawn(&self, task_id: TaskId, target: TargetHash) -> LookupHandle {
        let worker = Worker {
            chains: Arc::clone(&self.chains),
            plaintexts: Arc::clone(&self.plaintexts),
            progress: Arc::clone(&self.progress),
        };
        let join = self
            .runtime
            .spawn_blocking(move || worker.run(task_id, target));
        LookupHandle {
            task_id,
            progress: Arc::clone(&self.progress),
            state: HandleState::Running(join),
        }
    }
}

/// Background unit of work owning one lookup
struct Worker {
    chains: Arc<dyn ChainStore>,
    plaintexts: Arc<dyn PlaintextStore>,
    progress: Arc<TaskProgressManager>,
}

impl Worker {
    fn run(self, task_id: TaskId, target: TargetHash) -> LookupOutcome {
        let observer = TaskObserver {
            progress: &self.progress,
            task_id,
        };
        let outcome = search_hash(&target, self.chains.as_ref(), &observer);

        let (status, plaintext) = match &outcome {
            LookupOutcome::Found(p) => (TaskStatus::Success, Some(p.clone())),
            LookupOutcome::NotFound | LookupOutcome::Cancelled => (TaskStatus::Failed, None),
        };

        // A cancel or finish may already have applied the terminal state
        let outcome = if self.progress.complete(task_id, status, plaintext) {
            outcome
        } else {
            LookupOutcome::Cancelled
        };

        match &outcome {
            LookupOutcome::Found(plaintext) => {
                if let Err(e) = self.plaintexts.remember(plaintext) {
                    tracing::warn!(task_id, error = %e, "Failed to remember plaintext");
                }
                tracing::info!(task_id, "Lookup succeeded");
            }
            LookupOutcome::NotFound => tracing::info!(task_id, "Lookup exhausted without a match"),
            LookupOutcome::Cancelled => tracing::info!(task_id, "Lookup stopped after cancellation"),
        }

        self.progress.remove(task_id);
        outcome
    }
}

/// Maps engine events onto a task's progress and counters
struct TaskObserver<'a> {
    progress: &'a TaskProgressManager,
    task_id: TaskId,
}

impl SearchObserver for TaskObserver<'_> {
    fn is_cancelled(&self) -> bool {
        self.progress.is_cancelled(self.task_id)
    }

    fn on_event(&self, event: SearchEvent) {
        self.progress.update(self.task_id, |p| apply_event(p, event));
    }
}

fn apply_event(p: &mut TaskProgress, event: SearchEvent) {
    let detail = &mut p.detail;
    match event {
        SearchEvent::DirectStarted => {
            p.task.progress = PROGRESS_DIRECT_START;
            detail.tables_searched = 0;
            detail.total_tables = 0;
            detail.chains_searched = 0;
            detail.reduction_attempts = 0;
        }
        SearchEvent::DirectCandidates { .. } => p.task.progress = PROGRESS_DIRECT_CANDIDATES,
        SearchEvent::ChainReplayed { .. } => detail.chains_searched += 1,
        SearchEvent::ReversalStarted { total_tables } => {
            p.task.progress = PROGRESS_REVERSAL_START;
            detail.total_tables = total_tables;
            detail.tables_searched = 0;
        }
        SearchEvent::ReductionAttempted => detail.reduction_attempts += 1,
        SearchEvent::TableScanned {
            index,
            total_tables,
            chains,
        } => {
            p.task.progress = progress_for_table(index, total_tables);
            detail.tables_searched = index + 1;
            detail.chains_searched += chains;
        }
    }
}

enum HandleState {
    Ready(LookupOutcome),
    Running(JoinHandle<LookupOutcome>),
}

/// Handle to a lookup started by the service
pub struct LookupHandle {
    task_id: TaskId,
    progress: Arc<TaskProgressManager>,
    state: HandleState,
}

impl LookupHandle {
    fn ready(task_id: TaskId, progress: Arc<TaskProgressManager>, outcome: LookupOutcome) -> Self {
        Self {
            task_id,
            progress,
            state: HandleState::Ready(outcome),
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Cancel the lookup; `false` if it already ended
    pub fn cancel(&self) -> bool {
        self.progress.cancel(self.task_id)
    }

    pub fn is_finished(&self) -> bool {
        match &self.state {
            HandleState::Ready(_) => true,
            HandleState::Running(join) => join.is_finished(),
        }
    }

    /// Live progress; `None` once the lookup has ended
    pub fn snapshot(&self) -> Option<TaskProgress> {
        self.progress.read(self.task_id)
    }

    /// Wait for the lookup to end
    pub async fn wait(self) -> ServiceResult<LookupOutcome> {
        match self.state {
            HandleState::Ready(outcome) => Ok(outcome),
            HandleState::Running(join) => Ok(join.await?),
        }
    }
}
