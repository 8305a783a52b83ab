//! Durable store contracts
//!
//! The lookup engine and task manager only depend on these traits; the
//! backing engine (relational database, file, memory) is a collaborator.

use crate::domain::chain::{Chain, NewChain};
use crate::domain::hash::TargetHash;
use crate::domain::task::{LookupTask, NewTask, TaskDetail, TaskId, UserId};
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    /// The user already owns an in-progress task
    #[error("user {user_id} already has task {task_id} in progress")]
    Conflict { user_id: UserId, task_id: TaskId },

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persisted chains
pub trait ChainStore: Send + Sync {
    /// Chains whose end hash matches the target (at the target's width)
    fn find_by_end_hash(&self, target: &TargetHash) -> StoreResult<Vec<Chain>>;

    fn find_all(&self) -> StoreResult<Vec<Chain>>;

    fn create(&self, chain: NewChain) -> StoreResult<Chain>;

    /// Administrative removal; `StoreError::NotFound` when no chain has `id`
    fn delete(&self, id: u64) -> StoreResult<()>;

    fn count(&self) -> StoreResult<usize>;
}

/// Persisted lookup tasks and their detail counters
pub trait TaskStore: Send + Sync {
    /// Insert a task
    ///
    /// Must fail with `StoreError::Conflict` when the user already owns an
    /// `InProgress` task; the check and the insert are one atomic step.
    fn create_task(&self, task: NewTask) -> StoreResult<LookupTask>;

    /// Overwrite the mutable fields of an existing task
    fn update_task(&self, task: &LookupTask) -> StoreResult<()>;

    fn find_task(&self, id: TaskId) -> StoreResult<Option<LookupTask>>;

    /// Every task left `InProgress`
    fn find_in_progress(&self) -> StoreResult<Vec<LookupTask>>;

    /// Insert or replace the detail counters keyed by task id
    fn upsert_detail(&self, detail: &TaskDetail) -> StoreResult<()>;

    fn find_detail(&self, id: TaskId) -> StoreResult<Option<TaskDetail>>;
}

/// Dictionary of already reversed digests
pub trait PlaintextStore: Send + Sync {
    fn find_plaintext(&self, target: &TargetHash) -> StoreResult<Option<String>>;

    fn remember(&self, plaintext: &str) -> StoreResult<()>;
}
