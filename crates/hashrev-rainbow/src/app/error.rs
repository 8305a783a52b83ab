//! Service-level errors

use crate::domain::hash::HashFormatError;
use crate::domain::task::{TaskId, UserId};
use crate::infra::store::StoreError;
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid hash: {0}")]
    InvalidHash(#[from] HashFormatError),

    #[error("user {user_id} already has task {task_id} in progress")]
    TaskAlreadyRunning { user_id: UserId, task_id: TaskId },

    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    #[error("task {0} is not in progress")]
    TaskNotInProgress(TaskId),

    /// Stored as in progress but no lookup is running for it
    #[error("task {0} has no running lookup")]
    TaskOrphaned(TaskId),

    #[error("chain {0} not found")]
    ChainNotFound(u64),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("no tokio runtime available: {0}")]
    Runtime(#[from] tokio::runtime::TryCurrentError),

    #[error("lookup worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict { user_id, task_id } => Self::TaskAlreadyRunning { user_id, task_id },
            other => Self::Store(other),
        }
    }
}
