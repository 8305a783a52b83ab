//! Lookup task model
//!
//! Durable task records, their diagnostic counters and the in-memory
//! progress mirror kept while a lookup runs.

use serde::{Deserialize, Serialize};

pub type TaskId = u64;
pub type UserId = u64;

/// Task state machine: `NotStarted -> InProgress -> {Success, Failed}`
///
/// `Failed` also covers cancellation and exhaustion without a match.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    #[default]
    NotStarted,
    InProgress,
    Success,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// Durable lookup task record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupTask {
    pub id: TaskId,
    pub user_id: UserId,
    /// Hash being reversed, as submitted (normalized to lowercase)
    pub target_hash: String,
    /// Percentage in `0..=100`
    pub progress: u8,
    pub status: TaskStatus,
    /// Empty until a plaintext is found
    pub plaintext: String,
}

/// Task fields before the store assigns an id
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewTask {
    pub user_id: UserId,
    pub target_hash: String,
    pub progress: u8,
    pub status: TaskStatus,
    pub plaintext: String,
}

impl NewTask {
    /// A freshly requested lookup
    pub fn in_progress(user_id: UserId, target_hash: impl Into<String>) -> Self {
        Self {
            user_id,
            target_hash: target_hash.into(),
            progress: 0,
            status: TaskStatus::InProgress,
            plaintext: String::new(),
        }
    }

    pub fn with_id(self, id: TaskId) -> LookupTask {
        LookupTask {
            id,
            user_id: self.user_id,
            target_hash: self.target_hash,
            progress: self.progress,
            status: self.status,
            plaintext: self.plaintext,
        }
    }
}

/// Diagnostic counters, one per task (upserted by task id)
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDetail {
    pub task_id: TaskId,
    pub tables_searched: usize,
    pub total_tables: usize,
    pub chains_searched: usize,
    pub reduction_attempts: u64,
}

impl TaskDetail {
    pub fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            ..Default::default()
        }
    }
}

/// In-memory mirror of a running task
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskProgress {
    pub task: LookupTask,
    pub detail: TaskDetail,
}

impl TaskProgress {
    pub fn new(task: LookupTask) -> Self {
        let detail = TaskDetail::new(task.id);
        Self { task, detail }
    }

    pub fn with_detail(task: LookupTask, detail: Option<TaskDetail>) -> Self {
        let detail = detail.unwrap_or_else(|| TaskDetail::new(task.id));
        Self { task, detail }
    }

    pub fn id(&self) -> TaskId {
        self.task.id
    }
}

/// Client-facing status of a task
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatusView {
    pub task_id: TaskId,
    pub user_id: UserId,
    pub target_hash: String,
    pub status: TaskStatus,
    pub progress: u8,
    pub plaintext: String,
    pub detail: TaskDetail,
}

impl From<TaskProgress> for TaskStatusView {
    fn from(progress: TaskProgress) -> Self {
        let TaskProgress { task, detail } = progress;
        Self {
            task_id: task.id,
            user_id: task.user_id,
            target_hash: task.target_hash,
            status: task.status,
            progress: task.progress,
            plaintext: task.plaintext,
            detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!TaskStatus::NotStarted.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
        assert!(TaskStatus::Success.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }

    #[test]
    fn test_new_task_in_progress() {
        let task = NewTask::in_progress(7, "abc").with_id(3);
        assert_eq!(task.id, 3);
        assert_eq!(task.user_id, 7);
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.progress, 0);
        assert!(task.plaintext.is_empty());
    }

    #[test]
    fn test_status_view_from_progress() {
        let task = NewTask::in_progress(1, "ff").with_id(9);
        let mut progress = TaskProgress::new(task);
        progress.detail.chains_searched = 4;
        let view = TaskStatusView::from(progress);
        assert_eq!(view.task_id, 9);
        assert_eq!(view.detail.task_id, 9);
        assert_eq!(view.detail.chains_searched, 4);
    }
}
