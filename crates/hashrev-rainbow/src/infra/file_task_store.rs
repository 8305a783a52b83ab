//! File-backed task store
//!
//! Keeps the task table in memory and rewrites a JSON snapshot after every
//! mutation (temp file + rename), so in-progress tasks survive a restart.

use crate::domain::task::{LookupTask, NewTask, TaskDetail, TaskId};
use crate::infra::memory_store::TaskTable;
use crate::infra::store::{StoreResult, TaskStore};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub struct FileTaskStore {
    path: PathBuf,
    table: Mutex<TaskTable>,
}

impl FileTaskStore {
    /// Open a state file, starting empty when it does not exist yet
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let table = if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            serde_json::from_reader(reader)?
        } else {
            TaskTable::default()
        };

        tracing::debug!(path = %path.display(), "Opened task state file");
        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn table(&self) -> MutexGuard<'_, TaskTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, table: &TaskTable) -> StoreResult<()> {
        let tmp = self.path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(&mut writer, table)?;
            writer.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Apply a mutation and persist it; the in-memory table is only kept
    /// when the snapshot was written
    fn mutate<T>(&self, f: impl FnOnce(&mut TaskTable) -> StoreResult<T>) -> StoreResult<T> {
        let mut table = self.table();
        let mut next = table.clone();
        let out = f(&mut next)?;
        self.persist(&next)?;
        *table = next;
        Ok(out)
    }
}

impl TaskStore for FileTaskStore {
    fn create_task(&self, task: NewTask) -> StoreResult<LookupTask> {
        self.mutate(|t| t.create_task(task))
    }

    fn update_task(&self, task: &LookupTask) -> StoreResult<()> {
        self.mutate(|t| t.update_task(task))
    }

    fn find_task(&self, id: TaskId) -> StoreResult<Option<LookupTask>> {
        Ok(self.table().find_task(id))
    }

    fn find_in_progress(&self) -> StoreResult<Vec<LookupTask>> {
        Ok(self.table().find_in_progress())
    }

    fn upsert_detail(&self, detail: &TaskDetail) -> StoreResult<()> {
        self.mutate(|t| {
            t.upsert_detail(detail);
            Ok(())
        })
    }

    fn find_detail(&self, id: TaskId) -> StoreResult<Option<TaskDetail>> {
        Ok(self.table().find_detail(id))
    }
}
