//! Local-only task storage backed by a snapshot file.

use std::path::{Path, PathBuf};

use taskdeck_proto::store::{StoreError, TaskStore};
use taskdeck_proto::table::{SnapshotError, TaskTable};
use taskdeck_proto::task::{Filter, Identity, Task, TaskId, TaskPatch, Timestamp};
use tokio::sync::Mutex;

/// A [`TaskStore`] for running without a server.
///
/// Every successful mutation rewrites the data file. With no file the store
/// lives in memory only.
pub struct LocalStore {
    table: Mutex<TaskTable>,
    path: Option<PathBuf>,
}

impl LocalStore {
    /// Creates an empty store that is never written to disk.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            table: Mutex::new(TaskTable::new()),
            path: None,
        }
    }

    /// Opens the data file at `path`. A missing file starts an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] if the file exists but cannot be read or
    /// decoded.
    pub fn open(path: &Path) -> Result<Self, SnapshotError> {
        let table = TaskTable::load(path)?;
        tracing::debug!(path = %path.display(), rows = table.len(), "opened local task file");
        Ok(Self {
            table: Mutex::new(table),
            path: Some(path.to_path_buf()),
        })
    }

    /// The data file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn mutate<R>(
        &self,
        op: impl FnOnce(&mut TaskTable) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let mut live = self.table.lock().await;
        let mut next = live.clone();
        let result = op(&mut next)?;
        if let Some(path) = &self.path {
            next.save(path)?;
        }
        *live = next;
        Ok(result)
    }
}

impl TaskStore for LocalStore {
    async fn list(&self, owner: &Identity, filter: Filter) -> Result<Vec<Task>, StoreError> {
        Ok(self.table.lock().await.list(owner, filter))
    }

    async fn create(&self, owner: &Identity, text: &str) -> Result<Task, StoreError> {
        self.mutate(|table| table.create(owner, text, Timestamp::now()))
            .await
    }

    async fn update(
        &self,
        owner: &Identity,
        id: TaskId,
        patch: TaskPatch,
    ) -> Result<Task, StoreError> {
        self.mutate(|table| table.update(owner, id, patch, Timestamp::now()))
            .await
    }

    async fn delete(&self, owner: &Identity, id: TaskId) -> Result<(), StoreError> {
        self.mutate(|table| table.delete(owner, id)).await
    }

    async fn delete_completed(&self, owner: &Identity) -> Result<(), StoreError> {
        self.mutate(|table| Ok(table.delete_completed(owner)))
            .await
            .map(|_| ())
    }

    async fn set_all_completed(&self, owner: &Identity, completed: bool) -> Result<(), StoreError> {
        self.mutate(|table| Ok(table.set_all_completed(owner, completed, Timestamp::now())))
            .await
            .map(|_| ())
    }
}
