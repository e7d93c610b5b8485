//! Server-side task repository.
//!
//! The [`TaskRepository`] wraps a [`TaskTable`] behind a tokio [`RwLock`] and
//! optionally persists it to a snapshot file. Mutations are applied to a copy
//! of the table; the copy replaces the live table only after the snapshot
//! write succeeds, so a failed write leaves both disk and memory unchanged.

use std::path::{Path, PathBuf};

use taskdeck_proto::store::{StoreError, TaskStore};
use taskdeck_proto::table::{SnapshotError, TaskTable};
use taskdeck_proto::task::{Filter, Identity, Task, TaskId, TaskPatch, Timestamp};
use tokio::sync::RwLock;

/// Shared, identity-scoped task storage for every connection.
pub struct TaskRepository {
    table: RwLock<TaskTable>,
    snapshot_path: Option<PathBuf>,
}

impl Default for TaskRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRepository {
    /// Creates an empty, memory-only repository.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: RwLock::new(TaskTable::new()),
            snapshot_path: None,
        }
    }

    /// Opens a repository persisted at `path`, loading any existing snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] if the file exists but cannot be read or
    /// decoded.
    pub fn open(path: &Path) -> Result<Self, SnapshotError> {
        let table = TaskTable::load(path)?;
        tracing::info!(path = %path.display(), rows = table.len(), "loaded task snapshot");
        Ok(Self {
            table: RwLock::new(table),
            snapshot_path: Some(path.to_path_buf()),
        })
    }

    /// Total number of stored tasks across all owners.
    pub async fn len(&self) -> usize {
        self.table.read().await.len()
    }

    /// Returns `true` if no task is stored.
    pub async fn is_empty(&self) -> bool {
        self.table.read().await.is_empty()
    }

    /// Applies `op` to a copy of the table, persists the copy, then swaps it
    /// in. The write lock is held throughout so mutations never interleave.
    async fn mutate<R>(
        &self,
        op: impl FnOnce(&mut TaskTable) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let mut live = self.table.write().await;
        let mut next = live.clone();
        let result = op(&mut next)?;

        if let Some(path) = self.snapshot_path.clone() {
            next = tokio::task::spawn_blocking(move || next.save(&path).map(|()| next))
                .await
                .map_err(|e| StoreError::Unavailable(format!("snapshot task failed: {e}")))?
                .inspect_err(|e| tracing::error!(error = %e, "failed to persist task snapshot"))?;
        }

        *live = next;
        Ok(result)
    }
}

impl TaskStore for TaskRepository {
    async fn list(&self, owner: &Identity, filter: Filter) -> Result<Vec<Task>, StoreError> {
        Ok(self.table.read().await.list(owner, filter))
    }

    async fn create(&self, owner: &Identity, text: &str) -> Result<Task, StoreError> {
        let task = self
            .mutate(|table| table.create(owner, text, Timestamp::now()))
            .await?;
        tracing::debug!(owner = %owner, task_id = %task.id, "task created");
        Ok(task)
    }

    async fn update(
        &self,
        owner: &Identity,
        id: TaskId,
        patch: TaskPatch,
    ) -> Result<Task, StoreError> {
        if patch.is_empty() {
            // Nothing to persist; still answer NotFound for foreign ids.
            return self
                .table
                .read()
                .await
                .list(owner, Filter::All)
                .into_iter()
                .find(|t| t.id == id)
                .ok_or(StoreError::NotFound(id));
        }
        let task = self
            .mutate(|table| table.update(owner, id, patch, Timestamp::now()))
            .await?;
        tracing::debug!(owner = %owner, task_id = %id, "task updated");
        Ok(task)
    }

    async fn delete(&self, owner: &Identity, id: TaskId) -> Result<(), StoreError> {
        self.mutate(|table| table.delete(owner, id)).await?;
        tracing::debug!(owner = %owner, task_id = %id, "task deleted");
        Ok(())
    }

    async fn delete_completed(&self, owner: &Identity) -> Result<(), StoreError> {
        let removed = self
            .mutate(|table| Ok(table.delete_completed(owner)))
            .await?;
        tracing::debug!(owner = %owner, removed, "completed tasks deleted");
        Ok(())
    }

    async fn set_all_completed(&self, owner: &Identity, completed: bool) -> Result<(), StoreError> {
        let touched = self
            .mutate(|table| Ok(table.set_all_completed(owner, completed, Timestamp::now())))
            .await?;
        tracing::debug!(owner = %owner, completed, touched, "bulk completion applied");
        Ok(())
    }
}
