//! Owner-scoped task rows and their on-disk snapshot format.
//!
//! [`TaskTable`] holds the storage semantics every backend shares: ownership
//! checks, validation at intake, newest-first listing, and the two bulk
//! passes. It is plain synchronous data; backends wrap it in whatever lock
//! and persistence they need.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::store::StoreError;
use crate::task::{Filter, Identity, Task, TaskId, TaskPatch, Timestamp, validate_text};

/// Version byte prefixed to every snapshot.
pub const SNAPSHOT_VERSION: u8 = 1;

/// Errors reading or writing a table snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Failed to read or write the snapshot file.
    #[error("snapshot I/O error at {path}: {source}")]
    Io {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The snapshot bytes could not be decoded.
    #[error("snapshot decode error: {0}")]
    Decode(String),
    /// The table could not be encoded.
    #[error("snapshot encode error: {0}")]
    Encode(String),
    /// The snapshot was written by an incompatible version.
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u8),
}

impl From<SnapshotError> for StoreError {
    fn from(e: SnapshotError) -> Self {
        Self::Unavailable(e.to_string())
    }
}

/// Task rows for any number of owners, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTable {
    rows: Vec<Task>,
}

impl TaskTable {
    /// Creates an empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self { rows: Vec::new() }
    }

    /// Total number of rows across all owners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the owner's tasks matching `filter`, newest first.
    ///
    /// Tasks created in the same millisecond keep their relative insertion
    /// order reversed, so the most recently inserted still comes first.
    #[must_use]
    pub fn list(&self, owner: &Identity, filter: Filter) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .rows
            .iter()
            .rev()
            .filter(|t| t.is_owned_by(owner) && filter.matches(t))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks
    }

    /// Creates a task for `owner` from raw user text.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if the text is blank or too long.
    pub fn create(
        &mut self,
        owner: &Identity,
        text: &str,
        now: Timestamp,
    ) -> Result<Task, StoreError> {
        let text = validate_text(text)?;
        let task = Task::new(TaskId::new(), text, Some(owner.clone()), now);
        self.rows.push(task.clone());
        Ok(task)
    }

    /// Applies `patch` to one of the owner's tasks.
    ///
    /// An empty patch returns the task untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the task is absent or owned by
    /// someone else, and [`StoreError::Validation`] for invalid text. Nothing
    /// changes on error.
    pub fn update(
        &mut self,
        owner: &Identity,
        id: TaskId,
        patch: TaskPatch,
        now: Timestamp,
    ) -> Result<Task, StoreError> {
        let text = patch.text.as_deref().map(validate_text).transpose()?;
        let task = self.row_mut(owner, id).ok_or(StoreError::NotFound(id))?;
        if patch.is_empty() {
            return Ok(task.clone());
        }
        if let Some(text) = text {
            task.text = text;
        }
        if let Some(completed) = patch.completed {
            task.completed = completed;
        }
        task.touch(now);
        Ok(task.clone())
    }

    /// Deletes one of the owner's tasks.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the task is absent or owned by
    /// someone else.
    pub fn delete(&mut self, owner: &Identity, id: TaskId) -> Result<(), StoreError> {
        let index = self
            .rows
            .iter()
            .position(|t| t.id == id && t.is_owned_by(owner))
            .ok_or(StoreError::NotFound(id))?;
        self.rows.remove(index);
        Ok(())
    }

    /// Deletes every completed task of the owner, returning how many went.
    pub fn delete_completed(&mut self, owner: &Identity) -> usize {
        let before = self.rows.len();
        self.rows.retain(|t| !(t.completed && t.is_owned_by(owner)));
        before - self.rows.len()
    }

    /// Sets `completed` on all of the owner's tasks, returning how many rows
    /// were touched.
    pub fn set_all_completed(&mut self, owner: &Identity, completed: bool, now: Timestamp) -> usize {
        let mut touched = 0;
        for task in self.rows.iter_mut().filter(|t| t.is_owned_by(owner)) {
            task.completed = completed;
            task.touch(now);
            touched += 1;
        }
        touched
    }

    fn row_mut(&mut self, owner: &Identity, id: TaskId) -> Option<&mut Task> {
        self.rows
            .iter_mut()
            .find(|t| t.id == id && t.is_owned_by(owner))
    }

    /// Encodes the table as a versioned postcard snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Encode`] if serialization fails.
    pub fn encode_snapshot(&self) -> Result<Vec<u8>, SnapshotError> {
        let mut bytes = vec![SNAPSHOT_VERSION];
        let body = postcard::to_allocvec(self).map_err(|e| SnapshotError::Encode(e.to_string()))?;
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    /// Decodes a snapshot produced by [`encode_snapshot`](Self::encode_snapshot).
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::UnsupportedVersion`] for a foreign version
    /// byte and [`SnapshotError::Decode`] for empty or corrupt input.
    pub fn decode_snapshot(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let Some((&version, body)) = bytes.split_first() else {
            return Err(SnapshotError::Decode("empty snapshot".to_string()));
        };
        if version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(version));
        }
        postcard::from_bytes(body).map_err(|e| SnapshotError::Decode(e.to_string()))
    }

    /// Loads a snapshot file, treating a missing file as an empty table.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] if the file exists but cannot be read or
    /// decoded.
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        match std::fs::read(path) {
            Ok(bytes) => Self::decode_snapshot(&bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(source) => Err(SnapshotError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Writes the table to `path` atomically (temp file, then rename).
    ///
    /// Parent directories are created as needed.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] if encoding or any filesystem step fails.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let io_err = |source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        };
        let bytes = self.encode_snapshot()?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(io_err)?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, bytes).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)
    }
}
