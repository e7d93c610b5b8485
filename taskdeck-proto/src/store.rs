//! The store contract shared by every task backend.
//!
//! A [`TaskStore`] is the durable side of a task list. Every operation is
//! scoped to an owning [`Identity`]; a task owned by someone else is
//! indistinguishable from a task that does not exist.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::task::{Filter, Identity, Task, TaskId, TaskPatch, TextError};

/// Errors a store can report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum StoreError {
    /// The task does not exist or belongs to another identity.
    #[error("task not found: {0}")]
    NotFound(TaskId),
    /// The submitted text failed validation.
    #[error(transparent)]
    Validation(#[from] TextError),
    /// The caller has no identity the store accepts.
    #[error("not signed in")]
    Unauthenticated,
    /// The store could not complete the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Async, identity-scoped task storage.
///
/// Implementations must never read or mutate a task whose owner differs
/// from `owner`, and must leave their contents unchanged when an operation
/// returns an error.
pub trait TaskStore: Send + Sync {
    /// Returns the owner's tasks matching `filter`, newest first.
    fn list(
        &self,
        owner: &Identity,
        filter: Filter,
    ) -> impl Future<Output = Result<Vec<Task>, StoreError>> + Send;

    /// Creates a task. The store assigns the id and both timestamps.
    ///
    /// Not idempotent: repeating a create after an ambiguous failure may
    /// produce a duplicate.
    fn create(
        &self,
        owner: &Identity,
        text: &str,
    ) -> impl Future<Output = Result<Task, StoreError>> + Send;

    /// Applies `patch` to one of the owner's tasks and returns the result.
    fn update(
        &self,
        owner: &Identity,
        id: TaskId,
        patch: TaskPatch,
    ) -> impl Future<Output = Result<Task, StoreError>> + Send;

    /// Deletes one of the owner's tasks.
    fn delete(
        &self,
        owner: &Identity,
        id: TaskId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Deletes every completed task of the owner.
    fn delete_completed(
        &self,
        owner: &Identity,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Sets `completed` on every task of the owner.
    fn set_all_completed(
        &self,
        owner: &Identity,
        completed: bool,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

impl<T: TaskStore> TaskStore for Arc<T> {
    fn list(
        &self,
        owner: &Identity,
        filter: Filter,
    ) -> impl Future<Output = Result<Vec<Task>, StoreError>> + Send {
        (**self).list(owner, filter)
    }

    fn create(
        &self,
        owner: &Identity,
        text: &str,
    ) -> impl Future<Output = Result<Task, StoreError>> + Send {
        (**self).create(owner, text)
    }

    fn update(
        &self,
        owner: &Identity,
        id: TaskId,
        patch: TaskPatch,
    ) -> impl Future<Output = Result<Task, StoreError>> + Send {
        (**self).update(owner, id, patch)
    }

    fn delete(
        &self,
        owner: &Identity,
        id: TaskId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).delete(owner, id)
    }

    fn delete_completed(
        &self,
        owner: &Identity,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).delete_completed(owner)
    }

    fn set_all_completed(
        &self,
        owner: &Identity,
        completed: bool,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).set_all_completed(owner, completed)
    }
}
