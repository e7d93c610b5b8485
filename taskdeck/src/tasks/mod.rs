//! Client-side task state.
//!
//! [`reducer`] is the pure state machine over a task list, [`view`] derives
//! what a UI shows from that state, and [`session`] keeps the state in step
//! with a [`TaskStore`](taskdeck_proto::store::TaskStore), applying each
//! transition only after the store confirms it.

pub mod reducer;
pub mod session;
pub mod view;

pub use reducer::{Action, TaskListState, reduce};
pub use session::TaskSession;
pub use view::{TaskStats, TaskView, filtered_tasks, percent_complete, sort_by_created, stats};

use taskdeck_proto::store::StoreError;
use taskdeck_proto::task::{TaskId, TextError};
use thiserror::Error;

/// Errors reported by [`TaskSession`] operations.
///
/// Every failed operation leaves the session's state exactly as it was.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Task text was rejected before reaching the store.
    #[error(transparent)]
    Validation(#[from] TextError),
    /// The task is missing or belongs to another identity.
    #[error("task not found: {0}")]
    NotFound(TaskId),
    /// No identity is signed in, or the store refused it.
    #[error("not signed in")]
    Unauthenticated,
    /// Another mutation of the same task is still in flight.
    #[error("task {0} is busy with another change")]
    Busy(TaskId),
    /// A whole-list operation conflicts with mutations already in flight.
    #[error("another change to the list is in progress")]
    BulkInFlight,
    /// The store failed unexpectedly.
    #[error("store error: {0}")]
    Remote(String),
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::Validation(e) => Self::Validation(e),
            StoreError::Unauthenticated => Self::Unauthenticated,
            StoreError::Unavailable(reason) => Self::Remote(reason),
        }
    }
}
