//! Pure task-list state machine.
//!
//! [`reduce`] never mutates its input and reads no clock: every id and
//! timestamp a transition needs travels inside the [`Action`]. Text bounds
//! are enforced at intake, not here; the reducer only refuses blank text.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use taskdeck_proto::task::{Filter, Identity, Task, TaskId, Timestamp};

/// The in-memory task list and its active filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskListState {
    /// Tasks in the order they were added or loaded.
    pub tasks: Vec<Task>,
    /// Which tasks the view shows.
    pub filter: Filter,
}

impl TaskListState {
    /// Creates an empty state showing all tasks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a task by id.
    #[must_use]
    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Returns `true` if there is at least one task and all are completed.
    #[must_use]
    pub fn all_completed(&self) -> bool {
        !self.tasks.is_empty() && self.tasks.iter().all(|t| t.completed)
    }
}

/// A transition request.
///
/// Serialized with a `type` tag so actions can be logged or replayed; a tag
/// this version does not know decodes to [`Action::Unknown`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Append a new open task.
    Add {
        /// Id of the new task.
        id: TaskId,
        /// Task text.
        text: String,
        /// Creating identity.
        owner_id: Option<Identity>,
        /// Creation time.
        at: Timestamp,
    },
    /// Flip `completed` on one task.
    Toggle {
        /// Target task.
        id: TaskId,
        /// Mutation time.
        at: Timestamp,
    },
    /// Remove one task.
    Delete {
        /// Target task.
        id: TaskId,
    },
    /// Replace the text of one task.
    Edit {
        /// Target task.
        id: TaskId,
        /// Replacement text.
        text: String,
        /// Mutation time.
        at: Timestamp,
    },
    /// Complete every task, or reopen all of them if all are completed.
    CompleteAll {
        /// Mutation time.
        at: Timestamp,
    },
    /// Remove every completed task.
    ClearCompleted,
    /// Change the view filter.
    SetFilter {
        /// The new filter.
        filter: Filter,
    },
    /// Replace the task list wholesale.
    Initialize {
        /// Tasks to load, in display order.
        tasks: Vec<Task>,
    },
    /// An action this version does not recognize. Leaves state unchanged.
    #[serde(other)]
    Unknown,
}

impl Action {
    /// An [`Action::Add`] with a fresh id, stamped now.
    pub fn add(text: impl Into<String>, owner_id: Option<Identity>) -> Self {
        Self::Add {
            id: TaskId::new(),
            text: text.into(),
            owner_id,
            at: Timestamp::now(),
        }
    }

    /// An [`Action::Add`] that mirrors a task the store already created.
    #[must_use]
    pub fn created(task: &Task) -> Self {
        Self::Add {
            id: task.id,
            text: task.text.clone(),
            owner_id: task.owner_id.clone(),
            at: task.created_at,
        }
    }

    /// An [`Action::Toggle`] stamped now.
    #[must_use]
    pub fn toggle(id: TaskId) -> Self {
        Self::Toggle {
            id,
            at: Timestamp::now(),
        }
    }

    /// An [`Action::Edit`] stamped now.
    pub fn edit(id: TaskId, text: impl Into<String>) -> Self {
        Self::Edit {
            id,
            text: text.into(),
            at: Timestamp::now(),
        }
    }

    /// An [`Action::CompleteAll`] stamped now.
    #[must_use]
    pub fn complete_all() -> Self {
        Self::CompleteAll {
            at: Timestamp::now(),
        }
    }
}

/// Applies `action` to `state` and returns the resulting state.
#[must_use]
pub fn reduce(state: &TaskListState, action: &Action) -> TaskListState {
    let mut next = state.clone();
    match action {
        Action::Add {
            id,
            text,
            owner_id,
            at,
        } => {
            if text.trim().is_empty() || next.get(*id).is_some() {
                return next;
            }
            next.tasks
                .push(Task::new(*id, text.clone(), owner_id.clone(), *at));
        }
        Action::Toggle { id, at } => {
            if let Some(task) = next.tasks.iter_mut().find(|t| t.id == *id) {
                task.completed = !task.completed;
                task.touch(*at);
            }
        }
        Action::Delete { id } => next.tasks.retain(|t| t.id != *id),
        Action::Edit { id, text, at } => {
            if text.trim().is_empty() {
                return next;
            }
            if let Some(task) = next.tasks.iter_mut().find(|t| t.id == *id) {
                task.text.clone_from(text);
                task.touch(*at);
            }
        }
        Action::CompleteAll { at } => {
            let completed = !next.tasks.iter().all(|t| t.completed);
            for task in &mut next.tasks {
                task.completed = completed;
                task.touch(*at);
            }
        }
        Action::ClearCompleted => next.tasks.retain(|t| !t.completed),
        Action::SetFilter { filter } => next.filter = *filter,
        Action::Initialize { tasks } => {
            let mut seen = HashSet::with_capacity(tasks.len());
            next.tasks = tasks.iter().filter(|t| seen.insert(t.id)).cloned().collect();
        }
        Action::Unknown => {}
    }
    next
}
