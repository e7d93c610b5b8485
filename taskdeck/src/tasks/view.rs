//! Derived, read-only views over a [`TaskListState`].

use serde::Serialize;
use taskdeck_proto::task::{Filter, Task};

use super::reducer::TaskListState;

/// Aggregate counts over a task list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    /// Number of tasks.
    pub total: usize,
    /// Number of completed tasks.
    pub completed: usize,
    /// Number of open tasks.
    pub active: usize,
}

impl TaskStats {
    /// Share of completed tasks in percent, `0.0` for an empty list.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent_complete(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.completed as f64 / self.total as f64 * 100.0
    }
}

/// Everything a UI needs to draw the list, detached from the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskView {
    /// The active filter.
    pub filter: Filter,
    /// Tasks visible under `filter`, in state order.
    pub tasks: Vec<Task>,
    /// Counts over the whole list, not just the visible tasks.
    pub stats: TaskStats,
    /// Completed share of the whole list, in percent.
    pub percent_complete: f64,
}

impl TaskView {
    /// Builds the view for `state`.
    #[must_use]
    pub fn from_state(state: &TaskListState) -> Self {
        let stats = stats(&state.tasks);
        Self {
            filter: state.filter,
            tasks: filtered_tasks(state),
            stats,
            percent_complete: stats.percent_complete(),
        }
    }
}

/// The tasks visible under the state's filter, order preserved.
#[must_use]
pub fn filtered_tasks(state: &TaskListState) -> Vec<Task> {
    state
        .tasks
        .iter()
        .filter(|t| state.filter.matches(t))
        .cloned()
        .collect()
}

/// Counts total, completed, and active tasks.
#[must_use]
pub fn stats(tasks: &[Task]) -> TaskStats {
    let completed = tasks.iter().filter(|t| t.completed).count();
    TaskStats {
        total: tasks.len(),
        completed,
        active: tasks.len() - completed,
    }
}

/// Completed share of `tasks` in percent, `0.0` when empty.
#[must_use]
pub fn percent_complete(tasks: &[Task]) -> f64 {
    stats(tasks).percent_complete()
}

/// Returns `tasks` sorted by creation time. Ties keep their relative order.
#[must_use]
pub fn sort_by_created(tasks: &[Task], ascending: bool) -> Vec<Task> {
    let mut sorted = tasks.to_vec();
    if ascending {
        sorted.sort_by_key(|t| t.created_at);
    } else {
        sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }
    sorted
}
