//! Persistence bridge between local task state and a [`TaskStore`].
//!
//! A [`TaskSession`] owns one [`TaskListState`]. Each operation resolves the
//! acting identity through its [`AccessGate`], performs the store call, and
//! only then dispatches the matching reducer transition. A failed call leaves
//! the state untouched and is recorded in [`TaskSession::last_error`].
//!
//! The list belongs to one identity at a time. When the gate reports a
//! different identity, the next operation discards the previous owner's
//! tasks, and [`TaskSession::state`] and [`TaskSession::view`] never show
//! tasks owned by anyone but the current identity.
//!
//! Overlapping mutations are refused, not queued: a task with a change in
//! flight reports [`SessionError::Busy`], and whole-list operations
//! ([`TaskSession::clear_completed`], [`TaskSession::toggle_all`],
//! [`TaskSession::load`]) conflict with everything else via
//! [`SessionError::BulkInFlight`]. Claims are released when the operation's
//! future completes or is dropped.

use std::collections::HashSet;

use parking_lot::Mutex;
use taskdeck_proto::store::TaskStore;
use taskdeck_proto::task::{Filter, Identity, Task, TaskId, TaskPatch, validate_text};

use super::SessionError;
use super::reducer::{Action, TaskListState, reduce};
use super::view::TaskView;
use crate::gate::AccessGate;

/// What an in-flight operation has reserved.
#[derive(Debug, Clone, Copy)]
enum Claim {
    /// One existing task.
    Task(TaskId),
    /// A task being created.
    Create,
    /// The whole list.
    Bulk,
}

/// Reservations currently held by in-flight operations.
#[derive(Debug, Default)]
struct InFlight {
    tasks: HashSet<TaskId>,
    creates: usize,
    bulk: bool,
}

impl InFlight {
    fn is_idle(&self) -> bool {
        self.tasks.is_empty() && self.creates == 0 && !self.bulk
    }

    fn try_claim(&mut self, claim: Claim) -> Result<(), SessionError> {
        match claim {
            Claim::Bulk if !self.is_idle() => return Err(SessionError::BulkInFlight),
            Claim::Task(_) | Claim::Create if self.bulk => {
                return Err(SessionError::BulkInFlight);
            }
            Claim::Task(id) if self.tasks.contains(&id) => return Err(SessionError::Busy(id)),
            Claim::Bulk => self.bulk = true,
            Claim::Task(id) => {
                self.tasks.insert(id);
            }
            Claim::Create => self.creates += 1,
        }
        Ok(())
    }

    fn release(&mut self, claim: Claim) {
        match claim {
            Claim::Task(id) => {
                self.tasks.remove(&id);
            }
            Claim::Create => self.creates = self.creates.saturating_sub(1),
            Claim::Bulk => self.bulk = false,
        }
    }
}

/// Releases its claim on drop.
struct ClaimGuard<'a> {
    in_flight: &'a Mutex<InFlight>,
    claim: Claim,
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().release(self.claim);
    }
}

/// The local list and the identity it was built for.
#[derive(Debug, Default)]
struct OwnedList {
    owner: Option<Identity>,
    state: TaskListState,
}

/// Task list state bound to a store and an access gate.
pub struct TaskSession<S, G> {
    store: S,
    gate: G,
    list: Mutex<OwnedList>,
    in_flight: Mutex<InFlight>,
    last_error: Mutex<Option<SessionError>>,
}

impl<S: TaskStore, G: AccessGate> TaskSession<S, G> {
    /// Creates a session with an empty list.
    pub fn new(store: S, gate: G) -> Self {
        Self {
            store,
            gate,
            list: Mutex::new(OwnedList::default()),
            in_flight: Mutex::new(InFlight::default()),
            last_error: Mutex::new(None),
        }
    }

    /// The backing store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The access gate.
    pub const fn gate(&self) -> &G {
        &self.gate
    }

    /// Applies `action` to the local state without touching the store.
    pub fn dispatch(&self, action: &Action) {
        if matches!(action, Action::Unknown) {
            tracing::warn!("ignoring unknown action");
        }
        let mut list = self.list.lock();
        list.state = reduce(&list.state, action);
    }

    /// A snapshot of the current state, limited to tasks the current
    /// identity may see: its own and unowned ones.
    pub fn state(&self) -> TaskListState {
        let identity = self.gate.current_identity();
        let mut state = self.list.lock().state.clone();
        state.tasks.retain(|t| visible_to(t, identity.as_ref()));
        state
    }

    /// The derived view of [`TaskSession::state`].
    pub fn view(&self) -> TaskView {
        TaskView::from_state(&self.state())
    }

    /// The error from the most recent failed operation, cleared by the next
    /// successful one.
    pub fn last_error(&self) -> Option<SessionError> {
        self.last_error.lock().clone()
    }

    /// Changes the view filter. Local only.
    pub fn set_filter(&self, filter: Filter) {
        self.dispatch(&Action::SetFilter { filter });
    }

    /// Replaces local state with the identity's tasks from the store.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Unauthenticated`] with no identity, or the
    /// store's error. Local state is unchanged on error.
    pub async fn load(&self) -> Result<(), SessionError> {
        let result = async {
            let owner = self.identity()?;
            let _claim = self.claim(Claim::Bulk)?;
            let tasks = self.store.list(&owner, Filter::All).await?;
            tracing::debug!(identity = %owner, count = tasks.len(), "tasks loaded");
            self.apply(&owner, &Action::Initialize { tasks });
            Ok(())
        }
        .await;
        self.record("load", result)
    }

    /// Creates a task from raw text.
    ///
    /// The text is trimmed and checked locally first; invalid text never
    /// reaches the store.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Validation`] for blank or over-long text,
    /// [`SessionError::Unauthenticated`] with no identity, or the store's
    /// error.
    pub async fn add_task(&self, text: &str) -> Result<Task, SessionError> {
        let result = async {
            let text = validate_text(text)?;
            let owner = self.identity()?;
            let _claim = self.claim(Claim::Create)?;
            let task = self.store.create(&owner, &text).await?;
            tracing::debug!(identity = %owner, task_id = %task.id, "task added");
            self.apply(&owner, &Action::created(&task));
            Ok(task)
        }
        .await;
        self.record("add_task", result)
    }

    /// Flips the completion state of a task.
    ///
    /// The store receives the absolute new value, so repeating the request
    /// is harmless.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] if the task is not in the local
    /// list or the store refuses it, [`SessionError::Busy`] if the task has
    /// another change in flight, or the store's error.
    pub async fn toggle_task(&self, id: TaskId) -> Result<Task, SessionError> {
        let result = async {
            let owner = self.identity()?;
            let _claim = self.claim(Claim::Task(id))?;
            let completed = self
                .list
                .lock()
                .state
                .get(id)
                .map(|t| !t.completed)
                .ok_or(SessionError::NotFound(id))?;
            let task = self
                .store
                .update(&owner, id, TaskPatch::completed(completed))
                .await?;
            tracing::debug!(identity = %owner, task_id = %id, completed, "task toggled");
            self.apply(&owner, &Action::Toggle {
                id,
                at: task.updated_at,
            });
            Ok(task)
        }
        .await;
        self.record("toggle_task", result)
    }

    /// Replaces the text of a task.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Validation`] for blank or over-long text,
    /// [`SessionError::Busy`] if the task has another change in flight, or
    /// the store's error.
    pub async fn edit_task(&self, id: TaskId, text: &str) -> Result<Task, SessionError> {
        let result = async {
            let text = validate_text(text)?;
            let owner = self.identity()?;
            let _claim = self.claim(Claim::Task(id))?;
            let task = self.store.update(&owner, id, TaskPatch::text(text)).await?;
            tracing::debug!(identity = %owner, task_id = %id, "task edited");
            self.apply(&owner, &Action::Edit {
                id,
                text: task.text.clone(),
                at: task.updated_at,
            });
            Ok(task)
        }
        .await;
        self.record("edit_task", result)
    }

    /// Deletes a task.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Busy`] if the task has another change in
    /// flight, or the store's error.
    pub async fn delete_task(&self, id: TaskId) -> Result<(), SessionError> {
        let result = async {
            let owner = self.identity()?;
            let _claim = self.claim(Claim::Task(id))?;
            self.store.delete(&owner, id).await?;
            tracing::debug!(identity = %owner, task_id = %id, "task deleted");
            self.apply(&owner, &Action::Delete { id });
            Ok(())
        }
        .await;
        self.record("delete_task", result)
    }

    /// Deletes every completed task.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::BulkInFlight`] if any other change is in
    /// flight, or the store's error.
    pub async fn clear_completed(&self) -> Result<(), SessionError> {
        let result = async {
            let owner = self.identity()?;
            let _claim = self.claim(Claim::Bulk)?;
            self.store.delete_completed(&owner).await?;
            tracing::debug!(identity = %owner, "completed tasks cleared");
            self.apply(&owner, &Action::ClearCompleted);
            Ok(())
        }
        .await;
        self.record("clear_completed", result)
    }

    /// Completes every task, or reopens all of them if all are completed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::BulkInFlight`] if any other change is in
    /// flight, or the store's error.
    pub async fn toggle_all(&self) -> Result<(), SessionError> {
        let result = async {
            let owner = self.identity()?;
            let _claim = self.claim(Claim::Bulk)?;
            let completed = !self.list.lock().state.all_completed();
            self.store.set_all_completed(&owner, completed).await?;
            tracing::debug!(identity = %owner, completed, "all tasks toggled");
            // Reload so local rows carry the store's timestamps.
            match self.store.list(&owner, Filter::All).await {
                Ok(tasks) => self.apply(&owner, &Action::Initialize { tasks }),
                Err(e) => {
                    tracing::warn!(identity = %owner, error = %e, "reload after toggle_all failed");
                    self.apply(&owner, &Action::complete_all());
                }
            }
            Ok(())
        }
        .await;
        self.record("toggle_all", result)
    }

    /// Resolves the acting identity and binds the list to it.
    fn identity(&self) -> Result<Identity, SessionError> {
        let identity = self
            .gate
            .current_identity()
            .ok_or(SessionError::Unauthenticated)?;
        self.bind(&identity);
        Ok(identity)
    }

    /// Makes `identity` the owner of the local list. Tasks of a previous
    /// owner are discarded; the filter is kept.
    fn bind(&self, identity: &Identity) {
        let mut list = self.list.lock();
        if list.owner.as_ref() != Some(identity) {
            let previous = list.owner.replace(identity.clone());
            if let Some(previous) = previous {
                tracing::info!(
                    previous = %previous,
                    identity = %identity,
                    "identity changed, discarding local tasks"
                );
                list.state.tasks.clear();
            }
        }
        list.state.tasks.retain(|t| visible_to(t, Some(identity)));
    }

    /// Applies a confirmed transition, unless the list has since been
    /// rebound to another identity.
    fn apply(&self, owner: &Identity, action: &Action) {
        let mut list = self.list.lock();
        if list.owner.as_ref() != Some(owner) {
            tracing::debug!(identity = %owner, "identity changed mid-operation, dropping result");
            return;
        }
        list.state = reduce(&list.state, action);
    }

    fn claim(&self, claim: Claim) -> Result<ClaimGuard<'_>, SessionError> {
        self.in_flight.lock().try_claim(claim)?;
        Ok(ClaimGuard {
            in_flight: &self.in_flight,
            claim,
        })
    }

    fn record<T>(&self, op: &str, result: Result<T, SessionError>) -> Result<T, SessionError> {
        let mut last_error = self.last_error.lock();
        match &result {
            Ok(_) => *last_error = None,
            Err(e) => {
                tracing::warn!(op, error = %e, "task operation failed");
                *last_error = Some(e.clone());
            }
        }
        result
    }
}

/// Unowned tasks are visible to everyone; owned ones only to their owner.
fn visible_to(task: &Task, identity: Option<&Identity>) -> bool {
    task.owner_id.is_none() || task.owner_id.as_ref() == identity
}
