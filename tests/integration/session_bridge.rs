//! Integration tests for `TaskSession` over the real stores.
//!
//! Drives sessions against the server-side `TaskRepository` and the local
//! data-file store, checking that local state only follows confirmed store
//! results and that owners never see each other's tasks.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::similar_names,
    clippy::redundant_clone
)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use taskdeck::gate::{AccessGate, SessionGate};
use taskdeck::store::LocalStore;
use taskdeck::tasks::{Action, SessionError, TaskSession};
use taskdeck_proto::store::{StoreError, TaskStore};
use taskdeck_proto::task::{Filter, Identity, Task, TaskId, TaskPatch};
use taskdeck_server::repository::TaskRepository;

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

/// Forwards to an inner store and counts every call.
struct CountingStore<S> {
    inner: S,
    calls: AtomicUsize,
}

impl<S> CountingStore<S> {
    const fn new(inner: S) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl<S: TaskStore> TaskStore for CountingStore<S> {
    async fn list(&self, owner: &Identity, filter: Filter) -> Result<Vec<Task>, StoreError> {
        self.hit();
        self.inner.list(owner, filter).await
    }

    async fn create(&self, owner: &Identity, text: &str) -> Result<Task, StoreError> {
        self.hit();
        self.inner.create(owner, text).await
    }

    async fn update(
        &self,
        owner: &Identity,
        id: TaskId,
        patch: TaskPatch,
    ) -> Result<Task, StoreError> {
        self.hit();
        self.inner.update(owner, id, patch).await
    }

    async fn delete(&self, owner: &Identity, id: TaskId) -> Result<(), StoreError> {
        self.hit();
        self.inner.delete(owner, id).await
    }

    async fn delete_completed(&self, owner: &Identity) -> Result<(), StoreError> {
        self.hit();
        self.inner.delete_completed(owner).await
    }

    async fn set_all_completed(&self, owner: &Identity, completed: bool) -> Result<(), StoreError> {
        self.hit();
        self.inner.set_all_completed(owner, completed).await
    }
}

type SharedSession = TaskSession<CountingStore<Arc<TaskRepository>>, SessionGate>;

fn session_for(repo: &Arc<TaskRepository>, name: &str) -> SharedSession {
    TaskSession::new(
        CountingStore::new(Arc::clone(repo)),
        SessionGate::signed_in(Identity::new(name)),
    )
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("taskdeck-bridge-{name}-{}.bin", TaskId::new()))
}

// ===========================================================================
// Validation and authentication
// ===========================================================================

#[tokio::test]
async fn blank_text_never_reaches_store() {
    let repo = Arc::new(TaskRepository::new());
    let session = session_for(&repo, "alice");

    for text in ["", "   ", "\t\n"] {
        let err = session.add_task(text).await.unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));
    }

    assert_eq!(session.store().calls(), 0);
    assert!(repo.is_empty().await);
    assert!(session.state().tasks.is_empty());
    assert!(matches!(
        session.last_error(),
        Some(SessionError::Validation(_))
    ));
}

#[tokio::test]
async fn overlong_text_never_reaches_store() {
    let repo = Arc::new(TaskRepository::new());
    let session = session_for(&repo, "alice");

    let err = session.add_task(&"x".repeat(101)).await.unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));
    assert_eq!(session.store().calls(), 0);

    let task = session.add_task(&"x".repeat(100)).await.unwrap();
    assert_eq!(task.text.len(), 100);
    assert_eq!(session.store().calls(), 1);
}

#[tokio::test]
async fn signed_out_session_is_unauthenticated() {
    let repo = Arc::new(TaskRepository::new());
    let session = TaskSession::new(CountingStore::new(Arc::clone(&repo)), SessionGate::signed_out());

    assert_eq!(
        session.add_task("anything").await.unwrap_err(),
        SessionError::Unauthenticated
    );
    assert_eq!(session.load().await.unwrap_err(), SessionError::Unauthenticated);
    assert_eq!(session.store().calls(), 0);

    session.gate().sign_in(Identity::new("carol"));
    assert!(session.gate().is_authenticated());
    session.add_task("now it works").await.unwrap();
    assert_eq!(session.state().tasks.len(), 1);
    assert_eq!(session.last_error(), None);
}

// ===========================================================================
// Ownership
// ===========================================================================

#[tokio::test]
async fn owners_only_see_their_own_tasks() {
    let repo = Arc::new(TaskRepository::new());
    let alice = session_for(&repo, "alice");
    let bob = session_for(&repo, "bob");

    alice.add_task("alice one").await.unwrap();
    alice.add_task("alice two").await.unwrap();
    bob.add_task("bob one").await.unwrap();

    alice.load().await.unwrap();
    bob.load().await.unwrap();

    let alice_texts: Vec<String> = alice.state().tasks.into_iter().map(|t| t.text).collect();
    assert_eq!(alice_texts, vec!["alice two", "alice one"]);
    assert_eq!(bob.state().tasks.len(), 1);
    assert_eq!(bob.state().tasks[0].text, "bob one");
}

#[tokio::test]
async fn foreign_task_update_is_not_found_and_state_unchanged() {
    let repo = Arc::new(TaskRepository::new());
    let alice = session_for(&repo, "alice");
    let bob = session_for(&repo, "bob");

    let task = alice.add_task("private").await.unwrap();
    bob.add_task("bob's own").await.unwrap();
    let before = bob.state();
    let calls = bob.store().calls();

    // Edit and delete go to the store, which refuses the foreign id.
    assert_eq!(
        bob.edit_task(task.id, "hijacked").await.unwrap_err(),
        SessionError::NotFound(task.id)
    );
    assert_eq!(
        bob.delete_task(task.id).await.unwrap_err(),
        SessionError::NotFound(task.id)
    );
    assert_eq!(bob.store().calls(), calls + 2);
    assert_eq!(bob.state(), before);
    assert_eq!(bob.last_error(), Some(SessionError::NotFound(task.id)));

    alice.load().await.unwrap();
    assert_eq!(alice.state().tasks, vec![task]);
}

#[tokio::test]
async fn foreign_tasks_in_local_state_are_never_shown() {
    let repo = Arc::new(TaskRepository::new());
    let alice = session_for(&repo, "alice");
    let bob = session_for(&repo, "bob");

    let task = alice.add_task("private").await.unwrap();
    bob.dispatch(&Action::Initialize {
        tasks: vec![task.clone()],
    });
    assert!(bob.state().tasks.is_empty());
    assert_eq!(bob.view().stats.total, 0);

    assert_eq!(
        bob.toggle_task(task.id).await.unwrap_err(),
        SessionError::NotFound(task.id)
    );
    assert_eq!(bob.store().calls(), 0);
}

#[tokio::test]
async fn signing_in_as_someone_else_starts_a_fresh_list() {
    let repo = Arc::new(TaskRepository::new());
    let session = session_for(&repo, "alice");
    let secret = session.add_task("alice secret").await.unwrap();

    session.gate().sign_in(Identity::new("bob"));
    assert!(session.view().tasks.is_empty());

    session.toggle_all().await.unwrap();
    session.clear_completed().await.unwrap();
    session.load().await.unwrap();
    assert!(session.state().tasks.is_empty());

    let stored = repo.list(&Identity::new("alice"), Filter::All).await.unwrap();
    assert_eq!(stored, vec![secret]);
}

#[tokio::test]
async fn toggle_of_unknown_task_skips_store() {
    let repo = Arc::new(TaskRepository::new());
    let session = session_for(&repo, "alice");
    let id = TaskId::new();

    assert_eq!(
        session.toggle_task(id).await.unwrap_err(),
        SessionError::NotFound(id)
    );
    assert_eq!(session.store().calls(), 0);
}

#[tokio::test]
async fn bulk_operations_leave_other_owners_alone() {
    let repo = Arc::new(TaskRepository::new());
    let alice = session_for(&repo, "alice");
    let bob = session_for(&repo, "bob");

    alice.add_task("a1").await.unwrap();
    alice.add_task("a2").await.unwrap();
    let bob_task = bob.add_task("b1").await.unwrap();
    bob.toggle_task(bob_task.id).await.unwrap();

    alice.toggle_all().await.unwrap();
    assert!(alice.state().all_completed());
    alice.clear_completed().await.unwrap();
    assert!(alice.state().tasks.is_empty());

    bob.load().await.unwrap();
    let bob_tasks = bob.state().tasks;
    assert_eq!(bob_tasks.len(), 1);
    assert!(bob_tasks[0].completed);

    alice.load().await.unwrap();
    assert!(alice.state().tasks.is_empty());
}

// ===========================================================================
// Confirmed results drive local state
// ===========================================================================

#[tokio::test]
async fn local_state_matches_store_after_each_operation() {
    let repo = Arc::new(TaskRepository::new());
    let session = session_for(&repo, "alice");
    let owner = Identity::new("alice");

    let milk = session.add_task("  buy milk  ").await.unwrap();
    assert_eq!(milk.text, "buy milk");
    let eggs = session.add_task("buy eggs").await.unwrap();

    session.toggle_task(milk.id).await.unwrap();
    session.edit_task(eggs.id, "buy a dozen eggs").await.unwrap();

    let mut local = session.state().tasks;
    let mut stored = repo.list(&owner, Filter::All).await.unwrap();
    local.sort_by_key(|t| t.id);
    stored.sort_by_key(|t| t.id);
    assert_eq!(local, stored);

    let view = session.view();
    assert_eq!(view.stats.total, 2);
    assert_eq!(view.stats.completed, 1);
    assert!((view.percent_complete - 50.0).abs() < f64::EPSILON);

    session.set_filter(Filter::Completed);
    let view = session.view();
    assert_eq!(view.tasks.len(), 1);
    assert_eq!(view.tasks[0].id, milk.id);
}

#[tokio::test]
async fn toggle_all_twice_reopens_everything() {
    let repo = Arc::new(TaskRepository::new());
    let session = session_for(&repo, "alice");

    session.add_task("one").await.unwrap();
    session.add_task("two").await.unwrap();

    session.toggle_all().await.unwrap();
    assert!(session.state().tasks.iter().all(|t| t.completed));
    session.toggle_all().await.unwrap();
    assert!(session.state().tasks.iter().all(|t| !t.completed));

    let stored = repo
        .list(&Identity::new("alice"), Filter::Completed)
        .await
        .unwrap();
    assert!(stored.is_empty());
}

#[tokio::test]
async fn local_store_session_survives_restart() {
    let path = temp_path("restart");
    let milk = {
        let session = TaskSession::new(
            LocalStore::open(&path).unwrap(),
            SessionGate::signed_in(Identity::new("local")),
        );
        let milk = session.add_task("buy milk").await.unwrap();
        session.toggle_task(milk.id).await.unwrap();
        milk
    };

    let session = TaskSession::new(
        LocalStore::open(&path).unwrap(),
        SessionGate::signed_in(Identity::new("local")),
    );
    session.load().await.unwrap();
    let tasks = session.state().tasks;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, milk.id);
    assert!(tasks[0].completed);

    let _ = std::fs::remove_file(&path);
}
