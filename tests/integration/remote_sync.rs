//! Integration tests for sessions talking to a live `taskdeck` server.
//!
//! Starts the server in-process on an OS-assigned port and connects one
//! `RemoteStore` per user, so every call crosses the real WebSocket path.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::similar_names,
    clippy::redundant_clone
)]

use std::sync::Arc;
use std::time::Duration;

use taskdeck::cli::{self, Command};
use taskdeck::gate::SessionGate;
use taskdeck::store::{ConnectError, RemoteOptions, RemoteStore};
use taskdeck::tasks::{SessionError, TaskSession};
use taskdeck_proto::store::{StoreError, TaskStore};
use taskdeck_proto::task::{Filter, Identity, TaskPatch};
use taskdeck_server::gate::TokenGate;
use taskdeck_server::repository::TaskRepository;
use taskdeck_server::server::{ServerState, start_server_with_state};

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

type RemoteSession = TaskSession<RemoteStore, SessionGate>;

fn options() -> RemoteOptions {
    RemoteOptions {
        connect_timeout: Duration::from_secs(2),
        hello_timeout: Duration::from_secs(2),
        request_timeout: Duration::from_secs(2),
        request_retries: 1,
    }
}

/// Starts a server with accounts `alice` and `bob` and returns its URL.
async fn start_server() -> (String, Arc<ServerState>) {
    let mut gate = TokenGate::new();
    gate.insert("alice-token", Identity::new("alice"));
    gate.insert("bob-token", Identity::new("bob"));
    let state = Arc::new(ServerState::new(Arc::new(TaskRepository::new()), gate));

    let (addr, _handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("failed to start server");
    (format!("ws://{addr}/ws"), state)
}

async fn connect_session(url: &str, token: &str) -> RemoteSession {
    let store = RemoteStore::connect(url, token, options())
        .await
        .expect("connect failed");
    let gate = SessionGate::signed_in(store.identity().clone());
    TaskSession::new(store, gate)
}

// ===========================================================================
// Handshake
// ===========================================================================

#[tokio::test]
async fn token_maps_to_identity() {
    let (url, _state) = start_server().await;

    let store = RemoteStore::connect(&url, "bob-token", options())
        .await
        .unwrap();
    assert_eq!(store.identity(), &Identity::new("bob"));
    assert_eq!(store.server_url(), url);
    assert!(store.is_connected());
}

#[tokio::test]
async fn unknown_token_is_rejected() {
    let (url, _state) = start_server().await;

    let result = RemoteStore::connect(&url, "mallory-token", options()).await;
    assert!(matches!(result, Err(ConnectError::Rejected(_))));
}

#[tokio::test]
async fn unreachable_server_fails_to_connect() {
    // Bind then drop to get a port nothing listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = RemoteStore::connect(&format!("ws://{addr}/ws"), "alice-token", options()).await;
    assert!(matches!(
        result,
        Err(ConnectError::Unreachable(_) | ConnectError::Timeout)
    ));
}

// ===========================================================================
// Two users, one server
// ===========================================================================

#[tokio::test]
async fn two_users_keep_separate_lists() {
    let (url, _state) = start_server().await;
    let alice = connect_session(&url, "alice-token").await;
    let bob = connect_session(&url, "bob-token").await;

    let milk = alice.add_task("buy milk").await.unwrap();
    alice.add_task("walk dog").await.unwrap();
    bob.add_task("fix bike").await.unwrap();

    alice.load().await.unwrap();
    bob.load().await.unwrap();
    assert_eq!(alice.state().tasks.len(), 2);
    assert_eq!(bob.state().tasks.len(), 1);
    assert!(bob.state().get(milk.id).is_none());

    // Bob cannot touch Alice's task even with its id.
    let err = bob
        .store()
        .update(&Identity::new("bob"), milk.id, TaskPatch::completed(true))
        .await
        .unwrap_err();
    assert_eq!(err, StoreError::NotFound(milk.id));

    alice.load().await.unwrap();
    assert!(!alice.state().get(milk.id).unwrap().completed);
}

#[tokio::test]
async fn store_refuses_foreign_owner_locally() {
    let (url, _state) = start_server().await;
    let alice = connect_session(&url, "alice-token").await;

    let err = alice
        .store()
        .list(&Identity::new("bob"), Filter::All)
        .await
        .unwrap_err();
    assert_eq!(err, StoreError::Unauthenticated);
}

#[tokio::test]
async fn full_walkthrough_over_the_wire() {
    let (url, state) = start_server().await;
    let session = connect_session(&url, "alice-token").await;

    let milk = session.add_task("  buy milk ").await.unwrap();
    assert_eq!(milk.text, "buy milk");
    assert_eq!(milk.owner_id, Some(Identity::new("alice")));
    let eggs = session.add_task("buy eggs").await.unwrap();

    let toggled = session.toggle_task(milk.id).await.unwrap();
    assert!(toggled.completed);
    assert!(toggled.updated_at >= milk.updated_at);

    session.edit_task(eggs.id, "buy a dozen eggs").await.unwrap();
    assert_eq!(session.state().get(eggs.id).unwrap().text, "buy a dozen eggs");

    session.clear_completed().await.unwrap();
    assert!(session.state().get(milk.id).is_none());
    assert_eq!(session.state().tasks.len(), 1);

    session.toggle_all().await.unwrap();
    assert!(session.state().all_completed());

    session.delete_task(eggs.id).await.unwrap();
    assert!(session.state().tasks.is_empty());
    assert!(state.repository.is_empty().await);
}

#[tokio::test]
async fn server_validation_errors_reach_the_session() {
    let (url, _state) = start_server().await;
    let session = connect_session(&url, "alice-token").await;
    let task = session.add_task("valid").await.unwrap();

    // Bypass local validation to exercise the server check.
    let err = session
        .store()
        .update(&Identity::new("alice"), task.id, TaskPatch::text("   "))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));

    let err = session.edit_task(task.id, &"y".repeat(101)).await.unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));
    assert_eq!(session.state().get(task.id).unwrap().text, "valid");
}

#[tokio::test]
async fn cli_command_runs_against_server() {
    let (url, _state) = start_server().await;
    let session = connect_session(&url, "alice-token").await;

    cli::execute(
        &session,
        &Command::Add {
            text: vec!["remote".to_string(), "task".to_string()],
        },
        "%H:%M",
    )
    .await
    .unwrap();

    let out = cli::execute(&session, &Command::Stats, "%H:%M").await.unwrap();
    assert_eq!(out, "1 total, 1 active, 0 completed (0% complete)");

    let listing = cli::execute(&session, &Command::default(), "%H:%M")
        .await
        .unwrap();
    assert!(listing.contains("[ ]"));
    assert!(listing.contains("remote task"));
}
