//! Server core: shared state, WebSocket handler, and request dispatch.
//!
//! Each connection authenticates once with [`ClientMessage::Hello`]. The
//! token is resolved to an [`Identity`] by the [`TokenGate`], and every
//! request on that connection is executed against the shared
//! [`TaskRepository`] as that identity. Requests are handled concurrently;
//! responses carry the request id so the client can match them up.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use taskdeck_proto::store::{StoreError, TaskStore};
use taskdeck_proto::task::Identity;
use taskdeck_proto::wire::{self, ClientMessage, ServerMessage, StoreReply, StoreRequest};
use tokio::sync::mpsc;

use crate::gate::TokenGate;
use crate::repository::TaskRepository;

/// Default maximum accepted frame size in bytes (64 KB).
const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Shared server state: the repository, the token gate, and frame limits.
pub struct ServerState {
    /// Task storage shared by every connection.
    pub repository: Arc<TaskRepository>,
    gate: TokenGate,
    max_message_size: usize,
    connections: AtomicUsize,
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new(Arc::new(TaskRepository::new()), TokenGate::new())
    }
}

impl ServerState {
    /// Creates server state with the default frame size limit.
    #[must_use]
    pub fn new(repository: Arc<TaskRepository>, gate: TokenGate) -> Self {
        Self::with_config(repository, gate, DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Creates server state with a custom frame size limit.
    #[must_use]
    pub fn with_config(
        repository: Arc<TaskRepository>,
        gate: TokenGate,
        max_message_size: usize,
    ) -> Self {
        Self {
            repository,
            gate,
            max_message_size,
            connections: AtomicUsize::new(0),
        }
    }

    /// Number of currently authenticated connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }
}

/// Handles an upgraded WebSocket connection for a single client.
///
/// The connection lifecycle:
/// 1. Wait for a `Hello` message and resolve its token.
/// 2. Send `Welcome` with the identity, or `Rejected` and close.
/// 3. Enter the request loop, answering each request with a `Response`.
pub async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let Some(token) = wait_for_hello(&mut ws_receiver).await else {
        tracing::warn!("connection closed before hello");
        return;
    };

    let Some(identity) = state.gate.resolve(&token) else {
        tracing::warn!("rejecting connection with unknown token");
        let rejected = ServerMessage::Rejected {
            reason: "unknown or expired token".to_string(),
        };
        let _ = send_server_msg(&mut ws_sender, &rejected).await;
        let _ = ws_sender.send(Message::Close(None)).await;
        return;
    };

    let welcome = ServerMessage::Welcome {
        identity: identity.clone(),
    };
    if let Err(e) = send_server_msg(&mut ws_sender, &welcome).await {
        tracing::error!(identity = %identity, error = %e, "failed to send Welcome");
        return;
    }

    let active = state.connections.fetch_add(1, Ordering::Relaxed) + 1;
    tracing::info!(identity = %identity, connections = active, "client authenticated");

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let writer_identity = identity.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(identity = %writer_identity, "WebSocket write failed");
                break;
            }
        }
    });

    let reader_identity = identity.clone();
    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Binary(data) => {
                    handle_binary_message(&reader_identity, &data, &reader_state, &tx);
                }
                Message::Close(_) => {
                    tracing::info!(identity = %reader_identity, "received close frame");
                    break;
                }
                _ => {
                    // Ignore text, ping, pong frames.
                }
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    state.connections.fetch_sub(1, Ordering::Relaxed);
    tracing::info!(identity = %identity, "client disconnected");
}

/// Waits for the first message on the WebSocket, expecting a `Hello`.
///
/// Returns the presented token, or `None` if the connection closes or a
/// different message arrives first.
async fn wait_for_hello(
    receiver: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
) -> Option<String> {
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Binary(data) => match wire::decode_client(&data) {
                Ok(ClientMessage::Hello { token }) => return Some(token),
                Ok(other) => {
                    tracing::warn!(msg = ?other, "expected Hello, got different message");
                    return None;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to decode hello message");
                    return None;
                }
            },
            Message::Close(_) => return None,
            _ => {}
        }
    }
    None
}

/// Handles a binary frame from an authenticated client.
///
/// Store requests run on their own task so a slow snapshot write never
/// blocks reads queued behind it.
fn handle_binary_message(
    identity: &Identity,
    data: &[u8],
    state: &Arc<ServerState>,
    tx: &mpsc::UnboundedSender<Message>,
) {
    if data.len() > state.max_message_size {
        tracing::warn!(
            identity = %identity,
            size = data.len(),
            max = state.max_message_size,
            "frame exceeds size limit"
        );
        let err = ServerMessage::Error {
            reason: format!(
                "message too large: {} bytes (max {})",
                data.len(),
                state.max_message_size
            ),
        };
        queue_server_msg(tx, &err);
        return;
    }

    let msg = match wire::decode_client(data) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(identity = %identity, error = %e, "failed to decode message");
            queue_server_msg(
                tx,
                &ServerMessage::Error {
                    reason: e.to_string(),
                },
            );
            return;
        }
    };

    match msg {
        ClientMessage::Request {
            request_id,
            request,
        } => {
            let identity = identity.clone();
            let state = Arc::clone(state);
            let tx = tx.clone();
            tokio::spawn(async move {
                tracing::debug!(identity = %identity, request_id, request = ?request, "handling request");
                let result = execute(&state.repository, &identity, request).await;
                if let Err(e) = &result {
                    tracing::debug!(identity = %identity, request_id, error = %e, "request failed");
                }
                queue_server_msg(&tx, &ServerMessage::Response { request_id, result });
            });
        }
        ClientMessage::Hello { .. } => {
            tracing::warn!(identity = %identity, "received duplicate Hello");
            queue_server_msg(
                tx,
                &ServerMessage::Error {
                    reason: "already authenticated".to_string(),
                },
            );
        }
    }
}

/// Runs one store request as `owner`.
async fn execute(
    repository: &TaskRepository,
    owner: &Identity,
    request: StoreRequest,
) -> Result<StoreReply, StoreError> {
    match request {
        StoreRequest::List { filter } => repository.list(owner, filter).await.map(StoreReply::Tasks),
        StoreRequest::Create { text } => repository.create(owner, &text).await.map(StoreReply::Task),
        StoreRequest::Update { id, patch } => repository
            .update(owner, id, patch)
            .await
            .map(StoreReply::Task),
        StoreRequest::Delete { id } => repository.delete(owner, id).await.map(|()| StoreReply::Done),
        StoreRequest::DeleteCompleted => repository
            .delete_completed(owner)
            .await
            .map(|()| StoreReply::Done),
        StoreRequest::SetAllCompleted { completed } => repository
            .set_all_completed(owner, completed)
            .await
            .map(|()| StoreReply::Done),
    }
}

/// Encodes a server message and queues it on a connection's writer channel.
fn queue_server_msg(tx: &mpsc::UnboundedSender<Message>, msg: &ServerMessage) {
    match wire::encode_server(msg) {
        Ok(bytes) => {
            let _ = tx.send(Message::Binary(bytes.into()));
        }
        Err(e) => tracing::error!(error = %e, "failed to encode server message"),
    }
}

/// Encodes and sends a server message directly on a WebSocket sender.
async fn send_server_msg(
    ws_sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    msg: &ServerMessage,
) -> Result<(), String> {
    let bytes = wire::encode_server(msg).map_err(|e| e.to_string())?;
    ws_sender
        .send(Message::Binary(bytes.into()))
        .await
        .map_err(|e| format!("WebSocket send error: {e}"))
}

/// Starts the server on the given address with an empty in-memory
/// repository that accepts no tokens.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(ServerState::default())).await
}

/// Starts the server with a pre-configured [`ServerState`] and returns the
/// bound address and a join handle.
///
/// This is the primary entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<ServerState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok((bound_addr, handle))
}

/// Starts the server in-process for testing with accounts `alice` and `bob`
/// (tokens `alice-token` and `bob-token`).
///
/// Binds to `127.0.0.1:0` (OS-assigned port).
#[cfg(test)]
pub async fn start_test_server() -> (
    std::net::SocketAddr,
    tokio::task::JoinHandle<()>,
    Arc<ServerState>,
) {
    use crate::config::Account;

    let gate = TokenGate::from_accounts(&[
        Account {
            identity: "alice".to_string(),
            token: "alice-token".to_string(),
        },
        Account {
            identity: "bob".to_string(),
            token: "bob-token".to_string(),
        },
    ]);
    let state = Arc::new(ServerState::new(Arc::new(TaskRepository::new()), gate));
    let (addr, handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("failed to start test server");
    (addr, handle, state)
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<ServerState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
