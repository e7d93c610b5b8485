//! WebSocket client for a `taskdeck` server.
//!
//! [`RemoteStore::connect`] opens the connection, presents the bearer token,
//! and waits for the server to confirm the identity it acts as. After that
//! every [`TaskStore`] call becomes a request frame tagged with a fresh
//! request id; a background reader task routes each response back to the
//! waiting caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use taskdeck_proto::store::{StoreError, TaskStore};
use taskdeck_proto::task::{Filter, Identity, Task, TaskId, TaskPatch};
use taskdeck_proto::wire::{self, ClientMessage, ServerMessage, StoreReply, StoreRequest};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// Type alias for the write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Type alias for the read half of a WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Outcome of one request, delivered by the reader task.
type Reply = Result<StoreReply, StoreError>;

/// Requests waiting for a response, keyed by request id.
type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;

/// Errors establishing a session with the server.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// Connecting or the hello exchange did not finish in time.
    #[error("timed out connecting to server")]
    Timeout,
    /// The server could not be reached.
    #[error("server unreachable: {0}")]
    Unreachable(String),
    /// The server refused the token.
    #[error("server rejected token: {0}")]
    Rejected(String),
    /// The server answered with something other than the expected handshake.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The connection closed during the handshake.
    #[error("connection closed during handshake")]
    Closed,
}

/// Timeouts and retry policy for a [`RemoteStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteOptions {
    /// Timeout for the WebSocket connection itself.
    pub connect_timeout: Duration,
    /// Timeout for the server's answer to `Hello`.
    pub hello_timeout: Duration,
    /// Timeout for each request attempt.
    pub request_timeout: Duration,
    /// Extra attempts for idempotent requests after a timeout.
    pub request_retries: u32,
}

impl Default for RemoteOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            hello_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            request_retries: 1,
        }
    }
}

/// A [`TaskStore`] that lives on a `taskdeck` server.
///
/// The store is bound to the identity the server confirmed for its token.
/// Calls made on behalf of any other identity fail with
/// [`StoreError::Unauthenticated`] without reaching the server.
pub struct RemoteStore {
    identity: Identity,
    server_url: String,
    options: RemoteOptions,
    ws_sender: tokio::sync::Mutex<WsSender>,
    pending: Pending,
    next_request_id: AtomicU64,
    connected: Arc<AtomicBool>,
    reader_handle: tokio::task::JoinHandle<()>,
}

impl RemoteStore {
    /// Connects to `server_url` and authenticates with `token`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError`] if the server cannot be reached in time,
    /// refuses the token, or breaks the handshake.
    pub async fn connect(
        server_url: &str,
        token: &str,
        options: RemoteOptions,
    ) -> Result<Self, ConnectError> {
        let (ws_stream, _response) =
            tokio::time::timeout(options.connect_timeout, connect_async(server_url))
                .await
                .map_err(|_| {
                    tracing::warn!(url = server_url, "server connect timed out");
                    ConnectError::Timeout
                })?
                .map_err(|e| {
                    tracing::warn!(url = server_url, err = %e, "server connect failed");
                    ConnectError::Unreachable(e.to_string())
                })?;

        let (mut ws_sender, mut ws_reader) = ws_stream.split();

        let hello = wire::encode_client(&ClientMessage::Hello {
            token: token.to_string(),
        })
        .map_err(|e| ConnectError::Protocol(e.to_string()))?;
        ws_sender
            .send(Message::Binary(hello.into()))
            .await
            .map_err(|e| {
                tracing::warn!(err = %e, "failed to send Hello");
                ConnectError::Closed
            })?;

        let answer = tokio::time::timeout(options.hello_timeout, ws_reader.next())
            .await
            .map_err(|_| {
                tracing::warn!(url = server_url, "hello answer timed out");
                ConnectError::Timeout
            })?;

        let identity = match answer {
            Some(Ok(Message::Binary(data))) => match wire::decode_server(&data) {
                Ok(ServerMessage::Welcome { identity }) => identity,
                Ok(ServerMessage::Rejected { reason }) => {
                    tracing::warn!(reason = %reason, "server rejected token");
                    return Err(ConnectError::Rejected(reason));
                }
                Ok(other) => {
                    tracing::warn!(?other, "unexpected server message during hello");
                    return Err(ConnectError::Protocol(
                        "unexpected message during hello".to_string(),
                    ));
                }
                Err(e) => return Err(ConnectError::Protocol(e.to_string())),
            },
            Some(Ok(Message::Close(_))) | None => return Err(ConnectError::Closed),
            Some(Ok(_)) => {
                return Err(ConnectError::Protocol(
                    "unexpected non-binary frame during hello".to_string(),
                ));
            }
            Some(Err(e)) => return Err(ConnectError::Protocol(e.to_string())),
        };

        tracing::info!(identity = %identity, url = server_url, "connected to taskdeck server");

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));
        let reader_handle = tokio::spawn(reader_loop(
            ws_reader,
            Arc::clone(&pending),
            Arc::clone(&connected),
        ));

        Ok(Self {
            identity,
            server_url: server_url.to_string(),
            options,
            ws_sender: tokio::sync::Mutex::new(ws_sender),
            pending,
            next_request_id: AtomicU64::new(1),
            connected,
            reader_handle,
        })
    }

    /// The identity the server confirmed for this connection.
    #[must_use]
    pub const fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The server URL this store is connected to.
    #[must_use]
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Whether the connection is still open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Sends `request` as `owner`, retrying idempotent requests on timeout.
    async fn request(&self, owner: &Identity, request: StoreRequest) -> Reply {
        if *owner != self.identity {
            tracing::warn!(
                owner = %owner,
                identity = %self.identity,
                "refusing request for a different identity"
            );
            return Err(StoreError::Unauthenticated);
        }

        let attempts = if request.is_idempotent() {
            self.options.request_retries.saturating_add(1)
        } else {
            1
        };

        for attempt in 1..=attempts {
            match self.send_once(&request).await {
                // An earlier attempt may have deleted the row before timing out.
                Ok(Err(StoreError::NotFound(id)))
                    if attempt > 1 && matches!(request, StoreRequest::Delete { .. }) =>
                {
                    tracing::debug!(task_id = %id, attempt, "retried delete already applied");
                    return Ok(StoreReply::Done);
                }
                Err(AttemptError::TimedOut) if attempt < attempts => {
                    tracing::warn!(attempt, request = ?request, "request timed out, retrying");
                }
                Err(AttemptError::TimedOut) => {
                    return Err(StoreError::Unavailable("request timed out".to_string()));
                }
                Err(AttemptError::Closed) => {
                    return Err(StoreError::Unavailable("connection closed".to_string()));
                }
                Ok(reply) => return reply,
            }
        }
        Err(StoreError::Unavailable("request timed out".to_string()))
    }

    async fn send_once(&self, request: &StoreRequest) -> Result<Reply, AttemptError> {
        if !self.is_connected() {
            return Err(AttemptError::Closed);
        }

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let bytes = wire::encode_client(&ClientMessage::Request {
            request_id,
            request: request.clone(),
        })
        .map_err(|e| {
            tracing::error!(error = %e, "failed to encode request");
            AttemptError::Closed
        })?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id, tx);
        let _waiter = PendingGuard {
            pending: &self.pending,
            request_id,
        };

        let sent = self
            .ws_sender
            .lock()
            .await
            .send(Message::Binary(bytes.into()))
            .await;
        if let Err(e) = sent {
            tracing::warn!(request_id, err = %e, "request send failed");
            self.connected.store(false, Ordering::Relaxed);
            return Err(AttemptError::Closed);
        }

        match tokio::time::timeout(self.options.request_timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(AttemptError::Closed),
            Err(_) => Err(AttemptError::TimedOut),
        }
    }
}

impl Drop for RemoteStore {
    fn drop(&mut self) {
        self.reader_handle.abort();
    }
}

/// Removes a request's waiter from the pending map on drop, whether the
/// attempt finished, timed out, or was cancelled.
struct PendingGuard<'a> {
    pending: &'a Pending,
    request_id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.request_id);
    }
}

/// Why a single request attempt produced no reply.
enum AttemptError {
    TimedOut,
    Closed,
}

fn unexpected(reply: &StoreReply) -> StoreError {
    tracing::warn!(?reply, "unexpected reply type from server");
    StoreError::Unavailable("unexpected reply from server".to_string())
}

impl TaskStore for RemoteStore {
    async fn list(&self, owner: &Identity, filter: Filter) -> Result<Vec<Task>, StoreError> {
        match self.request(owner, StoreRequest::List { filter }).await? {
            StoreReply::Tasks(tasks) => Ok(tasks),
            other => Err(unexpected(&other)),
        }
    }

    async fn create(&self, owner: &Identity, text: &str) -> Result<Task, StoreError> {
        let request = StoreRequest::Create {
            text: text.to_string(),
        };
        match self.request(owner, request).await? {
            StoreReply::Task(task) => Ok(task),
            other => Err(unexpected(&other)),
        }
    }

    async fn update(
        &self,
        owner: &Identity,
        id: TaskId,
        patch: TaskPatch,
    ) -> Result<Task, StoreError> {
        match self.request(owner, StoreRequest::Update { id, patch }).await? {
            StoreReply::Task(task) => Ok(task),
            other => Err(unexpected(&other)),
        }
    }

    async fn delete(&self, owner: &Identity, id: TaskId) -> Result<(), StoreError> {
        match self.request(owner, StoreRequest::Delete { id }).await? {
            StoreReply::Done => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    async fn delete_completed(&self, owner: &Identity) -> Result<(), StoreError> {
        match self.request(owner, StoreRequest::DeleteCompleted).await? {
            StoreReply::Done => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    async fn set_all_completed(&self, owner: &Identity, completed: bool) -> Result<(), StoreError> {
        match self
            .request(owner, StoreRequest::SetAllCompleted { completed })
            .await?
        {
            StoreReply::Done => Ok(()),
            other => Err(unexpected(&other)),
        }
    }
}

/// Background task that reads server frames and completes pending requests.
///
/// Malformed frames are logged and skipped. When the connection ends, every
/// pending request is dropped so its caller sees the connection as closed.
async fn reader_loop(mut ws_reader: WsReader, pending: Pending, connected: Arc<AtomicBool>) {
    while let Some(msg_result) = ws_reader.next().await {
        match msg_result {
            Ok(Message::Binary(data)) => match wire::decode_server(&data) {
                Ok(ServerMessage::Response { request_id, result }) => {
                    let waiter = pending.lock().remove(&request_id);
                    match waiter {
                        Some(tx) => {
                            let _ = tx.send(result);
                        }
                        None => {
                            tracing::debug!(request_id, "response for abandoned request");
                        }
                    }
                }
                Ok(ServerMessage::Error { reason }) => {
                    tracing::warn!(reason = %reason, "server error");
                }
                Ok(other) => {
                    tracing::debug!(?other, "unexpected server message");
                }
                Err(e) => {
                    tracing::warn!(err = %e, "malformed server frame, skipping");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!("server closed the connection");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(err = %e, "WebSocket read error");
                break;
            }
        }
    }
    connected.store(false, Ordering::Relaxed);
    pending.lock().clear();
    tracing::info!("server reader task exiting");
}
