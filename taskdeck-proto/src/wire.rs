//! WebSocket wire protocol between `taskdeck` clients and the server.
//!
//! Every frame is a postcard-encoded [`ClientMessage`] or [`ServerMessage`]
//! carried in a binary WebSocket message. A connection starts with
//! [`ClientMessage::Hello`]; once the server answers
//! [`ServerMessage::Welcome`], the client issues store requests tagged with a
//! request id and the server answers each with a matching
//! [`ServerMessage::Response`].

use serde::{Deserialize, Serialize};

use crate::store::StoreError;
use crate::task::{Filter, Identity, Task, TaskId, TaskPatch};

/// Errors encoding or decoding a frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[error("frame encode error: {0}")]
    Encode(String),
    /// The frame could not be decoded.
    #[error("frame decode error: {0}")]
    Decode(String),
}

/// A store operation sent by a client.
///
/// The acting identity is never part of the request: the server scopes every
/// request to the identity it resolved from the connection's token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreRequest {
    /// List the caller's tasks.
    List {
        /// Which tasks to return.
        filter: Filter,
    },
    /// Create a task from raw text.
    Create {
        /// Untrimmed text as entered.
        text: String,
    },
    /// Patch one task.
    Update {
        /// Target task.
        id: TaskId,
        /// Fields to change.
        patch: TaskPatch,
    },
    /// Delete one task.
    Delete {
        /// Target task.
        id: TaskId,
    },
    /// Delete every completed task.
    DeleteCompleted,
    /// Set `completed` on every task.
    SetAllCompleted {
        /// The value to set.
        completed: bool,
    },
}

impl StoreRequest {
    /// Returns `true` if repeating the request cannot change the outcome.
    ///
    /// Only [`StoreRequest::Create`] is not idempotent.
    #[must_use]
    pub const fn is_idempotent(&self) -> bool {
        !matches!(self, Self::Create { .. })
    }
}

/// Successful result of a [`StoreRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreReply {
    /// Result of [`StoreRequest::List`].
    Tasks(Vec<Task>),
    /// Result of [`StoreRequest::Create`] and [`StoreRequest::Update`].
    Task(Task),
    /// Result of the operations that return nothing.
    Done,
}

/// Messages sent from a client to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Opens a session. Must be the first frame on a connection.
    Hello {
        /// Bearer token issued by the identity provider.
        token: String,
    },
    /// A store operation.
    Request {
        /// Client-chosen id echoed in the response.
        request_id: u64,
        /// The operation.
        request: StoreRequest,
    },
}

/// Messages sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// The token was accepted.
    Welcome {
        /// Identity every request on this connection acts as.
        identity: Identity,
    },
    /// The token was refused. The server closes the connection.
    Rejected {
        /// Human-readable reason.
        reason: String,
    },
    /// Outcome of a store request.
    Response {
        /// The id from the matching [`ClientMessage::Request`].
        request_id: u64,
        /// The store's answer.
        result: Result<StoreReply, StoreError>,
    },
    /// A protocol-level problem not tied to a request.
    Error {
        /// Human-readable description.
        reason: String,
    },
}

/// Encodes a [`ClientMessage`] into bytes using postcard.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.
pub fn encode_client(msg: &ClientMessage) -> Result<Vec<u8>, ProtocolError> {
    postcard::to_allocvec(msg).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Decodes a [`ClientMessage`] from bytes using postcard.
///
/// # Errors
///
/// Returns [`ProtocolError::Decode`] if the bytes are not a valid message.
pub fn decode_client(bytes: &[u8]) -> Result<ClientMessage, ProtocolError> {
    postcard::from_bytes(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
}

/// Encodes a [`ServerMessage`] into bytes using postcard.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.
pub fn encode_server(msg: &ServerMessage) -> Result<Vec<u8>, ProtocolError> {
    postcard::to_allocvec(msg).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Decodes a [`ServerMessage`] from bytes using postcard.
///
/// # Errors
///
/// Returns [`ProtocolError::Decode`] if the bytes are not a valid message.
pub fn decode_server(bytes: &[u8]) -> Result<ServerMessage, ProtocolError> {
    postcard::from_bytes(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
}
