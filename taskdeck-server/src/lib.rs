//! `taskdeck` server library.
//!
//! Exposes the task store server for use in tests and embedding. The server
//! accepts WebSocket connections, resolves each connection's token to an
//! identity, and answers identity-scoped store requests.

pub mod config;
pub mod gate;
pub mod repository;
pub mod server;
