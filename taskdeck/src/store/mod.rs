//! [`TaskStore`](taskdeck_proto::store::TaskStore) backends for the client.
//!
//! - [`local::LocalStore`] keeps tasks in a snapshot file on this machine.
//! - [`remote::RemoteStore`] forwards every operation to a `taskdeck` server
//!   over WebSocket.

pub mod local;
pub mod remote;

pub use local::LocalStore;
pub use remote::{ConnectError, RemoteOptions, RemoteStore};
