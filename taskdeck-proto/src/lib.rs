//! Shared definitions for `taskdeck`: the task model, the store contract
//! every backend implements, and the WebSocket wire format.

pub mod store;
pub mod table;
pub mod task;
pub mod wire;
