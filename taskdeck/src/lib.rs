//! `taskdeck`: multi-user to-do list client library.
//!
//! The [`tasks`] module holds the pure reducer, derived views, and the
//! [`tasks::TaskSession`] that keeps local state in step with a
//! [`taskdeck_proto::store::TaskStore`]. The [`store`] module provides the
//! local-file and WebSocket backends.

pub mod cli;
pub mod config;
pub mod gate;
pub mod store;
pub mod tasks;
