//! CMIT server library.
//!
//! Wires the socket transport, the verb registry and the execution queue
//! into a server. Used by the `cmit-server` binary and integration tests.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod app_state;
pub mod config;
pub mod dispatch;
pub mod obs;
pub mod queue;
pub mod server;
pub mod transport;

pub use app_state::ServerState;
pub use config::{ServerConfig, SessionMode};
pub use dispatch::{handler_fn, Handler, Registry};
pub use queue::ExecutionQueue;
pub use server::ServerBuilder;
pub use transport::{Client, ListenerError, Server, ServerHandle};
