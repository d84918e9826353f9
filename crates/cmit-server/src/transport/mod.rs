//! Socket transport.
//!
//! - `listener`: bind the unix socket, accept, shut down
//! - `session`: per-connection frame loop
//! - `client`: async client used by tools and tests

pub mod client;
mod errors;
pub mod listener;
pub mod session;

pub use client::Client;
pub use errors::ListenerError;
pub use listener::{Server, ServerHandle};
pub use session::Session;
