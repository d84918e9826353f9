//! Dispatch registry and built-in handlers.
//!
//! Re-exports the registry and handler trait so integrators can add verbs
//! without touching the engine.

pub mod builtins;
pub mod registry;

pub use registry::{handler_fn, Handler, HandlerFn, Registry};
