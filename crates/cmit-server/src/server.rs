//! Server assembly: config + registry + queue -> bound [`Server`].

use std::sync::Arc;

use crate::app_state::ServerState;
use crate::config::ServerConfig;
use crate::dispatch::{Handler, Registry};
use crate::queue::ExecutionQueue;
use crate::transport::{ListenerError, Server};

/// Collects handlers before the socket is bound.
///
/// Starts with the built-in verbs; [`ServerBuilder::handler`] adds or
/// replaces verbs.
pub struct ServerBuilder {
    cfg: ServerConfig,
    registry: Registry,
    queue: ExecutionQueue,
}

impl ServerBuilder {
    pub fn new(cfg: ServerConfig) -> Self {
        Self {
            cfg,
            registry: Registry::with_builtins(),
            queue: ExecutionQueue::new(),
        }
    }

    pub fn handler(self, verb: impl Into<String>, handler: impl Handler + 'static) -> Self {
        self.registry.register(verb, Arc::new(handler));
        self
    }

    /// Use an existing queue, e.g. one drained by an external worker.
    pub fn queue(mut self, queue: ExecutionQueue) -> Self {
        self.queue = queue;
        self
    }

    /// Validate config and assemble the shared state without binding.
    pub fn build_state(self) -> Result<ServerState, ListenerError> {
        Ok(ServerState::new(self.cfg, self.registry, self.queue)?)
    }

    /// Validate config and bind the socket. Must run inside a tokio runtime.
    pub fn bind(self) -> Result<Server, ListenerError> {
        Server::bind(self.build_state()?)
    }
}
