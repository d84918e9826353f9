use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::warn;

use cmit_core::error::{CmitError, Result};
use cmit_core::protocol::{Request, Response};

use crate::queue::ExecutionQueue;

use super::builtins::{Execute, Ping, Poll, EXECUTE, PING, POLL};

/// Produces the response for one verb.
///
/// An `Err` is turned into an error response correlated with the request, so
/// handlers may use `?` freely without tearing down the connection.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, req: Request, queue: ExecutionQueue) -> Result<Response>;
}

/// Adapter returned by [`handler_fn`].
pub struct HandlerFn<F> {
    f: F,
}

/// Wrap an async function `(Request, ExecutionQueue) -> Result<Response>`.
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Request, ExecutionQueue) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    HandlerFn { f }
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Request, ExecutionQueue) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    async fn handle(&self, req: Request, queue: ExecutionQueue) -> Result<Response> {
        (self.f)(req, queue).await
    }
}

/// Verb -> handler map. Matching is exact and case-sensitive; registering a
/// verb again replaces the previous handler.
#[derive(Default)]
pub struct Registry {
    handlers: DashMap<String, Arc<dyn Handler>>,
}

impl Registry {
    /// Registry without any verbs.
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }

    /// Registry with PING, EXECUTE and POLL.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(PING, Arc::new(Ping));
        registry.register(EXECUTE, Arc::new(Execute));
        registry.register(POLL, Arc::new(Poll));
        registry
    }

    /// Bind `verb` to `handler`, returning the handler it replaced.
    pub fn register(
        &self,
        verb: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Option<Arc<dyn Handler>> {
        self.handlers.insert(verb.into(), handler)
    }

    pub fn resolve(&self, verb: &str) -> Result<Arc<dyn Handler>> {
        self.handlers
            .get(verb)
            .map(|h| Arc::clone(h.value()))
            .ok_or_else(|| CmitError::UnknownVerb(verb.to_string()))
    }

    pub fn contains(&self, verb: &str) -> bool {
        self.handlers.contains_key(verb)
    }

    /// Registered verbs, sorted.
    pub fn verbs(&self) -> Vec<String> {
        let mut verbs: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        verbs.sort();
        verbs
    }

    /// Resolve and run the handler for a stamped request.
    ///
    /// Always yields a response: unknown verbs and handler errors become
    /// error responses, and the reply's id/topic are forced back to the
    /// request's if a handler changed them.
    pub async fn dispatch(&self, req: Request, queue: &ExecutionQueue) -> Response {
        let handler = match self.resolve(&req.verb) {
            Ok(h) => h,
            Err(err) => return Response::error_for(&req, &err),
        };

        let verb = req.verb.clone();
        let version = req.version.clone();
        let echo = req.envelope.reply();

        let mut resp = match handler.handle(req, queue.clone()).await {
            Ok(resp) => resp,
            Err(err) => {
                warn!(verb = %verb, id = %echo.id(), error = %err, "handler failed");
                return Response::error(Some(&version), Some(&echo), &err);
            }
        };

        if resp.envelope.id != echo.id || resp.envelope.topic != echo.topic {
            warn!(verb = %verb, id = %echo.id(), "handler reply lost correlation; restoring id/topic");
            resp.envelope.id = echo.id;
            resp.envelope.topic = echo.topic;
        }
        resp
    }
}
