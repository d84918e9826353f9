//! Shared server state.
//!
//! Cloned into every session; all fields sit behind `Arc`s so a clone is a
//! handful of reference-count bumps.

use std::sync::Arc;

use cmit_core::error::Result;
use cmit_core::protocol::FrameDecoder;

use crate::config::ServerConfig;
use crate::dispatch::Registry;
use crate::obs::ServerMetrics;
use crate::queue::ExecutionQueue;

#[derive(Clone)]
pub struct ServerState {
    inner: Arc<ServerStateInner>,
    registry: Arc<Registry>,
    metrics: Arc<ServerMetrics>,
}

struct ServerStateInner {
    cfg: ServerConfig,
    queue: ExecutionQueue,
}

impl ServerState {
    /// Validates `cfg` before anything is shared.
    pub fn new(cfg: ServerConfig, registry: Registry, queue: ExecutionQueue) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            inner: Arc::new(ServerStateInner { cfg, queue }),
            registry: Arc::new(registry),
            metrics: Arc::new(ServerMetrics::default()),
        })
    }

    pub fn cfg(&self) -> &ServerConfig {
        &self.inner.cfg
    }

    pub fn queue(&self) -> &ExecutionQueue {
        &self.inner.queue
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    pub fn metrics(&self) -> Arc<ServerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Decoder sized from `server.max_frame_bytes`.
    pub fn decoder(&self) -> FrameDecoder {
        FrameDecoder::new(self.inner.cfg.server.max_frame_bytes)
    }
}
