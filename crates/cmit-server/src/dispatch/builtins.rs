//! Built-in verbs.

use async_trait::async_trait;
use serde_json::{json, Value};

use cmit_core::error::Result;
use cmit_core::protocol::{Request, Response, Status};

use crate::queue::{Enqueued, ExecutionQueue, QueueEntry};

use super::registry::Handler;

pub const PING: &str = "PING";
pub const EXECUTE: &str = "EXECUTE";
pub const POLL: &str = "POLL";

/// Echoes the payload back untouched.
pub struct Ping;

#[async_trait]
impl Handler for Ping {
    async fn handle(&self, req: Request, _queue: ExecutionQueue) -> Result<Response> {
        let payload = req.envelope.payload.clone();
        Ok(Response::ok(&req, payload))
    }
}

/// Queues the request as a pending entry. The work itself happens elsewhere;
/// the entry is in the queue before the response leaves.
pub struct Execute;

#[async_trait]
impl Handler for Execute {
    async fn handle(&self, req: Request, queue: ExecutionQueue) -> Result<Response> {
        let payload = match queue.enqueue(QueueEntry::pending(&req)) {
            Enqueued::Added { depth } => json!({
                "status": "pending",
                "depth": depth,
            }),
            Enqueued::Existing { status, depth } => json!({
                "status": status.as_str(),
                "depth": depth,
                "duplicate": true,
            }),
        };
        Ok(Response::reply(&req, Status::OK, "Accepted", Some(payload)))
    }
}

/// Reports queue depth; with `{"id": ...}` in the payload also that entry.
pub struct Poll;

#[async_trait]
impl Handler for Poll {
    async fn handle(&self, req: Request, queue: ExecutionQueue) -> Result<Response> {
        // One snapshot so every reported number comes from the same instant.
        let entries = queue.snapshot();
        let topic_depth = entries.iter().filter(|e| e.topic == req.topic()).count();

        let mut payload = json!({
            "depth": entries.len(),
            "topic_depth": topic_depth,
        });

        let wanted = req
            .payload()
            .and_then(|p| p.get("id"))
            .and_then(Value::as_str);
        if let Some(id) = wanted {
            payload["entry"] = entries
                .iter()
                .find(|e| e.id == id)
                .map_or(Value::Null, |e| e.summary());
        }

        Ok(Response::ok(&req, Some(payload)))
    }
}
