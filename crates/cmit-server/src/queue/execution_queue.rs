use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{json, Value};

use cmit_core::error::{CmitError, Result};
use cmit_core::protocol::Request;

/// Lifecycle of one accepted EXECUTE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Pending,
    Running,
    Done,
}

impl EntryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Running => "running",
            EntryStatus::Done => "done",
        }
    }
}

/// One queued unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub id: String,
    pub topic: String,
    pub status: EntryStatus,
    /// Request payload, kept for the worker that performs the job.
    pub payload: Option<Value>,
    /// Request timestamp.
    pub enqueued_at: String,
}

impl QueueEntry {
    /// Pending entry keyed by a stamped request's id.
    pub fn pending(req: &Request) -> Self {
        Self {
            id: req.id().to_string(),
            topic: req.topic().to_string(),
            status: EntryStatus::Pending,
            payload: req.payload().cloned(),
            enqueued_at: req.envelope.timestamp.clone().unwrap_or_default(),
        }
    }

    /// Compact form reported by POLL.
    pub fn summary(&self) -> Value {
        json!({
            "id": self.id,
            "topic": self.topic,
            "status": self.status.as_str(),
        })
    }
}

/// Outcome of [`ExecutionQueue::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// New entry appended; `depth` is the queue length after the append.
    Added { depth: usize },
    /// An entry with this id was already queued; nothing changed.
    Existing { status: EntryStatus, depth: usize },
}

/// Insertion-ordered, lock-guarded queue handle.
///
/// Every operation takes the lock exactly once, so each one is atomic with
/// respect to the others. The guard never escapes a method, which keeps it
/// from being held across an `.await` in callers.
#[derive(Debug, Clone, Default)]
pub struct ExecutionQueue {
    inner: Arc<Mutex<VecDeque<QueueEntry>>>,
}

impl ExecutionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    // Entries are built before locking; a poisoned queue still holds whole entries.
    fn lock(&self) -> MutexGuard<'_, VecDeque<QueueEntry>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue(&self, entry: QueueEntry) -> Enqueued {
        let mut q = self.lock();
        if let Some(existing) = q.iter().find(|e| e.id == entry.id) {
            return Enqueued::Existing {
                status: existing.status,
                depth: q.len(),
            };
        }
        q.push_back(entry);
        Enqueued::Added { depth: q.len() }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of entries routed to `topic`.
    pub fn topic_len(&self, topic: &str) -> usize {
        self.lock().iter().filter(|e| e.topic == topic).count()
    }

    /// Copy of all entries in queue order.
    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.lock().iter().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<QueueEntry> {
        self.lock().iter().find(|e| e.id == id).cloned()
    }

    pub fn set_status(&self, id: &str, status: EntryStatus) -> Result<()> {
        let mut q = self.lock();
        let entry = q
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| CmitError::NotFound(format!("queue entry {id}")))?;
        entry.status = status;
        Ok(())
    }

    /// Remove an entry; an unknown id is a no-op reported as `NotFound`.
    pub fn remove(&self, id: &str) -> Result<QueueEntry> {
        let mut q = self.lock();
        let pos = q
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| CmitError::NotFound(format!("queue entry {id}")))?;
        q.remove(pos)
            .ok_or_else(|| CmitError::Internal(format!("queue entry {id} vanished")))
    }
}
