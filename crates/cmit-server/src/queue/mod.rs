//! Execution queue shared by every session.
//!
//! EXECUTE appends, POLL reads, and the integrator's worker advances or
//! removes entries. The queue is process-wide but never ambient: it is owned
//! by the server state and handed to each handler as a cheap clone.

mod execution_queue;

pub use execution_queue::{Enqueued, EntryStatus, ExecutionQueue, QueueEntry};
