//! Work queue seam between submission and execution.
//!
//! The queue decouples the request path from conversion execution. The
//! contract assumes at-least-once delivery; the job store's claim
//! transition deduplicates on the consumer side.

mod memory;
mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryQueue;
pub use types::WorkUnit;

/// Errors from queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue is closed and accepts no more work.
    #[error("Queue is closed")]
    Closed,

    /// The broker backing the queue is unreachable.
    #[error("Broker unavailable: {0}")]
    Unavailable(String),
}

/// Trait for broker queue backends.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Confirm the broker is reachable. Called once at startup so the
    /// service fails fast instead of silently dropping enqueues.
    async fn ready(&self) -> Result<(), QueueError>;

    /// Put a unit of work on the queue.
    async fn enqueue(&self, unit: WorkUnit) -> Result<(), QueueError>;

    /// Pull the next unit of work, waiting until one is available.
    /// Returns `None` when the queue has shut down.
    async fn dequeue(&self) -> Option<WorkUnit>;
}
