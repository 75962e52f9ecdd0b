//! In-process queue backed by a tokio channel.

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use super::types::WorkUnit;
use super::{JobQueue, QueueError};

/// Channel-backed queue for single-process deployments and tests.
///
/// Delivery within the process is effectively exactly-once, but consumers
/// must not rely on that: messages are lost on restart and recovery
/// re-enqueues them, so duplicates still occur across the system.
pub struct MemoryQueue {
    tx: mpsc::UnboundedSender<WorkUnit>,
    rx: Mutex<mpsc::UnboundedReceiver<WorkUnit>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn ready(&self) -> Result<(), QueueError> {
        if self.tx.is_closed() {
            return Err(QueueError::Closed);
        }
        Ok(())
    }

    async fn enqueue(&self, unit: WorkUnit) -> Result<(), QueueError> {
        self.tx.send(unit).map_err(|_| QueueError::Closed)
    }

    async fn dequeue(&self) -> Option<WorkUnit> {
        // One consumer holds the receiver at a time; workers take turns.
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::ConversionOptions;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn test_unit(job_id: &str) -> WorkUnit {
        WorkUnit {
            job_id: job_id.to_string(),
            source_format: "flac".to_string(),
            target_format: "mp3".to_string(),
            options: ConversionOptions::default(),
            input_path: PathBuf::from("/tmp/in.flac"),
        }
    }

    #[tokio::test]
    async fn test_enqueue_dequeue_fifo() {
        let queue = MemoryQueue::new();
        queue.enqueue(test_unit("a")).await.unwrap();
        queue.enqueue(test_unit("b")).await.unwrap();

        assert_eq!(queue.dequeue().await.unwrap().job_id, "a");
        assert_eq!(queue.dequeue().await.unwrap().job_id, "b");
    }

    #[tokio::test]
    async fn test_ready() {
        let queue = MemoryQueue::new();
        queue.ready().await.unwrap();
    }

    #[tokio::test]
    async fn test_each_unit_delivered_to_one_consumer() {
        let queue = Arc::new(MemoryQueue::new());
        for i in 0..10 {
            queue.enqueue(test_unit(&format!("job-{}", i))).await.unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Ok(Some(unit)) =
                    tokio::time::timeout(std::time::Duration::from_millis(100), queue.dequeue())
                        .await
                {
                    seen.push(unit.job_id);
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 10);
    }
}
