//! Job submission: create a record, hand it to the queue.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, warn};

use crate::job::{ErrorCategory, ErrorDetail, JobError, JobRecord, JobStatus, JobStore, NewJob,
    TransitionPayload};
use crate::queue::{JobQueue, QueueError, WorkUnit};

/// Errors surfaced to the submission path.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Job(#[from] JobError),

    /// The queue rejected the unit. The job record has already been marked
    /// failed by the time this is returned.
    #[error("Failed to enqueue job {job_id}: {reason}")]
    Enqueue { job_id: String, reason: String },
}

/// Hands accepted jobs to the broker queue for asynchronous execution.
pub struct Dispatcher {
    job_store: Arc<dyn JobStore>,
    queue: Arc<dyn JobQueue>,
}

impl Dispatcher {
    pub fn new(job_store: Arc<dyn JobStore>, queue: Arc<dyn JobQueue>) -> Self {
        Self { job_store, queue }
    }

    /// Confirm broker connectivity before accepting submissions.
    /// Called once at startup; a failure here is fatal.
    pub async fn ensure_ready(&self) -> Result<(), QueueError> {
        self.queue.ready().await
    }

    /// Validate, persist and enqueue a new job.
    ///
    /// Create and enqueue form one logical operation: if the enqueue
    /// fails, the job is marked `failed` instead of sitting `pending`
    /// forever with nothing to pick it up.
    pub async fn submit(&self, new_job: NewJob) -> Result<JobRecord, DispatchError> {
        let record = self.job_store.create(new_job)?;

        let unit = WorkUnit::from(&record);
        match self.queue.enqueue(unit).await {
            Ok(()) => {
                crate::metrics::JOBS_SUBMITTED.inc();
                Ok(record)
            }
            Err(e) => {
                error!("Enqueue failed for job {}: {}", record.id, e);
                crate::metrics::ENQUEUE_FAILURES.inc();
                let detail = ErrorDetail::new(
                    ErrorCategory::QueueUnavailable,
                    format!("could not enqueue conversion: {}", e),
                );
                if let Err(mark_err) = self.job_store.transition(
                    &record.id,
                    JobStatus::Pending,
                    JobStatus::Failed,
                    TransitionPayload::Error(detail),
                ) {
                    error!(
                        "Failed to mark job {} failed after enqueue error: {}",
                        record.id, mark_err
                    );
                }
                Err(DispatchError::Enqueue {
                    job_id: record.id,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Re-enqueue an existing pending job, rebuilding its work unit from
    /// the record. Used by the recovery sweep; duplicates are absorbed by
    /// the claim guard.
    pub async fn requeue(&self, record: &JobRecord) -> Result<(), QueueError> {
        if record.status != JobStatus::Pending {
            warn!(
                "Refusing to requeue job {} in status {}",
                record.id, record.status
            );
            return Ok(());
        }
        self.queue.enqueue(WorkUnit::from(record)).await
    }
}
