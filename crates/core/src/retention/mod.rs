//! Retention sweep and liveness recovery.
//!
//! A single background task periodically:
//! - expires terminal jobs past the retention window and deletes their
//!   artifacts and leftover inputs,
//! - returns `running` jobs with no recent update to `pending` and puts
//!   them back on the queue (their worker died mid-conversion),
//! - re-enqueues `pending` jobs that have waited past the liveness
//!   timeout, in case their queue delivery was lost.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use crate::dispatch::Dispatcher;
use crate::job::{JobError, JobStatus, JobStore, TransitionPayload};
use crate::metrics;
use crate::result_store::ResultStore;

/// Configuration for the retention sweeper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// How long results are kept after the job completes, in hours.
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,

    /// Interval between sweep passes, in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// A `running` job with no update for this long is presumed
    /// abandoned and recovered. Must comfortably exceed the conversion
    /// timeout so live jobs are never recovered out from under a worker.
    #[serde(default = "default_liveness_timeout")]
    pub liveness_timeout_secs: u64,
}

fn default_retention_hours() -> u64 {
    24
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_liveness_timeout() -> u64 {
    900
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            retention_hours: default_retention_hours(),
            sweep_interval_secs: default_sweep_interval(),
            liveness_timeout_secs: default_liveness_timeout(),
        }
    }
}

/// Background sweeper enforcing the retention window and recovering
/// abandoned jobs.
pub struct RetentionSweeper {
    config: RetentionConfig,
    job_store: Arc<dyn JobStore>,
    result_store: Arc<dyn ResultStore>,
    dispatcher: Arc<Dispatcher>,

    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl RetentionSweeper {
    pub fn new(
        config: RetentionConfig,
        job_store: Arc<dyn JobStore>,
        result_store: Arc<dyn ResultStore>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            job_store,
            result_store,
            dispatcher,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Start the sweep loop. The first pass runs immediately so a
    /// restarted service recovers abandoned jobs without waiting a full
    /// interval.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Retention sweeper already running");
            return;
        }

        info!(
            "Starting retention sweeper (retention {}h, interval {}s)",
            self.config.retention_hours, self.config.sweep_interval_secs
        );

        let sweeper = Arc::clone(self);
        let running = Arc::clone(&self.running);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            sweeper.run_once(Utc::now()).await;
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("Retention sweeper received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_secs(sweeper.config.sweep_interval_secs)) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        sweeper.run_once(Utc::now()).await;
                    }
                }
            }
            debug!("Retention sweeper stopped");
        });
    }

    /// Stop the sweep loop.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Stopping retention sweeper");
        let _ = self.shutdown_tx.send(());
    }

    /// One full pass, evaluated at `now`. Public so startup and tests can
    /// drive it directly.
    pub async fn run_once(&self, now: DateTime<Utc>) {
        self.expire_old_jobs(now).await;
        self.recover_stalled_running(now).await;
        self.replay_stale_pending(now).await;
    }

    async fn expire_old_jobs(&self, now: DateTime<Utc>) {
        let cutoff = now - ChronoDuration::hours(self.config.retention_hours as i64);
        let swept = match self.job_store.sweep_expired(cutoff) {
            Ok(swept) => swept,
            Err(e) => {
                error!("Retention sweep failed: {}", e);
                return;
            }
        };
        if swept.is_empty() {
            return;
        }

        info!("Expiring {} jobs past retention", swept.len());
        for job in swept {
            metrics::JOBS_EXPIRED.inc();
            if let Some(ref result_ref) = job.result_ref {
                match self.result_store.delete(result_ref).await {
                    Ok(()) => metrics::ARTIFACTS_DELETED.inc(),
                    Err(e) => {
                        // The record is already expired; a leaked artifact
                        // is retried implicitly on the next delete call.
                        warn!("Could not delete artifact {}: {}", result_ref, e);
                    }
                }
            }
            // Inputs are normally removed by the worker; failed dispatches
            // and crashes can leave them behind.
            if let Err(e) = tokio::fs::remove_file(&job.input_path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    debug!("Could not remove input {:?}: {}", job.input_path, e);
                }
            }
        }
    }

    async fn recover_stalled_running(&self, now: DateTime<Utc>) {
        let older_than = now - ChronoDuration::seconds(self.config.liveness_timeout_secs as i64);
        let stalled = match self.job_store.list_stalled(JobStatus::Running, older_than) {
            Ok(stalled) => stalled,
            Err(e) => {
                error!("Could not list stalled running jobs: {}", e);
                return;
            }
        };

        for job in stalled {
            match self.job_store.transition(
                &job.id,
                JobStatus::Running,
                JobStatus::Pending,
                TransitionPayload::None,
            ) {
                Ok(recovered) => {
                    warn!(
                        "Recovered abandoned job {} (running since {:?})",
                        recovered.id, job.started_at
                    );
                    metrics::JOBS_RECOVERED.inc();
                    if let Err(e) = self.dispatcher.requeue(&recovered).await {
                        // Left pending; the next pass picks it up again.
                        error!("Could not re-enqueue recovered job {}: {}", recovered.id, e);
                    }
                }
                Err(JobError::InvalidTransition { .. }) => {
                    // The worker finished between listing and recovery.
                    debug!("Job {} completed before recovery", job.id);
                }
                Err(e) => error!("Could not recover job {}: {}", job.id, e),
            }
        }
    }

    async fn replay_stale_pending(&self, now: DateTime<Utc>) {
        let older_than = now - ChronoDuration::seconds(self.config.liveness_timeout_secs as i64);
        let stale = match self.job_store.list_stalled(JobStatus::Pending, older_than) {
            Ok(stale) => stale,
            Err(e) => {
                error!("Could not list stale pending jobs: {}", e);
                return;
            }
        };

        for job in stale {
            debug!("Re-enqueueing stale pending job {}", job.id);
            // Duplicate deliveries are absorbed by the claim transition.
            if let Err(e) = self.dispatcher.requeue(&job).await {
                error!("Could not re-enqueue pending job {}: {}", job.id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{ConversionOptions, NewJob, SqliteJobStore};
    use crate::queue::{JobQueue, MemoryQueue};
    use crate::result_store::FsResultStore;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Harness {
        sweeper: RetentionSweeper,
        job_store: Arc<dyn JobStore>,
        result_store: Arc<dyn ResultStore>,
        queue: Arc<MemoryQueue>,
        _dir: TempDir,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let job_store: Arc<dyn JobStore> = Arc::new(SqliteJobStore::in_memory().unwrap());
        let result_store: Arc<dyn ResultStore> =
            Arc::new(FsResultStore::new(dir.path().join("results")).unwrap());
        let queue = Arc::new(MemoryQueue::new());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&job_store),
            Arc::clone(&queue) as Arc<dyn JobQueue>,
        ));
        let sweeper = RetentionSweeper::new(
            RetentionConfig::default(),
            Arc::clone(&job_store),
            Arc::clone(&result_store),
            dispatcher,
        );
        Harness {
            sweeper,
            job_store,
            result_store,
            queue,
            _dir: dir,
        }
    }

    fn create_job(h: &Harness) -> crate::job::JobRecord {
        h.job_store
            .create(NewJob {
                source_format: "png".to_string(),
                target_format: "jpeg".to_string(),
                original_name: "photo.png".to_string(),
                options: ConversionOptions::default(),
                input_path: PathBuf::from("/tmp/none.png"),
            })
            .unwrap()
    }

    async fn complete_job(h: &Harness, id: &str) -> String {
        h.job_store
            .transition(id, JobStatus::Pending, JobStatus::Running, TransitionPayload::None)
            .unwrap();
        let result_ref = h.result_store.put(id, "jpeg", b"out").await.unwrap();
        h.job_store
            .transition(
                id,
                JobStatus::Running,
                JobStatus::Succeeded,
                TransitionPayload::ResultRef(result_ref.clone()),
            )
            .unwrap();
        result_ref
    }

    #[tokio::test]
    async fn test_expires_old_jobs_and_deletes_artifacts() {
        let h = harness();
        let record = create_job(&h);
        let result_ref = complete_job(&h, &record.id).await;

        // Evaluate the sweep from far in the future: everything is old.
        let future = Utc::now() + ChronoDuration::hours(48);
        h.sweeper.run_once(future).await;

        let updated = h.job_store.get(&record.id).unwrap().unwrap();
        assert_eq!(updated.status, JobStatus::Expired);
        assert!(updated.result_ref.is_none());
        assert!(h.result_store.open(&result_ref).await.is_err());
    }

    #[tokio::test]
    async fn test_fresh_jobs_not_expired() {
        let h = harness();
        let record = create_job(&h);
        complete_job(&h, &record.id).await;

        h.sweeper.run_once(Utc::now()).await;

        let updated = h.job_store.get(&record.id).unwrap().unwrap();
        assert_eq!(updated.status, JobStatus::Succeeded);
        assert!(updated.result_ref.is_some());
    }

    #[tokio::test]
    async fn test_recovers_stalled_running_job() {
        let h = harness();
        let record = create_job(&h);
        h.job_store
            .transition(
                &record.id,
                JobStatus::Pending,
                JobStatus::Running,
                TransitionPayload::None,
            )
            .unwrap();

        // From the future, the claim has been silent past the timeout
        // (but the job is not terminal, so retention leaves it alone).
        let future = Utc::now() + ChronoDuration::hours(1);
        h.sweeper.run_once(future).await;

        let updated = h.job_store.get(&record.id).unwrap().unwrap();
        assert_eq!(updated.status, JobStatus::Pending);
        assert!(updated.started_at.is_none());

        // And it is back on the queue.
        let unit = h.queue.dequeue().await.unwrap();
        assert_eq!(unit.job_id, record.id);
    }

    #[tokio::test]
    async fn test_replays_stale_pending_job() {
        let h = harness();
        let record = create_job(&h);

        let future = Utc::now() + ChronoDuration::hours(1);
        h.sweeper.run_once(future).await;

        // Still pending, but a fresh delivery is on the queue.
        let updated = h.job_store.get(&record.id).unwrap().unwrap();
        assert_eq!(updated.status, JobStatus::Pending);
        let unit = h.queue.dequeue().await.unwrap();
        assert_eq!(unit.job_id, record.id);
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let h = harness();
        let record = create_job(&h);
        complete_job(&h, &record.id).await;

        let future = Utc::now() + ChronoDuration::hours(48);
        h.sweeper.run_once(future).await;
        h.sweeper.run_once(future).await;

        let updated = h.job_store.get(&record.id).unwrap().unwrap();
        assert_eq!(updated.status, JobStatus::Expired);
    }
}
