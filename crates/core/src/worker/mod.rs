//! Worker pool that executes conversion jobs.
//!
//! Workers pull units from the queue, claim the job with an atomic
//! `pending -> running` transition, run the converter, move the output
//! into the result store, and record the terminal state. Duplicate
//! deliveries lose the claim and are discarded; losing the terminal
//! compare-and-set means another worker finished the job and any output
//! written here is removed again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::converter::{ConversionRequest, ConverterSet};
use crate::job::{ErrorDetail, JobError, JobStatus, JobStore, TransitionPayload};
use crate::metrics;
use crate::queue::{JobQueue, WorkUnit};
use crate::registry;
use crate::result_store::{ResultStore, ResultStoreError};

/// Pool of conversion workers draining the job queue.
pub struct WorkerPool {
    worker_count: usize,
    job_store: Arc<dyn JobStore>,
    queue: Arc<dyn JobQueue>,
    result_store: Arc<dyn ResultStore>,
    converters: Arc<ConverterSet>,

    // Runtime state
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl WorkerPool {
    pub fn new(
        worker_count: usize,
        job_store: Arc<dyn JobStore>,
        queue: Arc<dyn JobQueue>,
        result_store: Arc<dyn ResultStore>,
        converters: Arc<ConverterSet>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            worker_count: worker_count.max(1),
            job_store,
            queue,
            result_store,
            converters,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Start the pool (spawns one task per worker).
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Worker pool already running");
            return;
        }

        info!("Starting {} conversion workers", self.worker_count);
        for worker_id in 0..self.worker_count {
            self.spawn_worker(worker_id);
        }
    }

    /// Stop the pool gracefully. In-flight conversions finish; idle
    /// workers exit on the shutdown signal.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Worker pool not running");
            return;
        }

        info!("Stopping worker pool");
        let _ = self.shutdown_tx.send(());
    }

    fn spawn_worker(&self, worker_id: usize) {
        let running = Arc::clone(&self.running);
        let job_store = Arc::clone(&self.job_store);
        let queue = Arc::clone(&self.queue);
        let result_store = Arc::clone(&self.result_store);
        let converters = Arc::clone(&self.converters);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            debug!("Worker {} started", worker_id);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("Worker {} received shutdown signal", worker_id);
                        break;
                    }
                    unit = queue.dequeue() => {
                        let Some(unit) = unit else {
                            debug!("Worker {}: queue closed", worker_id);
                            break;
                        };
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        Self::process_unit(
                            worker_id,
                            &job_store,
                            &result_store,
                            &converters,
                            unit,
                        ).await;
                    }
                }
            }
            debug!("Worker {} stopped", worker_id);
        });
    }

    /// Execute one unit of work end to end.
    async fn process_unit(
        worker_id: usize,
        job_store: &Arc<dyn JobStore>,
        result_store: &Arc<dyn ResultStore>,
        converters: &Arc<ConverterSet>,
        unit: WorkUnit,
    ) {
        // Claim the job. Losing here means a duplicate delivery or a job
        // already terminalized; either way the unit is dropped.
        match job_store.transition(
            &unit.job_id,
            JobStatus::Pending,
            JobStatus::Running,
            TransitionPayload::None,
        ) {
            Ok(_) => {}
            Err(JobError::InvalidTransition { current, .. }) => {
                debug!(
                    "Worker {}: job {} already {} - discarding duplicate delivery",
                    worker_id, unit.job_id, current
                );
                metrics::CLAIMS_LOST.inc();
                return;
            }
            Err(e) => {
                warn!("Worker {}: cannot claim job {}: {}", worker_id, unit.job_id, e);
                return;
            }
        }

        info!(
            "Worker {}: converting job {} ({} -> {})",
            worker_id, unit.job_id, unit.source_format, unit.target_format
        );
        metrics::JOBS_RUNNING.inc();
        let start = Instant::now();
        let outcome = Self::run_conversion(job_store, result_store, converters, &unit).await;
        metrics::JOBS_RUNNING.dec();

        let kind = registry::kind_of(&unit.source_format)
            .map(|k| k.as_str())
            .unwrap_or("unknown");
        metrics::CONVERSION_DURATION
            .with_label_values(&[kind])
            .observe(start.elapsed().as_secs_f64());

        match outcome {
            Outcome::Succeeded => {
                metrics::CONVERSIONS_TOTAL.with_label_values(&["success"]).inc();
                info!(
                    "Worker {}: job {} succeeded in {:.1}s",
                    worker_id,
                    unit.job_id,
                    start.elapsed().as_secs_f64()
                );
                Self::remove_input(&unit).await;
            }
            Outcome::Failed(detail) => {
                metrics::CONVERSIONS_TOTAL.with_label_values(&["failed"]).inc();
                metrics::CONVERSION_FAILURES
                    .with_label_values(&[detail.category.as_str()])
                    .inc();
                warn!(
                    "Worker {}: job {} failed ({}): {}",
                    worker_id,
                    unit.job_id,
                    detail.category.as_str(),
                    detail.message
                );
                if let Err(e) = job_store.transition(
                    &unit.job_id,
                    JobStatus::Running,
                    JobStatus::Failed,
                    TransitionPayload::Error(detail),
                ) {
                    warn!(
                        "Worker {}: could not record failure for job {}: {}",
                        worker_id, unit.job_id, e
                    );
                    return;
                }
                Self::remove_input(&unit).await;
            }
            Outcome::ClaimLost => {
                metrics::CLAIMS_LOST.inc();
                warn!(
                    "Worker {}: lost terminal claim on job {}, discarding output",
                    worker_id, unit.job_id
                );
            }
        }
    }

    /// Converts, stores the artifact and records success. Failure paths
    /// return the detail to record; the terminal-failed transition happens
    /// in the caller so claim losses are handled uniformly.
    async fn run_conversion(
        job_store: &Arc<dyn JobStore>,
        result_store: &Arc<dyn ResultStore>,
        converters: &Arc<ConverterSet>,
        unit: &WorkUnit,
    ) -> Outcome {
        let kind = match registry::kind_of(&unit.source_format) {
            Some(kind) => kind,
            None => {
                // Unreachable for records created through the registry check.
                return Outcome::Failed(ErrorDetail::new(
                    crate::job::ErrorCategory::UnsupportedCodec,
                    format!("unknown source format {}", unit.source_format),
                ));
            }
        };
        let converter = match converters.for_kind(kind) {
            Some(converter) => converter,
            None => {
                return Outcome::Failed(ErrorDetail::new(
                    crate::job::ErrorCategory::ToolCrash,
                    format!("no converter registered for {} files", kind),
                ));
            }
        };

        let request = ConversionRequest {
            job_id: unit.job_id.clone(),
            input_path: unit.input_path.clone(),
            source_format: unit.source_format.clone(),
            target_format: unit.target_format.clone(),
            options: unit.options.clone(),
        };

        let output_path = match converter.convert(&request).await {
            Ok(path) => path,
            Err(e) => {
                return Outcome::Failed(ErrorDetail::new(e.category(), e.to_string()));
            }
        };

        let result_ref = match result_store
            .put_file(&unit.job_id, &unit.target_format, &output_path)
            .await
        {
            Ok(result_ref) => result_ref,
            Err(ResultStoreError::AlreadyExists { .. }) => {
                // A previous run of this job wrote the artifact before its
                // worker died. Reuse it and drop the fresh copy.
                debug!("Job {}: artifact already stored, reusing", unit.job_id);
                if let Err(e) = tokio::fs::remove_file(&output_path).await {
                    debug!("Could not remove duplicate output {:?}: {}", output_path, e);
                }
                result_store.ref_for(&unit.job_id, &unit.target_format)
            }
            Err(e) => {
                error!("Job {}: could not store result: {}", unit.job_id, e);
                return Outcome::Failed(ErrorDetail::new(
                    crate::job::ErrorCategory::ToolCrash,
                    format!("could not store result: {}", e),
                ));
            }
        };

        match job_store.transition(
            &unit.job_id,
            JobStatus::Running,
            JobStatus::Succeeded,
            TransitionPayload::ResultRef(result_ref.clone()),
        ) {
            Ok(_) => Outcome::Succeeded,
            Err(JobError::InvalidTransition { .. }) => {
                // Another actor terminalized the job while we converted.
                // The artifact must not outlive the record's word on it.
                if let Err(e) = result_store.delete(&result_ref).await {
                    warn!("Job {}: could not remove orphan artifact: {}", unit.job_id, e);
                }
                Outcome::ClaimLost
            }
            Err(e) => {
                error!("Job {}: could not record success: {}", unit.job_id, e);
                Outcome::ClaimLost
            }
        }
    }

    /// Best-effort removal of the spooled input after a terminal outcome.
    /// The retention sweep cleans up anything left behind.
    async fn remove_input(unit: &WorkUnit) {
        if let Err(e) = tokio::fs::remove_file(&unit.input_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!("Could not remove input {:?}: {}", unit.input_path, e);
            }
        }
    }
}

enum Outcome {
    Succeeded,
    Failed(ErrorDetail),
    ClaimLost,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::ConverterError;
    use crate::job::{ConversionOptions, ErrorCategory, NewJob, SqliteJobStore};
    use crate::queue::MemoryQueue;
    use crate::result_store::FsResultStore;
    use crate::testing::MockConverter;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Harness {
        job_store: Arc<dyn JobStore>,
        result_store: Arc<dyn ResultStore>,
        converter: Arc<MockConverter>,
        converters: Arc<ConverterSet>,
        _dir: TempDir,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let job_store: Arc<dyn JobStore> = Arc::new(SqliteJobStore::in_memory().unwrap());
        let result_store: Arc<dyn ResultStore> =
            Arc::new(FsResultStore::new(dir.path().join("results")).unwrap());
        let converter = Arc::new(MockConverter::new(dir.path().join("scratch")));
        let mut set = ConverterSet::new();
        set.register(Arc::clone(&converter) as Arc<dyn crate::converter::FileConverter>);
        Harness {
            job_store,
            result_store,
            converter,
            converters: Arc::new(set),
            _dir: dir,
        }
    }

    async fn spool_input(h: &Harness, name: &str) -> PathBuf {
        let path = h._dir.path().join(name);
        tokio::fs::write(&path, b"input bytes").await.unwrap();
        path
    }

    fn create_job(h: &Harness, input_path: PathBuf) -> crate::job::JobRecord {
        h.job_store
            .create(NewJob {
                source_format: "png".to_string(),
                target_format: "jpeg".to_string(),
                original_name: "photo.png".to_string(),
                options: ConversionOptions::default(),
                input_path,
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_process_unit_success() {
        let h = harness();
        let input = spool_input(&h, "in.png").await;
        let record = create_job(&h, input.clone());
        let unit = WorkUnit::from(&record);

        WorkerPool::process_unit(0, &h.job_store, &h.result_store, &h.converters, unit).await;

        let updated = h.job_store.get(&record.id).unwrap().unwrap();
        assert_eq!(updated.status, JobStatus::Succeeded);
        let result_ref = updated.result_ref.unwrap();
        assert_eq!(h.result_store.len(&result_ref).await.unwrap(), 9);
        // Input spool file is cleaned up after the terminal outcome.
        assert!(!input.exists());
    }

    #[tokio::test]
    async fn test_process_unit_converter_failure() {
        let h = harness();
        let input = spool_input(&h, "in.png").await;
        let record = create_job(&h, input);
        h.converter
            .fail_next(ConverterError::Timeout { timeout_secs: 5 })
            .await;

        WorkerPool::process_unit(
            0,
            &h.job_store,
            &h.result_store,
            &h.converters,
            WorkUnit::from(&record),
        )
        .await;

        let updated = h.job_store.get(&record.id).unwrap().unwrap();
        assert_eq!(updated.status, JobStatus::Failed);
        let detail = updated.error.unwrap();
        assert_eq!(detail.category, ErrorCategory::Timeout);
        assert!(updated.result_ref.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_delivery_discarded() {
        let h = harness();
        let input = spool_input(&h, "in.png").await;
        let record = create_job(&h, input);
        let unit = WorkUnit::from(&record);

        WorkerPool::process_unit(0, &h.job_store, &h.result_store, &h.converters, unit.clone())
            .await;
        // Second delivery of the same unit: job is already terminal.
        WorkerPool::process_unit(1, &h.job_store, &h.result_store, &h.converters, unit).await;

        // Exactly one conversion ran.
        assert_eq!(h.converter.recorded_conversions().await.len(), 1);
        let updated = h.job_store.get(&record.id).unwrap().unwrap();
        assert_eq!(updated.status, JobStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_artifact_reused_after_recovered_rerun() {
        let h = harness();
        let input = spool_input(&h, "in.png").await;
        let record = create_job(&h, input.clone());

        // Simulate a previous run that stored the artifact but died before
        // the terminal transition and its input cleanup.
        h.result_store.put(&record.id, "jpeg", b"old").await.unwrap();

        WorkerPool::process_unit(
            0,
            &h.job_store,
            &h.result_store,
            &h.converters,
            WorkUnit::from(&record),
        )
        .await;

        let updated = h.job_store.get(&record.id).unwrap().unwrap();
        assert_eq!(updated.status, JobStatus::Succeeded);
        // The original artifact survives; at most one ever exists.
        assert_eq!(h.result_store.len(&updated.result_ref.unwrap()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_pool_drains_queue() {
        let h = harness();
        let queue: Arc<MemoryQueue> = Arc::new(MemoryQueue::new());

        let mut ids = Vec::new();
        for i in 0..5 {
            let input = spool_input(&h, &format!("in-{}.png", i)).await;
            let record = create_job(&h, input);
            queue.enqueue(WorkUnit::from(&record)).await.unwrap();
            ids.push(record.id);
        }

        let pool = WorkerPool::new(
            3,
            Arc::clone(&h.job_store),
            Arc::clone(&queue) as Arc<dyn JobQueue>,
            Arc::clone(&h.result_store),
            Arc::clone(&h.converters),
        );
        pool.start();

        // Wait for all jobs to reach a terminal state.
        for _ in 0..100 {
            let done = ids
                .iter()
                .all(|id| h.job_store.get(id).unwrap().unwrap().status.is_terminal());
            if done {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        pool.stop();

        for id in &ids {
            assert_eq!(
                h.job_store.get(id).unwrap().unwrap().status,
                JobStatus::Succeeded
            );
        }
    }
}
