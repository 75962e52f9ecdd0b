//! Job storage trait and operation types.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

use super::types::{ConversionOptions, ErrorDetail, JobRecord, JobStatus};

/// Error type for job store operations.
#[derive(Debug, Error)]
pub enum JobError {
    /// Job not found.
    #[error("Job not found: {0}")]
    NotFound(String),

    /// The (source, target) pair is not in the format registry.
    /// Rejected at submission; no record is created.
    #[error("Unsupported conversion: {source_format} -> {target_format}")]
    UnsupportedFormat {
        source_format: String,
        target_format: String,
    },

    /// Compare-and-set guard tripped: the record is not in the expected
    /// state. Expected when workers race on duplicate deliveries.
    #[error("Invalid transition for job {job_id}: {current} -> {requested}")]
    InvalidTransition {
        job_id: String,
        current: JobStatus,
        requested: JobStatus,
    },

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

/// Request to create a new job. Validated against the registry by `create`.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub source_format: String,
    pub target_format: String,
    pub original_name: String,
    pub options: ConversionOptions,
    /// Already-materialized input file location.
    pub input_path: PathBuf,
}

/// Payload carried by a status transition.
///
/// `transition` enforces the pairing: `Succeeded` requires a result
/// reference, `Failed` requires an error detail, everything else carries
/// nothing. This keeps readers from ever observing a succeeded record
/// without its result.
#[derive(Debug, Clone)]
pub enum TransitionPayload {
    None,
    ResultRef(String),
    Error(ErrorDetail),
}

/// A job removed from active retention by the sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweptJob {
    pub job_id: String,
    /// Result reference that was attached, for artifact deletion.
    pub result_ref: Option<String>,
    /// Input spool file, in case the worker never cleaned it up.
    pub input_path: PathBuf,
}

/// Trait for job storage backends.
///
/// Implementations must make `transition` atomic with respect to concurrent
/// readers and other transitions on the same record.
pub trait JobStore: Send + Sync {
    /// Allocate an id and insert a `pending` record. Fails with
    /// `UnsupportedFormat` (and inserts nothing) for pairs the registry
    /// rejects.
    fn create(&self, new_job: NewJob) -> Result<JobRecord, JobError>;

    /// Fetch a job by id.
    fn get(&self, id: &str) -> Result<Option<JobRecord>, JobError>;

    /// Atomic compare-and-set status transition.
    ///
    /// Fails with `InvalidTransition` when the current status differs from
    /// `from`, or when (from, to) is not in the transition table.
    fn transition(
        &self,
        id: &str,
        from: JobStatus,
        to: JobStatus,
        payload: TransitionPayload,
    ) -> Result<JobRecord, JobError>;

    /// Mark terminal jobs completed before `cutoff` as expired, clearing
    /// their result references. Returns what was swept so the caller can
    /// delete artifacts.
    fn sweep_expired(&self, cutoff: DateTime<Utc>) -> Result<Vec<SweptJob>, JobError>;

    /// Jobs sitting in `status` with no update since `older_than`.
    /// Used by the recovery sweep for abandoned `running` claims and for
    /// re-enqueueing `pending` jobs whose queue delivery was lost.
    fn list_stalled(
        &self,
        status: JobStatus,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<JobRecord>, JobError>;

    /// Number of jobs currently in `status`.
    fn count(&self, status: JobStatus) -> Result<i64, JobError>;
}
