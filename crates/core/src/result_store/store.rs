//! Result storage trait and error type.

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Opaque reference to a stored result artifact.
///
/// For the filesystem store this is the artifact's file name,
/// `{job_id}.{target_ext}` — derived deterministically from the job id so
/// names never collide across concurrent jobs.
pub type ResultRef = String;

/// Errors from result store operations.
#[derive(Debug, Error)]
pub enum ResultStoreError {
    /// A result was already stored for this job. At most one artifact may
    /// ever exist per job.
    #[error("Result already exists for job {job_id}")]
    AlreadyExists { job_id: String },

    /// No artifact under this reference, whether never stored or already
    /// swept. Expiry is the job record's call, not the store's.
    #[error("Result not found: {0}")]
    NotFound(String),

    /// The reference is malformed (path traversal, separators).
    #[error("Invalid result reference: {0}")]
    InvalidRef(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for result artifact storage backends.
///
/// Artifacts are written once by the worker that owns the job, served
/// read-only, and deleted only by the retention sweep.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// The reference an artifact for this job would be stored under.
    /// Deterministic, so a worker re-running a recovered job can find an
    /// artifact written before the crash.
    fn ref_for(&self, job_id: &str, target_format: &str) -> ResultRef;

    /// Store result bytes for a job. Fails with `AlreadyExists` if an
    /// artifact was already stored for this job.
    async fn put(
        &self,
        job_id: &str,
        target_format: &str,
        bytes: &[u8],
    ) -> Result<ResultRef, ResultStoreError>;

    /// Move an already-written file into the store. Same `AlreadyExists`
    /// guarantee as `put`; the source file is consumed on success.
    async fn put_file(
        &self,
        job_id: &str,
        target_format: &str,
        source: &Path,
    ) -> Result<ResultRef, ResultStoreError>;

    /// Open an artifact for streaming reads.
    async fn open(&self, result_ref: &str) -> Result<tokio::fs::File, ResultStoreError>;

    /// Size of an artifact in bytes.
    async fn len(&self, result_ref: &str) -> Result<u64, ResultStoreError>;

    /// Delete an artifact. Idempotent: deleting a missing artifact is a
    /// no-op. Only the retention sweep calls this.
    async fn delete(&self, result_ref: &str) -> Result<(), ResultStoreError>;
}
