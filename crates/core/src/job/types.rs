//! Core job data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lifecycle status of a conversion job.
///
/// Transitions are monotonic and enforced by [`JobStatus::can_transition`]
/// plus the store's compare-and-set. `running -> pending` is the single
/// backwards edge, reserved for liveness recovery of abandoned claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, waiting for a worker to claim it.
    Pending,
    /// Claimed by exactly one worker, conversion in progress.
    Running,
    /// Conversion finished, result artifact available.
    Succeeded,
    /// Conversion failed, error detail recorded. Terminal; retries are new jobs.
    Failed,
    /// Retention window elapsed, artifact swept. Tombstone state.
    Expired,
}

impl JobStatus {
    /// Stable lowercase name, matching the wire protocol.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Expired => "expired",
        }
    }

    /// Parses the stable name back into a status.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "succeeded" => Some(JobStatus::Succeeded),
            "failed" => Some(JobStatus::Failed),
            "expired" => Some(JobStatus::Expired),
            _ => None,
        }
    }

    /// Whether the job has reached an end state of execution.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Expired
        )
    }

    /// The allowed transition table. `pending -> failed` exists only for
    /// the dispatcher: an enqueue failure terminalizes the job instead of
    /// leaving it pending forever.
    pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
        matches!(
            (from, to),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Succeeded)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Pending)
                | (JobStatus::Succeeded, JobStatus::Expired)
                | (JobStatus::Failed, JobStatus::Expired)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a conversion failure, stable across the status API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    /// The input file could not be decoded.
    InputCorrupt,
    /// The external tool crashed or exited non-zero.
    ToolCrash,
    /// The conversion exceeded its time budget.
    Timeout,
    /// The tool does not support the requested codec/target.
    UnsupportedCodec,
    /// The work queue rejected the job at submission time.
    QueueUnavailable,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::InputCorrupt => "input-corrupt",
            ErrorCategory::ToolCrash => "tool-crash",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::UnsupportedCodec => "unsupported-codec",
            ErrorCategory::QueueUnavailable => "queue-unavailable",
        }
    }
}

/// Categorized error stored on a failed job and surfaced via polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub category: ErrorCategory,
    pub message: String,
}

impl ErrorDetail {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

/// Per-job conversion options, persisted as JSON on the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConversionOptions {
    /// Strip metadata (EXIF, tags) from the output.
    #[serde(default)]
    pub remove_metadata: bool,

    /// Quality level 1-100, mapped per-codec by the converter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,

    /// Explicit codec override (e.g. "libx265", "libopus").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,

    /// Target bitrate (e.g. "192k", "1M").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<String>,

    /// Prefer lossless encoding where the target format supports it.
    #[serde(default)]
    pub lossless: bool,
}

/// A persisted conversion job record.
///
/// Invariants maintained by the store:
/// - `result_ref` is `Some` iff status is `Succeeded`.
/// - `error` is `Some` iff status is `Failed`.
/// - `completed_at` is `Some` iff status is terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub source_format: String,
    pub target_format: String,
    /// Original upload filename, used to derive the download filename.
    pub original_name: String,
    pub options: ConversionOptions,
    /// Spooled input file location the worker reads from.
    pub input_path: PathBuf,
    pub status: JobStatus,
    pub error: Option<ErrorDetail>,
    pub result_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Filename presented to the client on download: original stem plus
    /// the target extension.
    pub fn download_name(&self) -> String {
        let stem = std::path::Path::new(&self.original_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.id);
        format!("{}.{}", stem, self.target_format)
    }
}
