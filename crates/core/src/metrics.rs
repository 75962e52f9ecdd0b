//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Submission (jobs accepted, enqueue failures)
//! - Workers (conversions by result, duration, claims lost)
//! - Retention (jobs expired, artifacts deleted, recoveries)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Submission Metrics
// =============================================================================

/// Jobs accepted and enqueued.
pub static JOBS_SUBMITTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "convertifile_jobs_submitted_total",
        "Total jobs accepted and enqueued",
    )
    .unwrap()
});

/// Submissions rejected before a record was created.
pub static SUBMISSIONS_REJECTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "convertifile_submissions_rejected_total",
            "Total submissions rejected",
        ),
        &["reason"], // "unsupported_format", "bad_request"
    )
    .unwrap()
});

/// Enqueue failures after the record was created.
pub static ENQUEUE_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "convertifile_enqueue_failures_total",
        "Total enqueue failures that terminalized a job",
    )
    .unwrap()
});

// =============================================================================
// Worker Metrics
// =============================================================================

/// Conversions total by result.
pub static CONVERSIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("convertifile_conversions_total", "Total file conversions"),
        &["result"], // "success", "failed"
    )
    .unwrap()
});

/// Conversion duration in seconds by format kind.
pub static CONVERSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "convertifile_conversion_duration_seconds",
            "Duration of file conversions",
        )
        .buckets(vec![0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        &["kind"], // "image", "audio", "video", "document"
    )
    .unwrap()
});

/// Failures by category.
pub static CONVERSION_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "convertifile_conversion_failures_total",
            "Total conversion failures",
        ),
        &["category"], // "input-corrupt", "tool-crash", "timeout", "unsupported-codec"
    )
    .unwrap()
});

/// Duplicate deliveries discarded by the claim guard.
pub static CLAIMS_LOST: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "convertifile_claims_lost_total",
        "Total work units discarded because another worker held the claim",
    )
    .unwrap()
});

/// Jobs currently executing across the pool.
pub static JOBS_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "convertifile_jobs_running",
        "Jobs currently being converted",
    )
    .unwrap()
});

// =============================================================================
// Retention Metrics
// =============================================================================

/// Jobs expired by the retention sweep.
pub static JOBS_EXPIRED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "convertifile_jobs_expired_total",
        "Total jobs expired by the retention sweep",
    )
    .unwrap()
});

/// Result artifacts deleted by the retention sweep.
pub static ARTIFACTS_DELETED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "convertifile_artifacts_deleted_total",
        "Total result artifacts deleted",
    )
    .unwrap()
});

/// Stalled running jobs returned to pending.
pub static JOBS_RECOVERED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "convertifile_jobs_recovered_total",
        "Total stalled jobs recovered to pending",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Submission
        Box::new(JOBS_SUBMITTED.clone()),
        Box::new(SUBMISSIONS_REJECTED.clone()),
        Box::new(ENQUEUE_FAILURES.clone()),
        // Workers
        Box::new(CONVERSIONS_TOTAL.clone()),
        Box::new(CONVERSION_DURATION.clone()),
        Box::new(CONVERSION_FAILURES.clone()),
        Box::new(CLAIMS_LOST.clone()),
        Box::new(JOBS_RUNNING.clone()),
        // Retention
        Box::new(JOBS_EXPIRED.clone()),
        Box::new(ARTIFACTS_DELETED.clone()),
        Box::new(JOBS_RECOVERED.clone()),
    ]
}
