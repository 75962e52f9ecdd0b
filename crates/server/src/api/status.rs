//! Job status polling.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use convertifile_core::job::{ErrorDetail, JobRecord, JobStatus};

use super::ApiError;
use crate::state::AppState;

/// Body of a status poll response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub task_id: String,
    pub status: JobStatus,
    pub source_format: String,
    pub target_format: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    /// Download filename, present once the job has succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

impl From<&JobRecord> for StatusResponse {
    fn from(record: &JobRecord) -> Self {
        let succeeded = record.status == JobStatus::Succeeded;
        let filename = succeeded.then(|| record.download_name());
        let download_url = succeeded.then(|| format!("/api/v1/result/{}", record.id));
        Self {
            task_id: record.id.clone(),
            status: record.status,
            source_format: record.source_format.clone(),
            target_format: record.target_format.clone(),
            created_at: record.created_at.to_rfc3339(),
            started_at: record.started_at.map(|t| t.to_rfc3339()),
            completed_at: record.completed_at.map(|t| t.to_rfc3339()),
            error: record.error.clone(),
            filename,
            download_url,
        }
    }
}

/// GET /api/v1/status/{id}
///
/// Expired jobs answer 410 so clients can distinguish "never existed" from
/// "existed but was swept".
pub async fn get_status(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.job_store().get(&id) {
        Ok(Some(record)) if record.status == JobStatus::Expired => (
            StatusCode::GONE,
            Json(StatusResponse::from(&record)),
        )
            .into_response(),
        Ok(Some(record)) => Json(StatusResponse::from(&record)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            ApiError::json(format!("no job with id {}", id)),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::json(e.to_string()),
        )
            .into_response(),
    }
}
