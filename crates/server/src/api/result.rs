//! Result artifact download.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::error;

use convertifile_core::job::JobStatus;
use convertifile_core::ResultStoreError;

use super::ApiError;
use crate::state::AppState;

/// GET /api/v1/result/{id}
///
/// Streams the stored artifact. Only succeeded jobs have one; anything
/// else, including an expired job, answers 404.
pub async fn download_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let record = match state.job_store().get(&id) {
        Ok(Some(record)) => record,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                ApiError::json(format!("no job with id {}", id)),
            )
                .into_response()
        }
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::json(e.to_string()),
            )
                .into_response()
        }
    };

    // Unlike the status route, expiry is not distinguished here: a swept
    // result downloads the same as a missing one.
    if record.status == JobStatus::Expired {
        return (
            StatusCode::NOT_FOUND,
            ApiError::json("result not found or expired"),
        )
            .into_response();
    }

    let Some(result_ref) = record.result_ref.as_deref() else {
        return (
            StatusCode::NOT_FOUND,
            ApiError::json(format!(
                "job {} has no result (status: {})",
                id, record.status
            )),
        )
            .into_response();
    };

    let store = state.result_store();
    let (file, len) = match (store.open(result_ref).await, store.len(result_ref).await) {
        (Ok(file), Ok(len)) => (file, len),
        (Err(ResultStoreError::NotFound(_)), _) | (_, Err(ResultStoreError::NotFound(_))) => {
            return (
                StatusCode::NOT_FOUND,
                ApiError::json("result artifact is missing"),
            )
                .into_response()
        }
        (Err(e), _) | (_, Err(e)) => {
            error!("Could not open result for job {}: {}", id, e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::json("could not read result artifact"),
            )
                .into_response();
        }
    };

    let mut headers = HeaderMap::new();
    let mime = mime_guess::from_ext(&record.target_format).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    let disposition = format!(
        "attachment; filename=\"{}\"",
        record.download_name().replace('"', "")
    );
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    let body = Body::from_stream(ReaderStream::new(file));
    (headers, body).into_response()
}
