//! Conversion submission: multipart upload, validation, dispatch.

use axum::extract::multipart::Multipart;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use convertifile_core::job::{ConversionOptions, NewJob};
use convertifile_core::metrics::SUBMISSIONS_REJECTED;
use convertifile_core::registry;
use convertifile_core::DispatchError;

use super::ApiError;
use crate::state::AppState;

/// Body of a 202 Accepted submission response.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub task_id: String,
    pub message: String,
}

/// Fields collected from the multipart form before dispatch.
#[derive(Default)]
struct SubmissionForm {
    original_name: Option<String>,
    spooled_path: Option<PathBuf>,
    target_format: Option<String>,
    options: ConversionOptions,
}

fn reject(reason: &'static str, status: StatusCode, message: impl Into<String>) -> Response {
    SUBMISSIONS_REJECTED.with_label_values(&[reason]).inc();
    (status, ApiError::json(message)).into_response()
}

/// POST /api/v1/convert
///
/// Accepts a multipart form with a `file` part and a `convert_to` field,
/// plus optional conversion options. The upload is spooled to the intake
/// directory before the job record exists, so a dispatch failure must clean
/// the spool file up.
pub async fn submit_conversion(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Response {
    let form = match read_form(&state, multipart).await {
        Ok(form) => form,
        Err(response) => return response,
    };

    let Some(spooled_path) = form.spooled_path else {
        return reject("missing-file", StatusCode::BAD_REQUEST, "missing file part");
    };
    let original_name = form.original_name.unwrap_or_default();

    let Some(target_format) = form.target_format else {
        remove_spool(&spooled_path).await;
        return reject(
            "missing-target",
            StatusCode::BAD_REQUEST,
            "missing convert_to field",
        );
    };

    let source_format = match Path::new(&original_name)
        .extension()
        .and_then(|e| e.to_str())
    {
        Some(ext) => registry::normalize(ext),
        None => {
            remove_spool(&spooled_path).await;
            return reject(
                "missing-extension",
                StatusCode::BAD_REQUEST,
                "uploaded filename has no extension to infer the source format from",
            );
        }
    };
    let target_format = registry::normalize(&target_format);

    if !registry::supported(&source_format, &target_format) {
        remove_spool(&spooled_path).await;
        return reject(
            "unsupported-pair",
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            format!(
                "conversion {} -> {} is not supported",
                source_format, target_format
            ),
        );
    }

    let new_job = NewJob {
        source_format,
        target_format,
        original_name,
        options: form.options,
        input_path: spooled_path.clone(),
    };

    match state.dispatcher().submit(new_job).await {
        Ok(record) => {
            info!(
                "Accepted job {}: {} -> {}",
                record.id, record.source_format, record.target_format
            );
            (
                StatusCode::ACCEPTED,
                Json(SubmitResponse {
                    task_id: record.id,
                    message: "conversion queued".to_string(),
                }),
            )
                .into_response()
        }
        Err(DispatchError::Enqueue { job_id, .. }) => {
            // The record is already marked failed; the spool file stays for
            // the retention sweep.
            warn!("Queue unavailable for job {}", job_id);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiError::json("conversion queue is unavailable, try again later"),
            )
                .into_response()
        }
        Err(DispatchError::Job(e)) => {
            remove_spool(&spooled_path).await;
            reject(
                "store-error",
                StatusCode::INTERNAL_SERVER_ERROR,
                e.to_string(),
            )
        }
    }
}

/// Drains the multipart stream, spooling the file part to the intake dir.
async fn read_form(state: &AppState, mut multipart: Multipart) -> Result<SubmissionForm, Response> {
    let mut form = SubmissionForm::default();

    while let Some(mut field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            ApiError::json(format!("malformed multipart body: {}", e)),
        )
            .into_response()
    })? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let original_name = field.file_name().unwrap_or_default().to_string();
                let ext = Path::new(&original_name)
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("bin");
                let spool_path = state
                    .intake_dir()
                    .join(format!("{}.{}", Uuid::new_v4(), ext));

                if let Err(response) = spool_field(&mut field, &spool_path).await {
                    remove_spool(&spool_path).await;
                    return Err(response);
                }
                form.original_name = Some(original_name);
                form.spooled_path = Some(spool_path);
            }
            "convert_to" => form.target_format = Some(text_field(field).await?),
            "remove_metadata" => {
                form.options.remove_metadata = text_field(field).await?.parse().unwrap_or(false)
            }
            "lossless" => form.options.lossless = text_field(field).await?.parse().unwrap_or(false),
            "quality" => {
                let raw = text_field(field).await?;
                match raw.parse::<u8>() {
                    Ok(q) if (1..=100).contains(&q) => form.options.quality = Some(q),
                    _ => {
                        if let Some(path) = &form.spooled_path {
                            remove_spool(path).await;
                        }
                        return Err(reject(
                            "invalid-quality",
                            StatusCode::BAD_REQUEST,
                            format!("quality must be an integer in 1..=100, got {:?}", raw),
                        ));
                    }
                }
            }
            "codec" => form.options.codec = Some(text_field(field).await?),
            "bitrate" => form.options.bitrate = Some(text_field(field).await?),
            _ => {
                // Unknown fields are ignored, but the part must still be
                // consumed.
                let _ = field.bytes().await;
            }
        }
    }

    Ok(form)
}

/// Streams one multipart field to disk without buffering the whole upload.
async fn spool_field(
    field: &mut axum::extract::multipart::Field<'_>,
    path: &Path,
) -> Result<(), Response> {
    let mut file = tokio::fs::File::create(path).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::json(format!("could not spool upload: {}", e)),
        )
            .into_response()
    })?;

    while let Some(chunk) = field.chunk().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            ApiError::json(format!("upload interrupted: {}", e)),
        )
            .into_response()
    })? {
        file.write_all(&chunk).await.map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::json(format!("could not spool upload: {}", e)),
            )
                .into_response()
        })?;
    }
    file.flush().await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::json(format!("could not spool upload: {}", e)),
        )
            .into_response()
    })?;
    Ok(())
}

async fn text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, Response> {
    field.text().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            ApiError::json(format!("malformed multipart body: {}", e)),
        )
            .into_response()
    })
}

async fn remove_spool(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove spool file {}: {}", path.display(), e);
        }
    }
}
