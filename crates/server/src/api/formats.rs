//! Supported formats listing.

use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use convertifile_core::registry;

#[derive(Debug, Serialize)]
pub struct FormatGroup {
    pub kind: String,
    pub formats: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct FormatsResponse {
    pub groups: Vec<FormatGroup>,
}

/// GET /api/v1/formats
pub async fn list_formats() -> impl IntoResponse {
    let groups = registry::all_formats()
        .into_iter()
        .map(|(kind, formats)| FormatGroup {
            kind: kind.as_str().to_string(),
            formats: formats.to_vec(),
        })
        .collect();
    Json(FormatsResponse { groups })
}
