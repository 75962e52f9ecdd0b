pub mod convert;
pub mod formats;
pub mod handlers;
pub mod middleware;
pub mod result;
pub mod routes;
pub mod status;

pub use routes::create_router;

use axum::Json;
use serde::Serialize;

/// Error response body shared by all endpoints.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

impl ApiError {
    pub fn json(message: impl Into<String>) -> Json<ApiError> {
        Json(ApiError {
            error: message.into(),
        })
    }
}
