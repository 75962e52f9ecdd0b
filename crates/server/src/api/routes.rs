use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::{convert, formats, handlers, middleware, result, status};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let max_upload = state.config().server.max_upload_mb as usize * 1024 * 1024;

    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Conversion pipeline
        .route("/formats", get(formats::list_formats))
        .route("/convert", post(convert::submit_conversion))
        .route("/status/{id}", get(status::get_status))
        .route("/result/{id}", get(result::download_result))
        .layer(DefaultBodyLimit::max(max_upload));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .layer(axum::middleware::from_fn(middleware::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
