//! API route table.

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{self, ApiState};

/// Distance sensor endpoints, nested under `/api/sensor`.
pub fn sensor_routes() -> Router<ApiState> {
    Router::new()
        .route("/status", get(handlers::sensor_status))
        .route("/configure", post(handlers::sensor_configure))
        .route("/start", post(handlers::sensor_start))
        .route("/stop", post(handlers::sensor_stop))
        .route("/stream", get(handlers::sensor_stream))
        // Batch collection
        .route("/displacement", get(handlers::sensor_displacement))
        .route("/oscillations", get(handlers::sensor_oscillations))
}

/// Oscillation counter endpoints, nested under `/api/osi`.
pub fn osi_routes() -> Router<ApiState> {
    Router::new()
        .route("/status", get(handlers::osi_status))
        .route("/configure", post(handlers::osi_configure))
        .route("/start", post(handlers::osi_start))
        .route("/stop", post(handlers::osi_stop))
        .route("/reset", post(handlers::osi_reset))
        .route("/stream", get(handlers::osi_stream))
        .route("/data", get(handlers::osi_data))
}

/// Full router with state attached.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/sensor", sensor_routes())
        .nest("/api/osi", osi_routes())
        .fallback(handlers::not_found)
        .with_state(state)
}
