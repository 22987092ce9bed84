//! HTTP handlers for the sensor and oscillation-counter devices.
//!
//! REST handlers return [`ApiResponse`] / [`ApiErrorResponse`]; the stream
//! handlers return server-sent events tagged `message` or `error`.

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::envelope::{ApiErrorResponse, ApiResponse};
use crate::config::StreamConfig;
use crate::physics_engine::{OscillationCounter, SignalProcessor};
use crate::pipeline::ExperimentController;
use crate::types::{ExperimentConfig, ExperimentMode, LiveEvent};

/// Shared state for all handlers.
#[derive(Clone)]
pub struct ApiState {
    /// Distance sensor
    pub sensor: Arc<ExperimentController>,
    /// Oscillation counter
    pub osi: Arc<ExperimentController>,
    /// Smoothing parameters for new stream subscriptions
    pub stream: StreamConfig,
    /// Parent of every stream's cancellation token; cancelled on shutdown
    pub shutdown: CancellationToken,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub sensor_device: String,
    pub osi_device: String,
}

#[derive(Debug, Serialize)]
struct CommandAck {
    status: &'static str,
}

fn ack(status: &'static str) -> Response {
    ApiResponse::ok(CommandAck { status })
}

/// Query for `/api/sensor/oscillations`.
#[derive(Debug, Deserialize)]
pub struct OscillationQuery {
    #[serde(default = "default_sets")]
    pub n: u32,
}

fn default_sets() -> u32 {
    3
}

/// Encode live events as SSE.
fn sse_response<T, S>(events: S) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    T: Serialize,
    S: Stream<Item = LiveEvent<T>> + Send + 'static,
{
    let sse = events.map(|ev| {
        Ok::<_, Infallible>(Event::default().event(ev.event_name()).data(ev.data_json()))
    });
    Sse::new(sse).keep_alive(KeepAlive::default())
}

// ============================================================================
// Health
// ============================================================================

/// GET /health
pub async fn health(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        sensor_device: state.sensor.device().base_url().to_string(),
        osi_device: state.osi.device().base_url().to_string(),
    })
}

/// Fallback for unknown paths.
pub async fn not_found(uri: axum::http::Uri) -> Response {
    ApiErrorResponse::not_found(format!("No route for {}", uri.path()))
}

// ============================================================================
// Distance sensor
// ============================================================================

/// GET /api/sensor/status
pub async fn sensor_status(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(state.sensor.status().await)
}

/// POST /api/sensor/configure
pub async fn sensor_configure(
    State(state): State<ApiState>,
    axum::Json(config): axum::Json<ExperimentConfig>,
) -> Response {
    match state.sensor.configure(config).await {
        Ok(outcome) => ApiResponse::ok(outcome),
        Err(e) => e.into_response(),
    }
}

/// POST /api/sensor/start
pub async fn sensor_start(State(state): State<ApiState>) -> Response {
    match state.sensor.start().await {
        Ok(()) => ack("started"),
        Err(e) => e.into_response(),
    }
}

/// POST /api/sensor/stop
pub async fn sensor_stop(State(state): State<ApiState>) -> Response {
    match state.sensor.stop().await {
        Ok(()) => ack("stopped"),
        Err(e) => e.into_response(),
    }
}

/// GET /api/sensor/stream
///
/// Decodes the stream in whatever mode the sensor was last configured for.
pub async fn sensor_stream(State(state): State<ApiState>) -> Response {
    let mode = state.sensor.configured_mode();
    info!(%mode, "Sensor live stream subscribed");
    let publisher = state.sensor.publisher();
    let cancel = state.shutdown.child_token();
    match mode {
        ExperimentMode::Distance => {
            sse_response(publisher.subscribe(SignalProcessor::from_config(&state.stream), cancel))
                .into_response()
        }
        ExperimentMode::Count => {
            sse_response(publisher.subscribe(OscillationCounter::new(), cancel)).into_response()
        }
    }
}

/// GET /api/sensor/displacement
pub async fn sensor_displacement(State(state): State<ApiState>) -> Response {
    match state.sensor.collect_displacement().await {
        Ok(data) => ApiResponse::ok(data),
        Err(e) => e.into_response(),
    }
}

/// GET /api/sensor/oscillations?n=3
pub async fn sensor_oscillations(
    State(state): State<ApiState>,
    Query(q): Query<OscillationQuery>,
) -> Response {
    match state.sensor.collect_oscillations(q.n).await {
        Ok(results) => ApiResponse::ok(serde_json::json!({ "results": results })),
        Err(e) => e.into_response(),
    }
}

// ============================================================================
// Oscillation counter
// ============================================================================

/// GET /api/osi/status
pub async fn osi_status(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(state.osi.status().await)
}

/// POST /api/osi/configure
pub async fn osi_configure(
    State(state): State<ApiState>,
    axum::Json(config): axum::Json<ExperimentConfig>,
) -> Response {
    match state.osi.configure(config).await {
        Ok(outcome) => ApiResponse::ok(outcome),
        Err(e) => e.into_response(),
    }
}

/// POST /api/osi/start
pub async fn osi_start(State(state): State<ApiState>) -> Response {
    match state.osi.start().await {
        Ok(()) => ack("started"),
        Err(e) => e.into_response(),
    }
}

/// POST /api/osi/stop
pub async fn osi_stop(State(state): State<ApiState>) -> Response {
    match state.osi.stop().await {
        Ok(()) => ack("stopped"),
        Err(e) => e.into_response(),
    }
}

/// POST /api/osi/reset
pub async fn osi_reset(State(state): State<ApiState>) -> Response {
    match state.osi.reset_counter().await {
        Ok(()) => ack("reset"),
        Err(e) => e.into_response(),
    }
}

/// GET /api/osi/stream
pub async fn osi_stream(State(state): State<ApiState>) -> impl IntoResponse {
    info!("Oscillation live stream subscribed");
    let events = state
        .osi
        .publisher()
        .subscribe(OscillationCounter::new(), state.shutdown.child_token());
    sse_response(events)
}

/// GET /api/osi/data
pub async fn osi_data(State(state): State<ApiState>) -> Response {
    match state.osi.data().await {
        Ok(data) => ApiResponse::ok(data),
        Err(e) => e.into_response(),
    }
}
