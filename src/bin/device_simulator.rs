//! Sensor Device Simulator
//!
//! Serves the sensor's HTTP API on the bench so the relay can be exercised
//! without hardware. The simulated rig is a damped spring-mass oscillator:
//! - distance mode streams range readings with Gaussian noise and occasional
//!   `65535` sensor-error sentinels
//! - count mode streams a cumulative oscillation count
//!
//! # Usage
//! ```bash
//! ./device-simulator --addr 127.0.0.1:8081 --error-rate 0.02
//! ./labrig --device-url http://127.0.0.1:8081
//! ```

use anyhow::{Context, Result};
use async_stream::stream;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

use labrig::types::DISTANCE_ERROR_SENTINEL;

// ============================================================================
// Rig Model Constants
// ============================================================================

/// Resting distance from sensor to mass (mm)
const REST_DISTANCE_MM: f64 = 200.0;
/// Initial amplitude (mm)
const AMPLITUDE_MM: f64 = 40.0;
/// Natural frequency (Hz)
const NATURAL_FREQ_HZ: f64 = 1.2;
/// Amplitude decay time constant (s)
const DECAY_TAU_S: f64 = 8.0;
/// Keep-alive comment cadence
const KEEPALIVE_EVERY: Duration = Duration::from_secs(2);

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "device-simulator")]
#[command(about = "Bench simulator for the lab rig's sensor HTTP API")]
#[command(version)]
struct Args {
    /// Bind address
    #[arg(short, long, default_value = "127.0.0.1:8081")]
    addr: String,

    /// Sample buffer capacity advertised on /status
    #[arg(long, default_value = "2000")]
    max_samples: u64,

    /// Probability that a distance reading is the error sentinel
    #[arg(long, default_value = "0.02")]
    error_rate: f64,

    /// Standard deviation of distance noise (mm)
    #[arg(long, default_value = "0.8")]
    noise_mm: f64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,
}

// ============================================================================
// Simulated Device State
// ============================================================================

#[derive(Debug, Clone, Copy, Deserialize)]
struct RunConfig {
    frequency: u32,
    duration: u32,
    #[serde(default = "default_mode")]
    mode: Mode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
enum Mode {
    Distance,
    Count,
}

fn default_mode() -> Mode {
    Mode::Distance
}

struct Device {
    config: RunConfig,
    started_at: Option<Instant>,
    stopped: bool,
    count_offset: i64,
    oscillation_armed_at: Option<Instant>,
    max_samples: u64,
    error_rate: f64,
    noise_mm: f64,
    rng: StdRng,
}

impl Device {
    fn elapsed_s(&self) -> f64 {
        self.started_at.map_or(0.0, |t| t.elapsed().as_secs_f64())
    }

    fn running(&self) -> bool {
        !self.stopped
            && self.started_at.is_some()
            && self.elapsed_s() < f64::from(self.config.duration)
    }

    fn total_count(&self) -> i64 {
        oscillation_count(self.elapsed_s()) - self.count_offset
    }

    fn distance_at(&mut self, t: f64) -> u16 {
        if self.rng.gen_bool(self.error_rate.clamp(0.0, 1.0)) {
            return DISTANCE_ERROR_SENTINEL;
        }
        let noise = Normal::new(0.0, self.noise_mm.max(1e-6))
            .map(|n| n.sample(&mut self.rng))
            .unwrap_or(0.0);
        let clean = REST_DISTANCE_MM
            + AMPLITUDE_MM
                * (-t / DECAY_TAU_S).exp()
                * (2.0 * std::f64::consts::PI * NATURAL_FREQ_HZ * t).cos();
        (clean + noise).clamp(0.0, 65_534.0) as u16
    }
}

fn oscillation_count(t: f64) -> i64 {
    (t * NATURAL_FREQ_HZ).floor() as i64
}

type Shared = Arc<Mutex<Device>>;

// ============================================================================
// Handlers
// ============================================================================

async fn status(State(dev): State<Shared>) -> Json<serde_json::Value> {
    let dev = dev.lock().await;
    Json(json!({
        "ready": !dev.running(),
        "running": dev.running(),
        "max_samples": dev.max_samples,
        "total_count": dev.total_count(),
        "mode": dev.config.mode,
        "frequency": dev.config.frequency,
        "duration": dev.config.duration,
    }))
}

async fn configure(State(dev): State<Shared>, Json(cfg): Json<RunConfig>) -> Response {
    let mut dev = dev.lock().await;
    let required = u64::from(cfg.frequency) * u64::from(cfg.duration);
    if cfg.frequency == 0 || cfg.frequency > 1000 {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "frequency must be 1-1000 Hz" })))
            .into_response();
    }
    if required > dev.max_samples {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": format!("{required} samples exceeds buffer of {}", dev.max_samples)
            })),
        )
            .into_response();
    }
    dev.config = cfg;
    info!(frequency = cfg.frequency, duration = cfg.duration, mode = ?cfg.mode, "Configured");
    Json(json!({
        "frequency": cfg.frequency,
        "duration": cfg.duration,
        "mode": cfg.mode,
    }))
    .into_response()
}

async fn start(State(dev): State<Shared>) -> StatusCode {
    let mut dev = dev.lock().await;
    dev.started_at = Some(Instant::now());
    dev.stopped = false;
    dev.count_offset = 0;
    info!("Run started");
    StatusCode::OK
}

async fn stop(State(dev): State<Shared>) -> StatusCode {
    dev.lock().await.stopped = true;
    info!("Run stopped");
    StatusCode::OK
}

async fn reset(State(dev): State<Shared>) -> StatusCode {
    let mut dev = dev.lock().await;
    dev.count_offset = oscillation_count(dev.elapsed_s());
    StatusCode::OK
}

async fn start_oscillation(State(dev): State<Shared>) -> StatusCode {
    dev.lock().await.oscillation_armed_at = Some(Instant::now());
    StatusCode::OK
}

async fn oscillation_data(State(dev): State<Shared>) -> Response {
    let dev = dev.lock().await;
    match dev.oscillation_armed_at {
        Some(armed) => {
            let window = armed.elapsed().as_secs_f64();
            let oscillations = (window * NATURAL_FREQ_HZ).floor();
            Json(json!({
                "window_s": window,
                "oscillations": oscillations,
                "period_s": 1.0 / NATURAL_FREQ_HZ,
            }))
            .into_response()
        }
        None => (
            StatusCode::CONFLICT,
            Json(json!({ "error": "oscillation set not armed" })),
        )
            .into_response(),
    }
}

async fn data(State(dev): State<Shared>) -> Json<serde_json::Value> {
    let mut dev = dev.lock().await;
    let cfg = dev.config;
    let n = u64::from(cfg.frequency) * u64::from(cfg.duration);
    let samples: Vec<_> = (0..n)
        .map(|i| {
            let t = i as f64 / f64::from(cfg.frequency);
            json!({
                "sample": i,
                "timestamp": (t * 1000.0) as i64,
                "distance": dev.distance_at(t),
            })
        })
        .collect();
    Json(json!({ "frequency": cfg.frequency, "duration": cfg.duration, "samples": samples }))
}

async fn event_stream(State(dev): State<Shared>) -> Response {
    let (frequency, mode) = {
        let d = dev.lock().await;
        (d.config.frequency.max(1), d.config.mode)
    };
    info!(frequency, mode = ?mode, "Stream client connected");

    let period = Duration::from_secs_f64(1.0 / f64::from(frequency));
    let body = stream! {
        let mut ticker = tokio::time::interval(period);
        let mut sample = 0u64;
        let mut last_keepalive = Instant::now();
        loop {
            ticker.tick().await;

            let line = {
                let mut d = dev.lock().await;
                if !d.running() {
                    None
                } else {
                    let t = d.elapsed_s();
                    let timestamp = (t * 1000.0) as i64;
                    sample += 1;
                    Some(match mode {
                        Mode::Distance => json!({
                            "distance": d.distance_at(t),
                            "timestamp": timestamp,
                            "sample": sample,
                        }),
                        Mode::Count => json!({
                            "count": d.total_count(),
                            "timestamp": timestamp,
                            "sample": sample,
                        }),
                    })
                }
            };

            if let Some(payload) = line {
                yield Ok::<_, Infallible>(format!("data: {payload}\n\n"));
            }
            if last_keepalive.elapsed() >= KEEPALIVE_EVERY {
                last_keepalive = Instant::now();
                yield Ok(": keep-alive\n\n".to_string());
            }
        }
    };

    (
        [(header::CONTENT_TYPE, "text/event-stream"), (header::CACHE_CONTROL, "no-cache")],
        Body::from_stream(body),
    )
        .into_response()
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    if !(0.0..=1.0).contains(&args.error_rate) {
        warn!(error_rate = args.error_rate, "error rate outside 0-1, clamping");
    }

    let rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let device: Shared = Arc::new(Mutex::new(Device {
        config: RunConfig { frequency: 50, duration: 10, mode: Mode::Distance },
        started_at: None,
        stopped: false,
        count_offset: 0,
        oscillation_armed_at: None,
        max_samples: args.max_samples,
        error_rate: args.error_rate,
        noise_mm: args.noise_mm,
        rng,
    }));

    let app = Router::new()
        .route("/status", get(status))
        .route("/configure", post(configure))
        .route("/start", get(start))
        .route("/stop", get(stop))
        .route("/reset", get(reset))
        .route("/start_oscillation", get(start_oscillation))
        .route("/oscillation_data", get(oscillation_data))
        .route("/data", get(data))
        .route("/stream", get(event_stream))
        .with_state(device);

    let listener = tokio::net::TcpListener::bind(&args.addr)
        .await
        .with_context(|| format!("Failed to bind {}", args.addr))?;
    info!("Simulated device listening on http://{}", args.addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Simulator shutting down");
        })
        .await
        .context("Simulator server error")?;
    Ok(())
}
