//! labrig - measurement rig relay server
//!
//! Serves the REST + SSE API in front of the lab's distance sensor and
//! oscillation counter.
//!
//! # Usage
//!
//! ```bash
//! # Against the rig on the lab network
//! cargo run --release
//!
//! # Against the bench simulator
//! cargo run --bin device-simulator -- --addr 127.0.0.1:8081 &
//! cargo run --release -- --device-url http://127.0.0.1:8081
//! ```
//!
//! # Environment Variables
//!
//! - `LABRIG_CONFIG`: Path to a `rig_config.toml`
//! - `LABRIG_SERVER_ADDR`: HTTP bind address
//! - `LABRIG_CORS_ORIGINS`: Comma-separated allowed origins
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use axum::Router;
use labrig::api::{create_app, ApiState};
use labrig::config::RigConfig;
use labrig::{DeviceClient, ExperimentController, ExperimentMode};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "labrig")]
#[command(about = "Measurement rig relay: device control and live kinematics streams")]
#[command(version)]
struct CliArgs {
    /// Override the server address (default from config: "0.0.0.0:5000")
    #[arg(short, long, env = "LABRIG_SERVER_ADDR")]
    addr: Option<String>,

    /// Override the distance sensor URL
    #[arg(long, value_name = "URL")]
    device_url: Option<String>,

    /// Override the oscillation counter URL (defaults to the sensor URL)
    #[arg(long, value_name = "URL")]
    osi_url: Option<String>,

    /// Load configuration from this TOML file instead of the search path
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,
}

// ============================================================================
// Task Supervisor
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
    DeviceProbe,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::DeviceProbe => write!(f, "DeviceProbe"),
        }
    }
}

fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: Router,
    shutdown: CancellationToken,
) {
    task_set.spawn(async move {
        info!(task = %TaskName::HttpServer, "Serving API");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| {
                error!(task = %TaskName::HttpServer, error = %e, "Server error");
                anyhow::anyhow!("HTTP server error: {e}")
            })?;

        info!(task = %TaskName::HttpServer, "Connections drained");
        Ok(TaskName::HttpServer)
    });
}

/// Probe both devices once so capacity is known before the first configure.
fn spawn_device_probe(task_set: &mut JoinSet<Result<TaskName>>, state: ApiState) {
    task_set.spawn(async move {
        for (name, controller) in [("sensor", &state.sensor), ("osi", &state.osi)] {
            let status = controller.status().await;
            if status.connected {
                info!(
                    task = %TaskName::DeviceProbe,
                    device = name,
                    url = controller.device().base_url(),
                    ready = status.ready,
                    capacity = controller.capacity(),
                    "Device reachable"
                );
            } else {
                warn!(
                    task = %TaskName::DeviceProbe,
                    device = name,
                    url = controller.device().base_url(),
                    error = status.error.as_deref().unwrap_or("unknown"),
                    "Device not reachable, using default capacity"
                );
            }
        }
        Ok(TaskName::DeviceProbe)
    });
}

/// Wait for shutdown or the first failing task, then drain the rest.
///
/// Tasks that finish normally (the device probe) are just logged.
async fn supervise(
    mut task_set: JoinSet<Result<TaskName>>,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut outcome = Ok(());

    while outcome.is_ok() {
        let joined = tokio::select! {
            _ = shutdown.cancelled() => break,
            joined = task_set.join_next() => joined,
        };

        outcome = match joined {
            None => break,
            Some(Ok(Ok(task))) => {
                debug!(%task, "Task finished");
                Ok(())
            }
            Some(Ok(Err(e))) => Err(e),
            Some(Err(e)) => Err(anyhow::anyhow!("Task panicked: {e}")),
        };
    }

    if let Err(ref e) = outcome {
        error!(error = %e, "Task failed, shutting down");
        shutdown.cancel();
    }

    while let Some(joined) = task_set.join_next().await {
        if let Ok(Err(e)) = joined {
            warn!(error = %e, "Task error during shutdown");
        }
    }

    outcome
}

// ============================================================================
// Main
// ============================================================================

fn load_config(args: &CliArgs) -> Result<RigConfig> {
    let mut config = match &args.config {
        Some(path) => RigConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => RigConfig::load(),
    };

    if let Some(addr) = &args.addr {
        config.server.addr = addr.clone();
    }
    if let Some(url) = &args.device_url {
        config.device.base_url = url.clone();
    }
    if let Some(url) = &args.osi_url {
        config.oscillation_device.base_url = Some(url.clone());
    }

    config.validate().context("Invalid configuration after CLI overrides")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let config = load_config(&args)?;

    info!("labrig {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        sensor = %config.device.base_url,
        osi = %config.oscillation_base_url(),
        capacity = config.device.default_max_samples,
        "Devices configured"
    );

    let sensor_client = DeviceClient::new(&config.device.base_url, &config.device)
        .context("Failed to build sensor client")?;
    let osi_client = DeviceClient::new(config.oscillation_base_url(), &config.device)
        .context("Failed to build oscillation counter client")?;

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let state = ApiState {
        sensor: Arc::new(ExperimentController::new(Arc::new(sensor_client), &config)),
        osi: Arc::new(
            ExperimentController::new(Arc::new(osi_client), &config)
                .with_mode(ExperimentMode::Count),
        ),
        stream: config.stream.clone(),
        shutdown: cancel_token.clone(),
    };

    let listener = tokio::net::TcpListener::bind(&config.server.addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.addr))?;
    info!("HTTP API listening on http://{}", config.server.addr);

    let mut task_set = JoinSet::new();
    spawn_device_probe(&mut task_set, state.clone());
    spawn_http_server(&mut task_set, listener, create_app(state), cancel_token.clone());

    supervise(task_set, cancel_token).await?;
    info!("labrig shutdown complete");
    Ok(())
}
