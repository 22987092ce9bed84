//! HTTP client for the sensor device
//!
//! The device is a microcontroller exposing a small HTTP API:
//!
//! | Endpoint | Purpose |
//! |---|---|
//! | `GET /status` | readiness, buffer capacity |
//! | `POST /configure` | `{frequency, duration, mode}`; 400 + `{error}` on rejection |
//! | `GET /start`, `GET /stop` | run control |
//! | `GET /reset` | zero the oscillation counter |
//! | `GET /start_oscillation` | arm one oscillation timing set |
//! | `GET /stream` | chunked `data: {...}\n\n` events |
//! | `GET /data`, `GET /oscillation_data` | buffered result snapshots |
//!
//! Control-plane calls are short and bounded by a timeout. The stream has no
//! overall timeout; inactivity is policed by the live publisher.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::DeviceConfig;
use crate::types::{DeviceStatus, ExperimentConfig};

/// Byte chunks from the device's event stream.
pub type ChunkStream = BoxStream<'static, Result<Vec<u8>, DeviceError>>;

/// Device communication errors
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Device unreachable: {0}")]
    Unreachable(String),

    #[error("Device request timed out")]
    Timeout,

    #[error("Device returned status {0}")]
    Status(u16),

    #[error("Device rejected request: {0}")]
    Rejected(String),

    #[error("Invalid device response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for DeviceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Unreachable(e.to_string())
        }
    }
}

/// Operations the pipeline needs from a device.
///
/// Implemented over HTTP by [`DeviceClient`]; tests substitute in-memory fakes.
#[async_trait]
pub trait DeviceApi: Send + Sync + 'static {
    /// Probe `/status`.
    async fn status(&self) -> Result<DeviceStatus, DeviceError>;

    /// Send a validated configuration. Returns the device's echo.
    async fn configure(&self, config: &ExperimentConfig) -> Result<serde_json::Value, DeviceError>;

    async fn start(&self) -> Result<(), DeviceError>;

    async fn stop(&self) -> Result<(), DeviceError>;

    /// Zero the oscillation counter.
    async fn reset_counter(&self) -> Result<(), DeviceError>;

    /// Arm one oscillation timing set.
    async fn start_oscillation(&self) -> Result<(), DeviceError>;

    /// Snapshot of buffered measurement data.
    async fn data(&self) -> Result<serde_json::Value, DeviceError>;

    /// Snapshot of the last oscillation timing set.
    async fn oscillation_data(&self) -> Result<serde_json::Value, DeviceError>;

    /// Open the long-lived event stream. A non-200 response is an error.
    async fn open_stream(&self) -> Result<ChunkStream, DeviceError>;

    /// Base URL for logging.
    fn base_url(&self) -> &str;
}

/// reqwest-backed [`DeviceApi`].
#[derive(Clone)]
pub struct DeviceClient {
    http: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
    status_timeout: Duration,
}

impl DeviceClient {
    /// Build a client for the device at `base_url`.
    pub fn new(base_url: &str, settings: &DeviceConfig) -> Result<Self, DeviceError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| DeviceError::Unreachable(format!("HTTP client init failed: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(settings.request_timeout_secs),
            status_timeout: Duration::from_secs(settings.status_timeout_secs),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET a command endpoint and require 200.
    async fn command(&self, path: &str, timeout: Duration) -> Result<(), DeviceError> {
        let resp = self.http.get(self.url(path)).timeout(timeout).send().await?;
        match resp.status() {
            reqwest::StatusCode::OK => {
                debug!(path, "Device command accepted");
                Ok(())
            }
            status => Err(DeviceError::Status(status.as_u16())),
        }
    }

    /// GET a JSON endpoint and require 200.
    async fn fetch_json(&self, path: &str) -> Result<serde_json::Value, DeviceError> {
        let resp = self
            .http
            .get(self.url(path))
            .timeout(self.request_timeout)
            .send()
            .await?;
        match resp.status() {
            reqwest::StatusCode::OK => Ok(resp.json().await?),
            status => Err(DeviceError::Status(status.as_u16())),
        }
    }
}

#[async_trait]
impl DeviceApi for DeviceClient {
    async fn status(&self) -> Result<DeviceStatus, DeviceError> {
        let resp = self
            .http
            .get(self.url("/status"))
            .timeout(self.status_timeout)
            .send()
            .await?;

        match resp.status() {
            reqwest::StatusCode::OK => {
                let info: serde_json::Value = resp.json().await?;
                Ok(DeviceStatus::from_device_info(info))
            }
            status => Err(DeviceError::Status(status.as_u16())),
        }
    }

    async fn configure(&self, config: &ExperimentConfig) -> Result<serde_json::Value, DeviceError> {
        let resp = self
            .http
            .post(self.url("/configure"))
            .json(config)
            .timeout(self.request_timeout)
            .send()
            .await?;

        match resp.status() {
            reqwest::StatusCode::OK => {
                // Older firmware answers with plain text; fall back to our own config
                let body = resp.text().await?;
                Ok(serde_json::from_str(&body)
                    .unwrap_or_else(|_| serde_json::to_value(config).unwrap_or_default()))
            }
            reqwest::StatusCode::BAD_REQUEST => {
                let detail = resp
                    .json::<serde_json::Value>()
                    .await
                    .ok()
                    .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
                    .unwrap_or_else(|| "Configuration rejected".to_string());
                warn!(error = %detail, "Configuration rejected by device");
                Err(DeviceError::Rejected(detail))
            }
            status => Err(DeviceError::Status(status.as_u16())),
        }
    }

    async fn start(&self) -> Result<(), DeviceError> {
        self.command("/start", self.request_timeout).await
    }

    async fn stop(&self) -> Result<(), DeviceError> {
        self.command("/stop", self.request_timeout).await
    }

    async fn reset_counter(&self) -> Result<(), DeviceError> {
        self.command("/reset", self.status_timeout).await
    }

    async fn start_oscillation(&self) -> Result<(), DeviceError> {
        self.command("/start_oscillation", self.status_timeout).await
    }

    async fn data(&self) -> Result<serde_json::Value, DeviceError> {
        self.fetch_json("/data").await
    }

    async fn oscillation_data(&self) -> Result<serde_json::Value, DeviceError> {
        self.fetch_json("/oscillation_data").await
    }

    async fn open_stream(&self) -> Result<ChunkStream, DeviceError> {
        info!(url = %self.url("/stream"), "Connecting to device event stream");

        let resp = self
            .http
            .get(self.url("/stream"))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        if resp.status() != reqwest::StatusCode::OK {
            return Err(DeviceError::Status(resp.status().as_u16()));
        }

        Ok(resp
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(DeviceError::from))
            .boxed())
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}
