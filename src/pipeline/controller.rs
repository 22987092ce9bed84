//! Experiment Controller
//!
//! Validates experiment configuration against the device's buffer capacity,
//! forwards run control to the device and drives the batch collection
//! workflows. Every `configure` and `start` opens a new session: the epoch
//! published on a `watch` channel advances, and live streams reset their
//! processor when they see it move.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::publisher::LivePublisher;
use crate::acquisition::{DeviceApi, DeviceError};
use crate::config::{CollectionConfig, RigConfig};
use crate::types::{DeviceStatus, ExperimentConfig, ExperimentMode};

/// Experiment control failures
#[derive(Debug, Error)]
pub enum ExperimentError {
    /// Rejected locally; the device was never contacted
    #[error(
        "Configuration exceeds device buffer capacity. Max samples: {max}, Required: {required}. \
         Reduce frequency or duration."
    )]
    CapacityExceeded { required: u64, max: u64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Accepted configuration as reported back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigureOutcome {
    /// Device's echo of the configuration
    pub config: serde_json::Value,
    pub required_samples: u64,
    pub max_samples: u64,
}

/// One set of an oscillation timing collection.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OscillationSet {
    pub set: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Control plane for one device.
pub struct ExperimentController {
    device: Arc<dyn DeviceApi>,
    /// Forces the payload mode sent to `/configure` (the oscillation counter only counts)
    pinned_mode: Option<ExperimentMode>,
    /// Mode of the last configuration the device accepted
    configured_mode: watch::Sender<ExperimentMode>,
    default_max_samples: u64,
    /// Last capacity the device advertised; 0 until one is seen
    advertised_max_samples: AtomicU64,
    session: watch::Sender<u64>,
    collection: CollectionConfig,
    stream_read_timeout: Duration,
    max_buffer_chars: usize,
}

impl ExperimentController {
    pub fn new(device: Arc<dyn DeviceApi>, config: &RigConfig) -> Self {
        let (session, _) = watch::channel(0);
        let (configured_mode, _) = watch::channel(ExperimentMode::default());
        Self {
            device,
            pinned_mode: None,
            configured_mode,
            default_max_samples: config.device.default_max_samples,
            advertised_max_samples: AtomicU64::new(0),
            session,
            collection: config.collection.clone(),
            stream_read_timeout: Duration::from_secs(config.device.stream_read_timeout_secs),
            max_buffer_chars: config.stream.max_buffer_chars,
        }
    }

    /// Always configure the device in `mode`, whatever the request says.
    pub fn with_mode(mut self, mode: ExperimentMode) -> Self {
        self.pinned_mode = Some(mode);
        self.configured_mode.send_replace(mode);
        self
    }

    /// Mode live streams should decode, from the last accepted configuration.
    pub fn configured_mode(&self) -> ExperimentMode {
        *self.configured_mode.borrow()
    }

    pub fn device(&self) -> &Arc<dyn DeviceApi> {
        &self.device
    }

    /// Buffer capacity used to validate configurations.
    pub fn capacity(&self) -> u64 {
        match self.advertised_max_samples.load(Ordering::Relaxed) {
            0 => self.default_max_samples,
            advertised => advertised,
        }
    }

    /// Current session epoch.
    pub fn session_epoch(&self) -> u64 {
        *self.session.borrow()
    }

    /// Receiver that observes every new session.
    pub fn subscribe_sessions(&self) -> watch::Receiver<u64> {
        self.session.subscribe()
    }

    /// Live publisher bound to this controller's device and sessions.
    pub fn publisher(&self) -> LivePublisher {
        LivePublisher::new(
            Arc::clone(&self.device),
            self.subscribe_sessions(),
            self.stream_read_timeout,
            self.max_buffer_chars,
        )
    }

    fn begin_session(&self) {
        self.session.send_modify(|epoch| *epoch += 1);
        debug!(epoch = self.session_epoch(), "New experiment session");
    }

    /// Probe the device. Failures become `connected: false`.
    pub async fn status(&self) -> DeviceStatus {
        match self.device.status().await {
            Ok(status) => {
                if let Some(max) = status.max_samples.filter(|&m| m > 0) {
                    self.advertised_max_samples.store(max, Ordering::Relaxed);
                }
                status
            }
            Err(e) => {
                error!(device = self.device.base_url(), error = %e, "Device status check failed");
                DeviceStatus::disconnected(Some(e.to_string()))
            }
        }
    }

    /// Validate `config` and forward it to the device.
    ///
    /// Capacity violations are rejected before any device call. On acceptance
    /// a new session begins even if the device later rejects the request.
    pub async fn configure(
        &self,
        config: ExperimentConfig,
    ) -> Result<ConfigureOutcome, ExperimentError> {
        let config = match self.pinned_mode {
            Some(mode) => ExperimentConfig { mode, ..config },
            None => config,
        };

        if config.frequency_hz == 0 || config.duration_s == 0 {
            return Err(ExperimentError::InvalidConfig(
                "frequency and duration must be greater than zero".to_string(),
            ));
        }

        let required = config.required_samples();
        let max = self.capacity();
        if required > max {
            let err = ExperimentError::CapacityExceeded { required, max };
            warn!(required, max, "{}", err);
            return Err(err);
        }

        self.begin_session();
        let echo = self.device.configure(&config).await?;
        self.configured_mode.send_replace(config.mode);
        info!(
            frequency = config.frequency_hz,
            duration = config.duration_s,
            mode = %config.mode,
            required,
            "Experiment configured"
        );

        Ok(ConfigureOutcome {
            config: echo,
            required_samples: required,
            max_samples: max,
        })
    }

    pub async fn start(&self) -> Result<(), ExperimentError> {
        self.begin_session();
        self.device.start().await?;
        info!(device = self.device.base_url(), "Experiment started");
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), ExperimentError> {
        self.device.stop().await?;
        info!(device = self.device.base_url(), "Experiment stopped");
        Ok(())
    }

    /// Zero the device's oscillation counter.
    pub async fn reset_counter(&self) -> Result<(), ExperimentError> {
        self.device.reset_counter().await?;
        info!(device = self.device.base_url(), "Counter reset");
        Ok(())
    }

    /// Buffered measurement snapshot.
    pub async fn data(&self) -> Result<serde_json::Value, ExperimentError> {
        Ok(self.device.data().await?)
    }

    /// Start a run, wait for the device to report ready and fetch its data.
    ///
    /// Status failures while polling are logged and polling continues. If
    /// the device never reports ready the data is fetched anyway.
    pub async fn collect_displacement(&self) -> Result<serde_json::Value, ExperimentError> {
        self.start().await?;

        let interval = Duration::from_millis(self.collection.status_poll_interval_ms);
        let mut ready = false;
        for poll in 0..self.collection.max_status_polls {
            match self.device.status().await {
                Ok(status) if status.ready => {
                    debug!(poll, "Device ready");
                    ready = true;
                    break;
                }
                Ok(_) => {}
                Err(e) => warn!(poll, error = %e, "Status poll failed"),
            }
            tokio::time::sleep(interval).await;
        }

        if !ready {
            warn!(
                polls = self.collection.max_status_polls,
                "Device never reported ready, fetching data anyway"
            );
        }

        Ok(self.device.data().await?)
    }

    /// Collect `sets` oscillation timing sets.
    ///
    /// A failed set is recorded and the loop moves on to the next one.
    pub async fn collect_oscillations(
        &self,
        sets: u32,
    ) -> Result<Vec<OscillationSet>, ExperimentError> {
        let max = self.collection.max_oscillation_sets;
        if sets == 0 || sets > max {
            return Err(ExperimentError::InvalidConfig(format!(
                "number of sets must be between 1 and {max}"
            )));
        }

        let settle = Duration::from_secs(self.collection.oscillation_settle_secs);
        let mut results = Vec::with_capacity(sets as usize);

        for set in 1..=sets {
            if let Err(e) = self.device.start_oscillation().await {
                warn!(set, error = %e, "Failed to arm oscillation set");
                results.push(OscillationSet {
                    set,
                    data: None,
                    error: Some(format!("Failed to start oscillation {set}: {e}")),
                });
                continue;
            }

            tokio::time::sleep(settle).await;

            let entry = match self.device.oscillation_data().await {
                Ok(data) => OscillationSet { set, data: Some(data), error: None },
                Err(e) => {
                    warn!(set, error = %e, "Failed to read oscillation set");
                    OscillationSet {
                        set,
                        data: None,
                        error: Some(format!("Failed to get oscillation {set} data: {e}")),
                    }
                }
            };
            results.push(entry);
        }

        let failed = results.iter().filter(|r| r.error.is_some()).count();
        info!(sets, failed, "Oscillation collection finished");
        Ok(results)
    }
}
