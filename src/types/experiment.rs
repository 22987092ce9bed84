//! Experiment configuration and device status types

use serde::{Deserialize, Serialize};

/// What the sensor measures during an experiment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentMode {
    /// Range finder: distance in mm per sample
    #[default]
    Distance,
    /// Oscillation counter: cumulative pass count per sample
    Count,
}

impl ExperimentMode {
    /// JSON field that carries the reading for this mode.
    pub fn payload_field(&self) -> &'static str {
        match self {
            Self::Distance => "distance",
            Self::Count => "count",
        }
    }
}

impl std::fmt::Display for ExperimentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.payload_field())
    }
}

/// Sampling parameters sent to the device's `/configure` endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExperimentConfig {
    #[serde(rename = "frequency")]
    pub frequency_hz: u32,
    #[serde(rename = "duration")]
    pub duration_s: u32,
    #[serde(default)]
    pub mode: ExperimentMode,
}

impl ExperimentConfig {
    pub fn new(frequency_hz: u32, duration_s: u32, mode: ExperimentMode) -> Self {
        Self {
            frequency_hz,
            duration_s,
            mode,
        }
    }

    /// Number of samples the device must buffer to run this experiment.
    pub fn required_samples(&self) -> u64 {
        u64::from(self.frequency_hz) * u64::from(self.duration_s)
    }
}

/// Result of probing the device's `/status` endpoint.
///
/// An unreachable device is reported as `connected: false` rather than an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DeviceStatus {
    pub connected: bool,
    pub ready: bool,
    /// Buffer capacity the device advertised, if it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_samples: Option<u64>,
    /// Oscillation counter total, if the device reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_count: Option<i64>,
    /// Raw status payload as the device sent it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_info: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeviceStatus {
    pub fn disconnected(error: Option<String>) -> Self {
        Self {
            error,
            ..Self::default()
        }
    }

    /// Build a status from the device's JSON body.
    ///
    /// `ready` defaults to true when the device omits it.
    pub fn from_device_info(info: serde_json::Value) -> Self {
        let ready = info.get("ready").and_then(|v| v.as_bool()).unwrap_or(true);
        let max_samples = info.get("max_samples").and_then(|v| v.as_u64());
        let current_count = info.get("total_count").and_then(|v| v.as_i64());
        Self {
            connected: true,
            ready,
            max_samples,
            current_count,
            device_info: Some(info),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_samples_does_not_overflow() {
        let cfg = ExperimentConfig::new(u32::MAX, u32::MAX, ExperimentMode::Distance);
        assert_eq!(cfg.required_samples(), u64::from(u32::MAX) * u64::from(u32::MAX));
    }

    #[test]
    fn test_config_wire_format() {
        let cfg = ExperimentConfig::new(50, 10, ExperimentMode::Count);
        let v = serde_json::to_value(cfg).unwrap();
        assert_eq!(v, serde_json::json!({"frequency": 50, "duration": 10, "mode": "count"}));

        let parsed: ExperimentConfig =
            serde_json::from_str(r#"{"frequency": 20, "duration": 5}"#).unwrap();
        assert_eq!(parsed.mode, ExperimentMode::Distance);
    }

    #[test]
    fn test_status_from_device_info() {
        let status = DeviceStatus::from_device_info(serde_json::json!({
            "max_samples": 1500,
            "total_count": 12
        }));
        assert!(status.connected);
        assert!(status.ready);
        assert_eq!(status.max_samples, Some(1500));
        assert_eq!(status.current_count, Some(12));
    }
}
