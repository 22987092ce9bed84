//! Sample types: raw device readings and derived outputs

use serde::{Deserialize, Serialize};

/// Distance value the sensor reports when a reading failed.
pub const DISTANCE_ERROR_SENTINEL: u16 = 65535;

// ============================================================================
// Raw readings (device -> pipeline)
// ============================================================================

/// One distance reading as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSample {
    /// Range in millimetres; `65535` means the sensor failed this read
    pub distance_mm: u16,
    /// Device clock in milliseconds (monotonic-ish, may repeat or step back)
    pub timestamp_ms: i64,
    /// Device-side sample counter (0 when the device omits it)
    pub sample_index: u64,
}

impl RawSample {
    /// Whether this reading is the sensor's error sentinel.
    pub fn is_sensor_error(&self) -> bool {
        self.distance_mm == DISTANCE_ERROR_SENTINEL
    }
}

/// One oscillation-counter reading as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOscillationSample {
    pub count: i64,
    pub timestamp_ms: i64,
    pub sample_index: u64,
}

/// A parsed device reading of either shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawReading {
    Distance(RawSample),
    Oscillation(RawOscillationSample),
}

impl RawReading {
    pub fn sample_index(&self) -> u64 {
        match self {
            Self::Distance(s) => s.sample_index,
            Self::Oscillation(s) => s.sample_index,
        }
    }
}

// ============================================================================
// Processed outputs (pipeline -> subscribers)
// ============================================================================

/// Whether a processed sample came from a real reading or a substitution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SampleQuality {
    #[default]
    Good,
    /// Sensor reported an error; the last smoothed displacement was reused
    Interpolated,
}

/// Kinematic quantities derived from one distance reading.
///
/// Serialized with the field names the live dashboard consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedSample {
    /// Seconds on the device clock (3 decimals)
    #[serde(rename = "time")]
    pub time_s: f64,
    /// Smoothed displacement in metres (4 decimals)
    #[serde(rename = "displacement")]
    pub displacement_m: f64,
    /// m/s (3 decimals)
    #[serde(rename = "velocity")]
    pub velocity_m_s: f64,
    /// m/s² (3 decimals)
    #[serde(rename = "acceleration")]
    pub acceleration_m_s2: f64,
    /// Distance exactly as the device reported it, sentinel included
    pub raw_distance_mm: u16,
    pub sample_quality: SampleQuality,
    #[serde(rename = "sample")]
    pub sample_index: u64,
}

/// Oscillation counter reading converted to seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscillationSample {
    #[serde(rename = "time")]
    pub time_s: f64,
    pub count: i64,
    #[serde(rename = "sample")]
    pub sample_index: u64,
}
