//! Rig Configuration - device addresses, timeouts and stream tuning as TOML values
//!
//! Each struct implements `Default` with the values in [`super::defaults`],
//! so a missing file or a partial file behaves exactly like the built-ins.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "LABRIG_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "rig_config.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one relay deployment.
///
/// Load with `RigConfig::load()` which searches:
/// 1. `$LABRIG_CONFIG` env var
/// 2. `./rig_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RigConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Distance sensor device
    #[serde(default)]
    pub device: DeviceConfig,

    /// Oscillation counter device (shares the distance device unless set)
    #[serde(default)]
    pub oscillation_device: OscillationDeviceConfig,

    /// Frame buffering and smoothing
    #[serde(default)]
    pub stream: StreamConfig,

    /// Polling workflows for batch collection
    #[serde(default)]
    pub collection: CollectionConfig,
}

impl RigConfig {
    /// Load configuration using the standard search order:
    /// 1. `$LABRIG_CONFIG` environment variable
    /// 2. `./rig_config.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded rig config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(
                            path = %p.display(),
                            error = %e,
                            "Failed to load config from {}, falling back",
                            CONFIG_ENV_VAR
                        );
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        // 2. Check ./rig_config.toml
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded rig config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        // 3. Defaults
        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    ///
    /// Unknown keys are logged as warnings; invalid values are an error.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;

        // Two-pass: check for unknown keys first (warnings only)
        for w in super::validation::validate_unknown_keys(&contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// URL of the oscillation counter device.
    pub fn oscillation_base_url(&self) -> &str {
        self.oscillation_device
            .base_url
            .as_deref()
            .unwrap_or(&self.device.base_url)
    }

    /// Validate all values for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (errors, warnings) = super::validation::validate_ranges(self);
        for w in &warnings {
            warn!("{}", w);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Server Config
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server bind address.
    ///
    /// Can be overridden by `LABRIG_SERVER_ADDR` env var or `--addr` CLI flag.
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

fn default_server_addr() -> String {
    defaults::SERVER_ADDR.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
        }
    }
}

// ============================================================================
// Device Config
// ============================================================================

/// Where the sensor lives and how long to wait for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_device_url")]
    pub base_url: String,

    /// Timeout for configure/start/stop/data calls (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Timeout for status probes (seconds).
    #[serde(default = "default_status_timeout")]
    pub status_timeout_secs: u64,

    /// Stream inactivity limit (seconds).
    #[serde(default = "default_stream_read_timeout")]
    pub stream_read_timeout_secs: u64,

    /// Capacity assumed until the device reports `max_samples`.
    #[serde(default = "default_max_samples")]
    pub default_max_samples: u64,
}

fn default_device_url() -> String {
    defaults::DEVICE_BASE_URL.to_string()
}

fn default_request_timeout() -> u64 {
    defaults::DEVICE_REQUEST_TIMEOUT_SECS
}

fn default_status_timeout() -> u64 {
    defaults::DEVICE_STATUS_TIMEOUT_SECS
}

fn default_stream_read_timeout() -> u64 {
    defaults::STREAM_READ_TIMEOUT_SECS
}

fn default_max_samples() -> u64 {
    defaults::DEFAULT_MAX_SAMPLES
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            base_url: default_device_url(),
            request_timeout_secs: default_request_timeout(),
            status_timeout_secs: default_status_timeout(),
            stream_read_timeout_secs: default_stream_read_timeout(),
            default_max_samples: default_max_samples(),
        }
    }
}

/// Oscillation counter device address.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OscillationDeviceConfig {
    /// Falls back to `device.base_url` when unset.
    #[serde(default)]
    pub base_url: Option<String>,
}

// ============================================================================
// Stream Config
// ============================================================================

/// Frame buffering and smoothing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Characters buffered without a delimiter before the buffer is dropped.
    #[serde(default = "default_max_buffer_chars")]
    pub max_buffer_chars: usize,

    /// Moving-average window capacity.
    #[serde(default = "default_smoothing_window")]
    pub smoothing_window: usize,

    /// Samples required before the moving average is applied.
    #[serde(default = "default_min_smoothing_samples")]
    pub min_smoothing_samples: usize,
}

fn default_max_buffer_chars() -> usize {
    defaults::MAX_FRAME_BUFFER_CHARS
}

fn default_smoothing_window() -> usize {
    defaults::SMOOTHING_WINDOW
}

fn default_min_smoothing_samples() -> usize {
    defaults::MIN_SMOOTHING_SAMPLES
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_buffer_chars: default_max_buffer_chars(),
            smoothing_window: default_smoothing_window(),
            min_smoothing_samples: default_min_smoothing_samples(),
        }
    }
}

// ============================================================================
// Collection Config
// ============================================================================

/// Batch collection polling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    #[serde(default = "default_max_status_polls")]
    pub max_status_polls: u32,

    #[serde(default = "default_status_poll_interval")]
    pub status_poll_interval_ms: u64,

    #[serde(default = "default_oscillation_settle")]
    pub oscillation_settle_secs: u64,

    #[serde(default = "default_max_oscillation_sets")]
    pub max_oscillation_sets: u32,
}

fn default_max_status_polls() -> u32 {
    defaults::MAX_STATUS_POLLS
}

fn default_status_poll_interval() -> u64 {
    defaults::STATUS_POLL_INTERVAL_MS
}

fn default_oscillation_settle() -> u64 {
    defaults::OSCILLATION_SETTLE_SECS
}

fn default_max_oscillation_sets() -> u32 {
    defaults::MAX_OSCILLATION_SETS
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            max_status_polls: default_max_status_polls(),
            status_poll_interval_ms: default_status_poll_interval(),
            oscillation_settle_secs: default_oscillation_settle(),
            max_oscillation_sets: default_max_oscillation_sets(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_validates() {
        let config = RigConfig::default();
        assert!(config.validate().is_ok(), "Default config must always validate");
    }

    #[test]
    fn test_empty_toml_produces_defaults() {
        let config: RigConfig = toml::from_str("").expect("empty TOML should parse");
        assert_eq!(config.device.default_max_samples, 2_000);
        assert_eq!(config.stream.max_buffer_chars, 10_000);
        assert_eq!(config.stream.smoothing_window, 5);
        assert_eq!(config.server.addr, "0.0.0.0:5000");
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config: RigConfig = toml::from_str(
            r#"
[device]
base_url = "http://10.1.1.20"
"#,
        )
        .unwrap();
        assert_eq!(config.device.base_url, "http://10.1.1.20");
        assert_eq!(config.device.request_timeout_secs, 10);
        assert_eq!(config.oscillation_base_url(), "http://10.1.1.20");
    }

    #[test]
    fn test_oscillation_device_override() {
        let mut config = RigConfig::default();
        config.oscillation_device.base_url = Some("http://10.1.1.21".into());
        assert_eq!(config.oscillation_base_url(), "http://10.1.1.21");
    }

    #[test]
    fn test_roundtrip_through_file() {
        let mut config = RigConfig::default();
        config.device.default_max_samples = 4_000;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_toml().unwrap().as_bytes()).unwrap();

        let loaded = RigConfig::load_from_file(file.path()).unwrap();
        assert_eq!(loaded.device.default_max_samples, 4_000);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[stream]\nsmoothing_window = 0\n").unwrap();

        let err = RigConfig::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = RigConfig::load_from_file(Path::new("/nonexistent/rig_config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_, _)));
    }
}
