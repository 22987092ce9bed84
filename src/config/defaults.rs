//! System-wide default constants.
//!
//! Centralises magic numbers used by the pipeline and the device client.
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Device
// ============================================================================

/// Base URL of the sensor device on the lab network.
pub const DEVICE_BASE_URL: &str = "http://192.168.137.15";

/// Timeout for configure/start/stop/data requests (seconds).
pub const DEVICE_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Timeout for status probes and quick commands (seconds).
pub const DEVICE_STATUS_TIMEOUT_SECS: u64 = 5;

/// Maximum silence on the event stream before it is declared dead (seconds).
pub const STREAM_READ_TIMEOUT_SECS: u64 = 300;

/// Sample buffer capacity assumed when the device has not advertised one.
pub const DEFAULT_MAX_SAMPLES: u64 = 2_000;

// ============================================================================
// Stream Processing
// ============================================================================

/// Characters buffered without a frame delimiter before the buffer is dropped.
pub const MAX_FRAME_BUFFER_CHARS: usize = 10_000;

/// Moving-average window capacity (samples).
pub const SMOOTHING_WINDOW: usize = 5;

/// Samples needed in the window before averaging kicks in.
pub const MIN_SMOOTHING_SAMPLES: usize = 3;

// ============================================================================
// Collection Workflows
// ============================================================================

/// Status polls while waiting for a displacement run to finish.
pub const MAX_STATUS_POLLS: u32 = 120;

/// Delay between status polls (milliseconds).
pub const STATUS_POLL_INTERVAL_MS: u64 = 500;

/// Wait between arming an oscillation set and reading it back (seconds).
pub const OSCILLATION_SETTLE_SECS: u64 = 3;

/// Upper bound on oscillation sets per collection request.
pub const MAX_OSCILLATION_SETS: u32 = 10;

// ============================================================================
// Server
// ============================================================================

/// HTTP bind address for the relay server.
pub const SERVER_ADDR: &str = "0.0.0.0:5000";
