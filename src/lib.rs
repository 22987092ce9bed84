//! labrig: measurement rig relay
//!
//! Configures a network-attached sensor, turns its chunked event stream into
//! smoothed kinematics and re-publishes the result to any number of clients.
//!
//! ## Architecture
//!
//! - **Acquisition**: device HTTP client, frame reassembly, event parsing
//! - **Physics Engine**: displacement/velocity/acceleration and oscillation counts
//! - **Pipeline**: experiment control and live stream publishing
//! - **API**: axum REST + SSE surface

pub mod acquisition;
pub mod api;
pub mod config;
pub mod physics_engine;
pub mod pipeline;
pub mod types;

// Re-export configuration
pub use config::RigConfig;

// Re-export commonly used types
pub use types::{
    DeviceStatus, ExperimentConfig, ExperimentMode, LiveEvent, OscillationSample,
    ProcessedSample, RawSample, SampleQuality,
};

pub use acquisition::{DeviceApi, DeviceClient, DeviceError, FrameReassembler};
pub use physics_engine::{OscillationCounter, SampleProcessor, SignalProcessor};
pub use pipeline::{ExperimentController, ExperimentError, LivePublisher};
