//! Experiment pipeline
//!
//! - [`controller`] - configuration validation, run control, batch collection
//! - [`publisher`] - live streams: device chunks -> frames -> readings -> samples
//!
//! ## Data Flow
//!
//! ```text
//! ExperimentController::configure/start ──► device
//!          │ (session epoch)
//!          ▼
//! LivePublisher::subscribe ◄── GET /stream (chunked)
//!          │  FrameReassembler → parse_frame → SampleProcessor
//!          ▼
//!   LiveEvent::Message / LiveEvent::Error
//! ```

pub mod controller;
pub mod publisher;

pub use controller::{ConfigureOutcome, ExperimentController, ExperimentError, OscillationSet};
pub use publisher::LivePublisher;
