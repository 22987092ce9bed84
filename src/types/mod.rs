//! Shared data structures for the measurement rig pipeline
//!
//! - Raw device readings: `RawSample`, `RawOscillationSample`
//! - Derived outputs: `ProcessedSample`, `OscillationSample`
//! - Control plane: `ExperimentConfig`, `DeviceStatus`
//! - Subscriber-facing events: `LiveEvent`

mod experiment;
mod live;
mod sample;

pub use experiment::*;
pub use live::*;
pub use sample::*;
