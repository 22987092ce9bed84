//! Physics Engine Module
//!
//! Deterministic per-sample calculations. All state is owned by a processor
//! instance and lives for one streaming session.
//!
//! - [`kinematics::SignalProcessor`] - distance mode: smoothing, velocity, acceleration
//! - [`oscillation::OscillationCounter`] - count mode: timestamp conversion

pub mod kinematics;
pub mod oscillation;

pub use kinematics::SignalProcessor;
pub use oscillation::OscillationCounter;

use serde::Serialize;

use crate::types::{ExperimentMode, RawReading};

/// A stateful converter from raw readings to subscriber-facing samples.
///
/// The live publisher is generic over this so both experiment modes share one
/// stream lifecycle.
pub trait SampleProcessor: Send + 'static {
    type Output: Serialize + Send + 'static;

    /// Which payload field this processor consumes.
    fn mode(&self) -> ExperimentMode;

    /// Convert one reading, or drop it.
    fn process_reading(&mut self, reading: &RawReading) -> Option<Self::Output>;

    /// Forget all carried-forward state.
    fn reset(&mut self);
}

/// Round half away from zero to `decimals` places.
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
