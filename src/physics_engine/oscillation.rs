//! Oscillation counter readings
//!
//! Count mode carries no smoothing and no carried-forward state: each reading
//! is a timestamp conversion plus the device's running count.

use tracing::debug;

use crate::types::{ExperimentMode, OscillationSample, RawOscillationSample, RawReading};

use super::{round_to, SampleProcessor};

#[derive(Debug, Clone, Default)]
pub struct OscillationCounter {
    last_count: Option<i64>,
}

impl OscillationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, sample: &RawOscillationSample) -> OscillationSample {
        if let Some(last) = self.last_count {
            if sample.count < last {
                debug!(last, count = sample.count, "Oscillation counter went backwards (reset?)");
            }
        }
        self.last_count = Some(sample.count);

        OscillationSample {
            time_s: round_to(sample.timestamp_ms as f64 / 1000.0, 3),
            count: sample.count,
            sample_index: sample.sample_index,
        }
    }

    /// Count seen on the most recent reading.
    pub fn last_count(&self) -> Option<i64> {
        self.last_count
    }
}

impl SampleProcessor for OscillationCounter {
    type Output = OscillationSample;

    fn mode(&self) -> ExperimentMode {
        ExperimentMode::Count
    }

    fn process_reading(&mut self, reading: &RawReading) -> Option<OscillationSample> {
        match reading {
            RawReading::Oscillation(sample) => Some(self.process(sample)),
            RawReading::Distance(_) => None,
        }
    }

    fn reset(&mut self) {
        self.last_count = None;
    }
}
