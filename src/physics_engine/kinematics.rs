//! Kinematics from a noisy range sensor
//!
//! Distance readings become displacement (m), velocity (m/s) and
//! acceleration (m/s²). Displacement is smoothed with a short moving average
//! before differentiation; velocity and acceleration are first differences
//! of the carried-forward state.
//!
//! ## State
//! One [`SignalProcessor`] owns the state for one streaming session. It is
//! reset whenever a new experiment is configured or started.

use std::collections::VecDeque;
use tracing::{debug, warn};

use crate::config::{defaults, StreamConfig};
use crate::types::{
    ExperimentMode, ProcessedSample, RawReading, RawSample, SampleQuality,
    DISTANCE_ERROR_SENTINEL,
};

use super::{round_to, SampleProcessor};

/// Stateful displacement/velocity/acceleration engine for distance mode.
#[derive(Debug, Clone)]
pub struct SignalProcessor {
    window: VecDeque<f64>,
    window_capacity: usize,
    min_smoothing_samples: usize,
    last_displacement_m: Option<f64>,
    last_velocity_m_s: Option<f64>,
    last_timestamp_s: Option<f64>,
}

impl Default for SignalProcessor {
    fn default() -> Self {
        Self::new(defaults::SMOOTHING_WINDOW, defaults::MIN_SMOOTHING_SAMPLES)
    }
}

impl SignalProcessor {
    /// Create a processor with a moving-average window of `window_capacity`
    /// samples, averaged once it holds `min_smoothing_samples`.
    pub fn new(window_capacity: usize, min_smoothing_samples: usize) -> Self {
        let window_capacity = window_capacity.max(1);
        Self {
            window: VecDeque::with_capacity(window_capacity),
            window_capacity,
            min_smoothing_samples: min_smoothing_samples.clamp(1, window_capacity),
            last_displacement_m: None,
            last_velocity_m_s: None,
            last_timestamp_s: None,
        }
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(config.smoothing_window, config.min_smoothing_samples)
    }

    /// Clear the window and all carried-forward values.
    pub fn reset(&mut self) {
        self.window.clear();
        self.last_displacement_m = None;
        self.last_velocity_m_s = None;
        self.last_timestamp_s = None;
    }

    /// Number of displacements currently in the smoothing window.
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Process one distance reading.
    ///
    /// Returns `None` only for a sensor-error reading with no history to
    /// fall back on. The returned sample has `sample_index = 0`; use
    /// [`SignalProcessor::process_sample`] to carry the device's index.
    pub fn process(&mut self, raw_distance_mm: u16, timestamp_ms: i64) -> Option<ProcessedSample> {
        let (effective_mm, quality) = if raw_distance_mm == DISTANCE_ERROR_SENTINEL {
            match self.last_displacement_m {
                Some(last) => {
                    warn!(timestamp_ms, "Sensor error reading, reusing last displacement");
                    (last * 1000.0, SampleQuality::Interpolated)
                }
                None => {
                    warn!(timestamp_ms, "Sensor error reading with no history, dropping sample");
                    return None;
                }
            }
        } else {
            (f64::from(raw_distance_mm), SampleQuality::Good)
        };

        let timestamp_s = timestamp_ms as f64 / 1000.0;
        let displacement_m = effective_mm / 1000.0;
        let smoothed = self.smooth(displacement_m);

        let mut velocity = 0.0;
        let mut acceleration = 0.0;

        if let (Some(last_t), Some(last_d)) = (self.last_timestamp_s, self.last_displacement_m) {
            let delta_t = timestamp_s - last_t;
            if delta_t > 0.0 {
                velocity = (smoothed - last_d) / delta_t;
                if let Some(last_v) = self.last_velocity_m_s {
                    acceleration = (velocity - last_v) / delta_t;
                }
            } else {
                debug!(delta_t, "Non-increasing timestamp, derivatives zeroed");
            }
        }

        self.last_displacement_m = Some(smoothed);
        self.last_velocity_m_s = Some(velocity);
        self.last_timestamp_s = Some(timestamp_s);

        Some(ProcessedSample {
            time_s: round_to(timestamp_s, 3),
            displacement_m: round_to(smoothed, 4),
            velocity_m_s: round_to(velocity, 3),
            acceleration_m_s2: round_to(acceleration, 3),
            raw_distance_mm,
            sample_quality: quality,
            sample_index: 0,
        })
    }

    /// Process a parsed reading, keeping its device sample index.
    pub fn process_sample(&mut self, sample: &RawSample) -> Option<ProcessedSample> {
        let mut out = self.process(sample.distance_mm, sample.timestamp_ms)?;
        out.sample_index = sample.sample_index;
        Some(out)
    }

    fn smooth(&mut self, displacement_m: f64) -> f64 {
        if self.window.len() == self.window_capacity {
            self.window.pop_front();
        }
        self.window.push_back(displacement_m);

        if self.window.len() >= self.min_smoothing_samples {
            self.window.iter().sum::<f64>() / self.window.len() as f64
        } else {
            displacement_m
        }
    }
}

impl SampleProcessor for SignalProcessor {
    type Output = ProcessedSample;

    fn mode(&self) -> ExperimentMode {
        ExperimentMode::Distance
    }

    fn process_reading(&mut self, reading: &RawReading) -> Option<ProcessedSample> {
        match reading {
            RawReading::Distance(sample) => self.process_sample(sample),
            RawReading::Oscillation(_) => None,
        }
    }

    fn reset(&mut self) {
        SignalProcessor::reset(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(processor: &mut SignalProcessor, input: &[(u16, i64)]) -> Vec<Option<ProcessedSample>> {
        input.iter().map(|&(d, t)| processor.process(d, t)).collect()
    }

    #[test]
    fn test_constant_distance_has_zero_derivatives() {
        let mut p = SignalProcessor::default();
        let out = run(&mut p, &[(100, 0), (100, 10), (100, 20), (100, 35), (100, 50)]);

        for sample in out.into_iter().map(Option::unwrap) {
            assert_eq!(sample.displacement_m, 0.1);
            assert_eq!(sample.velocity_m_s, 0.0);
            assert_eq!(sample.acceleration_m_s2, 0.0);
            assert_eq!(sample.sample_quality, SampleQuality::Good);
        }
    }

    #[test]
    fn test_sensor_error_substitutes_last_displacement() {
        let mut p = SignalProcessor::default();
        let first = p.process(200, 0).unwrap();
        assert_eq!(first.displacement_m, 0.2);

        let second = p.process(DISTANCE_ERROR_SENTINEL, 100).unwrap();
        assert_eq!(second.raw_distance_mm, 65535);
        assert!((second.displacement_m - 0.2).abs() < 1e-9);
        assert_eq!(second.sample_quality, SampleQuality::Interpolated);
        assert_eq!(second.velocity_m_s, 0.0);
    }

    #[test]
    fn test_first_sensor_error_is_dropped() {
        let mut p = SignalProcessor::default();
        assert!(p.process(DISTANCE_ERROR_SENTINEL, 0).is_none());
        assert_eq!(p.window_len(), 0);

        // Dropped sample leaves no history behind
        let next = p.process(150, 10).unwrap();
        assert_eq!(next.velocity_m_s, 0.0);
        assert_eq!(next.displacement_m, 0.15);
    }

    #[test]
    fn test_reset_makes_runs_identical() {
        let input = [
            (120, 0),
            (125, 20),
            (65535, 40),
            (131, 60),
            (140, 80),
            (150, 100),
            (149, 120),
        ];
        let mut p = SignalProcessor::default();

        let first = run(&mut p, &input);
        p.reset();
        let second = run(&mut p, &input);

        assert_eq!(first, second);
        assert_eq!(first.len(), input.len());
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut p = SignalProcessor::default();
        p.process(100, 0);
        p.reset();
        p.reset();
        assert_eq!(p.window_len(), 0);
        assert_eq!(p.process(300, 5).unwrap().displacement_m, 0.3);
    }

    #[test]
    fn test_non_positive_delta_t_zeroes_derivatives() {
        let mut p = SignalProcessor::default();
        p.process(100, 1000).unwrap();

        let duplicate = p.process(200, 1000).unwrap();
        assert_eq!(duplicate.velocity_m_s, 0.0);
        assert_eq!(duplicate.acceleration_m_s2, 0.0);

        let backwards = p.process(300, 900).unwrap();
        assert_eq!(backwards.velocity_m_s, 0.0);
        assert_eq!(backwards.acceleration_m_s2, 0.0);
    }

    #[test]
    fn test_smoothing_starts_at_third_sample() {
        let mut p = SignalProcessor::default();
        let out = run(&mut p, &[(100, 0), (200, 100), (300, 200)]);

        // First two pass through unsmoothed
        assert_eq!(out[0].as_ref().unwrap().displacement_m, 0.1);
        assert_eq!(out[1].as_ref().unwrap().displacement_m, 0.2);
        // Third is the mean of the window
        assert_eq!(out[2].as_ref().unwrap().displacement_m, 0.2);
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut p = SignalProcessor::default();
        for (i, d) in [100u16, 100, 100, 100, 100, 600].iter().enumerate() {
            p.process(*d, i as i64 * 100);
        }
        assert_eq!(p.window_len(), 5);

        // Pushing a second 600 evicts the oldest 100: mean of 100,100,100,600,600
        let out = p.process(600, 600).unwrap();
        assert_eq!(out.displacement_m, 0.3);
    }

    #[test]
    fn test_velocity_and_acceleration() {
        let mut p = SignalProcessor::new(5, 5);
        let a = p.process(100, 0).unwrap();
        let b = p.process(110, 100).unwrap();
        let c = p.process(130, 200).unwrap();

        assert_eq!(a.velocity_m_s, 0.0);
        // (0.110 - 0.100) / 0.1
        assert_eq!(b.velocity_m_s, 0.1);
        // First velocity is 0.0, so the second sample already has acceleration
        assert_eq!(b.acceleration_m_s2, 1.0);
        // (0.130 - 0.110) / 0.1 = 0.2; (0.2 - 0.1) / 0.1 = 1.0
        assert_eq!(c.velocity_m_s, 0.2);
        assert_eq!(c.acceleration_m_s2, 1.0);
    }

    #[test]
    fn test_output_rounding() {
        let mut p = SignalProcessor::default();
        let s = p.process(1234, 1_234_567).unwrap();
        assert_eq!(s.time_s, 1234.567);
        assert_eq!(s.displacement_m, 1.234);
    }

    #[test]
    fn test_process_sample_keeps_index() {
        let mut p = SignalProcessor::default();
        let out = p
            .process_sample(&RawSample { distance_mm: 50, timestamp_ms: 10, sample_index: 42 })
            .unwrap();
        assert_eq!(out.sample_index, 42);
    }

    #[test]
    fn test_ignores_oscillation_readings() {
        let mut p = SignalProcessor::default();
        let reading = RawReading::Oscillation(crate::types::RawOscillationSample {
            count: 3,
            timestamp_ms: 10,
            sample_index: 1,
        });
        assert!(p.process_reading(&reading).is_none());
    }
}
