//! Event parser for reassembled stream frames
//!
//! A frame is a block of lines. Only `data: ` lines carry a JSON payload;
//! blank lines and `:` comment lines (keep-alives) are ignored. Each payload
//! must carry the reading field for the active mode (`distance` or `count`),
//! otherwise it is a control message and is skipped without complaint.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::types::{ExperimentMode, RawOscillationSample, RawReading, RawSample};

/// Prefix marking a payload line.
const DATA_PREFIX: &str = "data: ";

/// JSON body of one device event. All fields optional so control messages parse.
#[derive(Debug, Deserialize)]
struct DevicePayload {
    #[serde(default)]
    distance: Option<u16>,
    #[serde(default)]
    count: Option<i64>,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    sample: Option<u64>,
}

/// Parse every data line of a frame, in order.
///
/// Malformed lines are dropped individually; they never hide later lines.
pub fn parse_frame(frame: &str, mode: ExperimentMode) -> Vec<RawReading> {
    frame
        .split('\n')
        .filter_map(|line| parse_line(line, mode))
        .collect()
}

/// Parse a single line into a reading for `mode`, or nothing.
pub fn parse_line(line: &str, mode: ExperimentMode) -> Option<RawReading> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return None;
    }

    let json = line.strip_prefix(DATA_PREFIX)?;

    let payload: DevicePayload = match serde_json::from_str(json) {
        Ok(p) => p,
        Err(e) => {
            warn!(payload = %json, error = %e, "Invalid JSON from device, dropping line");
            return None;
        }
    };

    let sample_index = payload.sample.unwrap_or(0);

    match mode {
        ExperimentMode::Distance => {
            let distance_mm = payload.distance?;
            let Some(timestamp_ms) = payload.timestamp else {
                warn!(sample = sample_index, "Distance event without timestamp, dropping line");
                return None;
            };
            Some(RawReading::Distance(RawSample {
                distance_mm,
                timestamp_ms,
                sample_index,
            }))
        }
        ExperimentMode::Count => {
            let count = payload.count?;
            let Some(timestamp_ms) = payload.timestamp else {
                warn!(sample = sample_index, "Count event without timestamp, dropping line");
                return None;
            };
            debug!(sample = sample_index, count, "Parsed oscillation event");
            Some(RawReading::Oscillation(RawOscillationSample {
                count,
                timestamp_ms,
                sample_index,
            }))
        }
    }
}
