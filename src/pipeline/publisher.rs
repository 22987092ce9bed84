//! Live Publisher
//!
//! Turns one device event stream into a sequence of [`LiveEvent`]s:
//! chunks -> [`FrameReassembler`] -> [`parse_frame`] -> [`SampleProcessor`].
//!
//! Each call to [`LivePublisher::subscribe`] opens its own device connection
//! and owns its own processor. The sequence ends in one of three ways:
//!
//! | Cause | Last event |
//! |---|---|
//! | cancellation or subscriber drop | none |
//! | inactivity timeout | `Error("Stream timeout")` |
//! | non-200, transport failure, device EOF | `Error(..)` |

use async_stream::stream;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::acquisition::{parse_frame, DeviceApi, FrameReassembler};
use crate::physics_engine::SampleProcessor;
use crate::types::LiveEvent;

pub const STREAM_TIMEOUT_MESSAGE: &str = "Stream timeout";
pub const STREAM_ENDED_MESSAGE: &str = "Device stream ended";

/// Factory for live sample streams from one device.
#[derive(Clone)]
pub struct LivePublisher {
    device: Arc<dyn DeviceApi>,
    sessions: watch::Receiver<u64>,
    read_timeout: Duration,
    max_buffer_chars: usize,
}

impl LivePublisher {
    pub fn new(
        device: Arc<dyn DeviceApi>,
        sessions: watch::Receiver<u64>,
        read_timeout: Duration,
        max_buffer_chars: usize,
    ) -> Self {
        Self {
            device,
            sessions,
            read_timeout,
            max_buffer_chars,
        }
    }

    /// Open a fresh device connection and stream processed samples from it.
    ///
    /// `processor` is owned by the returned stream and reset whenever the
    /// controller starts a new session.
    pub fn subscribe<P: SampleProcessor>(
        &self,
        processor: P,
        cancel: CancellationToken,
    ) -> impl Stream<Item = LiveEvent<P::Output>> + Send + 'static {
        let device = Arc::clone(&self.device);
        let mut sessions = self.sessions.clone();
        let read_timeout = self.read_timeout;
        let max_buffer_chars = self.max_buffer_chars;

        stream! {
            let mut processor = processor;
            let mode = processor.mode();
            sessions.borrow_and_update();

            let opened = tokio::select! {
                _ = cancel.cancelled() => {
                    info!(%mode, "Live stream cancelled before connecting");
                    return;
                }
                opened = tokio::time::timeout(read_timeout, device.open_stream()) => opened,
            };

            // The device may accept the connection and never answer
            let mut chunks = match opened {
                Ok(Ok(chunks)) => chunks,
                Ok(Err(e)) => {
                    error!(device = device.base_url(), error = %e, "Failed to open device stream");
                    yield LiveEvent::Error(e.to_string());
                    return;
                }
                Err(_) => {
                    error!(
                        device = device.base_url(),
                        timeout_secs = read_timeout.as_secs(),
                        "Device stream did not respond"
                    );
                    yield LiveEvent::Error(STREAM_TIMEOUT_MESSAGE.to_string());
                    return;
                }
            };

            info!(device = device.base_url(), %mode, "Connected to device stream");
            let mut frames = FrameReassembler::new(max_buffer_chars);
            let mut emitted = 0u64;

            loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => {
                        info!(%mode, emitted, "Live stream cancelled by subscriber");
                        break;
                    }
                    next = tokio::time::timeout(read_timeout, chunks.next()) => next,
                };

                let chunk = match next {
                    Ok(Some(Ok(chunk))) => chunk,
                    Ok(Some(Err(e))) => {
                        error!(error = %e, emitted, "Device stream failed");
                        yield LiveEvent::Error(e.to_string());
                        break;
                    }
                    Ok(None) => {
                        warn!(emitted, "Device closed the stream");
                        yield LiveEvent::Error(STREAM_ENDED_MESSAGE.to_string());
                        break;
                    }
                    Err(_) => {
                        error!(
                            timeout_secs = read_timeout.as_secs(),
                            emitted,
                            "Device stream timeout"
                        );
                        yield LiveEvent::Error(STREAM_TIMEOUT_MESSAGE.to_string());
                        break;
                    }
                };

                if sessions.has_changed().unwrap_or(false) {
                    let epoch = *sessions.borrow_and_update();
                    debug!(epoch, "New session, resetting processor");
                    processor.reset();
                }

                for frame in frames.push(&chunk) {
                    for reading in parse_frame(&frame, mode) {
                        if let Some(sample) = processor.process_reading(&reading) {
                            debug!(sample = reading.sample_index(), "Emitting sample");
                            emitted += 1;
                            yield LiveEvent::Message(sample);
                        }
                    }
                }
            }

            let stats = frames.stats();
            debug!(
                frames = stats.frames,
                dropped_chunks = stats.dropped_chunks,
                overflows = stats.overflows,
                "Live stream closed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::{ChunkStream, DeviceError};
    use crate::physics_engine::{OscillationCounter, SignalProcessor};
    use crate::types::{DeviceStatus, ExperimentConfig, ProcessedSample, SampleQuality};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Device whose stream is a fixed list of chunks, optionally hanging at the end.
    struct ScriptedDevice {
        chunks: Mutex<Option<Vec<Result<Vec<u8>, DeviceError>>>>,
        hang_after: bool,
        stall_open: bool,
        open_error: Option<u16>,
    }

    impl ScriptedDevice {
        fn new(chunks: Vec<&str>) -> Self {
            Self {
                chunks: Mutex::new(Some(
                    chunks.into_iter().map(|c| Ok(c.as_bytes().to_vec())).collect(),
                )),
                hang_after: false,
                stall_open: false,
                open_error: None,
            }
        }

        fn hanging(mut self) -> Self {
            self.hang_after = true;
            self
        }
    }

    #[async_trait]
    impl DeviceApi for ScriptedDevice {
        async fn status(&self) -> Result<DeviceStatus, DeviceError> {
            Ok(DeviceStatus::default())
        }
        async fn configure(&self, _: &ExperimentConfig) -> Result<serde_json::Value, DeviceError> {
            Ok(serde_json::Value::Null)
        }
        async fn start(&self) -> Result<(), DeviceError> {
            Ok(())
        }
        async fn stop(&self) -> Result<(), DeviceError> {
            Ok(())
        }
        async fn reset_counter(&self) -> Result<(), DeviceError> {
            Ok(())
        }
        async fn start_oscillation(&self) -> Result<(), DeviceError> {
            Ok(())
        }
        async fn data(&self) -> Result<serde_json::Value, DeviceError> {
            Ok(serde_json::Value::Null)
        }
        async fn oscillation_data(&self) -> Result<serde_json::Value, DeviceError> {
            Ok(serde_json::Value::Null)
        }

        async fn open_stream(&self) -> Result<ChunkStream, DeviceError> {
            if let Some(code) = self.open_error {
                return Err(DeviceError::Status(code));
            }
            if self.stall_open {
                futures::future::pending::<()>().await;
            }
            let chunks = self.chunks.lock().unwrap().take().unwrap_or_default();
            let body = futures::stream::iter(chunks);
            if self.hang_after {
                Ok(body.chain(futures::stream::pending()).boxed())
            } else {
                Ok(body.boxed())
            }
        }

        fn base_url(&self) -> &str {
            "mock://scripted"
        }
    }

    fn publisher(device: ScriptedDevice, timeout: Duration) -> (LivePublisher, watch::Sender<u64>) {
        let (tx, rx) = watch::channel(0);
        (LivePublisher::new(Arc::new(device), rx, timeout, 10_000), tx)
    }

    fn samples(events: &[LiveEvent<ProcessedSample>]) -> Vec<&ProcessedSample> {
        events
            .iter()
            .filter_map(|e| match e {
                LiveEvent::Message(s) => Some(s),
                LiveEvent::Error(_) => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_emits_samples_then_end_of_stream_error() {
        let device = ScriptedDevice::new(vec![
            ": keep-alive\n\n",
            "data: {\"distance\": 200, \"timestamp\": 0, \"sample\": 1}\n\ndata: {\"dist",
            "ance\": 65535, \"timestamp\": 100, \"sample\": 2}\n\n",
        ]);
        let (publisher, _tx) = publisher(device, Duration::from_secs(5));

        let events: Vec<_> = publisher
            .subscribe(SignalProcessor::default(), CancellationToken::new())
            .collect()
            .await;

        let out = samples(&events);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].sample_index, 1);
        assert_eq!(out[1].raw_distance_mm, 65535);
        assert_eq!(out[1].sample_quality, SampleQuality::Interpolated);
        assert_eq!(events.last(), Some(&LiveEvent::Error(STREAM_ENDED_MESSAGE.to_string())));
        assert_eq!(events.iter().filter(|e| e.is_error()).count(), 1);
    }

    #[tokio::test]
    async fn test_open_failure_is_single_error_event() {
        let mut device = ScriptedDevice::new(vec![]);
        device.open_error = Some(503);
        let (publisher, _tx) = publisher(device, Duration::from_secs(5));

        let events: Vec<_> = publisher
            .subscribe(SignalProcessor::default(), CancellationToken::new())
            .collect()
            .await;

        assert_eq!(events, vec![LiveEvent::Error("Device returned status 503".to_string())]);
    }

    #[tokio::test]
    async fn test_unanswered_open_times_out() {
        let mut device = ScriptedDevice::new(vec![]);
        device.stall_open = true;
        let (publisher, _tx) = publisher(device, Duration::from_millis(50));

        let events: Vec<_> = publisher
            .subscribe(SignalProcessor::default(), CancellationToken::new())
            .collect()
            .await;

        assert_eq!(events, vec![LiveEvent::Error(STREAM_TIMEOUT_MESSAGE.to_string())]);
    }

    #[tokio::test]
    async fn test_inactivity_timeout_reported() {
        let device =
            ScriptedDevice::new(vec!["data: {\"distance\": 10, \"timestamp\": 1}\n\n"]).hanging();
        let (publisher, _tx) = publisher(device, Duration::from_millis(50));

        let events: Vec<_> = publisher
            .subscribe(SignalProcessor::default(), CancellationToken::new())
            .collect()
            .await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[1], LiveEvent::Error(STREAM_TIMEOUT_MESSAGE.to_string()));
    }

    #[tokio::test]
    async fn test_cancellation_ends_without_error() {
        let device =
            ScriptedDevice::new(vec!["data: {\"distance\": 10, \"timestamp\": 1}\n\n"]).hanging();
        let (publisher, _tx) = publisher(device, Duration::from_secs(60));
        let cancel = CancellationToken::new();

        let mut stream = Box::pin(publisher.subscribe(SignalProcessor::default(), cancel.clone()));
        let first = stream.next().await;
        assert!(matches!(first, Some(LiveEvent::Message(_))));

        cancel.cancel();
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_new_session_resets_processor() {
        let device = ScriptedDevice::new(vec![
            "data: {\"distance\": 100, \"timestamp\": 0}\n\n",
            "data: {\"distance\": 65535, \"timestamp\": 100}\n\n",
        ])
        .hanging();
        let (publisher, tx) = publisher(device, Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let mut stream = Box::pin(publisher.subscribe(SignalProcessor::default(), cancel.clone()));

        assert!(matches!(stream.next().await, Some(LiveEvent::Message(_))));

        // A sentinel right after a reset has no history and is dropped
        tx.send_modify(|e| *e += 1);
        let next = tokio::time::timeout(Duration::from_millis(100), stream.next()).await;
        assert!(next.is_err(), "sentinel after reset must not produce a sample");
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_count_mode_stream() {
        let device = ScriptedDevice::new(vec![
            "data: {\"count\": 1, \"timestamp\": 1500, \"sample\": 1}\n\n",
            concat!(
                "data: {\"distance\": 5, \"timestamp\": 1600}\n\n",
                "data: {\"count\": 2, \"timestamp\": 2750, \"sample\": 2}\n\n",
            ),
        ]);
        let (publisher, _tx) = publisher(device, Duration::from_secs(5));

        let events: Vec<_> = publisher
            .subscribe(OscillationCounter::new(), CancellationToken::new())
            .collect()
            .await;

        assert_eq!(events.len(), 3);
        match &events[1] {
            LiveEvent::Message(s) => {
                assert_eq!(s.count, 2);
                assert_eq!(s.time_s, 2.75);
            }
            other => panic!("expected message, got {other:?}"),
        }
    }
}
