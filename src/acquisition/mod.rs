//! Sensor data acquisition module
//!
//! Handles the device's HTTP API and turns its chunked event stream into
//! raw readings: bytes -> frames ([`frame`]) -> readings ([`event_parser`]).

pub mod device;
pub mod event_parser;
pub mod frame;

pub use device::{ChunkStream, DeviceApi, DeviceClient, DeviceError};
pub use event_parser::{parse_frame, parse_line};
pub use frame::{FrameReassembler, FrameStats};
