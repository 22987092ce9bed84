//! Frame reassembly for the device's event stream
//!
//! The device writes `data: {...}\n\n` events over a chunked HTTP response.
//! Chunk boundaries are arbitrary: one chunk may hold several events, half an
//! event, or split a UTF-8 character. [`FrameReassembler`] buffers decoded
//! text and hands back every complete frame (the text before each `"\n\n"`).

use tracing::warn;

use crate::config::defaults::MAX_FRAME_BUFFER_CHARS;

/// Frame delimiter used by the device's event stream.
pub const FRAME_DELIMITER: &str = "\n\n";

/// Counters describing what the reassembler has dropped or emitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct FrameStats {
    pub frames: u64,
    pub dropped_chunks: u64,
    pub overflows: u64,
}

/// Accumulates raw byte chunks and splits them into delimited frames.
///
/// Never fails: undecodable chunks are dropped, and a buffer that grows past
/// `max_buffer_chars` without completing a frame is discarded.
#[derive(Debug)]
pub struct FrameReassembler {
    buffer: String,
    /// Trailing bytes of an incomplete UTF-8 sequence from the previous chunk
    partial_utf8: Vec<u8>,
    max_buffer_chars: usize,
    stats: FrameStats,
}

impl Default for FrameReassembler {
    fn default() -> Self {
        Self::new(MAX_FRAME_BUFFER_CHARS)
    }
}

impl FrameReassembler {
    pub fn new(max_buffer_chars: usize) -> Self {
        Self {
            buffer: String::with_capacity(1024),
            partial_utf8: Vec::new(),
            max_buffer_chars,
            stats: FrameStats::default(),
        }
    }

    /// Feed one chunk; returns every frame it completed, in stream order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        if !self.decode_into_buffer(chunk) {
            return Vec::new();
        }

        let frames = self.drain_frames();

        if self.buffer.len() > self.max_buffer_chars
            && self.buffer.chars().count() > self.max_buffer_chars
        {
            self.stats.overflows += 1;
            warn!(
                buffered_chars = self.buffer.chars().count(),
                limit = self.max_buffer_chars,
                "Frame buffer overflow without delimiter, clearing"
            );
            self.buffer.clear();
            self.partial_utf8.clear();
        }

        frames
    }

    /// Characters currently held waiting for a delimiter.
    pub fn buffered_chars(&self) -> usize {
        self.buffer.chars().count()
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Append the decoded chunk to the buffer. Returns false if it was dropped.
    fn decode_into_buffer(&mut self, chunk: &[u8]) -> bool {
        let joined;
        let bytes: &[u8] = if self.partial_utf8.is_empty() {
            chunk
        } else {
            let mut carried = std::mem::take(&mut self.partial_utf8);
            carried.extend_from_slice(chunk);
            joined = carried;
            &joined
        };

        match std::str::from_utf8(bytes) {
            Ok(text) => {
                self.buffer.push_str(text);
                true
            }
            // Incomplete sequence at the very end: keep it for the next chunk
            Err(e) if e.error_len().is_none() => {
                let valid = e.valid_up_to();
                // valid_up_to guarantees this prefix decodes
                self.buffer
                    .push_str(std::str::from_utf8(&bytes[..valid]).unwrap_or_default());
                self.partial_utf8 = bytes[valid..].to_vec();
                true
            }
            Err(e) => {
                self.stats.dropped_chunks += 1;
                warn!(
                    chunk_len = chunk.len(),
                    error = %e,
                    "Dropping undecodable stream chunk"
                );
                false
            }
        }
    }

    fn drain_frames(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        let mut consumed = 0;

        while let Some(pos) = self.buffer[consumed..].find(FRAME_DELIMITER) {
            frames.push(self.buffer[consumed..consumed + pos].to_string());
            consumed += pos + FRAME_DELIMITER.len();
        }

        if consumed > 0 {
            self.buffer.drain(..consumed);
        }
        self.stats.frames += frames.len() as u64;
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &str = ": keep-alive\n\n\
        data: {\"distance\": 120, \"timestamp\": 0, \"sample\": 1}\n\n\
        data: {\"distance\": 121, \"timestamp\": 20, \"sample\": 2}\n\n\
        data: {\"note\": \"µ-range ok\"}\n\n\
        data: {\"distance\": 65535, \"timestamp\": 40}\n\n";

    fn reassemble_all(chunks: &[&[u8]]) -> Vec<String> {
        let mut r = FrameReassembler::default();
        chunks.iter().flat_map(|c| r.push(c)).collect()
    }

    #[test]
    fn test_single_chunk_yields_all_frames() {
        let frames = reassemble_all(&[STREAM.as_bytes()]);
        assert_eq!(frames.len(), 5);
        assert_eq!(frames[0], ": keep-alive");
        assert!(frames[4].contains("65535"));
    }

    #[test]
    fn test_any_two_way_split_matches_single_chunk() {
        let bytes = STREAM.as_bytes();
        let expected = reassemble_all(&[bytes]);

        for split in 0..=bytes.len() {
            let (a, b) = bytes.split_at(split);
            assert_eq!(reassemble_all(&[a, b]), expected, "split at byte {split}");
        }
    }

    #[test]
    fn test_byte_at_a_time_matches_single_chunk() {
        let bytes = STREAM.as_bytes();
        let expected = reassemble_all(&[bytes]);
        let singles: Vec<&[u8]> = bytes.chunks(1).collect();
        assert_eq!(reassemble_all(&singles), expected);

        let threes: Vec<&[u8]> = bytes.chunks(3).collect();
        assert_eq!(reassemble_all(&threes), expected);
    }

    #[test]
    fn test_partial_frame_is_retained() {
        let mut r = FrameReassembler::default();
        assert!(r.push(b"data: {\"distance\": 1").is_empty());
        assert!(r.buffered_chars() > 0);

        let frames = r.push(b"00}\n\ndata: ");
        assert_eq!(frames, vec!["data: {\"distance\": 100}".to_string()]);
        assert_eq!(r.buffered_chars(), "data: ".len());
    }

    #[test]
    fn test_invalid_utf8_chunk_is_dropped() {
        let mut r = FrameReassembler::default();
        assert!(r.push(&[0xff, 0xfe, b'\n', b'\n']).is_empty());
        assert_eq!(r.stats().dropped_chunks, 1);

        // Stream keeps working after the bad chunk
        let frames = r.push(b"data: {}\n\n");
        assert_eq!(frames, vec!["data: {}".to_string()]);
    }

    #[test]
    fn test_overflow_clears_buffer_and_continues() {
        let mut r = FrameReassembler::new(10_000);
        let filler = vec![b'x'; 4_000];

        assert!(r.push(&filler).is_empty());
        assert!(r.push(&filler).is_empty());
        assert_eq!(r.stats().overflows, 0);
        assert!(r.push(&filler).is_empty());

        assert_eq!(r.stats().overflows, 1);
        assert_eq!(r.buffered_chars(), 0);

        let frames = r.push(b"data: {\"distance\": 5, \"timestamp\": 1}\n\n");
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_remainder_under_limit_after_frames_is_kept() {
        let mut r = FrameReassembler::new(16);
        let frames = r.push(b"short\n\nabcdefghij");
        assert_eq!(frames, vec!["short".to_string()]);
        assert_eq!(r.buffered_chars(), 10);
        assert_eq!(r.stats().overflows, 0);
    }
}
