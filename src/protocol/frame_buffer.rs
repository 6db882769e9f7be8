//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `Hunting`: Discarding bytes until a `0x7E` delimiter shows up
//! - `WaitingForLength`: Delimiter seen, need the 2 length bytes
//! - `WaitingForPayload`: Length parsed, need N more payload bytes
//!
//! # Example
//!
//! ```
//! use xbee_net::protocol::FrameBuffer;
//!
//! let mut buffer = FrameBuffer::new();
//!
//! // Noise, then one frame split across two reads
//! assert!(buffer.push(&[0x01, 0x02, 0x7E, 0x00]).is_empty());
//! let frames = buffer.push(&[0x02, b'h', b'i']);
//!
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].payload(), b"hi");
//! assert_eq!(buffer.discarded(), 2);
//! ```

use bytes::BytesMut;

use super::wire_format::{decode_length, DELIMITER, LENGTH_SIZE};
use super::Frame;

/// Default initial capacity of the accumulation buffer.
const DEFAULT_CAPACITY: usize = 4 * 1024;

/// State machine for frame parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Looking for the next delimiter.
    Hunting,
    /// Delimiter consumed, waiting for the length field.
    WaitingForLength,
    /// Length parsed, waiting for payload bytes.
    WaitingForPayload { length: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
///
/// Bytes that arrive outside a frame (before a delimiter) are dropped and
/// counted. Inside a payload `0x7E` is ordinary data; there is no escaping.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Bytes dropped while hunting for a delimiter.
    discarded: u64,
}

impl FrameBuffer {
    /// Create a new frame buffer with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new frame buffer with a custom initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            state: State::Hunting,
            discarded: 0,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Partial data is kept for the next push.
    pub fn push(&mut self, data: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one() {
            frames.push(frame);
        }
        frames
    }

    /// Try to extract a single frame from the buffer.
    fn try_extract_one(&mut self) -> Option<Frame> {
        loop {
            match self.state {
                State::Hunting => {
                    match self.buffer.iter().position(|&b| b == DELIMITER) {
                        Some(pos) => {
                            self.discarded += pos as u64;
                            let _ = self.buffer.split_to(pos + 1);
                            self.state = State::WaitingForLength;
                        }
                        None => {
                            self.discarded += self.buffer.len() as u64;
                            self.buffer.clear();
                            return None;
                        }
                    }
                }

                State::WaitingForLength => {
                    if self.buffer.len() < LENGTH_SIZE {
                        return None;
                    }
                    let length = decode_length([self.buffer[0], self.buffer[1]]) as usize;
                    let _ = self.buffer.split_to(LENGTH_SIZE);
                    self.state = State::WaitingForPayload { length };
                }

                State::WaitingForPayload { length } => {
                    if self.buffer.len() < length {
                        return None;
                    }
                    let payload = self.buffer.split_to(length).freeze();
                    self.state = State::Hunting;
                    return Some(Frame::new(payload));
                }
            }
        }
    }

    /// Number of buffered bytes not yet part of a returned frame.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// True while a frame has been started but not completed.
    pub fn in_frame(&self) -> bool {
        self.state != State::Hunting
    }

    /// Total bytes discarded while hunting for a delimiter.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::Hunting;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::Hunting => "Hunting",
            State::WaitingForLength => "WaitingForLength",
            State::WaitingForPayload { .. } => "WaitingForPayload",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
