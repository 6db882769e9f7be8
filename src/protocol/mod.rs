//! Protocol module - envelope format, framing, and frame I/O.
//!
//! This module implements the byte-level side of a client link:
//! - 3-byte envelope encoding (`0x7E`, 16-bit big-endian length)
//! - Frame buffer for accumulating partial reads and resynchronising on noise
//! - Frame reader/sender over any async byte stream
//! - Per-client receive buffer pool

mod frame;
mod frame_buffer;
mod frame_pool;
mod stream;
mod wire_format;

pub use frame::{build_frame, build_frame_parts, Frame};
pub use frame_buffer::FrameBuffer;
pub use frame_pool::FramePool;
pub use stream::{send_frame, FrameReader};
pub use wire_format::{
    decode_length, encode_envelope, encode_length, DELIMITER, ENVELOPE_SIZE, LENGTH_SIZE,
    MAX_PAYLOAD_SIZE,
};
