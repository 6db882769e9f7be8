//! Frame type and envelope building.
//!
//! A [`Frame`] is the payload of one envelope, with the delimiter and length
//! already stripped. Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use xbee_net::protocol::{build_frame, Frame};
//!
//! let bytes = build_frame(b"ABC").unwrap();
//! assert_eq!(&bytes[..], &[0x7E, 0x00, 0x03, b'A', b'B', b'C']);
//!
//! let frame = Frame::from_slice(b"ABC");
//! assert_eq!(frame.len(), 3);
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::{encode_envelope, ENVELOPE_SIZE, MAX_PAYLOAD_SIZE};
use crate::error::{Result, XbeeNetError};

/// One received frame payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    payload: Bytes,
}

impl Frame {
    /// Wrap an already-owned payload.
    ///
    /// The caller guarantees the payload fits the 16-bit length field; the
    /// parser only produces frames that do.
    pub fn new(payload: Bytes) -> Self {
        debug_assert!(payload.len() <= MAX_PAYLOAD_SIZE);
        Self { payload }
    }

    /// Create a frame by copying a slice.
    pub fn from_slice(payload: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(payload))
    }

    /// Payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Cheap clone of the payload.
    #[inline]
    pub fn payload_bytes(&self) -> Bytes {
        self.payload.clone()
    }

    /// Take the payload out of the frame.
    #[inline]
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Payload length.
    #[inline]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// True for a zero-length frame.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Build a complete enveloped frame as a single buffer.
///
/// # Errors
///
/// Returns `InvalidArgument` if the payload does not fit the 16-bit length.
pub fn build_frame(payload: &[u8]) -> Result<Bytes> {
    let length = checked_length(payload.len())?;
    let mut buf = BytesMut::with_capacity(ENVELOPE_SIZE + payload.len());
    buf.put_slice(&encode_envelope(length));
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Build an enveloped frame from several payload pieces without an
/// intermediate copy of each piece.
pub fn build_frame_parts(parts: &[&[u8]]) -> Result<Bytes> {
    let total: usize = parts.iter().map(|p| p.len()).sum();
    let length = checked_length(total)?;
    let mut buf = BytesMut::with_capacity(ENVELOPE_SIZE + total);
    buf.put_slice(&encode_envelope(length));
    for part in parts {
        buf.put_slice(part);
    }
    Ok(buf.freeze())
}

fn checked_length(len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| {
        XbeeNetError::InvalidArgument(format!(
            "Payload size {} exceeds maximum {}",
            len, MAX_PAYLOAD_SIZE
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DELIMITER;

    #[test]
    fn test_frame_accessors() {
        let frame = Frame::from_slice(b"hello");
        assert_eq!(frame.payload(), b"hello");
        assert_eq!(frame.len(), 5);
        assert!(!frame.is_empty());
        assert_eq!(frame.into_payload(), Bytes::from_static(b"hello"));
    }

    #[test]
    fn test_payload_bytes_zero_copy() {
        let original = Bytes::from_static(b"test data");
        let frame = Frame::new(original.clone());
        assert_eq!(frame.payload_bytes().as_ptr(), original.as_ptr());
    }

    #[test]
    fn test_build_frame() {
        let bytes = build_frame(b"ABC").unwrap();
        assert_eq!(&bytes[..], &[DELIMITER, 0x00, 0x03, b'A', b'B', b'C']);
    }

    #[test]
    fn test_build_frame_empty() {
        let bytes = build_frame(b"").unwrap();
        assert_eq!(&bytes[..], &[DELIMITER, 0x00, 0x00]);
    }

    #[test]
    fn test_build_frame_max_size() {
        let payload = vec![0x7E; MAX_PAYLOAD_SIZE];
        let bytes = build_frame(&payload).unwrap();
        assert_eq!(bytes.len(), ENVELOPE_SIZE + MAX_PAYLOAD_SIZE);
        assert_eq!(&bytes[1..3], &[0xFF, 0xFF]);
    }

    #[test]
    fn test_build_frame_too_large() {
        let payload = vec![0u8; MAX_PAYLOAD_SIZE + 1];
        let err = build_frame(&payload).unwrap_err();
        assert!(matches!(err, XbeeNetError::InvalidArgument(_)));
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_build_frame_parts() {
        let bytes = build_frame_parts(&[&[0x00, 0x01], b"xy"]).unwrap();
        assert_eq!(&bytes[..], &[DELIMITER, 0x00, 0x04, 0x00, 0x01, b'x', b'y']);
    }
}
