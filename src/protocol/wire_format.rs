//! Wire format of the outer frame envelope.
//!
//! Every frame on a client socket is wrapped like this:
//! ```text
//! ┌───────────┬──────────────┬─────────────────┐
//! │ Delimiter │ Length       │ Payload         │
//! │ 1 byte    │ 2 bytes      │ `length` bytes  │
//! │ 0x7E      │ uint16 BE    │                 │
//! └───────────┴──────────────┴─────────────────┘
//! ```
//!
//! There is no trailer. Checksums, if any, live inside the payload and are not
//! this layer's business.

/// Start-of-frame delimiter.
pub const DELIMITER: u8 = 0x7E;

/// Size of the length field in bytes.
pub const LENGTH_SIZE: usize = 2;

/// Delimiter plus length field.
pub const ENVELOPE_SIZE: usize = 1 + LENGTH_SIZE;

/// Largest payload the 16-bit length field can describe.
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// Combine the two length bytes into the payload length.
///
/// The high byte is shifted and OR-ed bitwise with the low byte.
///
/// # Example
///
/// ```
/// use xbee_net::protocol::decode_length;
///
/// assert_eq!(decode_length([0x00, 0x03]), 3);
/// assert_eq!(decode_length([0x01, 0x00]), 256);
/// assert_eq!(decode_length([0xFF, 0xFF]), 65535);
/// ```
#[inline]
pub fn decode_length(bytes: [u8; LENGTH_SIZE]) -> u16 {
    (u16::from(bytes[0]) << 8) | u16::from(bytes[1])
}

/// Split a payload length into its two big-endian bytes.
#[inline]
pub fn encode_length(length: u16) -> [u8; LENGTH_SIZE] {
    length.to_be_bytes()
}

/// Encode the 3-byte envelope for a payload of `length` bytes.
#[inline]
pub fn encode_envelope(length: u16) -> [u8; ENVELOPE_SIZE] {
    let [hi, lo] = encode_length(length);
    [DELIMITER, hi, lo]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_length_is_bitwise() {
        // A logical OR would collapse all of these to 1.
        assert_eq!(decode_length([0x00, 0x00]), 0);
        assert_eq!(decode_length([0x00, 0x03]), 3);
        assert_eq!(decode_length([0x12, 0x34]), 0x1234);
        assert_eq!(decode_length([0x80, 0x01]), 0x8001);
        assert_eq!(decode_length([0xFF, 0xFF]), u16::MAX);
    }

    #[test]
    fn test_encode_length_big_endian() {
        assert_eq!(encode_length(0x0102), [0x01, 0x02]);
        assert_eq!(encode_length(0), [0, 0]);
    }

    #[test]
    fn test_encode_envelope() {
        assert_eq!(encode_envelope(3), [DELIMITER, 0x00, 0x03]);
        assert_eq!(ENVELOPE_SIZE, 3);
    }
}
