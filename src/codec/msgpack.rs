//! MessagePack codec using `rmp-serde`.
//!
//! Structured backchannel replies are encoded with `to_vec_named`, so structs
//! go out as maps keyed by field name. Clients written against the map form
//! keep working when fields are added.
//!
//! # Example
//!
//! ```
//! use xbee_net::codec::MsgPackCodec;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Hello {
//!     version: String,
//!     mode: String,
//! }
//!
//! let msg = Hello { version: "0.1.0".into(), mode: "net_server".into() };
//! let encoded = MsgPackCodec::encode(&msg).unwrap();
//! let decoded: Hello = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, msg);
//! ```

use crate::error::Result;

/// MessagePack codec for structured payloads.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value as struct-as-map MessagePack.
    ///
    /// # Errors
    ///
    /// Returns `MsgPackEncode` if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MessagePack bytes.
    ///
    /// # Errors
    ///
    /// Returns `MsgPackDecode` if the bytes do not decode to `T`.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::XbeeNetError;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct TypeEntry {
        id: u8,
        name: String,
        endpoints: bool,
    }

    #[test]
    fn test_struct_encodes_as_map() {
        let entry = TypeEntry {
            id: 1,
            name: "Data".to_string(),
            endpoints: true,
        };

        let encoded = MsgPackCodec::encode(&entry).unwrap();

        // fixmap with 3 entries, not fixarray
        assert_eq!(encoded[0], 0x83);
        let decoded: TypeEntry = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn test_list_of_structs() {
        let list = vec![
            TypeEntry {
                id: 0,
                name: "Backchannel".to_string(),
                endpoints: true,
            },
            TypeEntry {
                id: 4,
                name: "Modem Status".to_string(),
                endpoints: false,
            },
        ];

        let encoded = MsgPackCodec::encode(&list).unwrap();
        let decoded: Vec<TypeEntry> = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, list);
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        let result: Result<TypeEntry> = MsgPackCodec::decode(b"not valid msgpack");
        assert!(matches!(result, Err(XbeeNetError::MsgPackDecode(_))));
    }
}
