//! Routing prefix carried inside each frame payload.
//!
//! ```text
//! ┌──────────┬──────────────────────────────┬─────────┐
//! │ Type id  │ Endpoint                     │ Data    │
//! │ 1 byte   │ 1 byte, endpoint types only  │ rest    │
//! └──────────┴──────────────────────────────┴─────────┘
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::ModeTable;
use crate::error::{Result, XbeeNetError};

/// A routed frame payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Connection type id.
    pub con_type: u8,
    /// Endpoint, present for endpoint-addressed types.
    pub endpoint: Option<u8>,
    /// Data after the routing prefix.
    pub data: Bytes,
}

impl Packet {
    /// Create a packet.
    pub fn new(con_type: u8, endpoint: Option<u8>, data: Bytes) -> Self {
        Self {
            con_type,
            endpoint,
            data,
        }
    }

    /// Split a frame payload into prefix and data.
    ///
    /// `types` decides whether an endpoint byte follows the type id. The
    /// data is a zero-copy slice of `payload`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty payload, an unknown type id,
    /// or a missing endpoint byte.
    pub fn parse(payload: Bytes, types: &ModeTable) -> Result<Self> {
        let Some(&con_type) = payload.first() else {
            return Err(XbeeNetError::InvalidArgument("empty packet".to_string()));
        };

        let ty = types.by_id(con_type).ok_or_else(|| {
            XbeeNetError::InvalidArgument(format!("unknown connection type 0x{:02X}", con_type))
        })?;

        if !ty.endpoints {
            return Ok(Self::new(con_type, None, payload.slice(1..)));
        }

        match payload.get(1) {
            Some(&endpoint) => Ok(Self::new(con_type, Some(endpoint), payload.slice(2..))),
            None => Err(XbeeNetError::InvalidArgument(format!(
                "'{}' packet without endpoint",
                ty.name
            ))),
        }
    }

    /// Encode prefix and data into one payload.
    pub fn encode(&self) -> Bytes {
        let prefix = 1 + usize::from(self.endpoint.is_some());
        let mut buf = BytesMut::with_capacity(prefix + self.data.len());
        buf.put_u8(self.con_type);
        if let Some(endpoint) = self.endpoint {
            buf.put_u8(endpoint);
        }
        buf.put_slice(&self.data);
        buf.freeze()
    }
}
