//! Context passed to connection callbacks.
//!
//! Replies go back on the same logical connection the packet arrived on:
//! - `respond_raw` - send bytes as-is
//! - `respond` - send a MessagePack-encoded value
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use xbee_net::conn::{ConAddress, Packet};
//! use xbee_net::{CallbackContext, ClientLink, Result};
//!
//! async fn echo(ctx: CallbackContext, packet: Packet) -> Result<()> {
//!     ctx.respond_bytes(packet.data).await
//! }
//!
//! fn open_echo(link: &ClientLink, endpoint: u8) -> Result<()> {
//!     let con = link
//!         .connections()
//!         .create("Data", ConAddress::endpoint(endpoint))?;
//!     con.set_callback(Arc::new(echo));
//!     Ok(())
//! }
//! ```

use std::any::Any;
use std::sync::Arc;

use bytes::Bytes;

use crate::codec::MsgPackCodec;
use crate::conn::{ConnectionHandle, Packet};
use crate::error::Result;
use crate::server::{ClientLink, PeerInfo};

/// Connection and client a packet was routed to.
///
/// `CallbackContext` is `Clone` and can be moved into spawned tasks.
#[derive(Clone)]
pub struct CallbackContext {
    con: ConnectionHandle,
    link: ClientLink,
}

impl CallbackContext {
    /// Create a context for `con` on `link`.
    pub fn new(con: ConnectionHandle, link: ClientLink) -> Self {
        Self { con, link }
    }

    /// The connection the packet was routed to.
    #[inline]
    pub fn connection(&self) -> &ConnectionHandle {
        &self.con
    }

    /// The client the packet came from.
    #[inline]
    pub fn link(&self) -> &ClientLink {
        &self.link
    }

    /// Peer address and port of the client.
    #[inline]
    pub fn peer(&self) -> &Arc<PeerInfo> {
        self.link.peer()
    }

    /// User data of the connection, downcast to `T`.
    pub fn user_data<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.con.user_data::<T>()
    }

    /// Reply with a MessagePack-encoded value.
    pub async fn respond<T: serde::Serialize>(&self, value: &T) -> Result<()> {
        let data = MsgPackCodec::encode(value)?;
        self.respond_bytes(Bytes::from(data)).await
    }

    /// Reply with raw bytes.
    pub async fn respond_raw(&self, data: &[u8]) -> Result<()> {
        self.respond_bytes(Bytes::copy_from_slice(data)).await
    }

    /// Reply with pre-allocated bytes (zero-copy).
    pub async fn respond_bytes(&self, data: Bytes) -> Result<()> {
        let packet = Packet::new(
            self.con.con_type().id,
            self.con.address().endpoint,
            data,
        );
        self.link.send_packet(&packet).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conn::{ConAddress, NET_SERVER_MODE};
    use crate::server::test_support::duplex_link;

    #[tokio::test]
    async fn test_respond_raw_prefixes_address() {
        let (link, mut reader, _task) = duplex_link();
        link.connections().import_mode(&NET_SERVER_MODE).unwrap();
        let con = link
            .connections()
            .create("Data", ConAddress::endpoint(3))
            .unwrap();

        let ctx = CallbackContext::new(con, link.clone());
        ctx.respond_raw(b"pong").await.unwrap();

        let frame = reader.receive_frame().await.unwrap();
        assert_eq!(frame.payload(), &[0x01, 3, b'p', b'o', b'n', b'g']);
    }

    #[tokio::test]
    async fn test_respond_msgpack() {
        let (link, mut reader, _task) = duplex_link();
        link.connections().import_mode(&NET_SERVER_MODE).unwrap();
        let con = link
            .connections()
            .create("Modem Status", ConAddress::none())
            .unwrap();

        CallbackContext::new(con, link.clone())
            .respond(&42u8)
            .await
            .unwrap();

        let frame = reader.receive_frame().await.unwrap();
        assert_eq!(frame.payload()[0], 0x04);
        let value: u8 = MsgPackCodec::decode(&frame.payload()[1..]).unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_user_data_and_peer() {
        let (link, _reader, _task) = duplex_link();
        link.connections().import_mode(&NET_SERVER_MODE).unwrap();
        let con = link
            .connections()
            .create("Backchannel", ConAddress::endpoint(0))
            .unwrap();
        con.set_user_data(link.peer().clone());

        let ctx = CallbackContext::new(con, link.clone());
        assert_eq!(ctx.user_data::<PeerInfo>().unwrap().address, "127.0.0.1");
        assert_eq!(ctx.peer().port, 5000);
    }
}
