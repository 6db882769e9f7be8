//! The handler path's view of a client.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;

use crate::conn::{ConnectionTable, Packet};
use crate::error::Result;
use crate::writer::{OutboundFrame, WriterHandle};

/// Address and port of an accepted peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerInfo {
    /// Textual IP address.
    pub address: String,
    /// Remote port.
    pub port: u16,
}

impl From<SocketAddr> for PeerInfo {
    fn from(addr: SocketAddr) -> Self {
        Self {
            address: addr.ip().to_string(),
            port: addr.port(),
        }
    }
}

impl fmt::Display for PeerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Receive and transmit sides of one client.
///
/// The receive side is the connection-type table plus logical connections;
/// the transmit side is the outbound queue.
pub(crate) struct Interface {
    pub(crate) connections: ConnectionTable,
    pub(crate) tx: WriterHandle,
}

impl Interface {
    pub(crate) fn new(tx: WriterHandle) -> Self {
        Self {
            connections: ConnectionTable::new(),
            tx,
        }
    }
}

/// Cheap, cloneable handle to an attached client.
#[derive(Clone)]
pub struct ClientLink {
    id: u64,
    peer: Arc<PeerInfo>,
    iface: Arc<Interface>,
}

impl ClientLink {
    pub(crate) fn new(id: u64, peer: Arc<PeerInfo>, iface: Arc<Interface>) -> Self {
        Self { id, peer, iface }
    }

    /// Server-assigned client id.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Peer address and port.
    #[inline]
    pub fn peer(&self) -> &Arc<PeerInfo> {
        &self.peer
    }

    /// Logical connections of this client.
    #[inline]
    pub fn connections(&self) -> &ConnectionTable {
        &self.iface.connections
    }

    /// Outbound queue of this client.
    #[inline]
    pub fn writer(&self) -> &WriterHandle {
        &self.iface.tx
    }

    /// Queue a raw frame payload.
    pub async fn send(&self, payload: Bytes) -> Result<()> {
        self.iface.tx.send(OutboundFrame::new(payload)?).await
    }

    /// Queue a routed packet.
    pub async fn send_packet(&self, packet: &Packet) -> Result<()> {
        self.send(packet.encode()).await
    }
}

impl fmt::Debug for ClientLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientLink")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{channel, WriterConfig};

    #[test]
    fn test_peer_info_from_socket_addr() {
        let peer = PeerInfo::from("127.0.0.1:4000".parse::<SocketAddr>().unwrap());
        assert_eq!(peer.address, "127.0.0.1");
        assert_eq!(peer.port, 4000);
        assert_eq!(peer.to_string(), "127.0.0.1:4000");
    }

    #[test]
    fn test_peer_info_v6() {
        let peer = PeerInfo::from("[::1]:9".parse::<SocketAddr>().unwrap());
        assert_eq!(peer.address, "::1");
    }

    #[tokio::test]
    async fn test_send_packet_queues_prefix() {
        let (tx, _queue) = channel(&WriterConfig::default());
        let link = ClientLink::new(
            1,
            Arc::new(PeerInfo::from("10.0.0.1:1".parse::<SocketAddr>().unwrap())),
            Arc::new(Interface::new(tx)),
        );

        link.send_packet(&Packet::new(0x00, Some(1), Bytes::from_static(b"ok")))
            .await
            .unwrap();
        assert_eq!(link.writer().pending_count(), 1);
    }
}
