//! Backchannel services.
//!
//! Every admitted client gets one `"Backchannel"` connection per
//! [`BackchannelService`], addressed by the service's endpoint. They exist
//! before the client's first frame is routed.
//!
//! | Endpoint | Service    | Reply                                      |
//! |----------|------------|--------------------------------------------|
//! | 0        | `Start`    | [`StartReply`] (MessagePack)               |
//! | 1        | `Echo`     | the request data, unchanged                |
//! | 2        | `ConTypes` | list of [`ConTypeEntry`] (MessagePack)     |

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::conn::{ConAddress, ConCallback, Packet};
use crate::error::Result;
use crate::handler::{BoxFuture, CallbackContext};
use crate::server::ClientLink;

/// Connection type name of backchannel connections.
pub const BACKCHANNEL_TYPE: &str = "Backchannel";

/// Protocol version reported by `Start`.
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// System services offered to every client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BackchannelService {
    /// Handshake: reports protocol version and mode.
    Start = 0,
    /// Returns the request data.
    Echo = 1,
    /// Lists the connection types the client may use.
    ConTypes = 2,
}

impl BackchannelService {
    /// Every service, in endpoint order.
    pub const ALL: [BackchannelService; 3] = [Self::Start, Self::Echo, Self::ConTypes];

    /// Endpoint the service listens on.
    #[inline]
    pub fn endpoint(self) -> u8 {
        self as u8
    }

    /// Service name for logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Echo => "echo",
            Self::ConTypes => "conTypes",
        }
    }

    /// Service bound to `endpoint`.
    pub fn from_endpoint(endpoint: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.endpoint() == endpoint)
    }

    async fn serve(self, ctx: CallbackContext, packet: Packet) -> Result<()> {
        tracing::debug!("Backchannel {} request from {}", self.name(), ctx.peer());
        match self {
            Self::Start => {
                let types = ctx.link().connections().mode_table();
                let reply = StartReply {
                    version: PROTOCOL_VERSION.to_string(),
                    mode: types.mode_name().unwrap_or_default().to_string(),
                };
                ctx.respond(&reply).await
            }
            Self::Echo => ctx.respond_bytes(packet.data).await,
            Self::ConTypes => {
                let types = ctx.link().connections().mode_table();
                let list: Vec<ConTypeEntry> = types
                    .con_types()
                    .iter()
                    .map(|t| ConTypeEntry {
                        id: t.id,
                        name: t.name.to_string(),
                        endpoints: t.endpoints,
                    })
                    .collect();
                ctx.respond(&list).await
            }
        }
    }
}

impl ConCallback for BackchannelService {
    fn call(&self, ctx: CallbackContext, packet: Packet) -> BoxFuture<'static, Result<()>> {
        Box::pin(self.serve(ctx, packet))
    }
}

/// Reply to `Start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartReply {
    /// Crate version of the server.
    pub version: String,
    /// Name of the mode imported for the client.
    pub mode: String,
}

/// One element of the `ConTypes` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConTypeEntry {
    /// Routing id.
    pub id: u8,
    /// Type name.
    pub name: String,
    /// True if packets of this type carry an endpoint byte.
    pub endpoints: bool,
}

/// Create the backchannel connections of a freshly accepted client.
///
/// Each connection carries the client's [`PeerInfo`](crate::PeerInfo) as
/// user data. Stops at the first failure.
///
/// # Errors
///
/// Propagates the connection table's error, e.g. when the mode has not been
/// imported or the backchannel already exists.
pub fn setup_backchannel(link: &ClientLink) -> Result<()> {
    for service in BackchannelService::ALL {
        let con = link
            .connections()
            .create(BACKCHANNEL_TYPE, ConAddress::endpoint(service.endpoint()))?;
        con.set_user_data(link.peer().clone());
        con.set_callback(Arc::new(service));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MsgPackCodec;
    use crate::conn::NET_SERVER_MODE;
    use crate::error::XbeeNetError;
    use crate::handler::{ConnectionRouter, FrameHandler};
    use crate::protocol::Frame;
    use crate::server::test_support::duplex_link;
    use crate::server::PeerInfo;

    #[test]
    fn test_endpoints_are_distinct() {
        assert_eq!(
            BackchannelService::ALL.map(BackchannelService::endpoint),
            [0, 1, 2]
        );
        assert_eq!(
            BackchannelService::from_endpoint(1),
            Some(BackchannelService::Echo)
        );
        assert_eq!(BackchannelService::from_endpoint(3), None);
    }

    #[tokio::test]
    async fn test_setup_creates_one_connection_per_service() {
        let (link, _reader, _task) = duplex_link();
        link.connections().import_mode(&NET_SERVER_MODE).unwrap();

        setup_backchannel(&link).unwrap();

        assert_eq!(link.connections().len(), BackchannelService::ALL.len());
        for service in BackchannelService::ALL {
            let con = link
                .connections()
                .find(0x00, Some(service.endpoint()))
                .unwrap();
            assert!(con.callback().is_some());
            assert_eq!(con.user_data::<PeerInfo>().unwrap().address, "127.0.0.1");
        }
    }

    #[tokio::test]
    async fn test_setup_without_mode_fails() {
        let (link, _reader, _task) = duplex_link();
        let err = setup_backchannel(&link).unwrap_err();
        assert!(matches!(err, XbeeNetError::InvalidArgument(_)));
        assert!(link.connections().is_empty());
    }

    #[tokio::test]
    async fn test_setup_twice_stops_at_first_failure() {
        let (link, _reader, _task) = duplex_link();
        link.connections().import_mode(&NET_SERVER_MODE).unwrap();
        setup_backchannel(&link).unwrap();
        assert!(setup_backchannel(&link).is_err());
        assert_eq!(link.connections().len(), 3);
    }

    #[tokio::test]
    async fn test_echo() {
        let (link, mut reader, _task) = duplex_link();
        link.connections().import_mode(&NET_SERVER_MODE).unwrap();
        setup_backchannel(&link).unwrap();

        ConnectionRouter
            .handle(link.clone(), Frame::from_slice(&[0x00, 0x01, 0xDE, 0xAD]))
            .await
            .unwrap();

        let reply = reader.receive_frame().await.unwrap();
        assert_eq!(reply.payload(), &[0x00, 0x01, 0xDE, 0xAD]);
    }

    #[tokio::test]
    async fn test_start_and_con_types() {
        let (link, mut reader, _task) = duplex_link();
        link.connections().import_mode(&NET_SERVER_MODE).unwrap();
        setup_backchannel(&link).unwrap();

        ConnectionRouter
            .handle(link.clone(), Frame::from_slice(&[0x00, 0x00]))
            .await
            .unwrap();
        let reply = reader.receive_frame().await.unwrap();
        assert_eq!(&reply.payload()[..2], &[0x00, 0x00]);
        let start: StartReply = MsgPackCodec::decode(&reply.payload()[2..]).unwrap();
        assert_eq!(start.mode, "net_server");
        assert_eq!(start.version, PROTOCOL_VERSION);

        ConnectionRouter
            .handle(link.clone(), Frame::from_slice(&[0x00, 0x02]))
            .await
            .unwrap();
        let reply = reader.receive_frame().await.unwrap();
        let list: Vec<ConTypeEntry> = MsgPackCodec::decode(&reply.payload()[2..]).unwrap();
        assert_eq!(list.len(), NET_SERVER_MODE.con_types.len());
        assert_eq!(list[0].name, "Backchannel");
        assert!(list.iter().any(|t| t.name == "I/O" && !t.endpoints));
    }
}
