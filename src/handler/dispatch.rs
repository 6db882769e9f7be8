//! Frame dispatch for the handler worker.
//!
//! Each client's handler worker passes every received frame, in arrival
//! order, to one [`FrameHandler`]. The default is [`ConnectionRouter`], which
//! routes by the packet prefix to the matching logical connection.

use std::future::Future;
use std::pin::Pin;

use super::CallbackContext;
use crate::conn::Packet;
use crate::error::Result;
use crate::protocol::Frame;
use crate::server::ClientLink;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for the per-frame handler.
pub trait FrameHandler: Send + Sync + 'static {
    /// Handle one frame received from `link`.
    fn handle(&self, link: ClientLink, frame: Frame) -> BoxFuture<'static, Result<()>>;
}

impl<F, Fut> FrameHandler for F
where
    F: Fn(ClientLink, Frame) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn handle(&self, link: ClientLink, frame: Frame) -> BoxFuture<'static, Result<()>> {
        Box::pin((self)(link, frame))
    }
}

/// Routes frames to logical connections by their packet prefix.
///
/// Frames that do not parse, or that address no connection, or whose
/// connection has no callback, are dropped with a warning.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionRouter;

impl ConnectionRouter {
    async fn route(link: ClientLink, frame: Frame) -> Result<()> {
        let types = link.connections().mode_table();
        let packet = match Packet::parse(frame.into_payload(), &types) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("Dropping frame from {}: {}", link.peer(), e);
                return Ok(());
            }
        };

        let Some(con) = link.connections().find(packet.con_type, packet.endpoint) else {
            tracing::warn!(
                "Dropping packet from {}: no connection for type 0x{:02X} endpoint {:?}",
                link.peer(),
                packet.con_type,
                packet.endpoint
            );
            return Ok(());
        };

        let Some(callback) = con.callback() else {
            tracing::warn!(
                "Dropping packet from {}: '{}' connection has no callback",
                link.peer(),
                con.con_type().name
            );
            return Ok(());
        };

        tracing::trace!(
            "Routing {} byte(s) to '{}' {:?}",
            packet.data.len(),
            con.con_type().name,
            packet.endpoint
        );
        callback.call(CallbackContext::new(con, link), packet).await
    }
}

impl FrameHandler for ConnectionRouter {
    fn handle(&self, link: ClientLink, frame: Frame) -> BoxFuture<'static, Result<()>> {
        Box::pin(Self::route(link, frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conn::{ConAddress, NET_SERVER_MODE};
    use crate::error::XbeeNetError;
    use crate::server::test_support::duplex_link;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_router_invokes_callback() {
        let (link, mut reader, _task) = duplex_link();
        link.connections().import_mode(&NET_SERVER_MODE).unwrap();
        let con = link
            .connections()
            .create("Data", ConAddress::endpoint(4))
            .unwrap();
        con.set_callback(Arc::new(|ctx: CallbackContext, packet: Packet| async move {
            ctx.respond_bytes(packet.data).await
        }));

        ConnectionRouter
            .handle(link.clone(), Frame::from_slice(&[0x01, 4, b'h', b'i']))
            .await
            .unwrap();

        let reply = reader.receive_frame().await.unwrap();
        assert_eq!(reply.payload(), &[0x01, 4, b'h', b'i']);
    }

    #[tokio::test]
    async fn test_router_drops_unroutable() {
        let (link, _reader, _task) = duplex_link();
        link.connections().import_mode(&NET_SERVER_MODE).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let con = link
            .connections()
            .create("Data", ConAddress::endpoint(1))
            .unwrap();
        let counter = calls.clone();
        con.set_callback(Arc::new(move |_ctx: CallbackContext, _packet: Packet| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, XbeeNetError>(())
            }
        }));

        let router = ConnectionRouter;
        // empty, unknown type, wrong endpoint, missing endpoint
        for payload in [&[][..], &[0x55, 0][..], &[0x01, 2][..], &[0x01][..]] {
            router
                .handle(link.clone(), Frame::from_slice(payload))
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        router
            .handle(link.clone(), Frame::from_slice(&[0x01, 1]))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_closure_handler() {
        let (link, _reader, _task) = duplex_link();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let handler = move |_link: ClientLink, frame: Frame| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(frame.len(), Ordering::SeqCst);
                Ok::<_, XbeeNetError>(())
            }
        };

        handler
            .handle(link, Frame::from_slice(b"abc"))
            .await
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }
}
