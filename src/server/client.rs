//! Per-client state and lifecycle.
//!
//! A [`ClientContext`] is allocated before `accept` returns, attached to the
//! accepted socket, started, and finally shut down exactly once:
//!
//! ```text
//! allocate ──► attach ──► start ──► (registered) ──► shutdown
//!     │           │          │
//!     └───────────┴──────────┴─────────────────────► shutdown / drop
//! ```

use std::net::{Shutdown, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use socket2::SockRef;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::Instrument;

use super::link::Interface;
use super::registry::Reaper;
use super::worker::{handler_loop, receive_loop, transmit_loop, Worker};
use super::{ClientLink, PeerInfo};
use crate::config::ServerConfig;
use crate::conn::Mode;
use crate::error::{Result, XbeeNetError};
use crate::handler::FrameHandler;
use crate::protocol::{FramePool, FrameReader};
use crate::writer::{self, WriterQueue};

/// One accepted peer and everything it owns.
///
/// Dropping a context that was never shut down aborts its workers.
pub(crate) struct ClientContext {
    id: u64,
    peer: Option<Arc<PeerInfo>>,
    socket: Option<TcpStream>,
    pool: Arc<FramePool>,
    iface: Arc<Interface>,
    outbound: Option<WriterQueue>,
    frame_queue_capacity: usize,
    rx: Option<Worker<OwnedReadHalf>>,
    handler: Option<Worker<()>>,
    tx: Option<Worker<OwnedWriteHalf>>,
    // Socket halves handed back by joined workers.
    read_half: Option<OwnedReadHalf>,
    write_half: Option<OwnedWriteHalf>,
    eof: Arc<AtomicBool>,
    started: bool,
    shut_down: bool,
}

impl ClientContext {
    /// Allocate the buffer pool and interface of a client.
    ///
    /// # Errors
    ///
    /// Returns `ResourceExhaustion` if the first receive buffer cannot be
    /// reserved.
    pub(crate) fn allocate(id: u64, config: &ServerConfig) -> Result<Self> {
        let pool = FramePool::new(config.read_buffer_size, config.max_idle_buffers)?;
        let (tx, outbound) = writer::channel(&config.writer);

        Ok(Self {
            id,
            peer: None,
            socket: None,
            pool: Arc::new(pool),
            iface: Arc::new(Interface::new(tx)),
            outbound: Some(outbound),
            frame_queue_capacity: config.frame_queue_capacity,
            rx: None,
            handler: None,
            tx: None,
            read_half: None,
            write_half: None,
            eof: Arc::new(AtomicBool::new(false)),
            started: false,
            shut_down: false,
        })
    }

    /// Bind the accepted socket and its peer.
    pub(crate) fn attach(&mut self, stream: TcpStream, addr: SocketAddr) {
        self.peer = Some(Arc::new(PeerInfo::from(addr)));
        self.socket = Some(stream);
    }

    #[inline]
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn peer(&self) -> Option<&Arc<PeerInfo>> {
        self.peer.as_ref()
    }

    /// Install the connection types of `mode` on the interface.
    pub(crate) fn import_mode(&self, mode: &'static Mode) -> Result<()> {
        self.iface.connections.import_mode(mode)
    }

    /// Handle for the handler path.
    ///
    /// # Errors
    ///
    /// Returns `MissingParameter` before [`ClientContext::attach`].
    pub(crate) fn link(&self) -> Result<ClientLink> {
        let peer = self
            .peer
            .clone()
            .ok_or(XbeeNetError::MissingParameter("peer"))?;
        Ok(ClientLink::new(self.id, peer, self.iface.clone()))
    }

    pub(crate) fn eof_flag(&self) -> Arc<AtomicBool> {
        self.eof.clone()
    }

    pub(crate) fn has_hit_eof(&self) -> bool {
        self.eof.load(Ordering::SeqCst)
    }

    /// Spawn the receive, handler and transmit workers, in that order.
    ///
    /// If a step fails, the workers already started are stopped and joined
    /// in reverse order before the error is returned.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the context was already started or shut down.
    /// - `MissingParameter` if the context is not attached.
    /// - `ThreadFailure` if no tokio runtime is available.
    pub(crate) async fn start(
        &mut self,
        handler: Arc<dyn FrameHandler>,
        reaper: Reaper,
    ) -> Result<()> {
        if self.started || self.shut_down {
            return Err(XbeeNetError::InvalidArgument(format!(
                "client {} cannot be started twice",
                self.id
            )));
        }
        let runtime = Handle::try_current()
            .map_err(|e| XbeeNetError::ThreadFailure(format!("no runtime for workers: {}", e)))?;
        let link = self.link()?;
        let stream = self
            .socket
            .take()
            .ok_or(XbeeNetError::MissingParameter("socket"))?;
        self.started = true;

        let span = tracing::info_span!("client", id = self.id, peer = %link.peer());
        let (read_half, write_half) = stream.into_split();
        let (frame_tx, frame_rx) = mpsc::channel(self.frame_queue_capacity);

        let reader = FrameReader::with_pool(read_half, self.pool.clone());
        let rx_span = span.clone();
        self.rx = Some(Worker::spawn(&runtime, "receive", move |stop| {
            receive_loop(reader, frame_tx, stop).instrument(rx_span)
        }));

        let handler_span = span.clone();
        self.handler = Some(Worker::spawn(&runtime, "handler", move |stop| {
            handler_loop(frame_rx, handler, link, stop, reaper).instrument(handler_span)
        }));

        let Some(queue) = self.outbound.take() else {
            self.write_half = Some(write_half);
            self.stop_workers().await;
            return Err(XbeeNetError::MissingParameter("outbound queue"));
        };
        self.tx = Some(Worker::spawn(&runtime, "transmit", move |stop| {
            transmit_loop(queue, write_half, stop).instrument(span)
        }));

        Ok(())
    }

    /// Ordered, idempotent teardown.
    ///
    /// Stops and joins the transmit, handler and receive workers, in that
    /// order; then shuts the socket down in both directions and closes it;
    /// then releases the buffer pool and the logical connections.
    pub(crate) async fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        self.stop_workers().await;
        self.close_socket();
        self.outbound = None;
        self.pool.clear();
        self.iface.connections.clear();

        match &self.peer {
            Some(peer) => tracing::debug!("Client {} ({}) shut down", self.id, peer),
            None => tracing::trace!("Unused client {} released", self.id),
        }
    }

    async fn stop_workers(&mut self) {
        if let Some(tx) = self.tx.take() {
            self.write_half = tx.stop_and_join().await;
        }
        if let Some(handler) = self.handler.take() {
            handler.stop_and_join().await;
        }
        if let Some(rx) = self.rx.take() {
            self.read_half = rx.stop_and_join().await;
        }
    }

    fn close_socket(&mut self) {
        let socket = self.socket.take();
        let read_half = self.read_half.take();
        let write_half = self.write_half.take();

        let stream: Option<&TcpStream> = socket
            .as_ref()
            .or(read_half.as_ref().map(AsRef::as_ref))
            .or(write_half.as_ref().map(AsRef::as_ref));

        if let Some(stream) = stream {
            if let Err(e) = SockRef::from(stream).shutdown(Shutdown::Both) {
                tracing::debug!("Socket shutdown for client {}: {}", self.id, e);
            }
        }
    }
}
