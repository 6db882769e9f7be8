//! Driver handle and the network server start/stop surface.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use xbee_net::{ClientFilter, Driver};
//!
//! # #[tokio::main]
//! # async fn main() -> xbee_net::Result<()> {
//! let driver = Driver::builder().build()?;
//! let loopback_only: ClientFilter = Arc::new(|addr: &str| addr == "127.0.0.1");
//!
//! driver.net_start(27015, Some(loopback_only)).await?;
//! // ...
//! driver.net_stop().await?;
//! # Ok(())
//! # }
//! ```

use std::net::{Shutdown, SocketAddr};
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::accept::{ClientFilter, ServerLoop, ServerState};
use super::registry::ClientCounts;
use crate::config::ServerConfig;
use crate::error::{Result, XbeeNetError};
use crate::handler::{ConnectionRouter, FrameHandler};

/// Create an IPv4/IPv6 TCP socket with address reuse, bound to `addr`.
///
/// The socket is not listening yet; pass it to
/// [`Driver::net_start_with_socket`].
pub fn bind_socket(addr: SocketAddr) -> Result<Socket> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    Ok(socket)
}

/// A running network server.
struct NetServer {
    state: Arc<ServerState>,
    stop: watch::Sender<bool>,
    // Duplicate of the listening socket, used for `listen` and stop-time shutdown.
    control: Socket,
    local_addr: SocketAddr,
    task: JoinHandle<Result<()>>,
}

impl NetServer {
    fn signal_stop(&self) {
        self.state.stop();
        let _ = self.stop.send(true);
    }

    async fn shutdown(self) {
        self.signal_stop();
        if let Err(e) = self.control.shutdown(Shutdown::Both) {
            tracing::debug!("Listening socket shutdown: {}", e);
        }
        drop(self.control);

        match self.task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Accept loop ended with error: {}", e),
            Err(e) => tracing::warn!("Accept loop did not finish cleanly: {}", e),
        }

        let active = self.state.registry.shutdown_active().await;
        let dead = self.state.registry.drain_dead().await;
        tracing::info!(
            "Network server on {} stopped ({} active, {} dead clients closed)",
            self.local_addr,
            active,
            dead
        );
    }
}

struct DriverInner {
    config: Arc<ServerConfig>,
    handler: Arc<dyn FrameHandler>,
    net: Mutex<Option<NetServer>>,
}

impl Drop for DriverInner {
    fn drop(&mut self) {
        if let Some(server) = self.net.get_mut().take() {
            tracing::warn!("Driver dropped with the network server running");
            server.signal_stop();
        }
    }
}

/// Handle to one radio driver and its network server slot.
///
/// Cheap to clone; clones share the same server.
#[derive(Clone)]
pub struct Driver {
    inner: Arc<DriverInner>,
}

impl Driver {
    /// Driver with default configuration and the [`ConnectionRouter`].
    pub fn new() -> Self {
        Self::from_parts(ServerConfig::default(), Arc::new(ConnectionRouter))
    }

    /// Start building a driver.
    pub fn builder() -> DriverBuilder {
        DriverBuilder::new()
    }

    fn from_parts(config: ServerConfig, handler: Arc<dyn FrameHandler>) -> Self {
        Self {
            inner: Arc::new(DriverInner {
                config: Arc::new(config),
                handler,
                net: Mutex::new(None),
            }),
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Start a network server on `0.0.0.0:port`.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if a server is already running, or for port 0 or
    ///   65535.
    /// - `Io` if the socket cannot be created, bound, or put into listening.
    pub async fn net_start(&self, port: u16, filter: Option<ClientFilter>) -> Result<()> {
        if port == 0 || port == u16::MAX {
            return Err(XbeeNetError::InvalidArgument(format!(
                "port {} is not usable",
                port
            )));
        }
        if self.inner.net.lock().await.is_some() {
            return Err(already_running());
        }

        let socket = bind_socket(SocketAddr::from(([0, 0, 0, 0], port)))?;
        self.net_start_with_socket(socket, filter).await
    }

    /// Start a network server on an already bound socket.
    ///
    /// The accept loop is spawned first and the socket is put into listening
    /// afterwards. If `listen` fails the loop is stopped and joined again.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if a server is already running or the socket has
    ///   no inet address.
    /// - `Io` for socket failures.
    pub async fn net_start_with_socket(
        &self,
        socket: Socket,
        filter: Option<ClientFilter>,
    ) -> Result<()> {
        let mut slot = self.inner.net.lock().await;
        if slot.is_some() {
            return Err(already_running());
        }

        socket.set_nonblocking(true)?;
        let local_addr = socket.local_addr()?.as_socket().ok_or_else(|| {
            XbeeNetError::InvalidArgument("socket is not bound to an inet address".to_string())
        })?;
        let control = socket.try_clone()?;
        let listener = TcpListener::from_std(std::net::TcpListener::from(socket))?;

        let (stop, stop_rx) = watch::channel(false);
        let state = Arc::new(ServerState::new(filter));
        let server_loop = ServerLoop::new(
            listener,
            state.clone(),
            self.inner.config.clone(),
            self.inner.handler.clone(),
            stop_rx,
        );
        let span = tracing::info_span!("net_server", addr = %local_addr);
        let task = tokio::spawn(server_loop.run().instrument(span));

        let server = NetServer {
            state,
            stop,
            control,
            local_addr,
            task,
        };

        if let Err(e) = server.control.listen(self.inner.config.listen_backlog) {
            tracing::error!("Failed to listen on {}: {}", local_addr, e);
            server.signal_stop();
            let _ = server.task.await;
            return Err(e.into());
        }

        tracing::info!("Network server listening on {}", local_addr);
        *slot = Some(server);
        Ok(())
    }

    /// Stop the network server and close every client.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if no server is running.
    pub async fn net_stop(&self) -> Result<()> {
        let server = self.inner.net.lock().await.take().ok_or_else(|| {
            XbeeNetError::InvalidArgument("network server is not running".to_string())
        })?;
        server.shutdown().await;
        Ok(())
    }

    /// Address the running server is bound to.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.net.lock().await.as_ref().map(|s| s.local_addr)
    }

    /// Active and dead client counts of the running server.
    pub async fn client_counts(&self) -> Option<ClientCounts> {
        self.inner
            .net
            .lock()
            .await
            .as_ref()
            .map(|s| s.state.registry.counts())
    }

    /// True while a network server is running.
    pub async fn is_net_running(&self) -> bool {
        self.inner.net.lock().await.is_some()
    }
}

impl Default for Driver {
    fn default() -> Self {
        Self::new()
    }
}

fn already_running() -> XbeeNetError {
    XbeeNetError::InvalidArgument("network server already running".to_string())
}

/// Fluent builder for [`Driver`].
pub struct DriverBuilder {
    config: ServerConfig,
    handler: Option<Arc<dyn FrameHandler>>,
}

impl DriverBuilder {
    /// Builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            handler: None,
        }
    }

    /// Use `config`.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default [`ConnectionRouter`] with `handler`.
    pub fn frame_handler<H: FrameHandler>(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Validate the configuration and build the driver.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the configuration fails validation.
    pub fn build(self) -> Result<Driver> {
        self.config.validate()?;
        let handler = self
            .handler
            .unwrap_or_else(|| Arc::new(ConnectionRouter) as Arc<dyn FrameHandler>);
        Ok(Driver::from_parts(self.config, handler))
    }
}

impl Default for DriverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_reserved_ports() {
        let driver = Driver::new();
        for port in [0, u16::MAX] {
            let err = driver.net_start(port, None).await.unwrap_err();
            assert!(matches!(err, XbeeNetError::InvalidArgument(_)));
        }
        assert!(!driver.is_net_running().await);
    }

    #[tokio::test]
    async fn test_stop_when_not_running() {
        let driver = Driver::new();
        let err = driver.net_stop().await.unwrap_err();
        assert!(matches!(err, XbeeNetError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_start_stop_on_adopted_socket() {
        let driver = Driver::new();
        let socket = bind_socket("127.0.0.1:0".parse().unwrap()).unwrap();
        driver.net_start_with_socket(socket, None).await.unwrap();

        let addr = driver.local_addr().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(
            driver.client_counts().await,
            Some(ClientCounts::default())
        );

        let second = bind_socket("127.0.0.1:0".parse().unwrap()).unwrap();
        let err = driver
            .net_start_with_socket(second, None)
            .await
            .unwrap_err();
        assert!(matches!(err, XbeeNetError::InvalidArgument(_)));

        driver.net_stop().await.unwrap();
        assert!(driver.local_addr().await.is_none());
        assert!(driver.client_counts().await.is_none());
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let driver = Driver::new();
        for _ in 0..2 {
            let socket = bind_socket("127.0.0.1:0".parse().unwrap()).unwrap();
            driver.net_start_with_socket(socket, None).await.unwrap();
            driver.net_stop().await.unwrap();
        }
    }

    #[test]
    fn test_builder_validates() {
        let config = ServerConfig {
            frame_queue_capacity: 0,
            ..Default::default()
        };
        assert!(Driver::builder().config(config).build().is_err());
        assert!(Driver::builder().build().is_ok());
    }
}
