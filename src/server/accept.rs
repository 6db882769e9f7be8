//! The accept loop.
//!
//! ```text
//! Idle ──► Listening ──► Accepting ⇄ Filtering ⇄ Admitting ──► Stopped
//! ```
//!
//! One pre-allocated [`ClientContext`] is kept across iterations, so a
//! vetoed connection or a dead-client wakeup does not cost an allocation.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;

use super::registry::ClientRegistry;
use super::ClientContext;
use crate::backchannel::setup_backchannel;
use crate::config::ServerConfig;
use crate::conn::NET_SERVER_MODE;
use crate::error::Result;
use crate::handler::FrameHandler;

/// Admission filter: gets the peer's textual IP address, returns `true` to
/// admit.
pub type ClientFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// State shared by the accept loop and the driver.
pub(crate) struct ServerState {
    running: AtomicBool,
    filter: Option<ClientFilter>,
    pub(crate) registry: Arc<ClientRegistry>,
    next_id: AtomicU64,
}

impl ServerState {
    pub(crate) fn new(filter: Option<ClientFilter>) -> Self {
        Self {
            running: AtomicBool::new(true),
            filter,
            registry: ClientRegistry::new(),
            next_id: AtomicU64::new(1),
        }
    }

    #[inline]
    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn admits(&self, address: &str) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(address))
    }
}

pub(crate) struct ServerLoop {
    listener: TcpListener,
    state: Arc<ServerState>,
    config: Arc<ServerConfig>,
    handler: Arc<dyn FrameHandler>,
    stop: watch::Receiver<bool>,
}

impl ServerLoop {
    pub(crate) fn new(
        listener: TcpListener,
        state: Arc<ServerState>,
        config: Arc<ServerConfig>,
        handler: Arc<dyn FrameHandler>,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            listener,
            state,
            config,
            handler,
            stop,
        }
    }

    /// Run until stopped.
    ///
    /// # Errors
    ///
    /// Returns the allocation or accept error that ended the loop.
    pub(crate) async fn run(mut self) -> Result<()> {
        let registry = self.state.registry.clone();
        let mut spare: Option<ClientContext> = None;

        while self.state.is_running() {
            registry.drain_dead().await;

            if spare.is_none() {
                let id = self.state.next_id.fetch_add(1, Ordering::Relaxed);
                match ClientContext::allocate(id, &self.config) {
                    Ok(ctx) => spare = Some(ctx),
                    Err(e) => {
                        tracing::error!("Failed to allocate client context: {}", e);
                        return Err(e);
                    }
                }
            }

            let (stream, addr) = tokio::select! {
                biased;
                changed = self.stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) if e.kind() == io::ErrorKind::InvalidInput => {
                        // Not listening yet.
                        tokio::time::sleep(self.config.accept_retry_delay()).await;
                        continue;
                    }
                    Err(e) => {
                        tracing::error!("Accept failed: {}", e);
                        return Err(e.into());
                    }
                },
                _ = registry.dead_notified() => continue,
            };

            if !self.state.is_running() {
                drop(stream);
                break;
            }

            if !self.state.admits(&addr.ip().to_string()) {
                tracing::info!("Blocked connection from {}", addr);
                drop(stream);
                continue;
            }

            let Some(mut ctx) = spare.take() else {
                continue;
            };
            ctx.attach(stream, addr);

            match self.admit(&mut ctx).await {
                Ok(()) => {
                    tracing::info!("Accepted connection from {} as client {}", addr, ctx.id());
                    registry.register(ctx);
                }
                Err(e) => {
                    tracing::warn!("Failed to admit client {}: {}", addr, e);
                    ctx.shutdown().await;
                }
            }
        }

        Ok(())
    }

    async fn admit(&self, ctx: &mut ClientContext) -> Result<()> {
        ctx.import_mode(&NET_SERVER_MODE)?;
        setup_backchannel(&ctx.link()?)?;
        let reaper = self.state.registry.reaper(ctx.id(), ctx.eof_flag());
        ctx.start(self.handler.clone(), reaper).await
    }
}
