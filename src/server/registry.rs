//! Live and dead clients of one server.
//!
//! A client is in at most one of the active list and the dead queue. The
//! move from active to dead happens under the active-list lock, and neither
//! lock is held across an await.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::futures::Notified;
use tokio::sync::Notify;

use super::ClientContext;

/// Active and dead client counts of a running server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientCounts {
    /// Clients with running workers.
    pub active: usize,
    /// Clients that hit end-of-stream and await reaping.
    pub dead: usize,
}

/// Clients whose peer hung up and whose pending frames have been handled.
///
/// Contexts here are shut down by the accept loop or by `net_stop`, never by
/// their own workers.
#[derive(Default)]
pub(crate) struct DeadClientQueue {
    queue: Mutex<VecDeque<ClientContext>>,
    notify: Notify,
}

impl DeadClientQueue {
    fn push(&self, ctx: ClientContext) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(ctx);
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<ClientContext> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    fn len(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Client registry of one server.
#[derive(Default)]
pub(crate) struct ClientRegistry {
    active: Mutex<Vec<ClientContext>>,
    dead: DeadClientQueue,
}

impl ClientRegistry {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reaper for the client `id` whose end-of-stream flag is `eof`.
    pub(crate) fn reaper(self: &Arc<Self>, id: u64, eof: Arc<AtomicBool>) -> Reaper {
        Reaper {
            registry: Arc::downgrade(self),
            id,
            eof,
        }
    }

    /// Register a started client.
    ///
    /// A client that was already retired by its own workers goes straight
    /// to the dead queue.
    pub(crate) fn register(&self, ctx: ClientContext) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if ctx.has_hit_eof() {
            tracing::debug!("Client {} ended before registration", ctx.id());
            self.dead.push(ctx);
        } else {
            active.push(ctx);
        }
    }

    /// Move client `id` from the active list to the dead queue.
    fn retire(&self, id: u64) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pos) = active.iter().position(|c| c.id() == id) {
            let ctx = active.swap_remove(pos);
            if let Some(peer) = ctx.peer() {
                tracing::debug!("Client {} ({}) moved to the dead queue", id, peer);
            }
            self.dead.push(ctx);
        }
    }

    /// Resolves once a client has been retired since the last wakeup.
    pub(crate) fn dead_notified(&self) -> Notified<'_> {
        self.dead.notify.notified()
    }

    /// Shut down every dead client. Returns how many were reaped.
    pub(crate) async fn drain_dead(&self) -> usize {
        let mut reaped = 0;
        while let Some(mut ctx) = self.dead.pop() {
            ctx.shutdown().await;
            reaped += 1;
        }
        if reaped > 0 {
            tracing::debug!("Reaped {} dead client(s)", reaped);
        }
        reaped
    }

    /// Shut down every active client. Returns how many there were.
    pub(crate) async fn shutdown_active(&self) -> usize {
        let clients: Vec<ClientContext> = std::mem::take(
            &mut *self.active.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let count = clients.len();
        for mut ctx in clients {
            ctx.shutdown().await;
        }
        count
    }

    pub(crate) fn counts(&self) -> ClientCounts {
        let active = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        ClientCounts {
            active,
            dead: self.dead.len(),
        }
    }
}

/// Handle a handler worker uses to retire its own client.
#[derive(Clone)]
pub(crate) struct Reaper {
    registry: Weak<ClientRegistry>,
    id: u64,
    eof: Arc<AtomicBool>,
}

impl Reaper {
    /// Flag end-of-stream and move the client to the dead queue.
    ///
    /// If the client is not registered yet, the flag routes it to the dead
    /// queue at registration.
    pub(crate) fn retire(&self) {
        self.eof.store(true, Ordering::SeqCst);
        if let Some(registry) = self.registry.upgrade() {
            registry.retire(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    fn context(id: u64) -> ClientContext {
        ClientContext::allocate(id, &ServerConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_register_and_retire() {
        let registry = ClientRegistry::new();
        let ctx = context(1);
        let reaper = registry.reaper(1, ctx.eof_flag());

        registry.register(ctx);
        assert_eq!(registry.counts(), ClientCounts { active: 1, dead: 0 });

        reaper.retire();
        assert_eq!(registry.counts(), ClientCounts { active: 0, dead: 1 });

        assert_eq!(registry.drain_dead().await, 1);
        assert_eq!(registry.counts(), ClientCounts::default());
    }

    #[tokio::test]
    async fn test_retire_before_register() {
        let registry = ClientRegistry::new();
        let ctx = context(2);
        registry.reaper(2, ctx.eof_flag()).retire();

        registry.register(ctx);
        assert_eq!(registry.counts(), ClientCounts { active: 0, dead: 1 });
    }

    #[tokio::test]
    async fn test_retire_wakes_waiter() {
        let registry = ClientRegistry::new();
        let ctx = context(3);
        let reaper = registry.reaper(3, ctx.eof_flag());
        registry.register(ctx);

        reaper.retire();
        tokio::time::timeout(std::time::Duration::from_secs(1), registry.dead_notified())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_active() {
        let registry = ClientRegistry::new();
        registry.register(context(4));
        registry.register(context(5));

        assert_eq!(registry.shutdown_active().await, 2);
        assert_eq!(registry.counts(), ClientCounts::default());
    }

    #[test]
    fn test_reaper_outliving_registry() {
        let registry = ClientRegistry::new();
        let reaper = registry.reaper(9, Arc::new(AtomicBool::new(false)));
        drop(registry);
        reaper.retire();
    }
}
