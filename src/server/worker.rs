//! Client worker tasks.
//!
//! Each client runs three tokio tasks:
//! - receive: reads frames off the socket and forwards them
//! - handler: passes forwarded frames, in order, to the frame handler
//! - transmit: drains the outbound queue into the socket
//!
//! Every worker selects its blocking await against a one-shot stop signal.

use std::future::Future;
use std::sync::Arc;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::registry::Reaper;
use super::ClientLink;
use crate::handler::FrameHandler;
use crate::protocol::{Frame, FrameReader};
use crate::writer::WriterQueue;

/// A spawned worker with its stop signal.
///
/// Dropping a worker that was never joined aborts its task.
pub(crate) struct Worker<T> {
    name: &'static str,
    stop: Option<oneshot::Sender<()>>,
    join: JoinHandle<T>,
}

impl<T> Worker<T>
where
    T: Send + 'static,
{
    /// Spawn `body` on `runtime`, handing it the stop receiver.
    pub(crate) fn spawn<F, Fut>(runtime: &Handle, name: &'static str, body: F) -> Self
    where
        F: FnOnce(oneshot::Receiver<()>) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (stop, stop_rx) = oneshot::channel();
        let join = runtime.spawn(body(stop_rx));
        Self {
            name,
            stop: Some(stop),
            join,
        }
    }

    /// Signal stop and wait for the task to finish.
    ///
    /// Returns `None` if the task panicked or was cancelled.
    pub(crate) async fn stop_and_join(mut self) -> Option<T> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        match (&mut self.join).await {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("{} worker did not finish cleanly: {}", self.name, e);
                None
            }
        }
    }
}

impl<T> Drop for Worker<T> {
    fn drop(&mut self) {
        self.join.abort();
    }
}

/// Receive worker body.
///
/// On end-of-stream or a read error the worker exits, closing the frame
/// channel behind the frames it already forwarded.
pub(crate) async fn receive_loop(
    mut reader: FrameReader<OwnedReadHalf>,
    frames: mpsc::Sender<Frame>,
    mut stop: oneshot::Receiver<()>,
) -> OwnedReadHalf {
    loop {
        let received = tokio::select! {
            biased;
            _ = &mut stop => break,
            r = reader.receive_frame() => r,
        };

        let frame = match received {
            Ok(frame) => frame,
            Err(e) => {
                if e.is_end_of_stream() {
                    tracing::debug!("Peer closed the connection");
                } else {
                    tracing::warn!("Receive failed: {}", e);
                }
                break;
            }
        };

        tracing::trace!("Received {} byte frame", frame.len());
        tokio::select! {
            biased;
            _ = &mut stop => break,
            sent = frames.send(frame) => {
                if sent.is_err() {
                    tracing::debug!("Handler worker gone, receive worker exiting");
                    break;
                }
            }
        }
    }

    reader.into_inner()
}

/// Handler worker body.
///
/// Once the receive worker is gone and every forwarded frame has been
/// handled, the context is retired through `reaper`. The worker never tears
/// its own context down.
pub(crate) async fn handler_loop(
    mut frames: mpsc::Receiver<Frame>,
    handler: Arc<dyn FrameHandler>,
    link: ClientLink,
    mut stop: oneshot::Receiver<()>,
    reaper: Reaper,
) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = &mut stop => break,
            f = frames.recv() => match f {
                Some(f) => f,
                None => {
                    tracing::debug!("Receive side closed, all frames handled");
                    reaper.retire();
                    break;
                }
            },
        };

        tokio::select! {
            biased;
            _ = &mut stop => break,
            result = handler.handle(link.clone(), frame) => {
                if let Err(e) = result {
                    tracing::warn!("Frame handler failed: {}", e);
                }
            }
        }
    }
}

/// Transmit worker body.
pub(crate) async fn transmit_loop(
    queue: WriterQueue,
    writer: OwnedWriteHalf,
    stop: oneshot::Receiver<()>,
) -> OwnedWriteHalf {
    let (writer, result) = queue.run(writer, stop).await;
    if let Err(e) = result {
        tracing::warn!("Transmit failed: {}", e);
    }
    writer
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stop_and_join_returns_value() {
        let worker = Worker::spawn(&Handle::current(), "test", |stop| async move {
            let _ = stop.await;
            7u32
        });
        assert_eq!(worker.stop_and_join().await, Some(7));
    }

    #[tokio::test]
    async fn test_drop_aborts_task() {
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let worker = Worker::spawn(&Handle::current(), "test", |_stop| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            let _ = done_tx.send(());
        });

        drop(worker);
        // The aborted task drops `done_tx` without sending.
        let result = tokio::time::timeout(Duration::from_secs(1), done_rx)
            .await
            .unwrap();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_panicking_worker_joins_as_none() {
        let worker: Worker<()> = Worker::spawn(&Handle::current(), "test", |_stop| async move {
            panic!("boom");
        });
        assert_eq!(worker.stop_and_join().await, None);
    }
}
