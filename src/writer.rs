//! Per-client outbound queue and transmit loop.
//!
//! Every part of the server that answers a client (backchannel services,
//! connection callbacks, frame handlers) holds a cheap [`WriterHandle`]. Frames
//! go through a bounded mpsc channel to the client's transmit worker, which
//! owns the socket write half and batches whatever is queued into vectored
//! writes.
//!
//! # Architecture
//!
//! ```text
//! Callback 1 ─┐
//! Callback 2 ─┼─► mpsc::Sender<OutboundFrame> ─► transmit worker ─► socket
//! Handler    ─┘
//! ```

use std::io::IoSlice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

use crate::error::{Result, XbeeNetError};
use crate::protocol::{encode_envelope, ENVELOPE_SIZE, MAX_PAYLOAD_SIZE};

/// Default maximum pending frames before backpressure kicks in.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 1024;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default backpressure timeout in milliseconds.
pub const DEFAULT_BACKPRESSURE_TIMEOUT_MS: u64 = 5_000;

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// A frame ready to be written to a client socket.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    /// Delimiter and length bytes.
    envelope: [u8; ENVELOPE_SIZE],
    /// Payload bytes.
    payload: Bytes,
}

impl OutboundFrame {
    /// Wrap a payload in the frame envelope.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the payload is longer than 65535 bytes.
    pub fn new(payload: Bytes) -> Result<Self> {
        let length = u16::try_from(payload.len()).map_err(|_| {
            XbeeNetError::InvalidArgument(format!(
                "Payload size {} exceeds maximum {}",
                payload.len(),
                MAX_PAYLOAD_SIZE
            ))
        })?;
        Ok(Self {
            envelope: encode_envelope(length),
            payload,
        })
    }

    /// Payload bytes.
    #[inline]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Total size on the wire (envelope + payload).
    #[inline]
    pub fn size(&self) -> usize {
        ENVELOPE_SIZE + self.payload.len()
    }
}

/// Configuration for a client's outbound queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Maximum pending frames before backpressure kicks in.
    pub max_pending_frames: usize,
    /// Channel capacity for the frame queue.
    pub channel_capacity: usize,
    /// How long `send` waits for backpressure to clear.
    pub backpressure_timeout_ms: u64,
}

impl WriterConfig {
    /// Backpressure timeout as a `Duration`.
    #[inline]
    pub fn backpressure_timeout(&self) -> Duration {
        Duration::from_millis(self.backpressure_timeout_ms)
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            backpressure_timeout_ms: DEFAULT_BACKPRESSURE_TIMEOUT_MS,
        }
    }
}

/// Create a client's outbound queue.
///
/// The handle side is shared with everything that answers the client; the
/// queue side is consumed by [`WriterQueue::run`] in the transmit worker.
pub fn channel(config: &WriterConfig) -> (WriterHandle, WriterQueue) {
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle {
        tx,
        pending: pending.clone(),
        max_pending: config.max_pending_frames,
        timeout: config.backpressure_timeout(),
    };

    (handle, WriterQueue { rx, pending })
}

/// Handle for queueing frames to a client.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
    pending: Arc<AtomicUsize>,
    max_pending: usize,
    timeout: Duration,
}

impl WriterHandle {
    /// Queue a frame, waiting while backpressure is active.
    ///
    /// # Errors
    ///
    /// - `BackpressureTimeout` if the queue stays full past the timeout.
    /// - `ConnectionClosed` if the transmit worker is gone.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        if self.pending.load(Ordering::Acquire) >= self.max_pending {
            self.wait_for_backpressure().await?;
        }

        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.send(frame).await.map_err(|_| {
            self.pending.fetch_sub(1, Ordering::Release);
            XbeeNetError::ConnectionClosed
        })
    }

    /// Wrap `payload` and queue it.
    pub async fn send_payload(&self, payload: Bytes) -> Result<()> {
        self.send(OutboundFrame::new(payload)?).await
    }

    async fn wait_for_backpressure(&self) -> Result<()> {
        let start = Instant::now();
        let check_interval = Duration::from_micros(100);

        loop {
            if self.tx.is_closed() {
                return Err(XbeeNetError::ConnectionClosed);
            }
            if self.pending.load(Ordering::Acquire) < self.max_pending {
                return Ok(());
            }
            if start.elapsed() > self.timeout {
                return Err(XbeeNetError::BackpressureTimeout);
            }

            tokio::time::sleep(check_interval).await;
        }
    }

    /// Queue a frame without waiting.
    ///
    /// Returns `Err(BackpressureTimeout)` immediately if at capacity.
    pub fn try_send(&self, frame: OutboundFrame) -> Result<()> {
        if self.pending.load(Ordering::Acquire) >= self.max_pending {
            return Err(XbeeNetError::BackpressureTimeout);
        }

        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.try_send(frame).map_err(|e| {
            self.pending.fetch_sub(1, Ordering::Release);
            match e {
                mpsc::error::TrySendError::Full(_) => XbeeNetError::BackpressureTimeout,
                mpsc::error::TrySendError::Closed(_) => XbeeNetError::ConnectionClosed,
            }
        })
    }

    /// True while backpressure is active.
    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        self.pending.load(Ordering::Acquire) >= self.max_pending
    }

    /// Frames queued but not yet written.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// True once the transmit side has gone away.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving end of a client's outbound queue.
pub struct WriterQueue {
    rx: mpsc::Receiver<OutboundFrame>,
    pending: Arc<AtomicUsize>,
}

impl WriterQueue {
    /// Drain the queue into `writer` until stopped, the queue closes, or a
    /// write fails.
    ///
    /// A stop signal also interrupts a batch whose write is blocked.
    ///
    /// The writer is handed back so the caller can close the socket after
    /// the loop is gone. A dropped `stop` sender counts as a stop.
    pub async fn run<W>(mut self, mut writer: W, mut stop: oneshot::Receiver<()>) -> (W, Result<()>)
    where
        W: AsyncWrite + Unpin,
    {
        loop {
            let first = tokio::select! {
                biased;
                _ = &mut stop => return (writer, Ok(())),
                frame = self.rx.recv() => match frame {
                    Some(f) => f,
                    None => return (writer, Ok(())),
                },
            };

            let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
            batch.push(first);
            while batch.len() < MAX_BATCH_SIZE {
                match self.rx.try_recv() {
                    Ok(frame) => batch.push(frame),
                    Err(_) => break,
                }
            }

            let batch_size = batch.len();
            // A peer that stops reading blocks the write; stop must still win.
            let written = tokio::select! {
                biased;
                _ = &mut stop => None,
                r = write_batch(&mut writer, &batch) => Some(r),
            };
            match written {
                None => {
                    tracing::debug!("Stopped with {} outbound frame(s) unwritten", batch_size);
                    return (writer, Ok(()));
                }
                Some(Err(e)) => return (writer, Err(e)),
                Some(Ok(())) => {}
            }
            tracing::trace!("Wrote {} outbound frame(s)", batch_size);

            self.pending.fetch_sub(batch_size, Ordering::Release);
        }
    }
}

/// Write a batch of frames using scatter/gather I/O.
///
/// Partial writes are continued from the first unwritten byte.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let total_size: usize = batch.iter().map(|f| f.size()).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        if slices.is_empty() {
            break;
        }

        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(XbeeNetError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// IoSlices covering everything after the first `skip_bytes` of the batch.
fn build_remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 2);
    let mut offset = 0;

    for frame in batch {
        let parts: [&[u8]; 2] = [&frame.envelope, &frame.payload];
        for part in parts {
            let end = offset + part.len();
            if !part.is_empty() && skip_bytes < end {
                slices.push(IoSlice::new(&part[skip_bytes.saturating_sub(offset)..]));
            }
            offset = end;
        }
    }

    slices
}
