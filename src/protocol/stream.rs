//! Frame I/O over async byte streams.
//!
//! - [`FrameReader::receive_frame`] pulls one frame at a time from any
//!   `AsyncRead`, buffering whatever arrives past the end of a frame.
//! - [`send_frame`] writes one already-enveloped frame to any `AsyncWrite`.
//!
//! # Example
//!
//! ```
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! use xbee_net::protocol::{build_frame, send_frame, FrameReader};
//!
//! let (mut client, server) = tokio::io::duplex(64);
//! send_frame(&mut client, &build_frame(b"ABC").unwrap()).await.unwrap();
//! drop(client);
//!
//! let mut reader = FrameReader::new(server);
//! assert_eq!(reader.receive_frame().await.unwrap().payload(), b"ABC");
//! assert!(reader.receive_frame().await.unwrap_err().is_end_of_stream());
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{Frame, FrameBuffer, FramePool};
use crate::error::{Result, XbeeNetError};

/// Read buffer size used when no pool is supplied.
const DEFAULT_READ_SIZE: usize = 4 * 1024;

/// Frame receiver over an async byte source.
///
/// `receive_frame` is cancel-safe: the parse state lives in the reader, so
/// dropping the future between reads loses no bytes.
pub struct FrameReader<R> {
    inner: R,
    parser: FrameBuffer,
    ready: VecDeque<Frame>,
    scratch: Vec<u8>,
    pool: Option<Arc<FramePool>>,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Wrap a byte source with a private read buffer.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            parser: FrameBuffer::new(),
            ready: VecDeque::new(),
            scratch: Vec::with_capacity(DEFAULT_READ_SIZE),
            pool: None,
        }
    }

    /// Wrap a byte source, taking the read buffer from `pool`.
    ///
    /// The buffer goes back to the pool in [`FrameReader::into_inner`].
    pub fn with_pool(inner: R, pool: Arc<FramePool>) -> Self {
        Self {
            inner,
            parser: FrameBuffer::with_capacity(pool.buffer_size()),
            ready: VecDeque::new(),
            scratch: pool.acquire(),
            pool: Some(pool),
        }
    }

    /// Receive the next frame.
    ///
    /// # Errors
    ///
    /// - `EndOfStream` when the source reports EOF, including EOF in the
    ///   middle of a frame (the partial frame is discarded).
    /// - `Io` when a read fails.
    pub async fn receive_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(frame);
            }

            self.scratch.clear();
            let n = self.inner.read_buf(&mut self.scratch).await?;
            if n == 0 {
                if self.parser.in_frame() {
                    tracing::debug!(
                        "Discarding {} buffered bytes of an incomplete frame",
                        self.parser.len()
                    );
                    self.parser.clear();
                }
                return Err(XbeeNetError::EndOfStream);
            }

            let frames = self.parser.push(&self.scratch[..n]);
            if !frames.is_empty() {
                tracing::trace!("Parsed {} frame(s) from {} bytes", frames.len(), n);
            }
            self.ready.extend(frames);
        }
    }

    /// Bytes dropped so far while hunting for a delimiter.
    pub fn discarded(&self) -> u64 {
        self.parser.discarded()
    }

    /// Get a reference to the underlying source.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Give back the source, returning the read buffer to its pool.
    pub fn into_inner(self) -> R {
        if let Some(pool) = &self.pool {
            pool.release(self.scratch);
        }
        self.inner
    }
}

/// Write one enveloped frame to `sink` and flush it.
///
/// Partial writes are continued until every byte is out.
///
/// # Errors
///
/// Returns `Io` if a write or the flush fails.
pub async fn send_frame<W>(sink: &mut W, frame: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    sink.write_all(frame).await?;
    sink.flush().await?;
    Ok(())
}
