//! Receive buffer pool for a client connection.
//!
//! Each client owns one [`FramePool`]. The first buffer is reserved when the
//! client context is allocated, before `accept` returns. The receive worker
//! takes its read buffer from the pool and hands it back when it stops; the
//! idle buffers are freed when the client is shut down.
//!
//! # Usage
//!
//! ```
//! use xbee_net::protocol::FramePool;
//!
//! let pool = FramePool::new(4096, 2).unwrap();
//! let buf = pool.acquire();
//! assert!(buf.capacity() >= 4096);
//! pool.release(buf);
//! assert_eq!(pool.idle_count(), 1);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::error::{Result, XbeeNetError};

/// A pool of reusable receive buffers.
///
/// Thread-safe; the lock is only held while pushing or popping a buffer.
#[derive(Debug)]
pub struct FramePool {
    /// Idle buffers ready for reuse.
    idle: Mutex<Vec<Vec<u8>>>,
    /// Capacity of each buffer.
    buffer_size: usize,
    /// Maximum idle buffers kept around.
    max_idle: usize,
    /// Buffers currently handed out.
    outstanding: AtomicUsize,
}

impl FramePool {
    /// Create a pool and pre-allocate its first buffer.
    ///
    /// # Errors
    ///
    /// Returns `ResourceExhaustion` if `buffer_size` is zero or the first
    /// buffer cannot be allocated.
    pub fn new(buffer_size: usize, max_idle: usize) -> Result<Self> {
        if buffer_size == 0 {
            return Err(XbeeNetError::ResourceExhaustion(
                "frame pool buffer size is zero".to_string(),
            ));
        }

        let mut first = Vec::<u8>::new();
        first.try_reserve_exact(buffer_size).map_err(|e| {
            XbeeNetError::ResourceExhaustion(format!(
                "cannot reserve {} byte receive buffer: {}",
                buffer_size, e
            ))
        })?;

        let mut idle = Vec::with_capacity(max_idle.max(1));
        idle.push(first);

        Ok(Self {
            idle: Mutex::new(idle),
            buffer_size,
            max_idle: max_idle.max(1),
            outstanding: AtomicUsize::new(0),
        })
    }

    /// Take a cleared buffer with at least `buffer_size` spare capacity.
    pub fn acquire(&self) -> Vec<u8> {
        let pooled = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        self.outstanding.fetch_add(1, Ordering::AcqRel);

        let mut buf = pooled.unwrap_or_default();
        buf.clear();
        buf.reserve(self.buffer_size);
        buf
    }

    /// Return a buffer to the pool. Dropped if the pool is already full.
    pub fn release(&self, mut buf: Vec<u8>) {
        let _ = self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        buf.clear();

        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.max_idle {
            idle.push(buf);
        }
    }

    /// Free every idle buffer.
    pub fn clear(&self) {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Capacity each acquired buffer is guaranteed to have.
    #[inline]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Number of idle buffers.
    pub fn idle_count(&self) -> usize {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of buffers handed out and not yet released.
    #[inline]
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_preallocates_one_buffer() {
        let pool = FramePool::new(1024, 4).unwrap();
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.buffer_size(), 1024);
    }

    #[test]
    fn test_zero_size_rejected() {
        let err = FramePool::new(0, 4).unwrap_err();
        assert!(matches!(err, XbeeNetError::ResourceExhaustion(_)));
    }

    #[test]
    fn test_acquire_release_reuses() {
        let pool = FramePool::new(256, 4).unwrap();

        let mut buf = pool.acquire();
        assert_eq!(pool.outstanding(), 1);
        assert_eq!(pool.idle_count(), 0);
        buf.extend_from_slice(b"garbage");

        pool.release(buf);
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.idle_count(), 1);

        let buf = pool.acquire();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= 256);
    }

    #[test]
    fn test_acquire_beyond_idle_allocates() {
        let pool = FramePool::new(64, 1).unwrap();
        let a = pool.acquire();
        let b = pool.acquire();
        assert_eq!(pool.outstanding(), 2);
        assert!(b.capacity() >= 64);

        pool.release(a);
        pool.release(b);
        // Idle cap is one.
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_clear_frees_idle() {
        let pool = FramePool::new(64, 4).unwrap();
        pool.clear();
        assert_eq!(pool.idle_count(), 0);
    }
}
