//! lockfree request buffer pool

use crate::error::{Error, Result};

use std::fmt::{self, Debug};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_queue::ArrayQueue;

/// shared pool state
struct Inner {
    /// lockfree queue of released allocations
    queue: ArrayQueue<Vec<u8>>,
    /// buffers currently handed out
    outstanding: AtomicUsize,
    /// buffers ever handed out
    acquired: AtomicUsize,
    /// upper bound of `outstanding`
    limit: usize,
}

/// buffer pool
#[derive(Clone)]
pub struct BufferPool {
    /// Arc state
    inner: Arc<Inner>,
}

/// A pooled buffer. Returns itself to the pool when dropped.
pub struct Buffer {
    /// data
    data: Vec<u8>,
    /// owner
    pool: Arc<Inner>,
}

impl Debug for BufferPool {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("cached", &self.inner.queue.len())
            .field("outstanding", &self.outstanding())
            .field("limit", &self.inner.limit)
            .finish()
    }
}

impl Debug for Buffer {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.data.len())
            .finish()
    }
}

impl BufferPool {
    /// Creates a new [`BufferPool`] which caches at most `cap` allocations
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self::with_limit(cap, usize::MAX)
    }

    /// Creates a new [`BufferPool`] which hands out at most `limit` buffers at a time
    #[must_use]
    pub fn with_limit(cap: usize, limit: usize) -> Self {
        let inner = Inner {
            queue: ArrayQueue::new(cap.max(1)),
            outstanding: AtomicUsize::new(0),
            acquired: AtomicUsize::new(0),
            limit,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Acquires a zeroed [`Buffer`] of `len` bytes. Reuses a cached allocation if any.
    /// # Errors
    /// Returns [`Error::ResourceExhausted`] when the limit is reached or the allocation fails
    pub fn acquire(&self, len: usize) -> Result<Buffer> {
        let prev = self.inner.outstanding.fetch_add(1, Ordering::AcqRel);
        if prev >= self.inner.limit {
            self.inner.outstanding.fetch_sub(1, Ordering::AcqRel);
            return Err(Error::ResourceExhausted);
        }
        self.inner.acquired.fetch_add(1, Ordering::Relaxed);

        let mut buf = Buffer {
            data: self.inner.queue.pop().unwrap_or_default(),
            pool: Arc::clone(&self.inner),
        };
        buf.data.clear();
        buf.data.try_reserve_exact(len)?;
        buf.data.resize(len, 0);
        Ok(buf)
    }

    /// Acquires a [`Buffer`] holding a copy of `bytes`
    /// # Errors
    /// Returns [`Error::ResourceExhausted`]
    pub fn acquire_copy(&self, bytes: &[u8]) -> Result<Buffer> {
        let mut buf = self.acquire(bytes.len())?;
        buf.copy_from_slice(bytes);
        Ok(buf)
    }

    /// Number of buffers currently handed out
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    /// Number of buffers handed out since the pool was created
    #[must_use]
    pub fn acquired(&self) -> usize {
        self.inner.acquired.load(Ordering::Relaxed)
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        self.pool.outstanding.fetch_sub(1, Ordering::AcqRel);
        drop(self.pool.queue.push(data));
    }
}

impl Deref for Buffer {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for Buffer {
    #[inline]
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl AsRef<[u8]> for Buffer {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl AsMut<[u8]> for Buffer {
    #[inline]
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_on_drop() {
        let pool = BufferPool::new(4);
        let a = pool.acquire(16).unwrap();
        let b = pool.acquire_copy(b"abc").unwrap();
        assert_eq!(pool.outstanding(), 2);
        assert_eq!(&*b, b"abc");
        assert!(a.iter().all(|&x| x == 0));

        drop(a);
        assert_eq!(pool.outstanding(), 1);
        drop(b);
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.acquired(), 2);
    }

    #[test]
    fn reused_buffers_are_zeroed() {
        let pool = BufferPool::new(1);
        drop(pool.acquire_copy(&[0xAA; 8]).unwrap());
        let buf = pool.acquire(8).unwrap();
        assert_eq!(&*buf, &[0; 8]);
    }

    #[test]
    fn limit() {
        let pool = BufferPool::with_limit(4, 1);
        let a = pool.acquire(1).unwrap();
        assert!(matches!(pool.acquire(1), Err(Error::ResourceExhausted)));
        assert_eq!(pool.outstanding(), 1);
        drop(a);
        assert!(pool.acquire(1).is_ok());
    }
}
