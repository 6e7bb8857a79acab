//! Shared buffer and string pools.
//!
//! Both pools are cheap to share between readers (`Clone` / `Arc`) and take a
//! single short lock per operation.

use std::collections::HashSet;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::{CsvError, CsvResult};

pub const DEFAULT_BUFFER_SIZE: usize = 4 * 1024;
pub const DEFAULT_MAX_RETAINED: usize = 64;
pub const DEFAULT_MAX_POOLED_LENGTH: usize = 128;

struct BufferShelf {
    buffer_size: usize,
    max_retained: usize,
    free: Mutex<Vec<Vec<u8>>>,
    outstanding: AtomicUsize,
}

impl BufferShelf {
    fn release(&self, mut buf: Vec<u8>) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        buf.clear();
        let mut free = self.free.lock();
        if free.len() < self.max_retained {
            free.push(buf);
        }
    }
}

/// Pool of reusable byte buffers.
///
/// [`rent`](Self::rent) hands out a [`PooledBuffer`] that goes back to the
/// pool when dropped, or explicitly through [`give_back`](Self::give_back).
///
/// ```
/// use csv_ingest::BufferPool;
///
/// let pool = BufferPool::new(1024, 8);
/// {
///     let mut buf = pool.rent();
///     buf.extend_from_slice(b"a,b,c");
///     assert_eq!(pool.outstanding(), 1);
/// }
/// assert_eq!(pool.outstanding(), 0);
/// assert_eq!(pool.available(), 1);
/// ```
#[derive(Clone)]
pub struct BufferPool {
    shelf: Arc<BufferShelf>,
}

impl BufferPool {
    /// `buffer_size` is the capacity of new buffers; at most `max_retained`
    /// idle buffers are kept.
    pub fn new(buffer_size: usize, max_retained: usize) -> Self {
        Self {
            shelf: Arc::new(BufferShelf {
                buffer_size,
                max_retained,
                free: Mutex::new(Vec::new()),
                outstanding: AtomicUsize::new(0),
            }),
        }
    }

    pub fn rent(&self) -> PooledBuffer {
        let reused = self.shelf.free.lock().pop();
        let data = reused.unwrap_or_else(|| Vec::with_capacity(self.shelf.buffer_size));
        self.shelf.outstanding.fetch_add(1, Ordering::AcqRel);
        PooledBuffer {
            data,
            home: Some(Arc::clone(&self.shelf)),
        }
    }

    /// Return a buffer early.
    ///
    /// Fails with [`CsvError::ForeignBuffer`] when the buffer was not rented
    /// from this pool; the buffer is dropped (and goes home) either way.
    pub fn give_back(&self, mut buf: PooledBuffer) -> CsvResult<()> {
        match buf.home.take() {
            Some(home) if Arc::ptr_eq(&home, &self.shelf) => {
                home.release(std::mem::take(&mut buf.data));
                Ok(())
            }
            Some(other) => {
                other.release(std::mem::take(&mut buf.data));
                Err(CsvError::ForeignBuffer)
            }
            None => Err(CsvError::ForeignBuffer),
        }
    }

    /// Buffers currently rented out.
    pub fn outstanding(&self) -> usize {
        self.shelf.outstanding.load(Ordering::Acquire)
    }

    /// Idle buffers ready for reuse.
    pub fn available(&self) -> usize {
        self.shelf.free.lock().len()
    }

    pub fn buffer_size(&self) -> usize {
        self.shelf.buffer_size
    }

    /// Drop every idle buffer. Rented buffers are unaffected.
    pub fn clear(&self) {
        let dropped = {
            let mut free = self.shelf.free.lock();
            std::mem::take(&mut *free).len()
        };
        debug!(dropped, "buffer pool cleared");
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE, DEFAULT_MAX_RETAINED)
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("buffer_size", &self.shelf.buffer_size)
            .field("max_retained", &self.shelf.max_retained)
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

/// A rented buffer. Derefs to `Vec<u8>`.
pub struct PooledBuffer {
    data: Vec<u8>,
    home: Option<Arc<BufferShelf>>,
}

impl PooledBuffer {
    /// A buffer that belongs to no pool; used when pooling is off.
    pub fn detached(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            home: None,
        }
    }

    pub fn is_pooled(&self) -> bool {
        self.home.is_some()
    }
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.data
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(home) = self.home.take() {
            home.release(std::mem::take(&mut self.data));
        }
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.data.len())
            .field("pooled", &self.is_pooled())
            .finish()
    }
}

/// Interns field values so repeated content shares one allocation.
///
/// Equality is by content. Entries live until [`clear`](Self::clear) or the
/// pool is dropped. Values longer than `max_length` characters are returned
/// without being pooled.
#[derive(Debug)]
pub struct StringPool {
    max_length: usize,
    entries: Mutex<HashSet<Arc<str>>>,
}

impl StringPool {
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_POOLED_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            entries: Mutex::new(HashSet::new()),
        }
    }

    /// Canonical instance for `value`, registering it on first sight.
    pub fn get_or_add(&self, value: &str) -> Arc<str> {
        if value.len() > self.max_length && value.chars().count() > self.max_length {
            return Arc::from(value);
        }
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(value) {
            return Arc::clone(existing);
        }
        let canonical: Arc<str> = Arc::from(value);
        entries.insert(Arc::clone(&canonical));
        canonical
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn clear(&self) {
        let dropped = {
            let mut entries = self.entries.lock();
            let n = entries.len();
            entries.clear();
            n
        };
        debug!(dropped, "string pool cleared");
    }
}

impl Default for StringPool {
    fn default() -> Self {
        Self::new()
    }
}
