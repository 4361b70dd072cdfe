//! Fixed-population packet buffer pool.
//!
//! Every buffer is [`MBUF_SIZE`] bytes and the pool never grows: once the population is leased
//! out, further leases fail until a buffer is dropped. Callers lease a buffer, fill it, and freeze
//! it into a [`PooledBuffer`] holding the valid length. Both types hand their allocation back to
//! the pool on drop, so a packet that is dropped anywhere in the switch is recycled.

use parking_lot::Mutex;
use std::sync::Arc;

/// Size of every pooled buffer (one maximum frame plus headroom).
pub const MBUF_SIZE: usize = 2048;

/// Default pool population used by the binary.
pub const DEFAULT_POOL_SIZE: usize = 8192;

/// Bounded pool of equally sized buffers shared by every core.
#[derive(Debug)]
pub struct MbufPool {
    free: Mutex<Vec<Vec<u8>>>,
    population: usize,
}

impl MbufPool {
    /// Pre-allocate `population` buffers.
    pub fn new(population: usize) -> Arc<Self> {
        let buffers = (0..population).map(|_| vec![0u8; MBUF_SIZE]).collect();
        Arc::new(MbufPool {
            free: Mutex::new(buffers),
            population,
        })
    }

    /// Buffers currently available for leasing.
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }

    /// Total number of buffers owned by the pool.
    pub fn population(&self) -> usize {
        self.population
    }

    /// Take a buffer out of the pool, or `None` when the pool is exhausted.
    pub fn lease(self: &Arc<Self>) -> Option<BufferLease> {
        let data = self.free.lock().pop()?;
        Some(BufferLease {
            pool: Arc::clone(self),
            data: Some(data),
        })
    }

    fn release(&self, mut data: Vec<u8>) {
        data.resize(MBUF_SIZE, 0);
        self.free.lock().push(data);
    }
}

/// Exclusive write access to a leased buffer prior to packet creation.
pub struct BufferLease {
    pool: Arc<MbufPool>,
    data: Option<Vec<u8>>,
}

impl BufferLease {
    /// Borrow the whole buffer to fill with incoming data.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.data.as_deref_mut().unwrap_or_default()
    }

    /// Keep the first `len` bytes (clamped to [`MBUF_SIZE`]) as the valid payload.
    pub fn freeze(mut self, len: usize) -> PooledBuffer {
        let data = self.data.take().unwrap_or_default();
        PooledBuffer {
            pool: Arc::clone(&self.pool),
            len: len.min(data.len()),
            data,
        }
    }
}

impl Drop for BufferLease {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            self.pool.release(data);
        }
    }
}

/// Filled buffer owned by exactly one packet.
pub struct PooledBuffer {
    pool: Arc<MbufPool>,
    data: Vec<u8>,
    len: usize,
}

impl PooledBuffer {
    /// Read-only view of the valid bytes.
    #[inline(always)]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer").field("len", &self.len).finish()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.data));
    }
}
