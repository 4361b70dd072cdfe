//! Packet handle carried through the reference datapath.

use crate::buffer_pool::{MbufPool, PooledBuffer, MBUF_SIZE};
use crate::datapath::PacketData;
use std::sync::Arc;

/// Frame bytes held in a pooled buffer.
///
/// Dropping the packet returns its buffer to the pool it was leased from.
#[derive(Debug)]
pub struct Packet {
    buffer: PooledBuffer,
}

impl Packet {
    /// Copy `frame` (truncated to [`MBUF_SIZE`]) into a freshly leased buffer.
    ///
    /// Returns `None` when the pool is exhausted.
    pub fn new(pool: &Arc<MbufPool>, frame: &[u8]) -> Option<Packet> {
        let len = frame.len().min(MBUF_SIZE);
        let mut lease = pool.lease()?;
        lease.as_mut_slice()[..len].copy_from_slice(&frame[..len]);
        Some(Packet {
            buffer: lease.freeze(len),
        })
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl PacketData for Packet {
    #[inline(always)]
    fn payload(&self) -> &[u8] {
        self.buffer.as_slice()
    }
}
