//! Bounded per-vport rings used by the reference datapath.

use crate::datapath::Burst;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// Default number of slots per ring.
pub const RING_SIZE: usize = 1024;

/// Multi-producer multi-consumer ring of packet handles.
///
/// A full ring never blocks the producer: the packet is handed back so the caller can account
/// the overrun and release it.
pub struct VportRing<P> {
    sender: Sender<P>,
    receiver: Receiver<P>,
}

impl<P> VportRing<P> {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        VportRing {
            sender,
            receiver,
        }
    }

    /// Enqueue one packet. On a full ring the packet comes back to the caller.
    #[inline]
    pub fn enqueue(&self, packet: P) -> Result<(), P> {
        self.sender.try_send(packet).map_err(|err| match err {
            TrySendError::Full(packet) | TrySendError::Disconnected(packet) => packet,
        })
    }

    /// Move as many packets as fit into `burst`. Returns the number moved.
    #[inline]
    pub fn dequeue_burst(&self, burst: &mut Burst<P>) -> usize {
        let mut moved = 0;
        while !burst.is_full() {
            let Ok(packet) = self.receiver.try_recv() else {
                break;
            };
            if burst.push(packet).is_err() {
                break;
            }
            moved += 1;
        }
        moved
    }

    /// Take one packet, if any.
    pub fn try_dequeue(&self) -> Option<P> {
        self.receiver.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl<P> Default for VportRing<P> {
    fn default() -> Self {
        Self::new(RING_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datapath::PKT_BURST_SIZE;

    #[test]
    fn full_ring_hands_packet_back() {
        let ring = VportRing::new(2);
        assert!(ring.enqueue(1).is_ok());
        assert!(ring.enqueue(2).is_ok());
        assert_eq!(ring.enqueue(3), Err(3));
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn dequeue_stops_at_burst_size() {
        let ring = VportRing::new(64);
        for i in 0..40 {
            ring.enqueue(i).unwrap();
        }
        let mut burst = Burst::new();
        assert_eq!(ring.dequeue_burst(&mut burst), PKT_BURST_SIZE);
        assert_eq!(burst.as_slice()[0], 0);
        assert_eq!(ring.len(), 40 - PKT_BURST_SIZE);

        burst.clear();
        assert_eq!(ring.dequeue_burst(&mut burst), 40 - PKT_BURST_SIZE);
        assert_eq!(ring.try_dequeue(), None);
        assert!(ring.is_empty());
    }
}
