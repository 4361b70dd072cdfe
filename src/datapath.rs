//! Boundary between the dispatch core and the switch subsystems it drives.
//!
//! The dispatch loop only schedules work. Receiving from a vport, classifying a packet, executing
//! the forwarding decision and draining egress queues all belong to the [`Datapath`]
//! implementation. The loop is generic over the datapath so every call on the hot path is
//! statically dispatched.

use crate::flow::FlowKey;
use crate::vport::{PhyPortId, VportId};

/// Maximum number of packets received from one vport in one call.
pub const PKT_BURST_SIZE: usize = 32;

/// Access to the packet bytes the pipeline prefetches ahead of extraction.
pub trait PacketData {
    /// Start of the packet payload (the frame as seen on the wire).
    fn payload(&self) -> &[u8];
}

/// Switching collaborator driven by one dispatch core.
///
/// Each core owns its own instance (`&mut self`), so per-core egress buffers need no locking.
pub trait Datapath {
    /// Packet handle. Owned by the dispatch core only between receive and `switch_packet`.
    type Packet: PacketData;

    /// Non-blocking receive of up to [`PKT_BURST_SIZE`] packets from `vport` into `burst`.
    ///
    /// An idle vport leaves the burst empty.
    fn receive_from_vport(&mut self, vport: VportId, burst: &mut Burst<Self::Packet>);

    /// Fill `key` for `packet`, received on `vport`. Must not modify the packet.
    fn flow_key_extract(&self, packet: &Self::Packet, vport: VportId, key: &mut FlowKey);

    /// Forward, drop or queue `packet` for transmit. Never blocks.
    fn switch_packet(&mut self, packet: Self::Packet, key: &FlowKey);

    /// Drain packets queued for client vports.
    fn flush_clients(&mut self);

    /// Drain packets queued for physical, kernel-bridge and raw-socket vports.
    fn flush_ports(&mut self);

    /// Drain packets queued for guest-transport vports.
    fn flush_vhost_devs(&mut self);

    /// Push the transmit ring of physical port `port` to the NIC.
    fn flush_nic_tx_ring(&mut self, port: PhyPortId);

    /// Service pending control-plane requests. Called only on the clock/report core.
    fn handle_control_requests(&mut self) {}
}

/// Periodic statistics reporting collaborator.
pub trait StatsReporter {
    fn report(&mut self);
}

impl<F: FnMut()> StatsReporter for F {
    fn report(&mut self) {
        self()
    }
}

/// Reporter that does nothing, for cores or tests that never report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReport;

impl StatsReporter for NoReport {
    fn report(&mut self) {}
}

/// Bounded batch of packet handles received from one vport.
///
/// Allocated once per core and reused for every receive call, so the hot loop never allocates.
#[derive(Debug)]
pub struct Burst<P> {
    packets: Vec<P>,
}

impl<P> Burst<P> {
    pub fn new() -> Self {
        Burst {
            packets: Vec::with_capacity(PKT_BURST_SIZE),
        }
    }

    /// Append a packet. Hands the packet back when the burst is already full.
    #[inline(always)]
    pub fn push(&mut self, packet: P) -> Result<(), P> {
        if self.packets.len() >= PKT_BURST_SIZE {
            return Err(packet);
        }
        self.packets.push(packet);
        Ok(())
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    #[inline(always)]
    pub fn is_full(&self) -> bool {
        self.packets.len() >= PKT_BURST_SIZE
    }

    pub fn as_slice(&self) -> &[P] {
        &self.packets
    }

    /// Move every packet out in receive order, leaving the burst empty.
    #[inline(always)]
    pub fn drain(&mut self) -> std::vec::Drain<'_, P> {
        self.packets.drain(..)
    }

    pub fn clear(&mut self) {
        self.packets.clear();
    }
}

impl<P> Default for Burst<P> {
    fn default() -> Self {
        Self::new()
    }
}
