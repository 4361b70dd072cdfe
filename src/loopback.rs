//! In-process reference datapath.
//!
//! Every vport is a pair of bounded rings: `rx` carries frames into the switch (filled by
//! [`LoopbackSwitch::inject`]) and `tx` carries frames out of it. Forwarding follows a static
//! patch table keyed by input vport. Physical ports transmit their `tx` ring to the wire on
//! [`Datapath::flush_nic_tx_ring`]; the other classes keep delivered frames queued until the host
//! side drains them with [`LoopbackSwitch::drain_tx`].
//!
//! The shared state lives in [`LoopbackSwitch`]; each dispatch core drives its own
//! [`LoopbackDatapath`] holding that core's pending egress.

use crate::buffer_pool::MbufPool;
use crate::config::DispatchConfig;
use crate::datapath::{Burst, Datapath, PKT_BURST_SIZE};
use crate::flow::FlowKey;
use crate::packet::Packet;
use crate::queue::{VportRing, RING_SIZE};
use crate::stats::StatsTable;
use crate::vport::{phy_vport, PhyPortId, PortClass, VportId, MAX_PHYPORTS, MAX_VPORTS};
use std::sync::Arc;

/// State shared by every core driving the loopback switch.
pub struct LoopbackSwitch {
    pool: Arc<MbufPool>,
    stats: Arc<StatsTable>,
    rx: Vec<VportRing<Packet>>,
    tx: Vec<VportRing<Packet>>,
    patches: Vec<Option<VportId>>,
}

impl LoopbackSwitch {
    /// Build the rings, stats and patch table for `config`.
    pub fn new(config: &DispatchConfig, pool: Arc<MbufPool>) -> Arc<Self> {
        let mut patches = vec![None; MAX_VPORTS as usize];
        for patch in &config.patches {
            if let Some(slot) = patches.get_mut(patch.from as usize) {
                *slot = Some(patch.to);
            }
        }
        Arc::new(LoopbackSwitch {
            pool,
            stats: Arc::new(StatsTable::new(config)),
            rx: (0..MAX_VPORTS).map(|_| VportRing::new(RING_SIZE)).collect(),
            tx: (0..MAX_VPORTS).map(|_| VportRing::new(RING_SIZE)).collect(),
            patches,
        })
    }

    pub fn stats(&self) -> &Arc<StatsTable> {
        &self.stats
    }

    pub fn pool(&self) -> &Arc<MbufPool> {
        &self.pool
    }

    /// Locally administered MAC of physical port `port`.
    pub fn mac_address(port: PhyPortId) -> Option<[u8; 6]> {
        if u32::from(port) >= MAX_PHYPORTS {
            return None;
        }
        let [hi, lo] = port.to_be_bytes();
        Some([0x02, 0x00, 0x00, 0x00, hi, lo])
    }

    /// Host side: queue `frame` as received on `vport`.
    ///
    /// Returns `false` when the frame was dropped (unknown vport, exhausted pool or full ring).
    pub fn inject(&self, vport: VportId, frame: &[u8]) -> bool {
        let (Some(ring), Some(counters)) = (self.rx.get(vport as usize), self.stats.vport(vport))
        else {
            return false;
        };
        let Some(packet) = Packet::new(&self.pool, frame) else {
            counters.add_rx_dropped(1);
            return false;
        };
        if ring.enqueue(packet).is_err() {
            counters.add_overrun();
            counters.add_rx_dropped(1);
            return false;
        }
        true
    }

    /// Host side: take every frame delivered to `vport` so far.
    pub fn drain_tx(&self, vport: VportId) -> Vec<Packet> {
        let Some(ring) = self.tx.get(vport as usize) else {
            return Vec::new();
        };
        std::iter::from_fn(|| ring.try_dequeue()).collect()
    }

    /// Datapath instance for one dispatch core.
    pub fn datapath(self: &Arc<Self>) -> LoopbackDatapath {
        LoopbackDatapath {
            switch: Arc::clone(self),
            pending_clients: Vec::with_capacity(PKT_BURST_SIZE),
            pending_ports: Vec::with_capacity(PKT_BURST_SIZE),
            pending_vhost: Vec::with_capacity(PKT_BURST_SIZE),
        }
    }

    fn deliver(&self, vport: VportId, packet: Packet) {
        let (Some(ring), Some(counters)) = (self.tx.get(vport as usize), self.stats.vport(vport))
        else {
            self.stats.add_switch_tx_dropped(1);
            return;
        };
        match ring.enqueue(packet) {
            // Physical ports count tx when the NIC ring is flushed.
            Ok(()) if PortClass::of(vport) != Some(PortClass::Physical) => counters.add_tx(1),
            Ok(()) => {}
            Err(_dropped) => {
                counters.add_overrun();
                counters.add_tx_dropped(1);
            }
        }
    }
}

/// Per-core view of the loopback switch holding that core's pending egress.
pub struct LoopbackDatapath {
    switch: Arc<LoopbackSwitch>,
    pending_clients: Vec<(VportId, Packet)>,
    pending_ports: Vec<(VportId, Packet)>,
    pending_vhost: Vec<(VportId, Packet)>,
}

impl LoopbackDatapath {
    pub fn switch(&self) -> &Arc<LoopbackSwitch> {
        &self.switch
    }

    /// Packets switched on this core and not flushed yet.
    pub fn pending(&self) -> usize {
        self.pending_clients.len() + self.pending_ports.len() + self.pending_vhost.len()
    }

    fn flush(switch: &LoopbackSwitch, pending: &mut Vec<(VportId, Packet)>) {
        for (vport, packet) in pending.drain(..) {
            switch.deliver(vport, packet);
        }
    }
}

impl Datapath for LoopbackDatapath {
    type Packet = Packet;

    #[inline]
    fn receive_from_vport(&mut self, vport: VportId, burst: &mut Burst<Packet>) {
        let Some(ring) = self.switch.rx.get(vport as usize) else {
            return;
        };
        let received = ring.dequeue_burst(burst);
        if received > 0 {
            if let Some(counters) = self.switch.stats.vport(vport) {
                counters.add_rx(received as u64);
            }
        }
    }

    #[inline]
    fn flow_key_extract(&self, packet: &Packet, vport: VportId, key: &mut FlowKey) {
        key.in_port = vport;
        key.frame_len = packet.len() as u32;
    }

    #[inline]
    fn switch_packet(&mut self, packet: Packet, key: &FlowKey) {
        let out = self
            .switch
            .patches
            .get(key.in_port as usize)
            .copied()
            .flatten();
        let Some(out) = out else {
            self.switch.stats.add_switch_rx_dropped(1);
            return;
        };
        match PortClass::of(out) {
            Some(PortClass::Client) => self.pending_clients.push((out, packet)),
            Some(PortClass::Physical | PortClass::KernelBridge | PortClass::RawSocket) => {
                self.pending_ports.push((out, packet))
            }
            Some(PortClass::GuestTransport) => self.pending_vhost.push((out, packet)),
            None => self.switch.stats.add_switch_tx_dropped(1),
        }
    }

    fn flush_clients(&mut self) {
        Self::flush(&self.switch, &mut self.pending_clients);
    }

    fn flush_ports(&mut self) {
        Self::flush(&self.switch, &mut self.pending_ports);
    }

    fn flush_vhost_devs(&mut self) {
        Self::flush(&self.switch, &mut self.pending_vhost);
    }

    fn flush_nic_tx_ring(&mut self, port: PhyPortId) {
        let vport = phy_vport(port);
        let (Some(ring), Some(counters)) =
            (self.switch.tx.get(vport as usize), self.switch.stats.vport(vport))
        else {
            return;
        };
        let mut sent = 0;
        while let Some(packet) = ring.try_dequeue() {
            drop(packet);
            sent += 1;
        }
        if sent > 0 {
            counters.add_tx(sent);
        }
    }
}
