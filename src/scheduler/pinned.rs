//! Physical ports pinned to a dedicated core.
//!
//! Pinned ports are never round-robined: every iteration services every port of the list, in
//! configuration order, and pushes that port's transmit ring to the NIC right after switching it.

use crate::datapath::{Burst, Datapath};
use crate::pipeline::switch_burst;
use crate::vport::{phy_vport, PhyPortId};

pub struct PinnedPorts<P> {
    ports: Vec<PhyPortId>,
    burst: Burst<P>,
}

impl<P> PinnedPorts<P> {
    pub fn new(ports: Vec<PhyPortId>) -> Self {
        PinnedPorts {
            ports,
            burst: Burst::new(),
        }
    }

    /// Receive, switch and flush each pinned port once.
    #[inline]
    pub fn step<D>(&mut self, datapath: &mut D)
    where
        D: Datapath<Packet = P>,
    {
        for &port in &self.ports {
            let vport = phy_vport(port);
            datapath.receive_from_vport(vport, &mut self.burst);
            switch_burst(datapath, vport, &mut self.burst);

            datapath.flush_clients();
            datapath.flush_ports();
            datapath.flush_vhost_devs();
            datapath.flush_nic_tx_ring(port);
        }
    }
}
