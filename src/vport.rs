//! Virtual port classes and the fixed vport index layout.
//!
//! Every virtual port is addressed by a single integer id. Each class owns a contiguous range
//! `[base, base + capacity)` of that id space, so the schedulers can walk a class with plain
//! integer arithmetic and never consult a lookup table on the hot path.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

/// Identifier of a virtual port (index into the global vport space).
pub type VportId = u32;

/// Identifier of a physical NIC port (index relative to [`PHYPORT0`]).
pub type PhyPortId = u16;

pub const MAX_CLIENTS: u32 = 16;
pub const MAX_PHYPORTS: u32 = 16;
pub const MAX_KNI_PORTS: u32 = 16;
pub const MAX_VETH_PORTS: u32 = 16;
pub const MAX_VHOST_PORTS: u32 = 16;

/// Switch-internal client queue. Never serviced by the client cursor.
pub const CLIENT0: VportId = 0;
/// First client the round-robin cursor services.
pub const CLIENT1: VportId = 1;
pub const PHYPORT0: VportId = CLIENT0 + MAX_CLIENTS;
pub const KNI0: VportId = PHYPORT0 + MAX_PHYPORTS;
pub const VETH0: VportId = KNI0 + MAX_KNI_PORTS;
pub const VHOST0: VportId = VETH0 + MAX_VETH_PORTS;
pub const MAX_VPORTS: u32 = VHOST0 + MAX_VHOST_PORTS;

/// Class of a virtual port.
///
/// `Physical` ports are never round-robined: they are pinned to dedicated cores. The other four
/// classes are walked one port per iteration by the client-switching core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PortClass {
    Client,
    Physical,
    KernelBridge,
    RawSocket,
    GuestTransport,
}

impl PortClass {
    /// Every class, in vport id order.
    pub const ALL: [PortClass; 5] = [
        PortClass::Client,
        PortClass::Physical,
        PortClass::KernelBridge,
        PortClass::RawSocket,
        PortClass::GuestTransport,
    ];

    /// Classes serviced by the round-robin scheduler, in service order.
    pub const ROUND_ROBIN: [PortClass; 4] = [
        PortClass::Client,
        PortClass::KernelBridge,
        PortClass::RawSocket,
        PortClass::GuestTransport,
    ];

    /// Stable index for class based arrays.
    pub const fn index(self) -> usize {
        match self {
            PortClass::Client => 0,
            PortClass::Physical => 1,
            PortClass::KernelBridge => 2,
            PortClass::RawSocket => 3,
            PortClass::GuestTransport => 4,
        }
    }

    /// First vport id owned by the class.
    pub const fn base(self) -> VportId {
        match self {
            PortClass::Client => CLIENT0,
            PortClass::Physical => PHYPORT0,
            PortClass::KernelBridge => KNI0,
            PortClass::RawSocket => VETH0,
            PortClass::GuestTransport => VHOST0,
        }
    }

    /// Number of vport ids reserved for the class.
    pub const fn capacity(self) -> u32 {
        match self {
            PortClass::Client => MAX_CLIENTS,
            PortClass::Physical => MAX_PHYPORTS,
            PortClass::KernelBridge => MAX_KNI_PORTS,
            PortClass::RawSocket => MAX_VETH_PORTS,
            PortClass::GuestTransport => MAX_VHOST_PORTS,
        }
    }

    /// Short name prefix used when naming vports of this class.
    pub const fn prefix(self) -> &'static str {
        match self {
            PortClass::Client => "client",
            PortClass::Physical => "port",
            PortClass::KernelBridge => "kni",
            PortClass::RawSocket => "veth",
            PortClass::GuestTransport => "vhost",
        }
    }

    /// Resolve the class owning `vport`, or `None` when the id is outside the vport space.
    pub fn of(vport: VportId) -> Option<PortClass> {
        PortClass::ALL
            .into_iter()
            .find(|class| vport >= class.base() && vport < class.base() + class.capacity())
    }
}

impl fmt::Display for PortClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PortClass::Client => "client",
            PortClass::Physical => "physical",
            PortClass::KernelBridge => "kernel_bridge",
            PortClass::RawSocket => "raw_socket",
            PortClass::GuestTransport => "guest_transport",
        };
        write!(f, "{label}")
    }
}

/// Vport id of physical port `port`.
#[inline]
pub const fn phy_vport(port: PhyPortId) -> VportId {
    PHYPORT0 + port as VportId
}

/// Helper structure wrapping a value per [`PortClass`].
///
/// Indexed by [`PortClass::index`] so lookups are a single array access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortClassTable<T> {
    values: Vec<T>,
}

impl<T> PortClassTable<T> {
    /// Build a table by executing a closure for each class in [`PortClass::ALL`] order.
    pub fn from_fn(mut f: impl FnMut(PortClass) -> T) -> Self {
        let mut values = Vec::with_capacity(PortClass::ALL.len());
        for class in PortClass::ALL {
            values.push(f(class));
        }
        PortClassTable { values }
    }

    pub fn get(&self, class: PortClass) -> &T {
        &self.values[class.index()]
    }

    pub fn get_mut(&mut self, class: PortClass) -> &mut T {
        &mut self.values[class.index()]
    }
}

impl<T> Index<PortClass> for PortClassTable<T> {
    type Output = T;

    fn index(&self, index: PortClass) -> &Self::Output {
        self.get(index)
    }
}

impl<T> IndexMut<PortClass> for PortClassTable<T> {
    fn index_mut(&mut self, index: PortClass) -> &mut Self::Output {
        self.get_mut(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_ranges_are_contiguous() {
        let mut next = 0;
        for class in PortClass::ALL {
            assert_eq!(class.base(), next);
            next += class.capacity();
        }
        assert_eq!(next, MAX_VPORTS);
    }

    #[test]
    fn class_lookup_by_vport() {
        assert_eq!(PortClass::of(CLIENT0), Some(PortClass::Client));
        assert_eq!(PortClass::of(phy_vport(3)), Some(PortClass::Physical));
        assert_eq!(PortClass::of(KNI0 + 15), Some(PortClass::KernelBridge));
        assert_eq!(PortClass::of(VETH0), Some(PortClass::RawSocket));
        assert_eq!(PortClass::of(VHOST0 + 1), Some(PortClass::GuestTransport));
        assert_eq!(PortClass::of(MAX_VPORTS), None);
    }

    #[test]
    fn class_table_indexes() {
        let table = PortClassTable::from_fn(|class| class.base());
        assert_eq!(table[PortClass::Client], CLIENT0);
        assert_eq!(table[PortClass::GuestTransport], VHOST0);
    }
}
