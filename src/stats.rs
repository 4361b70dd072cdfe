//! Switch statistics storage.
//!
//! Counters are written on the hot path by whichever core touches a vport and read by the
//! reporting core, so every counter is a relaxed atomic. Each vport's counter block sits on its
//! own cache line.

use crate::clock::CachePadded;
use crate::config::DispatchConfig;
use crate::vport::{phy_vport, PhyPortId, PortClass, VportId, MAX_PHYPORTS, MAX_VPORTS};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

/// Printable MAC returned for ports that cannot be resolved.
pub const MAC_PLACEHOLDER: &str = "00:00:00:00:00:00";

/// Counters of one vport.
#[derive(Debug, Default)]
pub struct VportCounters {
    rx_packets: AtomicU64,
    rx_dropped: AtomicU64,
    tx_packets: AtomicU64,
    tx_dropped: AtomicU64,
    overruns: AtomicU64,
}

impl VportCounters {
    #[inline(always)]
    pub fn add_rx(&self, packets: u64) {
        self.rx_packets.fetch_add(packets, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn add_rx_dropped(&self, packets: u64) {
        self.rx_dropped.fetch_add(packets, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn add_tx(&self, packets: u64) {
        self.tx_packets.fetch_add(packets, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn add_tx_dropped(&self, packets: u64) {
        self.tx_dropped.fetch_add(packets, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn add_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> VportStatsSnapshot {
        VportStatsSnapshot {
            rx_packets: self.rx_packets.load(Ordering::Relaxed),
            rx_dropped: self.rx_dropped.load(Ordering::Relaxed),
            tx_packets: self.tx_packets.load(Ordering::Relaxed),
            tx_dropped: self.tx_dropped.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of one vport's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VportStatsSnapshot {
    pub rx_packets: u64,
    pub rx_dropped: u64,
    pub tx_packets: u64,
    pub tx_dropped: u64,
    pub overruns: u64,
}

/// Per-vport names and counters plus switch-wide drop counters.
pub struct StatsTable {
    names: Vec<String>,
    vports: Vec<CachePadded<VportCounters>>,
    switch_rx_dropped: CachePadded<AtomicU64>,
    switch_tx_dropped: CachePadded<AtomicU64>,
}

impl StatsTable {
    /// Name every configured vport `<class prefix><index within class>`; the rest stay unnamed.
    pub fn new(config: &DispatchConfig) -> Self {
        let mut names = vec![String::new(); MAX_VPORTS as usize];
        for class in PortClass::ALL {
            if class == PortClass::Physical {
                continue;
            }
            for n in 0..config.class_count(class).min(class.capacity()) {
                names[(class.base() + n) as usize] = format!("{}{n}", class.prefix());
            }
        }
        for port in config.physical_ports() {
            names[phy_vport(port) as usize] = format!("{}{port}", PortClass::Physical.prefix());
        }

        StatsTable {
            names,
            vports: (0..MAX_VPORTS).map(|_| CachePadded::default()).collect(),
            switch_rx_dropped: CachePadded::default(),
            switch_tx_dropped: CachePadded::default(),
        }
    }

    /// Name of `vport`, empty when it is not configured.
    pub fn name(&self, vport: VportId) -> &str {
        self.names.get(vport as usize).map(String::as_str).unwrap_or("")
    }

    /// Counters of `vport`, `None` outside the vport space.
    #[inline(always)]
    pub fn vport(&self, vport: VportId) -> Option<&VportCounters> {
        self.vports.get(vport as usize).map(|c| &c.value)
    }

    pub fn snapshot(&self, vport: VportId) -> VportStatsSnapshot {
        self.vport(vport).map(VportCounters::snapshot).unwrap_or_default()
    }

    /// Sum of ring overruns across every vport.
    pub fn total_overruns(&self) -> u64 {
        self.vports
            .iter()
            .map(|c| c.value.overruns.load(Ordering::Relaxed))
            .sum()
    }

    #[inline(always)]
    pub fn add_switch_rx_dropped(&self, packets: u64) {
        self.switch_rx_dropped.value.fetch_add(packets, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn add_switch_tx_dropped(&self, packets: u64) {
        self.switch_tx_dropped.value.fetch_add(packets, Ordering::Relaxed);
    }

    pub fn switch_rx_dropped(&self) -> u64 {
        self.switch_rx_dropped.value.load(Ordering::Relaxed)
    }

    pub fn switch_tx_dropped(&self) -> u64 {
        self.switch_tx_dropped.value.load(Ordering::Relaxed)
    }
}

/// Format six bytes as `aa:bb:cc:dd:ee:ff`.
pub fn format_mac(mac: [u8; 6]) -> String {
    mac.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Printable MAC address per physical port, resolved once on first successful lookup.
pub struct MacAddressCache {
    resolve: Box<dyn Fn(PhyPortId) -> Option<[u8; 6]> + Send>,
    addresses: Vec<OnceLock<String>>,
}

impl MacAddressCache {
    pub fn new(resolve: impl Fn(PhyPortId) -> Option<[u8; 6]> + Send + 'static) -> Self {
        MacAddressCache {
            resolve: Box::new(resolve),
            addresses: (0..MAX_PHYPORTS).map(|_| OnceLock::new()).collect(),
        }
    }

    /// Printable address of `port`; [`MAC_PLACEHOLDER`] for an out-of-range or unresolved port.
    pub fn get(&self, port: PhyPortId) -> &str {
        let Some(slot) = self.addresses.get(port as usize) else {
            return MAC_PLACEHOLDER;
        };
        if let Some(address) = slot.get() {
            return address.as_str();
        }
        match (self.resolve)(port) {
            Some(mac) => slot.get_or_init(|| format_mac(mac)).as_str(),
            None => MAC_PLACEHOLDER,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PortQueueCore;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn names_follow_configuration() {
        let config = DispatchConfig {
            num_clients: 3,
            num_kni: 1,
            port_queue_cores: vec![PortQueueCore { port: 2, queue: 0, core: 2 }],
            ..DispatchConfig::default()
        };
        let stats = StatsTable::new(&config);
        assert_eq!(stats.name(0), "client0");
        assert_eq!(stats.name(2), "client2");
        assert_eq!(stats.name(3), "");
        assert_eq!(stats.name(phy_vport(2)), "port2");
        assert_eq!(stats.name(phy_vport(0)), "");
        assert_eq!(stats.name(PortClass::KernelBridge.base()), "kni0");
        assert_eq!(stats.name(MAX_VPORTS), "");
    }

    #[test]
    fn counters_accumulate() {
        let stats = StatsTable::new(&DispatchConfig::default());
        let counters = stats.vport(1).unwrap();
        counters.add_rx(5);
        counters.add_tx(2);
        counters.add_overrun();
        stats.vport(2).unwrap().add_overrun();
        stats.add_switch_rx_dropped(3);

        let snap = stats.snapshot(1);
        assert_eq!((snap.rx_packets, snap.tx_packets, snap.overruns), (5, 2, 1));
        assert_eq!(stats.total_overruns(), 2);
        assert_eq!(stats.switch_rx_dropped(), 3);
        assert_eq!(stats.snapshot(MAX_VPORTS), VportStatsSnapshot::default());
    }

    #[test]
    fn mac_cache_resolves_once() {
        let lookups = Arc::new(AtomicUsize::new(0));
        let counter = lookups.clone();
        let cache = MacAddressCache::new(move |port| {
            counter.fetch_add(1, Ordering::Relaxed);
            (port == 1).then_some([0x02, 0, 0, 0, 0xab, 0x01])
        });

        assert_eq!(cache.get(1), "02:00:00:00:ab:01");
        assert_eq!(cache.get(1), "02:00:00:00:ab:01");
        assert_eq!(lookups.load(Ordering::Relaxed), 1);

        assert_eq!(cache.get(3), MAC_PLACEHOLDER);
        assert_eq!(cache.get(MAX_PHYPORTS as PhyPortId), MAC_PLACEHOLDER);
    }
}
