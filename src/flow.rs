//! Flow key record handed to the switching decision.
//!
//! The dispatch core never interprets the key; it only guarantees that each key slot is zeroed
//! before extraction so no stale bytes from a previous burst leak into classification.

use crate::vport::VportId;

/// Fixed-size per-packet record describing the flow a packet belongs to.
///
/// Layout is `repr(C)` so the whole burst of keys is one contiguous, zero-initialisable block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FlowKey {
    pub in_port: VportId,
    pub ether_dst: [u8; 6],
    pub ether_src: [u8; 6],
    pub ether_type: u16,
    pub vlan_id: u16,
    pub vlan_prio: u8,
    pub ip_proto: u8,
    pub ip_tos: u8,
    pub ip_ttl: u8,
    pub ip_src: u32,
    pub ip_dst: u32,
    pub tran_src_port: u16,
    pub tran_dst_port: u16,
    pub frame_len: u32,
}

impl FlowKey {
    /// All-zero key, used to reset burst key slots.
    pub const ZERO: FlowKey = FlowKey {
        in_port: 0,
        ether_dst: [0; 6],
        ether_src: [0; 6],
        ether_type: 0,
        vlan_id: 0,
        vlan_prio: 0,
        ip_proto: 0,
        ip_tos: 0,
        ip_ttl: 0,
        ip_src: 0,
        ip_dst: 0,
        tran_src_port: 0,
        tran_dst_port: 0,
        frame_len: 0,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_matches_default() {
        assert_eq!(FlowKey::ZERO, FlowKey::default());
    }
}
