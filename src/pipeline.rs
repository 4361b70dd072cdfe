//! Burst extraction/switch pipeline.
//!
//! Every received burst goes through three phases:
//! 1. Priming: prefetch the payload of the first [`PREFETCH_OFFSET`] packets.
//! 2. Pipelined: for packet `j`, extract its flow key, prefetch packet `j + PREFETCH_OFFSET`,
//!    then hand packet `j` to the switching decision.
//! 3. Tail: the last [`PREFETCH_OFFSET`] packets are already in flight, so they are extracted and
//!    switched without further prefetching.
//!
//! By the time a packet's key is extracted its first cache line was requested several packets
//! earlier, so the memory stall overlaps with useful work on the packets in between.

use crate::clock::prefetch0;
use crate::datapath::{Burst, Datapath, PacketData, PKT_BURST_SIZE};
use crate::flow::FlowKey;
use crate::vport::VportId;

/// Distance, in packets, between the packet being switched and the packet being prefetched.
pub const PREFETCH_OFFSET: usize = 3;

const _: () = assert!(PREFETCH_OFFSET < PKT_BURST_SIZE);

/// Extract a key for and switch every packet of `burst`, in receive order, then leave the burst
/// empty.
///
/// Each packet reaches [`Datapath::switch_packet`] exactly once; no handle outlives this call.
#[inline(always)]
pub fn switch_burst<D: Datapath>(datapath: &mut D, vport: VportId, burst: &mut Burst<D::Packet>) {
    let rx_count = burst.len();
    if rx_count == 0 {
        return;
    }

    // Zeroed up front so extraction never reads stale bytes from an earlier burst.
    let mut keys = [FlowKey::ZERO; PKT_BURST_SIZE];

    for packet in burst.as_slice().iter().take(PREFETCH_OFFSET) {
        prefetch0(packet.payload());
    }

    let pipelined = rx_count.saturating_sub(PREFETCH_OFFSET);
    let mut packets = burst.drain();
    let mut j = 0;

    while j < pipelined {
        let Some(packet) = packets.next() else {
            break;
        };
        datapath.flow_key_extract(&packet, vport, &mut keys[j]);
        // The drain has already yielded packet j, so j + PREFETCH_OFFSET sits at OFFSET - 1.
        if let Some(ahead) = packets.as_slice().get(PREFETCH_OFFSET - 1) {
            prefetch0(ahead.payload());
        }
        datapath.switch_packet(packet, &keys[j]);
        j += 1;
    }

    for packet in packets {
        datapath.flow_key_extract(&packet, vport, &mut keys[j]);
        datapath.switch_packet(packet, &keys[j]);
        j += 1;
    }
}
