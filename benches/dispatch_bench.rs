use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

use vswitch_dispatch::buffer_pool::MbufPool;
use vswitch_dispatch::clock::SharedClock;
use vswitch_dispatch::config::{DispatchConfig, Patch};
use vswitch_dispatch::datapath::{Burst, Datapath, NoReport, PacketData, PKT_BURST_SIZE};
use vswitch_dispatch::flow::FlowKey;
use vswitch_dispatch::loopback::LoopbackSwitch;
use vswitch_dispatch::pipeline::switch_burst;
use vswitch_dispatch::removal::DeviceRemovalSlots;
use vswitch_dispatch::vport::{PhyPortId, VportId, VHOST0};
use vswitch_dispatch::DispatcherBuilder;

struct Frame([u8; 64]);

impl PacketData for Frame {
    fn payload(&self) -> &[u8] {
        &self.0
    }
}

/// Datapath that only folds keys into a checksum, so the bench measures the pipeline itself.
#[derive(Default)]
struct Sink {
    checksum: u64,
}

impl Datapath for Sink {
    type Packet = Frame;

    fn receive_from_vport(&mut self, _vport: VportId, _burst: &mut Burst<Frame>) {}

    fn flow_key_extract(&self, packet: &Frame, vport: VportId, key: &mut FlowKey) {
        key.in_port = vport;
        key.ether_dst.copy_from_slice(&packet.0[..6]);
        key.frame_len = packet.0.len() as u32;
    }

    fn switch_packet(&mut self, packet: Frame, key: &FlowKey) {
        self.checksum = self
            .checksum
            .wrapping_add(u64::from(key.frame_len) + u64::from(packet.0[0]));
    }

    fn flush_clients(&mut self) {}
    fn flush_ports(&mut self) {}
    fn flush_vhost_devs(&mut self) {}
    fn flush_nic_tx_ring(&mut self, _port: PhyPortId) {}
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");

    group.bench_function("switch_full_burst", |b| {
        let mut sink = Sink::default();
        let mut burst = Burst::new();
        b.iter(|| {
            for i in 0..PKT_BURST_SIZE {
                let _ = burst.push(Frame([i as u8; 64]));
            }
            switch_burst(&mut sink, black_box(1), &mut burst);
        });
        black_box(sink.checksum);
    });

    group.bench_function("switch_short_burst", |b| {
        let mut sink = Sink::default();
        let mut burst = Burst::new();
        b.iter(|| {
            let _ = burst.push(Frame([0; 64]));
            let _ = burst.push(Frame([1; 64]));
            switch_burst(&mut sink, black_box(1), &mut burst);
        });
        black_box(sink.checksum);
    });

    group.finish();
}

fn bench_client_iteration(c: &mut Criterion) {
    let mut group = c.benchmark_group("client_switching");

    let config = DispatchConfig {
        num_clients: 4,
        num_vhost: 2,
        patches: vec![Patch { from: 1, to: VHOST0 }],
        ..DispatchConfig::default()
    };
    let pool = MbufPool::new(4096);
    let switch = LoopbackSwitch::new(&config, Arc::clone(&pool));
    let clock = SharedClock::new();
    let removal = DeviceRemovalSlots::new();
    let mut dispatcher = DispatcherBuilder::new(1, &config)
        .clock(&clock)
        .removal(&removal)
        .build(switch.datapath(), NoReport);

    group.bench_function("idle_iteration", |b| {
        b.iter(|| dispatcher.poll_at(black_box(0)));
    });

    group.bench_function("burst_to_guest", |b| {
        let frame = [0xabu8; 64];
        b.iter(|| {
            for _ in 0..PKT_BURST_SIZE {
                switch.inject(1, &frame);
            }
            // One round over clients 1..3 reaches client 1 again.
            for _ in 0..3 {
                dispatcher.poll_at(0);
            }
            black_box(switch.drain_tx(VHOST0).len());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_pipeline, bench_client_iteration);
criterion_main!(benches);
