//! Routing hot-path benchmarks
//!
//! - Routing table lookups, inserts and purges
//! - Link-failure invalidation
//! - Packet queue churn
//! - Flood suppression caches
//! - Control message codec
//!
//! Run with: cargo bench -p meshroute-routing

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::time::Duration;

use meshroute_core::{DataPacket, InterfaceInfo, NodeAddr, PacketHeader, VirtualTime};
use meshroute_routing::{
    BroadcastIdCache, ControlMessage, DsdvEntry, DsdvUpdate, DuplicateCache, PacketQueue,
    QueueEntry, RouteError, RouteRequest, RoutingTable, RoutingTableEntry,
};

// ============================================================================
// Helper Functions
// ============================================================================

fn addr(n: u32) -> NodeAddr {
    NodeAddr(0x0a00_0000 | n)
}

fn iface() -> InterfaceInfo {
    InterfaceInfo::new(1, addr(1), NodeAddr::BROADCAST)
}

/// Table with `size` destinations spread over 8 neighbors
fn populated_table(size: u32) -> RoutingTable {
    let mut table = RoutingTable::with_hold_down(Duration::from_secs(15));
    for n in 0..size {
        let dst = addr(100 + n);
        let next_hop = addr(10 + n % 8);
        table.add_route(
            RoutingTableEntry::new(dst, next_hop, iface())
                .with_seq_no(n * 2, true)
                .with_hop_count((n % 10 + 1) as u16)
                .with_lifetime(Duration::from_secs(3), VirtualTime::ZERO),
        );
    }
    table
}

fn make_entry(id: u64, dst: NodeAddr) -> QueueEntry {
    let packet = DataPacket::new(PacketHeader::new(id, addr(1), dst), vec![0u8; 64]);
    QueueEntry::new(packet, Box::new(|_, _| {}), Box::new(|_, _| {}))
}

// ============================================================================
// Routing Table Benchmarks
// ============================================================================

fn bench_routing_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("routing_table");

    for size in [16u32, 256, 4096] {
        let table = populated_table(size);
        group.bench_with_input(BenchmarkId::new("lookup_valid", size), &size, |b, &size| {
            let mut n = 0u32;
            b.iter(|| {
                n = (n + 1) % size;
                table.lookup_valid_route(black_box(addr(100 + n)), VirtualTime::from_secs(1))
            })
        });
    }

    group.bench_function("add_delete_route", |b| {
        let mut table = populated_table(256);
        b.iter(|| {
            let entry = RoutingTableEntry::new(addr(9999), addr(10), iface());
            table.add_route(black_box(entry));
            table.delete_route(addr(9999))
        })
    });

    group.bench_function("purge_256_expired", |b| {
        b.iter_batched(
            || populated_table(256),
            |mut table| table.purge(VirtualTime::from_secs(4)),
            criterion::BatchSize::SmallInput,
        )
    });

    group.bench_function("invalidate_next_hop_256", |b| {
        b.iter_batched(
            || populated_table(256),
            |mut table| {
                table.invalidate_routes_with_next_hop(
                    black_box(addr(10)),
                    Duration::from_secs(15),
                    VirtualTime::from_secs(1),
                )
            },
            criterion::BatchSize::SmallInput,
        )
    });

    group.finish();
}

// ============================================================================
// Packet Queue Benchmarks
// ============================================================================

fn bench_packet_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet_queue");

    group.bench_function("enqueue_dequeue", |b| {
        let mut queue = PacketQueue::new(64, 64, Duration::from_secs(30));
        let mut id = 0u64;
        b.iter(|| {
            id += 1;
            let dst = addr(100 + (id % 4) as u32);
            let _ = queue.enqueue(make_entry(id, dst), VirtualTime::ZERO);
            queue.dequeue(dst, VirtualTime::ZERO)
        })
    });

    group.bench_function("fill_and_flush_64", |b| {
        b.iter(|| {
            let mut queue = PacketQueue::new(64, 64, Duration::from_secs(30));
            for id in 0..64 {
                let _ = queue.enqueue(make_entry(id, addr(100)), VirtualTime::ZERO);
            }
            queue.dequeue_all(addr(100), VirtualTime::ZERO).len()
        })
    });

    group.finish();
}

// ============================================================================
// Duplicate Cache Benchmarks
// ============================================================================

fn bench_duplicate_detection(c: &mut Criterion) {
    let mut group = c.benchmark_group("duplicate_detection");

    group.bench_function("broadcast_id_fresh", |b| {
        let mut cache = BroadcastIdCache::new(Duration::from_secs(6));
        let mut id = 0u32;
        b.iter(|| {
            id += 1;
            cache.is_duplicate(black_box(addr(2)), id, VirtualTime::ZERO)
        })
    });

    group.bench_function("data_packet_repeat", |b| {
        let mut cache = DuplicateCache::new(Duration::from_secs(6));
        cache.check(addr(2), 7, VirtualTime::ZERO);
        b.iter(|| cache.check(black_box(addr(2)), black_box(7), VirtualTime::ZERO))
    });

    group.finish();
}

// ============================================================================
// Codec Benchmarks
// ============================================================================

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    let rreq = ControlMessage::Rreq(RouteRequest {
        gratuitous_reply: true,
        destination_only: false,
        unknown_seq_no: false,
        hop_count: 3,
        id: 42,
        destination: addr(100),
        dest_seq_no: 12,
        origin: addr(1),
        origin_seq_no: 7,
        ttl: 35,
    });
    group.bench_function("encode_rreq", |b| b.iter(|| black_box(&rreq).encode()));

    let mut rerr = RouteError::new();
    for n in 0..64 {
        rerr.add_unreachable(addr(100 + n), n * 2 + 1);
    }
    let encoded = ControlMessage::Rerr(rerr).encode().unwrap_or_default();
    group.bench_function("decode_rerr_64", |b| {
        b.iter(|| ControlMessage::decode(black_box(&encoded)))
    });

    let update = ControlMessage::Update(DsdvUpdate {
        entries: (0..128)
            .map(|n| DsdvEntry {
                destination: addr(100 + n),
                seq_no: n * 2,
                hop_count: (n % 10 + 1) as u16,
            })
            .collect(),
    });
    group.bench_function("encode_update_128", |b| b.iter(|| black_box(&update).encode()));

    group.finish();
}

criterion_group!(
    benches,
    bench_routing_table,
    bench_packet_queue,
    bench_duplicate_detection,
    bench_codec,
);

criterion_main!(benches);
