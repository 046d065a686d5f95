//! Benchmarks for the per-tick aggregation path

use std::cell::Cell;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hogwatch::format::format_bytes;
use hogwatch::{
    ConnectionSource, DnsResolver, Error, HistoryBuffer, IoAccountant, ProcessNamer,
    RawConnection, Result, ReverseLookup, SampleAggregator, TableRenderer,
};

/// `connections` sockets spread over `processes` pids, every counter growing
/// by a fixed step on each read
struct SyntheticHost {
    table: Vec<RawConnection>,
    reads: Cell<u64>,
}

impl SyntheticHost {
    fn new(connections: u32, processes: u32) -> Self {
        let table = (0..connections)
            .map(|i| {
                let port = 40_000 + (i % 20_000) as u16;
                let local = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), port);
                let host = Ipv4Addr::new(198, 51, (i / 256 % 256) as u8, (i % 256) as u8);
                let remote = SocketAddr::new(IpAddr::V4(host), 443);
                RawConnection::new(
                    Some(1 + i % processes),
                    Some(local),
                    Some(remote),
                    libc::SOCK_STREAM,
                )
            })
            .collect();
        Self {
            table,
            reads: Cell::new(0),
        }
    }
}

impl ConnectionSource for SyntheticHost {
    fn connections(&self) -> Result<Vec<RawConnection>> {
        Ok(self.table.clone())
    }
}

impl IoAccountant for SyntheticHost {
    fn bytes_written(&self, pid: u32) -> Result<u64> {
        let reads = self.reads.get() + 1;
        self.reads.set(reads);
        Ok(reads * 512 + u64::from(pid))
    }
}

impl ProcessNamer for SyntheticHost {
    fn process_name(&self, pid: u32) -> Result<String> {
        Ok(format!("proc-{}", pid % 16))
    }
}

/// Resolver backend that never finds a name
struct NoNames;

impl ReverseLookup for NoNames {
    fn reverse_lookup(&self, ip: IpAddr) -> Result<String> {
        Err(Error::lookup(ip, "benchmark"))
    }
}

fn bench_collect(c: &mut Criterion) {
    let mut group = c.benchmark_group("collect");
    for connections in [64u32, 512, 4096] {
        let host = SyntheticHost::new(connections, 32);
        let mut aggregator = SampleAggregator::with_resolver(DnsResolver::with_lookup(NoNames));
        group.bench_with_input(BenchmarkId::from_parameter(connections), &host, |b, host| {
            b.iter(|| black_box(aggregator.collect(host).expect("synthetic host")));
        });
    }
    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let host = SyntheticHost::new(256, 32);
    let mut aggregator = SampleAggregator::with_resolver(DnsResolver::with_lookup(NoNames));
    let mut history = HistoryBuffer::default();
    for _ in 0..history.capacity() {
        history.push(aggregator.collect(&host).expect("synthetic host"));
    }

    let renderer = TableRenderer::new();
    c.bench_function("render_full_history", |b| {
        b.iter(|| black_box(renderer.render(&history)));
    });
}

fn bench_format_bytes(c: &mut Criterion) {
    c.bench_function("format_bytes", |b| {
        b.iter(|| {
            for shift in 0..50 {
                black_box(format_bytes(black_box(1u64 << shift)));
            }
        });
    });
}

criterion_group!(benches, bench_collect, bench_render, bench_format_bytes);
criterion_main!(benches);
