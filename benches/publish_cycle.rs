//! Benchmarks for one poll cycle without the interval wait
//!
//! Measures each stage separately and then together:
//! - decode of the full offset table from a snapshot source
//! - encode plus JSON serialization
//! - framing into the 4096-byte region
//!
//! Platform: Cross-platform (in-memory snapshot, CI-safe)

use chrono::{TimeZone, Utc};
use criterion::{Criterion, criterion_group, criterion_main};
use simbridge::publisher::{
    DEFAULT_LIVENESS_NAME, DEFAULT_REGION_NAME, MemoryBackend, REGION_SIZE, SharedBufferPublisher,
    write_frame,
};
use simbridge::source::SnapshotSource;
use simbridge::test_utils::cruise_snapshot;
use simbridge::{TelemetryDecoder, TelemetrySink, TelemetrySource, encode};
use std::hint::black_box;

fn refreshed_source() -> SnapshotSource {
    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
    let mut source = SnapshotSource::from_snapshot(cruise_snapshot());
    runtime.block_on(async {
        source.connect().await.unwrap();
        source.refresh().await.unwrap();
    });
    source
}

fn bench_stages(c: &mut Criterion) {
    let source = refreshed_source();
    let decoder = TelemetryDecoder::new();
    let telemetry = decoder.decode(&source).unwrap();
    let now = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap();
    let json = encode(&telemetry, now).to_json().unwrap();

    let mut group = c.benchmark_group("stages");

    group.bench_function("decode", |b| {
        b.iter(|| black_box(decoder.decode(black_box(&source)).unwrap()));
    });

    group.bench_function("encode_json", |b| {
        b.iter(|| black_box(encode(black_box(&telemetry), now).to_json().unwrap()));
    });

    let mut region = vec![0u8; REGION_SIZE];
    group.bench_function("write_frame", |b| {
        b.iter(|| black_box(write_frame(&mut region, black_box(&json)).unwrap()));
    });

    group.finish();
}

fn bench_full_cycle(c: &mut Criterion) {
    let source = refreshed_source();
    let decoder = TelemetryDecoder::new();
    let mut publisher = SharedBufferPublisher::open(
        MemoryBackend::new(),
        DEFAULT_REGION_NAME,
        DEFAULT_LIVENESS_NAME,
    )
    .unwrap();

    c.bench_function("decode_encode_publish", |b| {
        b.iter(|| {
            let telemetry = decoder.decode(&source).unwrap();
            let message = simbridge::encode_now(&telemetry);
            black_box(publisher.publish(&message).unwrap())
        });
    });

    publisher.close();
}

criterion_group!(benches, bench_stages, bench_full_cycle);
criterion_main!(benches);
