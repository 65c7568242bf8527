//! Latency benchmarks for Herald.
//!
//! These benchmarks focus on the time from emit to a frame being queued.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use herald_bench::{runtime, Fixture};
use herald_core::{EventContext, EventKind, ServiceEvent};
use herald_protocol::{codec, Encoding, Frame};
use serde_json::json;
use std::time::Instant;

/// Benchmark emit until every client has the frame.
fn bench_emit_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("emit_latency");
    let rt = runtime();

    for (name, clients) in [("single_client", 1), ("ten_clients", 10)] {
        group.bench_function(name, |b| {
            b.iter_custom(|iters| {
                let mut fixture = Fixture::new(clients);
                let messages = fixture.hub.service("messages").unwrap();

                let start = Instant::now();
                for _ in 0..iters {
                    rt.block_on(messages.emit_created(json!({"n": 1}), EventContext::new()));
                    let received = fixture.drain();
                    assert_eq!(received, clients);
                }
                start.elapsed()
            });
        });
    }

    group.finish();
}

/// Benchmark building and encoding an event frame.
fn bench_frame_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_creation");
    let event = ServiceEvent::new(
        "messages",
        EventKind::Created,
        json!({"id": 1, "text": "hello", "room": "lobby"}),
        EventContext::new(),
    );

    group.bench_function("event_name", |b| b.iter(|| black_box(&event).event_name()));

    group.bench_function("to_frame", |b| {
        b.iter(|| black_box(&event).to_frame(event.broadcast_payload().clone()))
    });

    let frame = event.to_frame(event.payload.clone());
    group.bench_function("encode_json", |b| {
        b.iter(|| codec::encode_text(black_box(&frame)).unwrap())
    });

    group.bench_function("encode_msgpack", |b| {
        b.iter(|| codec::encode(black_box(&frame), Encoding::MessagePack).unwrap())
    });

    group.bench_function("error", |b| {
        b.iter(|| Frame::error(black_box(1001), black_box("Error message")))
    });

    group.finish();
}

criterion_group!(benches, bench_emit_latency, bench_frame_creation);
criterion_main!(benches);
