//! Codec benchmarks for herald-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use herald_protocol::{codec, Encoding, Frame};
use serde_json::json;

fn bench_codec(c: &mut Criterion) {
    let frame = Frame::event(
        "messages created",
        json!({"id": 42, "text": "x".repeat(256), "room": "lobby"}),
    );

    for (name, encoding) in [("json", Encoding::Json), ("msgpack", Encoding::MessagePack)] {
        let encoded = codec::encode(&frame, encoding).unwrap();

        c.bench_function(&format!("encode_event_{}", name), |b| {
            b.iter(|| codec::encode(black_box(&frame), encoding))
        });
        c.bench_function(&format!("decode_event_{}", name), |b| {
            b.iter(|| codec::decode(black_box(&encoded), encoding))
        });
    }
}

criterion_group!(benches, bench_codec);
criterion_main!(benches);
