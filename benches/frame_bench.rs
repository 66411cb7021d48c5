use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use rtl433_net::core::codec::FrameCodec;
use rtl433_net::protocol::message::{Fields, Message};
use serde_json::json;
use tokio_util::codec::{Decoder, Encoder};

/// A typical rtl_433 weather-station record, padded with `extra` fields.
fn record(extra: usize) -> Fields {
    let mut fields = match json!({
        "time": "2024-05-01 12:00:00",
        "model": "Fineoffset-WS85",
        "id": 3051,
        "battery_mV": 3280,
        "temperature_C": 21.4,
        "humidity": 58,
        "wind_avg_m_s": 3.2,
        "wind_max_m_s": 5.1,
        "wind_dir_deg": 247,
        "rain_mm": 12.6,
        "mic": "CRC",
    }) {
        serde_json::Value::Object(fields) => fields,
        _ => Fields::new(),
    };
    for i in 0..extra {
        fields.insert(format!("extra_{i}"), json!(i));
    }
    fields
}

#[allow(clippy::unwrap_used)]
fn bench_packet_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet_frames");

    for &extra in &[0usize, 32, 512] {
        let fields = record(extra);
        let frame = Message::Packet(fields.clone()).to_frame().unwrap();
        let wire = frame.to_bytes().unwrap();
        group.throughput(Throughput::Bytes(wire.len() as u64));

        group.bench_function(format!("encode_{}b", wire.len()), |b| {
            b.iter_batched(
                || fields.clone(),
                |fields| {
                    let frame = Message::Packet(fields).to_frame().unwrap();
                    let mut buf = BytesMut::with_capacity(wire.len());
                    FrameCodec::default().encode(frame, &mut buf).unwrap();
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function(format!("decode_{}b", wire.len()), |b| {
            b.iter_batched(
                || BytesMut::from(&wire[..]),
                |mut buf| {
                    let frame = FrameCodec::default().decode(&mut buf).unwrap().unwrap();
                    let message = Message::from_frame(&frame);
                    assert!(message.is_ok());
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_fragmented_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("fragmented_stream");
    let mut wire = BytesMut::new();
    for seq in 0..100 {
        let mut fields = record(0);
        fields.insert("seq".into(), json!(seq));
        let frame = Message::Packet(fields).to_frame().unwrap();
        FrameCodec::default().encode(frame, &mut wire).unwrap();
    }
    let wire = wire.freeze();
    group.throughput(Throughput::Bytes(wire.len() as u64));

    for &chunk in &[7usize, 64, 1460] {
        group.bench_function(format!("chunk_{chunk}b"), |b| {
            b.iter(|| {
                let mut codec = FrameCodec::default();
                let mut buf = BytesMut::new();
                let mut frames = 0;
                for piece in wire.chunks(chunk) {
                    buf.extend_from_slice(piece);
                    while codec.decode(&mut buf).unwrap().is_some() {
                        frames += 1;
                    }
                }
                assert_eq!(frames, 100);
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_packet_frames, bench_fragmented_stream);
criterion_main!(benches);
