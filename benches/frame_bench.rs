use bytes::BytesMut;
use candlemc::core::frame::{FrameCodec, RawFrame};
use candlemc::event::EventBus;
use candlemc::protocol::{read_packet, ConnectionState, HandshakePacket, NextState, Packet};
use candlemc::transport::ServerContext;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use tokio_util::codec::{Decoder, Encoder};

#[allow(clippy::unwrap_used)]
fn bench_frame_encode_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode_decode");
    let payload_sizes = [16usize, 256, 4096, 65536];

    for &size in &payload_sizes {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("encode_{size}b"), |b| {
            b.iter_batched(
                || RawFrame::new(0x2a, vec![0u8; size]),
                |frame| {
                    let mut buf = BytesMut::with_capacity(size + 8);
                    FrameCodec::default().encode(frame, &mut buf).unwrap();
                },
                BatchSize::SmallInput,
            )
        });

        let mut encoded = BytesMut::new();
        FrameCodec::default()
            .encode(RawFrame::new(0x2a, vec![0u8; size]), &mut encoded)
            .unwrap();
        group.bench_function(format!("decode_{size}b"), |b| {
            b.iter_batched(
                || encoded.clone(),
                |mut buf| {
                    let frame = FrameCodec::default().decode(&mut buf).unwrap();
                    assert!(frame.is_some());
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_handshake_resolution(c: &mut Criterion) {
    let context = ServerContext::new(EventBus::new(1)).unwrap();
    let codec = context.codec_for(769).unwrap();
    let handshake =
        HandshakePacket::new(769, "localhost", 25565, NextState::Login, &codec).unwrap();
    let frame = RawFrame::new(0x00, handshake.payload().clone());

    c.bench_function("handshake_read_packet", |b| {
        b.iter(|| {
            let packet = read_packet(
                frame.clone(),
                ConnectionState::Handshaking,
                769,
                &context.registries,
                &codec,
            )
            .unwrap();
            assert_eq!(packet.id(), 0x00);
        })
    });
}

criterion_group!(benches, bench_frame_encode_decode, bench_handshake_resolution);
criterion_main!(benches);
