//! Receive-path benchmarks

use std::time::{Duration, Instant};

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rs485_core::{BytePattern, Checksum, Checksum2, ChecksumEngine, FrameAssembler, FrameBuilder, NumericSpec};

fn pattern_benchmark(c: &mut Criterion) {
    let frame: Vec<u8> = vec![0xF7, 0x0E, 0x1F, 0x81, 0x01, 0x00, 0x1F, 0x40, 0x7A, 0xEE];
    let state_on = BytePattern::new(4, vec![0x01]).with_and_operator(true);
    let state_off = BytePattern::new(4, vec![0x01]).with_and_operator(true).with_inverted(true);
    let numeric = NumericSpec::new(6, 2, 1).unwrap();

    let mut group = c.benchmark_group("classify");

    group.bench_function("state_patterns", |b| {
        b.iter(|| {
            let frame = black_box(&frame);
            black_box((state_on.matches(frame), state_off.matches(frame)))
        })
    });

    group.bench_function("numeric_decode", |b| {
        b.iter(|| black_box(numeric.decode(black_box(&frame)).ok()))
    });

    group.finish();
}

fn frame_benchmark(c: &mut Criterion) {
    let builder = FrameBuilder::new()
        .with_prefix(vec![0xF7])
        .with_suffix(vec![0xEE])
        .with_checksum(ChecksumEngine::new(Checksum::Xor, Checksum2::Add));
    let payload: Vec<u8> = (0..32).collect();
    let frame = builder.build(&payload);

    let mut group = c.benchmark_group("frame");
    group.throughput(Throughput::Bytes(frame.len() as u64));

    group.bench_function("build", |b| b.iter(|| black_box(builder.build(black_box(&payload)))));

    group.bench_function("verify", |b| b.iter(|| black_box(builder.verify(black_box(&frame)))));

    group.bench_function("assemble", |b| {
        let stream: Vec<u8> = frame.iter().copied().cycle().take(frame.len() * 16).collect();
        b.iter(|| {
            let mut asm = FrameAssembler::new(Duration::from_millis(2))
                .with_prefix(vec![0xF7])
                .with_suffix(vec![0xEE]);
            black_box(asm.push(black_box(&stream), Instant::now()))
        })
    });

    group.finish();
}

criterion_group!(benches, pattern_benchmark, frame_benchmark);
criterion_main!(benches);
