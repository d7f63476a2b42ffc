//! Flatten/unflatten and lookup throughput over representative messages.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use flatmsg::Message;

/// A message shaped like typical application traffic: a handful of scalars,
/// a few strings, one array.
fn build_message(array_len: u32) -> Message {
    let mut msg = Message::with_what(u32::from_be_bytes(*b"BNCH"));
    msg.add_int32("sequence", 7).unwrap();
    msg.add_int64("timestamp", 1_700_000_000_000).unwrap();
    msg.add_bool("urgent", false).unwrap();
    msg.add_string("subject", "benchmark payload").unwrap();
    msg.add_string("body", &"lorem ipsum ".repeat(8)).unwrap();
    for value in 0..array_len {
        msg.add_int32("samples", value as i32).unwrap();
    }
    msg
}

fn bench_flatten(c: &mut Criterion) {
    let mut group = c.benchmark_group("flatten");
    for array_len in [0u32, 64, 1024] {
        let msg = build_message(array_len);
        let mut buffer = vec![0u8; msg.flattened_size()];
        group.bench_with_input(BenchmarkId::from_parameter(array_len), &msg, |b, msg| {
            b.iter(|| msg.flatten(black_box(&mut buffer)).unwrap());
        });
    }
    group.finish();
}

fn bench_unflatten(c: &mut Criterion) {
    let mut group = c.benchmark_group("unflatten");
    for array_len in [0u32, 64, 1024] {
        let bytes = build_message(array_len).flatten_to_vec();
        group.bench_with_input(BenchmarkId::from_parameter(array_len), &bytes, |b, bytes| {
            let mut msg = Message::new();
            b.iter(|| msg.unflatten(black_box(bytes)).unwrap());
        });
    }
    group.finish();
}

fn bench_build(c: &mut Criterion) {
    c.bench_function("build/typical", |b| {
        b.iter(|| black_box(build_message(16)));
    });
}

fn bench_find(c: &mut Criterion) {
    let msg = build_message(64);
    c.bench_function("find/fixed_element", |b| {
        b.iter(|| msg.find_int32_at(black_box("samples"), black_box(32)).unwrap());
    });
    c.bench_function("find/string", |b| {
        b.iter(|| msg.find_string(black_box("body")).unwrap());
    });
    c.bench_function("find/missing_name", |b| {
        b.iter(|| msg.find_int32(black_box("absent")).unwrap_err());
    });
}

criterion_group!(benches, bench_flatten, bench_unflatten, bench_build, bench_find);
criterion_main!(benches);
