//! Key lookup benchmarks.
//!
//! Compares cached and direct key reads for sequential, clustered and
//! uniformly random access over an in-memory dataset.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vecs_eval::persistence::{DatasetWriter, MemorySource, ReaderOptions, ValueType, VecsReader};

const N: u64 = 100_000;
const LOOKUPS: usize = 10_000;

fn dataset() -> Vec<u8> {
    let mut writer = DatasetWriter::new(ValueType::Int8, 4);
    for i in 0..N {
        writer.push(i * 7 + 1, &[1.0, 2.0, 3.0, 4.0]).unwrap();
    }
    writer.to_bytes().unwrap()
}

fn access_patterns() -> Vec<(&'static str, Vec<u64>)> {
    let mut rng = StdRng::seed_from_u64(42);
    let sequential = (0..LOOKUPS as u64).collect();
    let clustered = (0..LOOKUPS)
        .map(|i| (i as u64 / 64) * 997 % N + rng.random_range(0..64))
        .collect();
    let random = (0..LOOKUPS).map(|_| rng.random_range(0..N)).collect();
    vec![
        ("sequential", sequential),
        ("clustered", clustered),
        ("random", random),
    ]
}

fn bench_key_lookup(c: &mut Criterion) {
    let bytes = dataset();
    let mut group = c.benchmark_group("key_lookup");
    group.throughput(Throughput::Elements(LOOKUPS as u64));

    for (pattern, indices) in access_patterns() {
        for key_cache in [true, false] {
            let options = ReaderOptions { key_cache };
            let mut reader = VecsReader::with_options(MemorySource::new(bytes.clone()), options);
            reader.load().unwrap();
            let label = if key_cache { "cached" } else { "direct" };

            group.bench_with_input(BenchmarkId::new(label, pattern), &indices, |b, indices| {
                b.iter(|| {
                    let mut sum = 0u64;
                    for &i in indices {
                        sum = sum.wrapping_add(reader.key(i).unwrap().unwrap_or(0));
                    }
                    black_box(sum)
                })
            });
        }
    }

    group.finish();
}

fn bench_vector_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("vector_decode");

    for value_type in [ValueType::Fp16, ValueType::Fp32, ValueType::Int8] {
        let mut writer = DatasetWriter::new(value_type, 128);
        let v: Vec<f64> = (0..128).map(|i| i as f64 / 16.0).collect();
        for i in 0..1000 {
            writer.push(i, &v).unwrap();
        }
        let mut reader = VecsReader::new(MemorySource::new(writer.to_bytes().unwrap()));
        reader.load().unwrap();

        group.bench_function(BenchmarkId::from_parameter(format!("{value_type:?}")), |b| {
            b.iter(|| {
                for i in 0..1000 {
                    black_box(reader.vector(i).unwrap());
                }
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_key_lookup, bench_vector_decode);
criterion_main!(benches);
