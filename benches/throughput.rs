//! Throughput of `alt` over two finite ranges, against a purely serial `append` baseline of the
//! same total element count.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use concurrent_streams::{alt, append, empty, pull, single, BoxStream};

fn range(start: i32, end: i32) -> BoxStream<i32> {
    (start..end)
        .rev()
        .fold(Box::new(empty()) as BoxStream<i32>, |acc, v| {
            append(Box::new(single(v)), acc)
        })
}

fn bench_alt(c: &mut Criterion) {
    c.bench_function("alt_two_ranges_of_5000", |b| {
        b.iter(|| {
            let stream = alt(range(0, 5_000), range(5_000, 10_000));
            let values: Vec<_> = pull(stream).collect::<Result<Vec<_>, _>>().unwrap();
            black_box(values.len())
        })
    });
}

fn bench_serial_baseline(c: &mut Criterion) {
    c.bench_function("append_single_range_of_10000", |b| {
        b.iter(|| {
            let stream = range(0, 10_000);
            let values: Vec<_> = pull(stream).collect::<Result<Vec<_>, _>>().unwrap();
            black_box(values.len())
        })
    });
}

criterion_group!(benches, bench_alt, bench_serial_baseline);
criterion_main!(benches);
