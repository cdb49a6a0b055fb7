//! Performance benchmarks for entry ordering.
//!
//! These benchmarks measure the paths hit on every reload and re-sort:
//! - Natural name comparison
//! - Sorting a large listing by each key and direction

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dirdeck::sort::{compare_names, sort_entries};
use dirdeck::{Entry, SortKey};

const EXTENSIONS: &[&str] = &["txt", "png", "PDF", "zip", "log", ""];

/// Build a listing with mixed case, numbered names and missing timestamps.
fn listing(count: usize) -> Vec<Entry> {
    (0..count)
        .map(|i| {
            let ext = EXTENSIONS[i % EXTENSIONS.len()];
            let stem = if i % 3 == 0 {
                format!("Report {}", i)
            } else {
                format!("report{}", count - i)
            };
            let name = if ext.is_empty() {
                stem
            } else {
                format!("{stem}.{ext}")
            };
            let created = (i % 7 != 0)
                .then(|| SystemTime::UNIX_EPOCH + Duration::from_secs((i * 37 % 1000) as u64));
            Entry::new(PathBuf::from("/bench").join(name), i as u64, created, i % 11 == 0)
        })
        .collect()
}

/// Benchmark the name comparator on typical pairs.
fn bench_compare_names(c: &mut Criterion) {
    let mut group = c.benchmark_group("compare_names");

    group.bench_function("plain", |b| {
        b.iter(|| compare_names(black_box("holiday-photos.png"), black_box("Holiday-Photos.png")));
    });

    group.bench_function("numeric", |b| {
        b.iter(|| compare_names(black_box("IMG_0000123.jpg"), black_box("IMG_124.jpg")));
    });

    group.finish();
}

/// Benchmark sorting listings of increasing size.
fn bench_sort_entries(c: &mut Criterion) {
    let mut group = c.benchmark_group("sort_entries");

    for count in [100usize, 1_000, 10_000] {
        let entries = listing(count);
        group.throughput(Throughput::Elements(count as u64));

        for key in SortKey::ALL {
            for ascending in [true, false] {
                let id = format!("{key}_{}", if ascending { "asc" } else { "desc" });
                group.bench_with_input(BenchmarkId::new(id, count), &entries, |b, entries| {
                    b.iter_batched(
                        || entries.clone(),
                        |mut batch| {
                            sort_entries(&mut batch, key, ascending);
                            batch
                        },
                        criterion::BatchSize::LargeInput,
                    );
                });
            }
        }
    }

    group.finish();
}

criterion_group!(benches, bench_compare_names, bench_sort_entries);
criterion_main!(benches);
