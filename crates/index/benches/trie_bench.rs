//! Benchmarks for strata-index using criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use strata_core::Config;
use strata_index::{IdIndex, LongIndex, LongMultiIndex, StringIndex};
use tempfile::TempDir;

fn trie_insert_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("trie_insert_commit");

    for size in [100i64, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let dir = TempDir::new().unwrap();
                let mut trie = LongIndex::create(dir.path().join("bench"), &Config::default()).unwrap();
                for i in 0..size {
                    trie.put(i, i).unwrap();
                }
                trie.commit().unwrap();
                black_box(trie.stats().unwrap())
            });
        });
    }

    group.finish();
}

fn trie_get_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("trie_get");

    for size in [1000i64, 100000].iter() {
        let dir = TempDir::new().unwrap();
        let mut trie = LongIndex::create(dir.path().join("bench"), &Config::default()).unwrap();
        for i in 0..*size {
            trie.put(i * 31, i).unwrap();
        }
        trie.commit().unwrap();

        group.bench_with_input(BenchmarkId::new("cached", size), size, |b, &size| {
            b.iter(|| {
                for i in (0..100).map(|x| x * size / 100) {
                    black_box(trie.get(&(i * 31)).unwrap());
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("cold", size), size, |b, &size| {
            b.iter(|| {
                trie.clean_up();
                for i in (0..100).map(|x| x * size / 100) {
                    black_box(trie.get(&(i * 31)).unwrap());
                }
            });
        });
    }

    group.finish();
}

fn string_trie_benchmark(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let mut trie = StringIndex::create(dir.path().join("bench"), &Config::default()).unwrap();
    for i in 0..10000 {
        trie.put(format!("user-{:06}@example.com", i), i).unwrap();
    }
    trie.commit().unwrap();

    c.bench_function("string_trie_get", |b| {
        b.iter(|| {
            for i in (0..10000).step_by(100) {
                black_box(trie.get(&format!("user-{:06}@example.com", i)).unwrap());
            }
        });
    });
}

fn multi_append_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("multi_append_commit");

    for values in [10i64, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(values), values, |b, &values| {
            b.iter(|| {
                let dir = TempDir::new().unwrap();
                let mut multi =
                    LongMultiIndex::create(dir.path().join("bench"), &Config::default()).unwrap();
                for v in 0..values {
                    multi.put(v % 8, v).unwrap();
                }
                multi.commit().unwrap();
                black_box(multi.get(&0).unwrap())
            });
        });
    }

    group.finish();
}

fn id_index_benchmark(c: &mut Criterion) {
    c.bench_function("id_index_put_commit_10000", |b| {
        b.iter(|| {
            let dir = TempDir::new().unwrap();
            let mut index = IdIndex::open(dir.path().join("bench"), &Config::default()).unwrap();
            for id in 0..10000 {
                index.put(id, id * 8).unwrap();
            }
            index.commit().unwrap();
            black_box(index.last_id())
        });
    });
}

criterion_group!(
    benches,
    trie_insert_benchmark,
    trie_get_benchmark,
    string_trie_benchmark,
    multi_append_benchmark,
    id_index_benchmark
);
criterion_main!(benches);
