// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Core store operation benchmarks.
//!
//! Measures performance of:
//! - insert() - upsert into a populated tree
//! - search() - point lookup, warm cache
//! - range() - ordered scan over the leaf chain
//! - bulk_load() - sorted batch load

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;
use treebase::codec::{I32Codec, StringCodec};
use treebase::store::{BTree, BulkLoadOptions, RangeOptions, StoreConfig};

fn tree(dir: &TempDir, order: u32) -> BTree<i32, String> {
    let mut config = StoreConfig::new(
        dir.path().join("bench.tbs"),
        Box::new(I32Codec),
        Box::new(StringCodec),
    );
    config.order = order;
    config.cache_capacity = 10_000;
    BTree::open(config).unwrap()
}

fn populated(dir: &TempDir, keys: i32) -> BTree<i32, String> {
    let mut tree = tree(dir, 64);
    let entries: Vec<(i32, String)> = (0..keys).map(|i| (i, format!("v{}", i))).collect();
    tree.bulk_load(
        entries,
        BulkLoadOptions {
            sorted: true,
            ..Default::default()
        },
    )
    .unwrap();
    tree
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");
    group.sample_size(20);

    for size in [1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &keys| {
            let dir = TempDir::new().unwrap();
            let mut tree = populated(&dir, keys);
            let mut next = keys;
            b.iter(|| {
                tree.insert(next, format!("v{}", next)).unwrap();
                next += 1;
            });
        });
    }

    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");

    for size in [1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &keys| {
            let dir = TempDir::new().unwrap();
            let mut tree = populated(&dir, keys);
            let mut probe = 0;
            b.iter(|| {
                black_box(tree.search(&probe).unwrap());
                probe = (probe + 7919) % keys;
            });
        });
    }

    group.finish();
}

fn bench_range(c: &mut Criterion) {
    let mut group = c.benchmark_group("range_100");

    for size in [10_000].iter() {
        group.throughput(Throughput::Elements(100));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &keys| {
            let dir = TempDir::new().unwrap();
            let mut tree = populated(&dir, keys);
            let options = RangeOptions {
                limit: Some(100),
                ..Default::default()
            };
            let mut start = 0;
            b.iter(|| {
                black_box(tree.range(&start, &(start + 99), &options).unwrap());
                start = (start + 997) % (keys - 100);
            });
        });
    }

    group.finish();
}

fn bench_bulk_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk_load");
    group.sample_size(10);

    for size in [1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &keys| {
            b.iter_batched(
                || {
                    let dir = TempDir::new().unwrap();
                    let tree = tree(&dir, 64);
                    let entries: Vec<(i32, String)> =
                        (0..keys).map(|i| (i, format!("v{}", i))).collect();
                    (dir, tree, entries)
                },
                |(_dir, mut tree, entries)| {
                    tree.bulk_load(
                        entries,
                        BulkLoadOptions {
                            sorted: true,
                            ..Default::default()
                        },
                    )
                    .unwrap();
                },
                criterion::BatchSize::PerIteration,
            );
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_insert,
    bench_search,
    bench_range,
    bench_bulk_load
);
criterion_main!(benches);
