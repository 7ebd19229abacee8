//! Lazy loading benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use unitgraph_bench::{order_graph, shuffled};
use unitgraph_core::{PersistenceStrategy, TransactionHierarchy};
use unitgraph_testkit::order_mapping;

/// Benchmark loading objects one at a time.
fn bench_single_loads(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_loads");

    for count in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let (storage, graph) = order_graph(count, 0);
            let ids = shuffled(&graph.orders);

            b.iter(|| {
                let mut hierarchy = TransactionHierarchy::new(
                    order_mapping(),
                    Arc::clone(&storage) as Arc<dyn PersistenceStrategy>,
                );
                for id in &ids {
                    black_box(hierarchy.get_object(*id).unwrap());
                }
            });
        });
    }
    group.finish();
}

/// Benchmark loading objects in one round trip.
fn bench_bulk_loads(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk_loads");

    for count in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let (storage, graph) = order_graph(count, 0);

            b.iter(|| {
                let mut hierarchy = TransactionHierarchy::new(
                    order_mapping(),
                    Arc::clone(&storage) as Arc<dyn PersistenceStrategy>,
                );
                black_box(hierarchy.get_objects(&graph.orders).unwrap());
            });
        });
    }
    group.finish();
}

/// Benchmark loading collection end points.
fn bench_collection_loads(c: &mut Criterion) {
    let mut group = c.benchmark_group("collection_loads");

    for items in [1, 10, 100].iter() {
        group.throughput(Throughput::Elements(*items as u64 * 10));
        group.bench_with_input(BenchmarkId::from_parameter(items), items, |b, &items| {
            let (storage, graph) = order_graph(10, items);

            b.iter(|| {
                let mut hierarchy = TransactionHierarchy::new(
                    order_mapping(),
                    Arc::clone(&storage) as Arc<dyn PersistenceStrategy>,
                );
                for order in hierarchy.get_objects(&graph.orders).unwrap() {
                    black_box(hierarchy.related_objects(&order, "OrderItems").unwrap());
                }
            });
        });
    }
    group.finish();
}

/// Benchmark loading through a sub-transaction.
fn bench_sub_transaction_loads(c: &mut Criterion) {
    let (storage, graph) = order_graph(100, 0);

    c.bench_function("sub_transaction_loads_100", |b| {
        b.iter(|| {
            let mut hierarchy = TransactionHierarchy::new(
                order_mapping(),
                Arc::clone(&storage) as Arc<dyn PersistenceStrategy>,
            );
            hierarchy.create_sub_transaction().unwrap();
            black_box(hierarchy.get_objects(&graph.orders).unwrap());
        });
    });
}

criterion_group!(
    benches,
    bench_single_loads,
    bench_bulk_loads,
    bench_collection_loads,
    bench_sub_transaction_loads
);
criterion_main!(benches);
