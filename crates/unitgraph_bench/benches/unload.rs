//! Unloading benchmarks.

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use unitgraph_bench::order_graph;
use unitgraph_core::{ObjectId, PersistenceStrategy, TransactionHierarchy};
use unitgraph_testkit::order_mapping;

/// A hierarchy with every order and item of the graph loaded.
fn loaded_hierarchy(orders: usize, items_per_order: usize) -> (TransactionHierarchy, Vec<ObjectId>) {
    let (storage, graph) = order_graph(orders, items_per_order);
    let mut hierarchy = TransactionHierarchy::new(
        order_mapping(),
        Arc::clone(&storage) as Arc<dyn PersistenceStrategy>,
    );
    for order in hierarchy.get_objects(&graph.orders).unwrap() {
        hierarchy.related_objects(&order, "OrderItems").unwrap();
    }
    (hierarchy, graph.orders)
}

/// Benchmark emptying a transaction.
fn bench_unload_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("unload_all");

    for orders in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*orders as u64 * 5));
        group.bench_with_input(BenchmarkId::from_parameter(orders), orders, |b, &orders| {
            b.iter_batched(
                || loaded_hierarchy(orders, 4).0,
                |mut hierarchy| hierarchy.unload_all().unwrap(),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

/// Benchmark unloading objects whose collections are loaded.
fn bench_unload_data(c: &mut Criterion) {
    let mut group = c.benchmark_group("unload_data");

    for orders in [10, 100].iter() {
        group.throughput(Throughput::Elements(*orders as u64));
        group.bench_with_input(BenchmarkId::from_parameter(orders), orders, |b, &orders| {
            b.iter_batched(
                || loaded_hierarchy(orders, 4),
                |(mut hierarchy, ids)| hierarchy.unload_data(&ids).unwrap(),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

/// Benchmark unloading collection data only.
fn bench_unload_virtual_end_points(c: &mut Criterion) {
    c.bench_function("unload_virtual_end_points_100", |b| {
        b.iter_batched(
            || loaded_hierarchy(100, 4),
            |(mut hierarchy, ids)| {
                for order in hierarchy.get_objects(&ids).unwrap() {
                    hierarchy
                        .unload_virtual_end_point(&order, "OrderItems")
                        .unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_unload_all,
    bench_unload_data,
    bench_unload_virtual_end_points
);
criterion_main!(benches);
