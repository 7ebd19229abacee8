//! Benchmark utilities.

use rand::seq::SliceRandom;
use std::sync::Arc;
use unitgraph_core::{ClassId, InMemoryStorage, ObjectId, Value};
use unitgraph_testkit::object_id;

/// Identities stored by [`order_graph`].
#[derive(Debug, Clone)]
pub struct OrderGraph {
    /// The single customer owning every order.
    pub customer: ObjectId,
    /// All orders, in storage order.
    pub orders: Vec<ObjectId>,
    /// All items, grouped by order.
    pub items: Vec<ObjectId>,
}

/// Storage holding one customer with `orders` orders of `items_per_order`
/// items each.
pub fn order_graph(orders: usize, items_per_order: usize) -> (Arc<InMemoryStorage>, OrderGraph) {
    let storage = InMemoryStorage::new();
    let customer = object_id("Customer", 1);
    storage.insert(customer, [("Name", Value::from("Bench"))]);

    let mut graph = OrderGraph {
        customer,
        orders: Vec::with_capacity(orders),
        items: Vec::with_capacity(orders * items_per_order),
    };
    let mut next_item = 1;
    for number in 1..=orders {
        let order = object_id("Order", number as u128);
        storage.insert(
            order,
            [
                ("OrderNumber", Value::Integer(number as i64)),
                ("Customer", Value::Object(customer)),
            ],
        );
        for _ in 0..items_per_order {
            let item = object_id("OrderItem", next_item);
            next_item += 1;
            storage.insert(
                item,
                [
                    ("Product", Value::from("Part")),
                    ("Order", Value::Object(order)),
                ],
            );
            graph.items.push(item);
        }
        graph.orders.push(order);
    }
    (Arc::new(storage), graph)
}

/// `count` fresh order identities.
pub fn new_order_ids(count: usize) -> Vec<ObjectId> {
    (0..count)
        .map(|_| ObjectId::random(ClassId::new("Order")))
        .collect()
}

/// The identities in random order.
pub fn shuffled(ids: &[ObjectId]) -> Vec<ObjectId> {
    let mut ids = ids.to_vec();
    ids.shuffle(&mut rand::thread_rng());
    ids
}
