//! Test fixtures and hierarchy helpers.
//!
//! The mapping models a small order-processing domain:
//!
//! - `Customer.Orders` 1-n `Order.Customer`
//! - `Official.Orders` 1-n `Order.Official`
//! - `Order.OrderItems` 1-n `OrderItem.Order`
//! - `Order.OrderTicket` 1-1 `OrderTicket.Order` (mandatory on the ticket)
//! - `Employee.Subordinates` 1-n `Employee.Supervisor`
//! - `Employee.Computer` 1-1 `Computer.Employee`

use crate::listeners::RecordingListener;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::debug;
use unitgraph_core::{
    ClassId, Config, DataManager, InMemoryStorage, MappingBuilder, MappingConfiguration, ObjectId,
    ObjectKey, PersistenceStrategy, TransactionEventSink, TransactionHierarchy, TransactionId,
    TransactionListener, Value,
};

/// Builds the identity of a fixture object.
pub fn object_id(class: &'static str, key: u128) -> ObjectId {
    ObjectId::new(ClassId::new(class), ObjectKey::from_u128(key))
}

/// The order-processing mapping.
pub fn order_mapping() -> Arc<MappingConfiguration> {
    let mapping = MappingBuilder::new()
        .class("Customer")
        .class("Official")
        .class("Order")
        .class("OrderItem")
        .class("OrderTicket")
        .class("Employee")
        .class("Computer")
        .property("Customer", "Name", Value::Null)
        .property("Official", "Name", Value::Null)
        .property("Order", "OrderNumber", Value::Integer(0))
        .property("OrderItem", "Product", Value::Null)
        .property("OrderTicket", "FileName", Value::Null)
        .property("Employee", "Name", Value::Null)
        .property("Computer", "SerialNumber", Value::Null)
        .one_to_many(("Customer", "Orders"), ("Order", "Customer"))
        .one_to_many(("Official", "Orders"), ("Order", "Official"))
        .one_to_many(("Order", "OrderItems"), ("OrderItem", "Order"))
        .one_to_one(("Order", "OrderTicket"), ("OrderTicket", "Order"))
        .one_to_many(("Employee", "Subordinates"), ("Employee", "Supervisor"))
        .one_to_one(("Employee", "Computer"), ("Computer", "Employee"))
        .mandatory("OrderTicket", "Order")
        .build()
        .expect("order mapping is valid");
    Arc::new(mapping)
}

/// Identities of the objects in [`seeded_storage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seed {
    /// Customer "Kim", owner of `order`.
    pub customer: ObjectId,
    /// Official "Lee", responsible for `order`.
    pub official: ObjectId,
    /// Order 1.
    pub order: ObjectId,
    /// Ticket of `order`.
    pub ticket: ObjectId,
    /// The two items of `order`, in storage order.
    pub items: [ObjectId; 2],
    /// Order 2 of `customer`, with no items, ticket or official.
    pub other_order: ObjectId,
    /// Employee "Park", supervisor of `employee`.
    pub supervisor: ObjectId,
    /// Employee "Choi", user of `computer`.
    pub employee: ObjectId,
    /// Computer of `employee`.
    pub computer: ObjectId,
}

/// Storage holding one fully related order plus a small employee graph.
pub fn seeded_storage() -> (Arc<InMemoryStorage>, Seed) {
    let storage = InMemoryStorage::new();
    let seed = Seed {
        customer: object_id("Customer", 1),
        official: object_id("Official", 1),
        order: object_id("Order", 1),
        ticket: object_id("OrderTicket", 1),
        items: [object_id("OrderItem", 1), object_id("OrderItem", 2)],
        other_order: object_id("Order", 2),
        supervisor: object_id("Employee", 1),
        employee: object_id("Employee", 2),
        computer: object_id("Computer", 1),
    };
    storage.insert(seed.customer, [("Name", Value::from("Kim"))]);
    storage.insert(seed.official, [("Name", Value::from("Lee"))]);
    storage.insert(
        seed.order,
        [
            ("OrderNumber", Value::Integer(1)),
            ("Customer", Value::Object(seed.customer)),
            ("Official", Value::Object(seed.official)),
        ],
    );
    storage.insert(
        seed.ticket,
        [
            ("FileName", Value::from("order1.txt")),
            ("Order", Value::Object(seed.order)),
        ],
    );
    for (item, product) in seed.items.iter().zip(["Mainboard", "CPU Fan"]) {
        storage.insert(
            *item,
            [
                ("Product", Value::from(product)),
                ("Order", Value::Object(seed.order)),
            ],
        );
    }
    storage.insert(
        seed.other_order,
        [
            ("OrderNumber", Value::Integer(2)),
            ("Customer", Value::Object(seed.customer)),
        ],
    );
    storage.insert(seed.supervisor, [("Name", Value::from("Park"))]);
    storage.insert(
        seed.employee,
        [
            ("Name", Value::from("Choi")),
            ("Supervisor", Value::Object(seed.supervisor)),
        ],
    );
    storage.insert(
        seed.computer,
        [
            ("SerialNumber", Value::from("93401-1")),
            ("Employee", Value::Object(seed.employee)),
        ],
    );
    debug!(objects = storage.len(), "seeded storage");
    (Arc::new(storage), seed)
}

/// A transaction hierarchy over in-memory storage, with a
/// [`RecordingListener`] on its root transaction.
pub struct TestHierarchy {
    /// The hierarchy under test.
    pub hierarchy: TransactionHierarchy,
    /// The storage behind the root transaction.
    pub storage: Arc<InMemoryStorage>,
    /// Records every event of the root transaction.
    pub root_events: Arc<RecordingListener>,
}

impl TestHierarchy {
    /// Creates a hierarchy over empty storage.
    pub fn empty() -> Self {
        Self::with_storage(Arc::new(InMemoryStorage::new()), Config::default())
    }

    /// Creates a hierarchy over [`seeded_storage`].
    pub fn seeded() -> (Self, Seed) {
        let (storage, seed) = seeded_storage();
        (Self::with_storage(storage, Config::default()), seed)
    }

    /// Creates a hierarchy over `storage` with the order mapping.
    pub fn with_storage(storage: Arc<InMemoryStorage>, config: Config) -> Self {
        let hierarchy = TransactionHierarchy::with_config(
            order_mapping(),
            Arc::clone(&storage) as Arc<dyn PersistenceStrategy>,
            config,
        );
        let root_events = Arc::new(RecordingListener::new());
        hierarchy
            .add_listener(
                hierarchy.root_transaction_id(),
                Arc::clone(&root_events) as Arc<dyn TransactionListener>,
            )
            .expect("root transaction exists");
        Self {
            hierarchy,
            storage,
            root_events,
        }
    }
}

impl std::ops::Deref for TestHierarchy {
    type Target = TransactionHierarchy;

    fn deref(&self) -> &Self::Target {
        &self.hierarchy
    }
}

impl std::ops::DerefMut for TestHierarchy {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.hierarchy
    }
}

/// A writeable data manager outside any hierarchy, with a
/// [`RecordingListener`] on its event sink.
///
/// Useful for driving commands directly; load through
/// [`StorageLoader`](unitgraph_core::loading::StorageLoader).
pub fn standalone_data_manager(tx: u64) -> (DataManager, Arc<RecordingListener>) {
    let tx = TransactionId::new(tx);
    let events = Arc::new(TransactionEventSink::new(tx));
    let recorder = Arc::new(RecordingListener::new());
    events.add_listener(Arc::clone(&recorder) as Arc<dyn TransactionListener>);
    let data = DataManager::new(
        tx,
        order_mapping(),
        Arc::new(Config::default()),
        events,
        Arc::new(AtomicBool::new(true)),
        false,
    );
    (data, recorder)
}

/// Runs a test against a freshly seeded hierarchy.
///
/// # Example
///
/// ```rust
/// use unitgraph_testkit::with_seeded_hierarchy;
///
/// with_seeded_hierarchy(|hierarchy, seed| {
///     let customer = hierarchy.get_object(seed.customer).unwrap();
///     assert_eq!(hierarchy.related_objects(&customer, "Orders").unwrap().len(), 2);
/// });
/// ```
pub fn with_seeded_hierarchy<F, R>(f: F) -> R
where
    F: FnOnce(&mut TestHierarchy, Seed) -> R,
{
    let (mut hierarchy, seed) = TestHierarchy::seeded();
    f(&mut hierarchy, seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_storage_holds_every_object() {
        let (storage, seed) = seeded_storage();
        assert_eq!(storage.len(), 10);
        assert_eq!(
            storage.get(seed.items[1]).unwrap().value("Order"),
            Value::Object(seed.order)
        );
    }

    #[test]
    fn mapping_declares_both_sides() {
        let mapping = order_mapping();
        let order = mapping.class_by_name("Order").unwrap();
        assert!(order.end_point("Official").is_some());
        assert!(order.end_point("OrderTicket").is_some());
        assert!(mapping
            .class_by_name("OrderTicket")
            .unwrap()
            .end_point("Order")
            .unwrap()
            .is_mandatory());
    }
}
