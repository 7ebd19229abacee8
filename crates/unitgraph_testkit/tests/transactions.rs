//! Integration tests for commit, rollback and scoping across a transaction
//! hierarchy.

use proptest::prelude::*;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use unitgraph_core::{
    Config, CoreError, DomainObject, ObjectId, ObjectState, TransactionHierarchy,
    TransactionListener, Value,
};
use unitgraph_testkit::init_test_tracing;
use unitgraph_testkit::prelude::*;

#[test]
fn root_commit_writes_changes_and_deletions() {
    init_test_tracing();
    let (mut hierarchy, seed) = TestHierarchy::seeded();
    let order = hierarchy.get_object(seed.order).unwrap();
    let item = hierarchy.get_object(seed.items[0]).unwrap();
    hierarchy.set_value(&order, "OrderNumber", 9i64).unwrap();
    hierarchy.delete(&item).unwrap();

    hierarchy.commit().unwrap();

    let stored = hierarchy.storage.get(seed.order).unwrap();
    assert_eq!(stored.value("OrderNumber"), Value::Integer(9));
    assert!(!hierarchy.storage.contains(seed.items[0]));
    assert_eq!(hierarchy.storage.stats().snapshot().persists, 1);
    assert_eq!(hierarchy.state(&order).unwrap(), ObjectState::Unchanged);
    assert_eq!(hierarchy.state(&item).unwrap(), ObjectState::Invalid);
    assert_eq!(
        hierarchy.related_objects(&order, "OrderItems").unwrap(),
        vec![hierarchy.get_object(seed.items[1]).unwrap()]
    );
    assert!(!hierarchy.has_changes().unwrap());
}

#[test]
fn committing_event_lists_the_changed_objects() {
    let (mut hierarchy, seed) = TestHierarchy::seeded();
    let customer = hierarchy.get_object(seed.customer).unwrap();
    hierarchy.set_value(&customer, "Name", "Han").unwrap();
    hierarchy.commit().unwrap();

    assert!(matches!(
        hierarchy.root_events.named("transaction_committing").as_slice(),
        [RecordedEvent::TransactionCommitting { ids, .. }] if ids == &[seed.customer]
    ));
    assert!(matches!(
        hierarchy.root_events.named("transaction_committed").as_slice(),
        [RecordedEvent::TransactionCommitted { ids, .. }] if ids == &[seed.customer]
    ));
}

#[test]
fn vetoed_commit_keeps_every_change() {
    let (mut hierarchy, seed) = TestHierarchy::seeded();
    let veto = Arc::new(VetoingListener::new());
    hierarchy
        .add_listener(
            hierarchy.root_transaction_id(),
            Arc::clone(&veto) as Arc<dyn TransactionListener>,
        )
        .unwrap();
    let customer = hierarchy.get_object(seed.customer).unwrap();
    hierarchy.set_value(&customer, "Name", "Han").unwrap();
    veto.veto_commits();

    assert!(matches!(
        hierarchy.commit(),
        Err(CoreError::InvalidOperation { .. })
    ));
    assert_eq!(hierarchy.state(&customer).unwrap(), ObjectState::Changed);
    assert_eq!(hierarchy.storage.stats().snapshot().persists, 0);
    assert_eq!(hierarchy.root_events.count("transaction_committed"), 0);
}

#[test]
fn sub_commit_reaches_the_parent_but_not_storage() {
    let (mut hierarchy, seed) = TestHierarchy::seeded();
    let root = hierarchy.root_transaction_id();
    let order = hierarchy.get_object(seed.order).unwrap();
    hierarchy.create_sub_transaction().unwrap();
    let item = hierarchy.new_object("OrderItem").unwrap();
    hierarchy.set_value(&item, "Product", "Keyboard").unwrap();
    hierarchy.add_related_object(&order, "OrderItems", &item).unwrap();
    hierarchy.set_value(&order, "OrderNumber", 11i64).unwrap();

    hierarchy.commit().unwrap();
    assert_eq!(hierarchy.state(&item).unwrap(), ObjectState::Unchanged);
    assert_eq!(hierarchy.storage.stats().snapshot().persists, 0);

    hierarchy.discard_sub_transaction().unwrap();
    assert_eq!(hierarchy.current_transaction_id(), root);
    assert_eq!(hierarchy.state(&item).unwrap(), ObjectState::New);
    assert_eq!(hierarchy.state(&order).unwrap(), ObjectState::Changed);
    assert_eq!(hierarchy.value(&item, "Product").unwrap(), Value::from("Keyboard"));
    assert_eq!(hierarchy.related_objects(&order, "OrderItems").unwrap().len(), 3);

    hierarchy.commit().unwrap();
    assert_eq!(
        hierarchy.storage.get(item.id()).unwrap().value("Order"),
        Value::Object(seed.order)
    );
}

#[test]
fn sub_deletion_of_a_parent_object_is_applied_on_commit() {
    let (mut hierarchy, seed) = TestHierarchy::seeded();
    let employee = hierarchy.get_object(seed.employee).unwrap();
    let computer = hierarchy.get_object(seed.computer).unwrap();
    assert_eq!(
        hierarchy.related_object(&employee, "Computer").unwrap(),
        Some(computer)
    );
    hierarchy.create_sub_transaction().unwrap();
    hierarchy.delete(&computer).unwrap();
    assert_eq!(hierarchy.related_object(&employee, "Computer").unwrap(), None);

    hierarchy.commit().unwrap();
    hierarchy.discard_sub_transaction().unwrap();

    assert_eq!(hierarchy.state(&computer).unwrap(), ObjectState::Deleted);
    assert_eq!(hierarchy.related_object(&employee, "Computer").unwrap(), None);
    assert!(hierarchy.storage.contains(seed.computer));
    hierarchy.commit().unwrap();
    assert!(!hierarchy.storage.contains(seed.computer));
}

#[test]
fn rollback_restores_values_and_invalidates_new_objects() {
    let (mut hierarchy, seed) = TestHierarchy::seeded();
    let order = hierarchy.get_object(seed.order).unwrap();
    let item = hierarchy.new_object("OrderItem").unwrap();
    hierarchy.add_related_object(&order, "OrderItems", &item).unwrap();
    hierarchy.set_value(&order, "OrderNumber", 3i64).unwrap();

    hierarchy.rollback().unwrap();

    assert_eq!(hierarchy.value(&order, "OrderNumber").unwrap(), Value::Integer(1));
    assert_eq!(hierarchy.state(&order).unwrap(), ObjectState::Unchanged);
    assert_eq!(hierarchy.state(&item).unwrap(), ObjectState::Invalid);
    assert_eq!(hierarchy.related_objects(&order, "OrderItems").unwrap().len(), 2);
    assert_eq!(hierarchy.root_events.count("transaction_rolled_back"), 1);
}

#[test]
fn concurrent_storage_change_fails_the_commit() {
    let (mut hierarchy, seed) = TestHierarchy::seeded();
    let order = hierarchy.get_object(seed.order).unwrap();
    hierarchy
        .storage
        .update(seed.order, "OrderNumber", Value::Integer(99))
        .unwrap();
    hierarchy.set_value(&order, "OrderNumber", 2i64).unwrap();

    let error = hierarchy.commit().unwrap_err();
    assert_eq!(error, CoreError::ConcurrencyViolation { ids: vec![seed.order] });
    assert_eq!(hierarchy.state(&order).unwrap(), ObjectState::Changed);
    assert_eq!(hierarchy.storage.stats().snapshot().conflicts, 1);
    assert_eq!(
        hierarchy.storage.get(seed.order).unwrap().value("OrderNumber"),
        Value::Integer(99)
    );
}

#[test]
fn mandatory_relations_are_checked_on_commit() {
    let mut hierarchy = TestHierarchy::empty();
    let ticket = hierarchy.new_object("OrderTicket").unwrap();

    let error = hierarchy.commit().unwrap_err();
    assert_eq!(
        error,
        CoreError::MandatoryRelationNotSet {
            id: ticket.id(),
            property: "Order".to_string(),
        }
    );

    let order = hierarchy.new_object("Order").unwrap();
    hierarchy.set_related_object(&ticket, "Order", Some(&order)).unwrap();
    hierarchy.commit().unwrap();
    assert!(hierarchy.storage.contains(ticket.id()));
}

#[test]
fn mandatory_check_can_be_disabled() {
    let mut hierarchy = TestHierarchy::with_storage(
        Arc::new(unitgraph_core::InMemoryStorage::new()),
        Config::default().validate_mandatory_relations(false),
    );
    let ticket = hierarchy.new_object("OrderTicket").unwrap();
    hierarchy.commit().unwrap();
    assert_eq!(hierarchy.state(&ticket).unwrap(), ObjectState::Unchanged);
}

#[test]
fn scope_restores_the_current_transaction_after_a_panic() {
    let mut hierarchy = TestHierarchy::empty();
    let root = hierarchy.root_transaction_id();
    let sub = hierarchy.create_sub_transaction().unwrap();

    let result = catch_unwind(AssertUnwindSafe(|| {
        let scope = hierarchy.enter_scope(root).unwrap();
        assert_eq!(scope.current_transaction_id(), root);
        panic!("failure inside the scope");
    }));

    assert!(result.is_err());
    assert_eq!(hierarchy.current_transaction_id(), sub);
}

fn item_ids(hierarchy: &mut TransactionHierarchy, order: ObjectId) -> Vec<ObjectId> {
    let order = hierarchy.get_object(order).unwrap();
    hierarchy
        .related_objects(&order, "OrderItems")
        .unwrap()
        .iter()
        .map(DomainObject::id)
        .collect()
}

fn assert_items_point_back(hierarchy: &mut TransactionHierarchy, order: ObjectId) {
    for item in item_ids(hierarchy, order) {
        let item = hierarchy.get_object(item).unwrap();
        let owner = hierarchy.related_object(&item, "Order").unwrap();
        assert_eq!(owner.map(|o| o.id()), Some(order), "{item} is in {order}");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn relations_stay_consistent_through_hierarchy_operations(
        ops in hierarchy_ops_strategy(24)
    ) {
        let (mut hierarchy, seed) = TestHierarchy::seeded();
        for op in &ops {
            // Rejected operations must leave the hierarchy consistent too.
            let _ = op.apply(&mut hierarchy, &seed);
        }

        let first = item_ids(&mut hierarchy, seed.order);
        let second = item_ids(&mut hierarchy, seed.other_order);
        for item in &first {
            prop_assert!(!second.contains(item));
            prop_assert_eq!(first.iter().filter(|i| *i == item).count(), 1);
        }
        for item in seed.items {
            prop_assert!(first.contains(&item) || second.contains(&item));
        }
        assert_items_point_back(&mut hierarchy, seed.order);
        assert_items_point_back(&mut hierarchy, seed.other_order);

        while hierarchy.depth() > 1 {
            hierarchy.commit().unwrap();
            hierarchy.discard_sub_transaction().unwrap();
        }
        hierarchy.commit().unwrap();
        for order in [seed.order, seed.other_order] {
            for item in item_ids(&mut hierarchy, order) {
                prop_assert_eq!(
                    hierarchy.storage.get(item).unwrap().value("Order"),
                    Value::Object(order)
                );
            }
        }
    }
}
