//! Integration tests for unloading objects, relation data and whole
//! transactions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use unitgraph_core::commands::{execute, Command, UnloadAllCommand};
use unitgraph_core::loading::StorageLoader;
use unitgraph_core::{
    CoreError, CoreResult, DataManager, InMemoryStorage, ObjectId, ObjectState, TransactionId,
    TransactionListener,
};
use unitgraph_testkit::init_test_tracing;
use unitgraph_testkit::prelude::*;

/// Registers one more object the first time it is told about unloading.
struct LateRegistration {
    storage: Arc<InMemoryStorage>,
    object: ObjectId,
    done: AtomicBool,
}

impl TransactionListener for LateRegistration {
    fn objects_unloading(
        &self,
        _tx: TransactionId,
        _ids: &[ObjectId],
        data: &mut DataManager,
    ) -> CoreResult<()> {
        if self.done.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let record = self
            .storage
            .get(self.object)
            .ok_or_else(|| CoreError::object_not_found(self.object))?;
        data.register_loaded_objects(&[record])?;
        Ok(())
    }
}

#[test]
fn unload_all_empties_the_transaction() {
    init_test_tracing();
    let (storage, seed) = seeded_storage();
    let (mut data, events) = standalone_data_manager(1);
    let mut loader = StorageLoader::new(storage.as_ref());
    data.get_data_container_with_lazy_load(seed.order, true, &mut loader)
        .unwrap();
    let fresh = object_id("OrderItem", 90);
    data.new_object(fresh).unwrap();

    let mut command = UnloadAllCommand::new();
    execute(&mut command, &mut data).unwrap();

    assert!(command.was_performed());
    assert!(data.data_containers().is_empty());
    assert_eq!(command.unloaded_containers().len(), 2);
    for container in command.unloaded_containers() {
        let expected = if container.id() == fresh {
            ObjectState::Discarded
        } else {
            ObjectState::Invalid
        };
        assert_eq!(data.data_containers().state_of(container), expected);
    }
    assert_eq!(data.get_state(fresh), ObjectState::Invalid);
    assert_eq!(data.get_state(seed.order), ObjectState::NotLoadedYet);
    assert_eq!(events.count("objects_unloading"), 1);
    assert_eq!(events.count("objects_unloaded"), 1);
}

#[test]
fn unload_all_reports_nothing_when_not_performed() {
    let (storage, seed) = seeded_storage();
    let (mut data, events) = standalone_data_manager(1);
    let mut loader = StorageLoader::new(storage.as_ref());
    data.get_data_container_with_lazy_load(seed.customer, true, &mut loader)
        .unwrap();

    let mut command = UnloadAllCommand::new();
    command.begin(&mut data).unwrap();
    command.end(&mut data).unwrap();

    assert_eq!(command.notified_objects(), [seed.customer]);
    assert!(!command.was_performed());
    assert!(data.data_containers().contains(seed.customer));
    assert_eq!(events.count("objects_unloading"), 1);
    assert_eq!(events.count("objects_unloaded"), 0);
}

#[test]
fn unload_all_cannot_perform_without_begin() {
    let (storage, seed) = seeded_storage();
    let (mut data, events) = standalone_data_manager(1);
    let mut loader = StorageLoader::new(storage.as_ref());
    data.get_data_container_with_lazy_load(seed.customer, true, &mut loader)
        .unwrap();

    let mut command = UnloadAllCommand::new();
    assert!(matches!(
        command.perform(&mut data),
        Err(CoreError::InvalidOperation { .. })
    ));
    assert!(data.data_containers().contains(seed.customer));

    command.begin(&mut data).unwrap();
    command.perform(&mut data).unwrap();
    assert!(matches!(
        command.perform(&mut data),
        Err(CoreError::InvalidOperation { .. })
    ));
    command.end(&mut data).unwrap();
    assert!(data.data_containers().is_empty());
    assert_eq!(events.count("objects_unloaded"), 1);
}

#[test]
fn unload_all_notifies_objects_registered_while_unloading() {
    let (storage, seed) = seeded_storage();
    let (mut data, events) = standalone_data_manager(1);
    data.events().add_listener(Arc::new(LateRegistration {
        storage: Arc::clone(&storage),
        object: seed.ticket,
        done: AtomicBool::new(false),
    }));
    let mut loader = StorageLoader::new(storage.as_ref());
    data.get_data_container_with_lazy_load(seed.order, true, &mut loader)
        .unwrap();

    let mut command = UnloadAllCommand::new();
    execute(&mut command, &mut data).unwrap();

    let unloading: Vec<RecordedEvent> = events.named("objects_unloading");
    assert_eq!(unloading.len(), 2);
    assert!(matches!(&unloading[0], RecordedEvent::ObjectsUnloading { ids, .. } if ids == &[seed.order]));
    assert!(matches!(&unloading[1], RecordedEvent::ObjectsUnloading { ids, .. } if ids == &[seed.ticket]));
    assert_eq!(command.notified_objects(), [seed.order, seed.ticket]);
    assert!(data.data_containers().is_empty());
}

#[test]
fn unloading_twice_notifies_once() {
    let (mut hierarchy, seed) = TestHierarchy::seeded();
    hierarchy.get_object(seed.order).unwrap();

    hierarchy.unload_all().unwrap();
    hierarchy.unload_all().unwrap();
    hierarchy.unload_data(&[seed.order]).unwrap();

    assert_eq!(hierarchy.root_events.count("objects_unloading"), 1);
    assert_eq!(hierarchy.root_events.count("objects_unloaded"), 1);
}

#[test]
fn unloaded_objects_reload_on_next_access() {
    let (mut hierarchy, seed) = TestHierarchy::seeded();
    let customer = hierarchy.get_object(seed.customer).unwrap();
    let loads = hierarchy.storage.stats().snapshot().object_loads;

    hierarchy.unload_data(&[seed.customer]).unwrap();
    assert_eq!(hierarchy.state(&customer).unwrap(), ObjectState::NotLoadedYet);
    assert_eq!(
        hierarchy.value(&customer, "Name").unwrap(),
        unitgraph_core::Value::from("Kim")
    );
    assert_eq!(hierarchy.storage.stats().snapshot().object_loads, loads + 1);
    assert_eq!(hierarchy.state(&customer).unwrap(), ObjectState::Unchanged);
}

#[test]
fn unloading_a_virtual_end_point_reloads_its_items() {
    let (mut hierarchy, seed) = TestHierarchy::seeded();
    let customer = hierarchy.get_object(seed.customer).unwrap();
    assert_eq!(hierarchy.related_objects(&customer, "Orders").unwrap().len(), 2);
    let related_loads = hierarchy.storage.stats().snapshot().related_loads;
    hierarchy.root_events.clear();

    hierarchy.unload_virtual_end_point(&customer, "Orders").unwrap();

    let updated = hierarchy
        .root_events
        .named("virtual_relation_end_point_state_updated");
    assert_eq!(updated.len(), 1);
    assert!(matches!(
        &updated[0],
        RecordedEvent::VirtualEndPointStateUpdated { has_changed: None, .. }
    ));
    assert!(matches!(
        hierarchy.root_events.named("objects_unloaded").as_slice(),
        [RecordedEvent::ObjectsUnloaded { ids, .. }] if ids == &[seed.customer]
    ));
    assert_eq!(hierarchy.state(&customer).unwrap(), ObjectState::Unchanged);

    let orders = hierarchy.related_objects(&customer, "Orders").unwrap();
    assert_eq!(
        orders.iter().map(|o| o.id()).collect::<Vec<_>>(),
        vec![seed.order, seed.other_order]
    );
    assert_eq!(hierarchy.storage.stats().snapshot().related_loads, related_loads + 1);
}

#[test]
fn changed_relations_cannot_be_unloaded() {
    let (mut hierarchy, seed) = TestHierarchy::seeded();
    let customer = hierarchy.get_object(seed.customer).unwrap();
    let order = hierarchy.get_object(seed.order).unwrap();
    hierarchy
        .remove_related_object(&customer, "Orders", &order)
        .unwrap();

    let error = hierarchy
        .unload_virtual_end_point(&customer, "Orders")
        .unwrap_err();
    assert!(matches!(error.root_cause(), CoreError::CannotUnload { .. }));
    assert!(matches!(
        hierarchy.unload_virtual_end_point(&order, "Customer"),
        Err(CoreError::InvalidOperation { .. })
    ));
}

#[test]
fn unloading_from_a_sub_transaction_reaches_the_root() {
    let (mut hierarchy, seed) = TestHierarchy::seeded();
    let order = hierarchy.get_object(seed.order).unwrap();
    hierarchy.create_sub_transaction().unwrap();
    hierarchy.value(&order, "OrderNumber").unwrap();

    hierarchy.unload_data(&[seed.order]).unwrap();

    assert_eq!(hierarchy.state(&order).unwrap(), ObjectState::NotLoadedYet);
    let root = hierarchy.root_transaction_id();
    let root_data = hierarchy.transaction(root).unwrap().data();
    assert_eq!(root_data.get_state(seed.order), ObjectState::NotLoadedYet);
    assert_eq!(hierarchy.root_events.count("objects_unloaded"), 1);
    assert!(!hierarchy.transaction(root).unwrap().is_writeable());
}

#[test]
fn unloading_from_a_sub_transaction_aborts_on_parent_changes() {
    let (mut hierarchy, seed) = TestHierarchy::seeded();
    let root = hierarchy.root_transaction_id();
    let order = hierarchy.get_object(seed.order).unwrap();
    hierarchy.set_value(&order, "OrderNumber", 5i64).unwrap();
    hierarchy.create_sub_transaction().unwrap();

    let error = hierarchy.unload_data(&[seed.order]).unwrap_err();
    assert!(matches!(
        &error,
        CoreError::HierarchyCommandAborted { transaction, .. } if *transaction == root
    ));
    assert!(matches!(error.root_cause(), CoreError::CannotUnload { .. }));
    assert!(!hierarchy.try_unload_data(&[seed.order]).unwrap());
    assert_eq!(hierarchy.root_events.count("objects_unloading"), 0);

    hierarchy.discard_sub_transaction().unwrap();
    assert_eq!(hierarchy.state(&order).unwrap(), ObjectState::Changed);
}
