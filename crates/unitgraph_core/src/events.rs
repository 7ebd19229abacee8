//! Transaction events.
//!
//! The core raises one-way notifications through [`TransactionListener`].
//! "-ing" notifications are raised before a mutation and may veto it by
//! returning an error; "-ed" notifications are raised afterwards and cannot
//! fail.
//!
//! Every transaction owns a [`TransactionEventSink`] that broadcasts to its
//! listeners in registration order and stops at the first veto.

use crate::data::DataContainer;
use crate::data_manager::DataManager;
use crate::error::{CoreError, CoreResult};
use crate::relations::RelationEndPoint;
use crate::types::{ClassId, ObjectId, RelationEndPointId, TransactionId};
use crate::value::Value;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Observer of transaction events.
///
/// All methods have no-op defaults so implementors only override what they
/// need.
#[allow(unused_variables)]
pub trait TransactionListener: Send + Sync {
    /// A sub-transaction was created below `tx`.
    fn sub_transaction_created(&self, tx: TransactionId, sub: TransactionId) {}

    /// `tx` was discarded and must not be used any more.
    fn transaction_discarded(&self, tx: TransactionId) {}

    /// A new object of `class_id` is about to be created.
    fn new_object_creating(&self, tx: TransactionId, class_id: ClassId) -> CoreResult<()> {
        Ok(())
    }

    /// Data for `ids` is about to be loaded.
    fn objects_loading(&self, tx: TransactionId, ids: &[ObjectId]) {}

    /// `ids` were loaded and registered.
    fn objects_loaded(&self, tx: TransactionId, ids: &[ObjectId]) {}

    /// The data source reported no data for `ids`.
    fn objects_not_found(&self, tx: TransactionId, ids: &[ObjectId]) {}

    /// `ids` are about to be unloaded.
    ///
    /// Listeners receive the transaction's data manager and may register
    /// further objects; unloading re-notifies until no new registrations appear.
    fn objects_unloading(
        &self,
        tx: TransactionId,
        ids: &[ObjectId],
        data: &mut DataManager,
    ) -> CoreResult<()> {
        Ok(())
    }

    /// `ids` were unloaded.
    fn objects_unloaded(&self, tx: TransactionId, ids: &[ObjectId]) {}

    /// `id` is about to be deleted.
    fn object_deleting(&self, tx: TransactionId, id: ObjectId) -> CoreResult<()> {
        Ok(())
    }

    /// `id` was deleted.
    fn object_deleted(&self, tx: TransactionId, id: ObjectId) {}

    /// A property value is about to change.
    fn property_value_changing(
        &self,
        tx: TransactionId,
        id: ObjectId,
        property: &str,
        old: &Value,
        new: &Value,
    ) -> CoreResult<()> {
        Ok(())
    }

    /// A property value changed.
    fn property_value_changed(
        &self,
        tx: TransactionId,
        id: ObjectId,
        property: &str,
        old: &Value,
        new: &Value,
    ) {
    }

    /// A relation end point is about to change.
    fn relation_changing(
        &self,
        tx: TransactionId,
        end_point: RelationEndPointId,
        old: Option<ObjectId>,
        new: Option<ObjectId>,
    ) -> CoreResult<()> {
        Ok(())
    }

    /// A relation end point changed.
    fn relation_changed(
        &self,
        tx: TransactionId,
        end_point: RelationEndPointId,
        old: Option<ObjectId>,
        new: Option<ObjectId>,
    ) {
    }

    /// The change state of a virtual end point may have been updated.
    ///
    /// `has_changed` is `None` when the end point is incomplete.
    fn virtual_relation_end_point_state_updated(
        &self,
        tx: TransactionId,
        end_point: RelationEndPointId,
        has_changed: Option<bool>,
    ) {
    }

    /// A data container is about to be added to the identity map.
    fn data_container_map_registering(
        &self,
        tx: TransactionId,
        container: &DataContainer,
    ) -> CoreResult<()> {
        Ok(())
    }

    /// A data container is about to be removed from the identity map.
    fn data_container_map_unregistering(
        &self,
        tx: TransactionId,
        container: &DataContainer,
    ) -> CoreResult<()> {
        Ok(())
    }

    /// An end point is about to be added to the end point map.
    fn relation_end_point_map_registering(
        &self,
        tx: TransactionId,
        end_point: &RelationEndPoint,
    ) -> CoreResult<()> {
        Ok(())
    }

    /// An end point is about to be removed from the end point map.
    fn relation_end_point_map_unregistering(
        &self,
        tx: TransactionId,
        end_point: RelationEndPointId,
    ) -> CoreResult<()> {
        Ok(())
    }

    /// The transaction is about to commit `ids`.
    fn transaction_committing(&self, tx: TransactionId, ids: &[ObjectId]) -> CoreResult<()> {
        Ok(())
    }

    /// The transaction committed `ids`.
    fn transaction_committed(&self, tx: TransactionId, ids: &[ObjectId]) {}

    /// The transaction is about to roll back `ids`.
    fn transaction_rolling_back(&self, tx: TransactionId, ids: &[ObjectId]) -> CoreResult<()> {
        Ok(())
    }

    /// The transaction rolled back `ids`.
    fn transaction_rolled_back(&self, tx: TransactionId, ids: &[ObjectId]) {}
}

/// Broadcasts events of one transaction to its listeners.
///
/// The listener list is snapshotted before each broadcast, so listeners may
/// trigger nested events without holding the lock.
pub struct TransactionEventSink {
    tx: TransactionId,
    listeners: RwLock<Vec<Arc<dyn TransactionListener>>>,
}

impl TransactionEventSink {
    /// Creates a sink without listeners.
    #[must_use]
    pub fn new(tx: TransactionId) -> Self {
        Self {
            tx,
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Transaction whose events this sink broadcasts.
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        self.tx
    }

    /// Appends a listener.
    pub fn add_listener(&self, listener: Arc<dyn TransactionListener>) {
        self.listeners.write().push(listener);
    }

    /// Returns the number of listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    fn snapshot(&self) -> Vec<Arc<dyn TransactionListener>> {
        self.listeners.read().clone()
    }

    fn veto(&self, f: impl Fn(&dyn TransactionListener) -> CoreResult<()>) -> CoreResult<()> {
        for listener in self.snapshot() {
            f(listener.as_ref())?;
        }
        Ok(())
    }

    fn notify(&self, f: impl Fn(&dyn TransactionListener)) {
        for listener in self.snapshot() {
            f(listener.as_ref());
        }
    }
}

impl std::fmt::Debug for TransactionEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionEventSink")
            .field("tx", &self.tx)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl TransactionListener for TransactionEventSink {
    fn sub_transaction_created(&self, tx: TransactionId, sub: TransactionId) {
        self.notify(|l| l.sub_transaction_created(tx, sub));
    }

    fn transaction_discarded(&self, tx: TransactionId) {
        self.notify(|l| l.transaction_discarded(tx));
    }

    fn new_object_creating(&self, tx: TransactionId, class_id: ClassId) -> CoreResult<()> {
        self.veto(|l| l.new_object_creating(tx, class_id))
    }

    fn objects_loading(&self, tx: TransactionId, ids: &[ObjectId]) {
        self.notify(|l| l.objects_loading(tx, ids));
    }

    fn objects_loaded(&self, tx: TransactionId, ids: &[ObjectId]) {
        self.notify(|l| l.objects_loaded(tx, ids));
    }

    fn objects_not_found(&self, tx: TransactionId, ids: &[ObjectId]) {
        self.notify(|l| l.objects_not_found(tx, ids));
    }

    fn objects_unloading(
        &self,
        tx: TransactionId,
        ids: &[ObjectId],
        data: &mut DataManager,
    ) -> CoreResult<()> {
        for listener in self.snapshot() {
            listener.objects_unloading(tx, ids, data)?;
        }
        Ok(())
    }

    fn objects_unloaded(&self, tx: TransactionId, ids: &[ObjectId]) {
        self.notify(|l| l.objects_unloaded(tx, ids));
    }

    fn object_deleting(&self, tx: TransactionId, id: ObjectId) -> CoreResult<()> {
        self.veto(|l| l.object_deleting(tx, id))
    }

    fn object_deleted(&self, tx: TransactionId, id: ObjectId) {
        self.notify(|l| l.object_deleted(tx, id));
    }

    fn property_value_changing(
        &self,
        tx: TransactionId,
        id: ObjectId,
        property: &str,
        old: &Value,
        new: &Value,
    ) -> CoreResult<()> {
        self.veto(|l| l.property_value_changing(tx, id, property, old, new))
    }

    fn property_value_changed(
        &self,
        tx: TransactionId,
        id: ObjectId,
        property: &str,
        old: &Value,
        new: &Value,
    ) {
        self.notify(|l| l.property_value_changed(tx, id, property, old, new));
    }

    fn relation_changing(
        &self,
        tx: TransactionId,
        end_point: RelationEndPointId,
        old: Option<ObjectId>,
        new: Option<ObjectId>,
    ) -> CoreResult<()> {
        self.veto(|l| l.relation_changing(tx, end_point, old, new))
    }

    fn relation_changed(
        &self,
        tx: TransactionId,
        end_point: RelationEndPointId,
        old: Option<ObjectId>,
        new: Option<ObjectId>,
    ) {
        self.notify(|l| l.relation_changed(tx, end_point, old, new));
    }

    fn virtual_relation_end_point_state_updated(
        &self,
        tx: TransactionId,
        end_point: RelationEndPointId,
        has_changed: Option<bool>,
    ) {
        self.notify(|l| l.virtual_relation_end_point_state_updated(tx, end_point, has_changed));
    }

    fn data_container_map_registering(
        &self,
        tx: TransactionId,
        container: &DataContainer,
    ) -> CoreResult<()> {
        self.veto(|l| l.data_container_map_registering(tx, container))
    }

    fn data_container_map_unregistering(
        &self,
        tx: TransactionId,
        container: &DataContainer,
    ) -> CoreResult<()> {
        self.veto(|l| l.data_container_map_unregistering(tx, container))
    }

    fn relation_end_point_map_registering(
        &self,
        tx: TransactionId,
        end_point: &RelationEndPoint,
    ) -> CoreResult<()> {
        self.veto(|l| l.relation_end_point_map_registering(tx, end_point))
    }

    fn relation_end_point_map_unregistering(
        &self,
        tx: TransactionId,
        end_point: RelationEndPointId,
    ) -> CoreResult<()> {
        self.veto(|l| l.relation_end_point_map_unregistering(tx, end_point))
    }

    fn transaction_committing(&self, tx: TransactionId, ids: &[ObjectId]) -> CoreResult<()> {
        self.veto(|l| l.transaction_committing(tx, ids))
    }

    fn transaction_committed(&self, tx: TransactionId, ids: &[ObjectId]) {
        self.notify(|l| l.transaction_committed(tx, ids));
    }

    fn transaction_rolling_back(&self, tx: TransactionId, ids: &[ObjectId]) -> CoreResult<()> {
        self.veto(|l| l.transaction_rolling_back(tx, ids))
    }

    fn transaction_rolled_back(&self, tx: TransactionId, ids: &[ObjectId]) {
        self.notify(|l| l.transaction_rolled_back(tx, ids));
    }
}

/// Rejects mutating events while its transaction is read-only.
///
/// Installed first on every transaction. Loading into a read-only transaction
/// stays possible (sub-transactions load through their parents), as do the
/// unloading notifications; everything that changes or removes state is
/// rejected until the flag is released.
#[derive(Debug)]
pub struct ReadOnlyTransactionListener {
    writeable: Arc<AtomicBool>,
}

impl ReadOnlyTransactionListener {
    /// Creates a listener guarding the given writeable flag.
    #[must_use]
    pub fn new(writeable: Arc<AtomicBool>) -> Self {
        Self { writeable }
    }

    fn ensure_writeable(&self, tx: TransactionId, operation: &str) -> CoreResult<()> {
        if self.writeable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CoreError::read_only(tx, operation))
        }
    }
}

impl TransactionListener for ReadOnlyTransactionListener {
    fn new_object_creating(&self, tx: TransactionId, _class_id: ClassId) -> CoreResult<()> {
        self.ensure_writeable(tx, "create new objects")
    }

    fn object_deleting(&self, tx: TransactionId, _id: ObjectId) -> CoreResult<()> {
        self.ensure_writeable(tx, "delete objects")
    }

    fn property_value_changing(
        &self,
        tx: TransactionId,
        _id: ObjectId,
        _property: &str,
        _old: &Value,
        _new: &Value,
    ) -> CoreResult<()> {
        self.ensure_writeable(tx, "change property values")
    }

    fn relation_changing(
        &self,
        tx: TransactionId,
        _end_point: RelationEndPointId,
        _old: Option<ObjectId>,
        _new: Option<ObjectId>,
    ) -> CoreResult<()> {
        self.ensure_writeable(tx, "change relations")
    }

    fn data_container_map_registering(
        &self,
        tx: TransactionId,
        container: &DataContainer,
    ) -> CoreResult<()> {
        if container.is_new() {
            self.ensure_writeable(tx, "register new objects")
        } else {
            Ok(())
        }
    }

    fn data_container_map_unregistering(
        &self,
        tx: TransactionId,
        _container: &DataContainer,
    ) -> CoreResult<()> {
        self.ensure_writeable(tx, "unregister data containers")
    }

    fn relation_end_point_map_unregistering(
        &self,
        tx: TransactionId,
        _end_point: RelationEndPointId,
    ) -> CoreResult<()> {
        self.ensure_writeable(tx, "unregister relation end points")
    }

    fn transaction_committing(&self, tx: TransactionId, _ids: &[ObjectId]) -> CoreResult<()> {
        self.ensure_writeable(tx, "commit")
    }

    fn transaction_rolling_back(&self, tx: TransactionId, _ids: &[ObjectId]) -> CoreResult<()> {
        self.ensure_writeable(tx, "roll back")
    }
}

/// Logs every event through `tracing` at debug level.
#[derive(Debug, Default)]
pub struct LoggingTransactionListener;

impl TransactionListener for LoggingTransactionListener {
    fn sub_transaction_created(&self, tx: TransactionId, sub: TransactionId) {
        debug!(%tx, %sub, "sub-transaction created");
    }

    fn transaction_discarded(&self, tx: TransactionId) {
        debug!(%tx, "transaction discarded");
    }

    fn new_object_creating(&self, tx: TransactionId, class_id: ClassId) -> CoreResult<()> {
        debug!(%tx, %class_id, "new object creating");
        Ok(())
    }

    fn objects_loaded(&self, tx: TransactionId, ids: &[ObjectId]) {
        debug!(%tx, count = ids.len(), "objects loaded");
    }

    fn objects_not_found(&self, tx: TransactionId, ids: &[ObjectId]) {
        debug!(%tx, ?ids, "objects not found");
    }

    fn objects_unloading(
        &self,
        tx: TransactionId,
        ids: &[ObjectId],
        _data: &mut DataManager,
    ) -> CoreResult<()> {
        debug!(%tx, count = ids.len(), "objects unloading");
        Ok(())
    }

    fn objects_unloaded(&self, tx: TransactionId, ids: &[ObjectId]) {
        debug!(%tx, count = ids.len(), "objects unloaded");
    }

    fn object_deleting(&self, tx: TransactionId, id: ObjectId) -> CoreResult<()> {
        debug!(%tx, %id, "object deleting");
        Ok(())
    }

    fn object_deleted(&self, tx: TransactionId, id: ObjectId) {
        debug!(%tx, %id, "object deleted");
    }

    fn property_value_changed(
        &self,
        tx: TransactionId,
        id: ObjectId,
        property: &str,
        old: &Value,
        new: &Value,
    ) {
        debug!(%tx, %id, property, %old, %new, "property value changed");
    }

    fn relation_changed(
        &self,
        tx: TransactionId,
        end_point: RelationEndPointId,
        old: Option<ObjectId>,
        new: Option<ObjectId>,
    ) {
        debug!(%tx, %end_point, ?old, ?new, "relation changed");
    }

    fn data_container_map_registering(
        &self,
        tx: TransactionId,
        container: &DataContainer,
    ) -> CoreResult<()> {
        debug!(%tx, id = %container.id(), "data container registering");
        Ok(())
    }

    fn data_container_map_unregistering(
        &self,
        tx: TransactionId,
        container: &DataContainer,
    ) -> CoreResult<()> {
        debug!(%tx, id = %container.id(), "data container unregistering");
        Ok(())
    }

    fn relation_end_point_map_unregistering(
        &self,
        tx: TransactionId,
        end_point: RelationEndPointId,
    ) -> CoreResult<()> {
        debug!(%tx, %end_point, "relation end point unregistering");
        Ok(())
    }

    fn transaction_committed(&self, tx: TransactionId, ids: &[ObjectId]) {
        debug!(%tx, count = ids.len(), "transaction committed");
    }

    fn transaction_rolled_back(&self, tx: TransactionId, ids: &[ObjectId]) {
        debug!(%tx, count = ids.len(), "transaction rolled back");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ObjectKey;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<&'static str>>,
        veto_deleting: bool,
    }

    impl TransactionListener for Recorder {
        fn object_deleting(&self, _tx: TransactionId, _id: ObjectId) -> CoreResult<()> {
            self.seen.lock().push("deleting");
            if self.veto_deleting {
                Err(CoreError::invalid_operation("vetoed"))
            } else {
                Ok(())
            }
        }

        fn object_deleted(&self, _tx: TransactionId, _id: ObjectId) {
            self.seen.lock().push("deleted");
        }
    }

    fn order() -> ObjectId {
        ObjectId::new(ClassId::new("Order"), ObjectKey::from_u128(1))
    }

    #[test]
    fn sink_stops_at_first_veto() {
        let tx = TransactionId::new(1);
        let sink = TransactionEventSink::new(tx);
        let vetoing = Arc::new(Recorder {
            veto_deleting: true,
            ..Recorder::default()
        });
        let second = Arc::new(Recorder::default());
        sink.add_listener(vetoing.clone());
        sink.add_listener(second.clone());

        assert!(sink.object_deleting(tx, order()).is_err());
        assert_eq!(*vetoing.seen.lock(), vec!["deleting"]);
        assert!(second.seen.lock().is_empty());
    }

    #[test]
    fn sink_notifies_all_listeners() {
        let tx = TransactionId::new(1);
        let sink = TransactionEventSink::new(tx);
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        sink.add_listener(first.clone());
        sink.add_listener(second.clone());

        sink.object_deleted(tx, order());
        assert_eq!(*first.seen.lock(), vec!["deleted"]);
        assert_eq!(*second.seen.lock(), vec!["deleted"]);
    }

    #[test]
    fn read_only_listener_follows_flag() {
        let tx = TransactionId::new(1);
        let flag = Arc::new(AtomicBool::new(false));
        let listener = ReadOnlyTransactionListener::new(Arc::clone(&flag));

        let err = listener.object_deleting(tx, order()).unwrap_err();
        assert!(matches!(err, CoreError::TransactionReadOnly { .. }));
        assert!(listener.transaction_committing(tx, &[]).is_err());
        assert!(listener
            .relation_end_point_map_unregistering(tx, RelationEndPointId::new(order(), "Customer"))
            .is_err());

        flag.store(true, Ordering::SeqCst);
        assert!(listener.object_deleting(tx, order()).is_ok());
        assert!(listener.transaction_committing(tx, &[]).is_ok());
    }
}
