//! Recording and vetoing transaction listeners.

use parking_lot::Mutex;
use unitgraph_core::data::DataContainer;
use unitgraph_core::relations::RelationEndPoint;
use unitgraph_core::{
    ClassId, CoreError, CoreResult, DataManager, ObjectId, RelationEndPointId, TransactionId,
    TransactionListener, Value,
};

/// One event seen by a [`RecordingListener`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum RecordedEvent {
    SubTransactionCreated { tx: TransactionId, sub: TransactionId },
    TransactionDiscarded { tx: TransactionId },
    NewObjectCreating { tx: TransactionId, class_id: ClassId },
    ObjectsLoading { tx: TransactionId, ids: Vec<ObjectId> },
    ObjectsLoaded { tx: TransactionId, ids: Vec<ObjectId> },
    ObjectsNotFound { tx: TransactionId, ids: Vec<ObjectId> },
    ObjectsUnloading { tx: TransactionId, ids: Vec<ObjectId> },
    ObjectsUnloaded { tx: TransactionId, ids: Vec<ObjectId> },
    ObjectDeleting { tx: TransactionId, id: ObjectId },
    ObjectDeleted { tx: TransactionId, id: ObjectId },
    PropertyValueChanging {
        tx: TransactionId,
        id: ObjectId,
        property: String,
        old: Value,
        new: Value,
    },
    PropertyValueChanged {
        tx: TransactionId,
        id: ObjectId,
        property: String,
        old: Value,
        new: Value,
    },
    RelationChanging {
        tx: TransactionId,
        end_point: RelationEndPointId,
        old: Option<ObjectId>,
        new: Option<ObjectId>,
    },
    RelationChanged {
        tx: TransactionId,
        end_point: RelationEndPointId,
        old: Option<ObjectId>,
        new: Option<ObjectId>,
    },
    VirtualEndPointStateUpdated {
        tx: TransactionId,
        end_point: RelationEndPointId,
        has_changed: Option<bool>,
    },
    DataContainerRegistering { tx: TransactionId, id: ObjectId },
    DataContainerUnregistering { tx: TransactionId, id: ObjectId },
    EndPointRegistering { tx: TransactionId, end_point: RelationEndPointId },
    EndPointUnregistering { tx: TransactionId, end_point: RelationEndPointId },
    TransactionCommitting { tx: TransactionId, ids: Vec<ObjectId> },
    TransactionCommitted { tx: TransactionId, ids: Vec<ObjectId> },
    TransactionRollingBack { tx: TransactionId, ids: Vec<ObjectId> },
    TransactionRolledBack { tx: TransactionId, ids: Vec<ObjectId> },
}

impl RecordedEvent {
    /// Short name of the event, e.g. `"objects_unloading"`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SubTransactionCreated { .. } => "sub_transaction_created",
            Self::TransactionDiscarded { .. } => "transaction_discarded",
            Self::NewObjectCreating { .. } => "new_object_creating",
            Self::ObjectsLoading { .. } => "objects_loading",
            Self::ObjectsLoaded { .. } => "objects_loaded",
            Self::ObjectsNotFound { .. } => "objects_not_found",
            Self::ObjectsUnloading { .. } => "objects_unloading",
            Self::ObjectsUnloaded { .. } => "objects_unloaded",
            Self::ObjectDeleting { .. } => "object_deleting",
            Self::ObjectDeleted { .. } => "object_deleted",
            Self::PropertyValueChanging { .. } => "property_value_changing",
            Self::PropertyValueChanged { .. } => "property_value_changed",
            Self::RelationChanging { .. } => "relation_changing",
            Self::RelationChanged { .. } => "relation_changed",
            Self::VirtualEndPointStateUpdated { .. } => "virtual_relation_end_point_state_updated",
            Self::DataContainerRegistering { .. } => "data_container_map_registering",
            Self::DataContainerUnregistering { .. } => "data_container_map_unregistering",
            Self::EndPointRegistering { .. } => "relation_end_point_map_registering",
            Self::EndPointUnregistering { .. } => "relation_end_point_map_unregistering",
            Self::TransactionCommitting { .. } => "transaction_committing",
            Self::TransactionCommitted { .. } => "transaction_committed",
            Self::TransactionRollingBack { .. } => "transaction_rolling_back",
            Self::TransactionRolledBack { .. } => "transaction_rolled_back",
        }
    }
}

/// Records every event it receives, in order.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingListener {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events.
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    /// Names of all recorded events.
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(RecordedEvent::name).collect()
    }

    /// Recorded events with the given name.
    pub fn named(&self, name: &str) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.name() == name)
            .cloned()
            .collect()
    }

    /// Number of recorded events with the given name.
    pub fn count(&self, name: &str) -> usize {
        self.events.lock().iter().filter(|e| e.name() == name).count()
    }

    /// Forgets everything recorded so far.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    fn push(&self, event: RecordedEvent) {
        self.events.lock().push(event);
    }
}

impl TransactionListener for RecordingListener {
    fn sub_transaction_created(&self, tx: TransactionId, sub: TransactionId) {
        self.push(RecordedEvent::SubTransactionCreated { tx, sub });
    }

    fn transaction_discarded(&self, tx: TransactionId) {
        self.push(RecordedEvent::TransactionDiscarded { tx });
    }

    fn new_object_creating(&self, tx: TransactionId, class_id: ClassId) -> CoreResult<()> {
        self.push(RecordedEvent::NewObjectCreating { tx, class_id });
        Ok(())
    }

    fn objects_loading(&self, tx: TransactionId, ids: &[ObjectId]) {
        self.push(RecordedEvent::ObjectsLoading { tx, ids: ids.to_vec() });
    }

    fn objects_loaded(&self, tx: TransactionId, ids: &[ObjectId]) {
        self.push(RecordedEvent::ObjectsLoaded { tx, ids: ids.to_vec() });
    }

    fn objects_not_found(&self, tx: TransactionId, ids: &[ObjectId]) {
        self.push(RecordedEvent::ObjectsNotFound { tx, ids: ids.to_vec() });
    }

    fn objects_unloading(
        &self,
        tx: TransactionId,
        ids: &[ObjectId],
        _data: &mut DataManager,
    ) -> CoreResult<()> {
        self.push(RecordedEvent::ObjectsUnloading { tx, ids: ids.to_vec() });
        Ok(())
    }

    fn objects_unloaded(&self, tx: TransactionId, ids: &[ObjectId]) {
        self.push(RecordedEvent::ObjectsUnloaded { tx, ids: ids.to_vec() });
    }

    fn object_deleting(&self, tx: TransactionId, id: ObjectId) -> CoreResult<()> {
        self.push(RecordedEvent::ObjectDeleting { tx, id });
        Ok(())
    }

    fn object_deleted(&self, tx: TransactionId, id: ObjectId) {
        self.push(RecordedEvent::ObjectDeleted { tx, id });
    }

    fn property_value_changing(
        &self,
        tx: TransactionId,
        id: ObjectId,
        property: &str,
        old: &Value,
        new: &Value,
    ) -> CoreResult<()> {
        self.push(RecordedEvent::PropertyValueChanging {
            tx,
            id,
            property: property.to_owned(),
            old: old.clone(),
            new: new.clone(),
        });
        Ok(())
    }

    fn property_value_changed(
        &self,
        tx: TransactionId,
        id: ObjectId,
        property: &str,
        old: &Value,
        new: &Value,
    ) {
        self.push(RecordedEvent::PropertyValueChanged {
            tx,
            id,
            property: property.to_owned(),
            old: old.clone(),
            new: new.clone(),
        });
    }

    fn relation_changing(
        &self,
        tx: TransactionId,
        end_point: RelationEndPointId,
        old: Option<ObjectId>,
        new: Option<ObjectId>,
    ) -> CoreResult<()> {
        self.push(RecordedEvent::RelationChanging { tx, end_point, old, new });
        Ok(())
    }

    fn relation_changed(
        &self,
        tx: TransactionId,
        end_point: RelationEndPointId,
        old: Option<ObjectId>,
        new: Option<ObjectId>,
    ) {
        self.push(RecordedEvent::RelationChanged { tx, end_point, old, new });
    }

    fn virtual_relation_end_point_state_updated(
        &self,
        tx: TransactionId,
        end_point: RelationEndPointId,
        has_changed: Option<bool>,
    ) {
        self.push(RecordedEvent::VirtualEndPointStateUpdated {
            tx,
            end_point,
            has_changed,
        });
    }

    fn data_container_map_registering(
        &self,
        tx: TransactionId,
        container: &DataContainer,
    ) -> CoreResult<()> {
        self.push(RecordedEvent::DataContainerRegistering {
            tx,
            id: container.id(),
        });
        Ok(())
    }

    fn data_container_map_unregistering(
        &self,
        tx: TransactionId,
        container: &DataContainer,
    ) -> CoreResult<()> {
        self.push(RecordedEvent::DataContainerUnregistering {
            tx,
            id: container.id(),
        });
        Ok(())
    }

    fn relation_end_point_map_registering(
        &self,
        tx: TransactionId,
        end_point: &RelationEndPoint,
    ) -> CoreResult<()> {
        self.push(RecordedEvent::EndPointRegistering {
            tx,
            end_point: end_point.id(),
        });
        Ok(())
    }

    fn relation_end_point_map_unregistering(
        &self,
        tx: TransactionId,
        end_point: RelationEndPointId,
    ) -> CoreResult<()> {
        self.push(RecordedEvent::EndPointUnregistering { tx, end_point });
        Ok(())
    }

    fn transaction_committing(&self, tx: TransactionId, ids: &[ObjectId]) -> CoreResult<()> {
        self.push(RecordedEvent::TransactionCommitting { tx, ids: ids.to_vec() });
        Ok(())
    }

    fn transaction_committed(&self, tx: TransactionId, ids: &[ObjectId]) {
        self.push(RecordedEvent::TransactionCommitted { tx, ids: ids.to_vec() });
    }

    fn transaction_rolling_back(&self, tx: TransactionId, ids: &[ObjectId]) -> CoreResult<()> {
        self.push(RecordedEvent::TransactionRollingBack { tx, ids: ids.to_vec() });
        Ok(())
    }

    fn transaction_rolled_back(&self, tx: TransactionId, ids: &[ObjectId]) {
        self.push(RecordedEvent::TransactionRolledBack { tx, ids: ids.to_vec() });
    }
}

/// Rejects deletions, commits or new objects on request.
#[derive(Debug, Default)]
pub struct VetoingListener {
    deletions: Mutex<Vec<ObjectId>>,
    commits: Mutex<bool>,
    new_objects: Mutex<Vec<ClassId>>,
}

impl VetoingListener {
    /// Creates a listener that rejects nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects deleting `id` from now on.
    pub fn veto_delete(&self, id: ObjectId) {
        self.deletions.lock().push(id);
    }

    /// Rejects every commit from now on.
    pub fn veto_commits(&self) {
        *self.commits.lock() = true;
    }

    /// Rejects creating objects of `class_id` from now on.
    pub fn veto_new_objects(&self, class_id: ClassId) {
        self.new_objects.lock().push(class_id);
    }
}

impl TransactionListener for VetoingListener {
    fn new_object_creating(&self, _tx: TransactionId, class_id: ClassId) -> CoreResult<()> {
        if self.new_objects.lock().contains(&class_id) {
            return Err(CoreError::invalid_operation(format!(
                "creating {class_id} objects was vetoed"
            )));
        }
        Ok(())
    }

    fn object_deleting(&self, _tx: TransactionId, id: ObjectId) -> CoreResult<()> {
        if self.deletions.lock().contains(&id) {
            return Err(CoreError::invalid_operation(format!(
                "deleting {id} was vetoed"
            )));
        }
        Ok(())
    }

    fn transaction_committing(&self, tx: TransactionId, _ids: &[ObjectId]) -> CoreResult<()> {
        if *self.commits.lock() {
            return Err(CoreError::invalid_operation(format!(
                "commit of {tx} was vetoed"
            )));
        }
        Ok(())
    }
}
