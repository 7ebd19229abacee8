//! Per-transaction facade over the identity map and the relation end points.

use crate::commands::{
    CollectionEndPointInsertCommand, CollectionEndPointRemoveCommand, Command, DeleteCommand,
    NopCommand, ObjectEndPointSetCommand, UnloadAllCommand, UnloadCommand,
    UnloadVirtualEndPointsCommand,
};
use crate::config::Config;
use crate::data::{DataContainer, DataContainerMap, InvalidObjectManager, ObjectState};
use crate::error::{CoreError, CoreResult};
use crate::events::{TransactionEventSink, TransactionListener};
use crate::loading::{FetchedRelationDataRegistrationAgent, LazyLoader};
use crate::mapping::{EndPointKind, MappingConfiguration, RelationEndPointDefinition};
use crate::persistence::{ObjectData, PersistableData, PersistableState, Query};
use crate::relations::{RelationEndPoint, RelationEndPointManager, UnregisterPlan};
use crate::types::{ObjectId, RelationEndPointId, Timestamp, TransactionId};
use crate::value::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Owns the data of one transaction.
///
/// The data manager keeps the [`DataContainerMap`], the
/// [`RelationEndPointManager`] and the [`InvalidObjectManager`] of its
/// transaction consistent with each other. It loads through a caller-supplied
/// [`LazyLoader`] and creates the commands that mutate its state.
pub struct DataManager {
    tx: TransactionId,
    mapping: Arc<MappingConfiguration>,
    config: Arc<Config>,
    events: Arc<TransactionEventSink>,
    writeable: Arc<AtomicBool>,
    containers: DataContainerMap,
    end_points: RelationEndPointManager,
    invalid: InvalidObjectManager,
}

impl DataManager {
    /// Creates an empty data manager.
    ///
    /// `order_sensitive` selects how collection changes are detected; it is
    /// set for sub-transactions.
    #[must_use]
    pub fn new(
        tx: TransactionId,
        mapping: Arc<MappingConfiguration>,
        config: Arc<Config>,
        events: Arc<TransactionEventSink>,
        writeable: Arc<AtomicBool>,
        order_sensitive: bool,
    ) -> Self {
        Self {
            tx,
            containers: DataContainerMap::new(tx, Arc::clone(&events)),
            end_points: RelationEndPointManager::new(
                tx,
                Arc::clone(&events),
                Arc::clone(&mapping),
                order_sensitive,
            ),
            invalid: InvalidObjectManager::new(),
            mapping,
            config,
            events,
            writeable,
        }
    }

    /// The owning transaction.
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        self.tx
    }

    /// The mapping of the hierarchy.
    #[must_use]
    pub fn mapping(&self) -> &Arc<MappingConfiguration> {
        &self.mapping
    }

    /// The configuration of the hierarchy.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The event sink of the transaction.
    #[must_use]
    pub fn events(&self) -> &Arc<TransactionEventSink> {
        &self.events
    }

    /// Returns `true` unless a sub-transaction is active.
    #[must_use]
    pub fn is_writeable(&self) -> bool {
        self.writeable.load(Ordering::SeqCst)
    }

    /// The identity map.
    #[must_use]
    pub fn data_containers(&self) -> &DataContainerMap {
        &self.containers
    }

    /// The relation end point manager.
    #[must_use]
    pub fn end_point_manager(&self) -> &RelationEndPointManager {
        &self.end_points
    }

    /// The relation end point manager, for mutation.
    pub fn end_point_manager_mut(&mut self) -> &mut RelationEndPointManager {
        &mut self.end_points
    }

    /// The invalid identities.
    #[must_use]
    pub fn invalid_objects(&self) -> &InvalidObjectManager {
        &self.invalid
    }

    // --- registration -----------------------------------------------------

    /// Adds a container to the identity map and registers its end points.
    ///
    /// If the end points cannot be registered the container is removed again,
    /// so a failed registration leaves both maps untouched.
    pub fn register_data_container(&mut self, container: DataContainer) -> CoreResult<()> {
        let id = container.id();
        self.invalid.ensure_valid(id)?;
        self.containers.register(container)?;
        let container = self.containers.require(id)?;
        if let Err(error) = self.end_points.register_end_points_for_data_container(container) {
            self.containers.evict(id);
            return Err(error);
        }
        trace!(tx = %self.tx, %id, "data container registered");
        Ok(())
    }

    /// Registers loaded data for every identity that is neither registered
    /// nor invalid. Returns the newly registered identities.
    pub fn register_loaded_objects(&mut self, data: &[ObjectData]) -> CoreResult<Vec<ObjectId>> {
        let mut fresh: Vec<&ObjectData> = Vec::new();
        for item in data {
            if !self.containers.contains(item.id)
                && !self.invalid.is_invalid(item.id)
                && !fresh.iter().any(|f| f.id == item.id)
            {
                fresh.push(item);
            }
        }
        if fresh.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<ObjectId> = fresh.iter().map(|item| item.id).collect();
        self.events.objects_loading(self.tx, &ids);
        let mapping = Arc::clone(&self.mapping);
        for item in fresh {
            let class = mapping.class(item.id.class_id())?;
            self.register_data_container(DataContainer::from_loaded(
                item.id,
                class,
                item.timestamp,
                item.values.clone(),
            ))?;
        }
        self.events.objects_loaded(self.tx, &ids);
        Ok(ids)
    }

    /// Creates and registers the container of a new object.
    pub fn new_object(&mut self, id: ObjectId) -> CoreResult<()> {
        self.events.new_object_creating(self.tx, id.class_id())?;
        let class = self.mapping.class(id.class_id())?;
        self.register_data_container(DataContainer::new_object(id, class))?;
        debug!(tx = %self.tx, %id, "new object created");
        Ok(())
    }

    /// Removes a new object from the transaction; it becomes invalid.
    pub fn discard(&mut self, id: ObjectId) -> CoreResult<()> {
        let container = self.containers.require(id)?;
        if !container.is_new() {
            return Err(CoreError::invalid_operation(format!(
                "only new objects can be discarded, {id} is {:?}",
                container.state()
            )));
        }
        self.end_points.remove_end_points_of(container)?;
        let mut container = self.containers.unregister(id)?;
        container.discard();
        self.invalid.mark_invalid(id);
        debug!(tx = %self.tx, %id, "new object discarded");
        Ok(())
    }

    /// Marks `id` invalid in this transaction.
    pub fn mark_invalid(&mut self, id: ObjectId) -> bool {
        self.invalid.mark_invalid(id)
    }

    /// Makes `id` valid again.
    pub fn mark_not_invalid(&mut self, id: ObjectId) -> CoreResult<()> {
        self.invalid.mark_not_invalid(id)
    }

    /// State of `id` in this transaction.
    ///
    /// An unchanged object whose virtual end points changed reports
    /// [`ObjectState::Changed`].
    #[must_use]
    pub fn get_state(&self, id: ObjectId) -> ObjectState {
        if self.invalid.is_invalid(id) {
            return ObjectState::Invalid;
        }
        match self.containers.get(id).map(DataContainer::state) {
            None => ObjectState::NotLoadedYet,
            Some(ObjectState::Unchanged) if self.has_relation_changes(id) => ObjectState::Changed,
            Some(state) => state,
        }
    }

    /// Returns `true` if a virtual end point owned by `id` changed.
    #[must_use]
    pub fn has_relation_changes(&self, id: ObjectId) -> bool {
        let order_sensitive = self.end_points.is_order_sensitive();
        self.end_points
            .map()
            .ids_of(id)
            .into_iter()
            .filter_map(|ep| self.end_points.get_relation_end_point_without_loading(ep))
            .any(|ep| ep.has_virtual_changes(order_sensitive))
    }

    /// Forces an existing object into the changed state.
    pub fn mark_as_changed(&mut self, id: ObjectId) -> CoreResult<()> {
        self.invalid.ensure_valid(id)?;
        self.containers.require_mut(id)?.mark_as_changed()
    }

    // --- loading ------------------------------------------------------------

    /// Returns the container of `id`, loading it if necessary.
    ///
    /// If the object does not exist, fails with [`CoreError::ObjectNotFound`]
    /// when `throw_on_not_found` is set and returns `Ok(None)` otherwise.
    pub fn get_data_container_with_lazy_load(
        &mut self,
        id: ObjectId,
        throw_on_not_found: bool,
        loader: &mut dyn LazyLoader,
    ) -> CoreResult<Option<&DataContainer>> {
        Ok(self
            .get_data_containers_with_lazy_load(&[id], throw_on_not_found, loader)?
            .into_iter()
            .next()
            .flatten())
    }

    /// Returns the containers of `ids` in request order, loading the
    /// missing ones in one round trip.
    pub fn get_data_containers_with_lazy_load(
        &mut self,
        ids: &[ObjectId],
        throw_on_not_found: bool,
        loader: &mut dyn LazyLoader,
    ) -> CoreResult<Vec<Option<&DataContainer>>> {
        for id in ids {
            self.invalid.ensure_valid(*id)?;
        }
        let mut missing: Vec<ObjectId> = Vec::new();
        for id in ids {
            if !self.containers.contains(*id) && !missing.contains(id) {
                missing.push(*id);
            }
        }
        if !missing.is_empty() {
            self.events.objects_loading(self.tx, &missing);
            let loaded = loader.load_object_data_many(&missing)?;
            let mapping = Arc::clone(&self.mapping);
            let mut found = Vec::new();
            let mut not_found = Vec::new();
            for (id, data) in missing.iter().zip(loaded) {
                match data {
                    Some(data) => {
                        let class = mapping.class(id.class_id())?;
                        self.register_data_container(DataContainer::from_loaded(
                            *id,
                            class,
                            data.timestamp,
                            data.values,
                        ))?;
                        found.push(*id);
                    }
                    None => not_found.push(*id),
                }
            }
            debug!(tx = %self.tx, loaded = found.len(), missing = not_found.len(), "objects loaded");
            if !found.is_empty() {
                self.events.objects_loaded(self.tx, &found);
            }
            if let Some(first) = not_found.first().copied() {
                self.events.objects_not_found(self.tx, &not_found);
                if throw_on_not_found {
                    return Err(CoreError::object_not_found(first));
                }
            }
        }
        Ok(ids.iter().map(|id| self.containers.get(*id)).collect())
    }

    /// Returns an end point, loading its owner and, for virtual end points,
    /// its data.
    pub fn get_relation_end_point_with_lazy_load(
        &mut self,
        id: RelationEndPointId,
        loader: &mut dyn LazyLoader,
    ) -> CoreResult<&RelationEndPoint> {
        let mapping = Arc::clone(&self.mapping);
        let definition = mapping.end_point(&id)?;
        self.get_data_container_with_lazy_load(id.object_id(), true, loader)?;
        match definition.kind() {
            EndPointKind::Real => {}
            EndPointKind::VirtualObject | EndPointKind::VirtualCollection => {
                self.load_lazy_virtual_end_point(id, definition, loader)?;
            }
            EndPointKind::Anonymous => {
                return Err(CoreError::mapping(format!("{id} is anonymous and cannot be loaded")))
            }
        }
        self.end_points
            .get_relation_end_point_without_loading(id)
            .ok_or_else(|| CoreError::invalid_operation(format!("{id} is not registered")))
    }

    /// Returns an end point if it is registered, without loading anything.
    #[must_use]
    pub fn get_relation_end_point_without_loading(
        &self,
        id: RelationEndPointId,
    ) -> Option<&RelationEndPoint> {
        self.end_points.get_relation_end_point_without_loading(id)
    }

    /// Returns a virtual end point, registering it incomplete if missing.
    pub fn get_or_create_virtual_end_point(
        &mut self,
        id: RelationEndPointId,
    ) -> CoreResult<&mut RelationEndPoint> {
        self.end_points.get_or_create_virtual_end_point(id)
    }

    /// Loads the data of a collection end point. A no-op if it is complete.
    pub fn load_lazy_collection_end_point(
        &mut self,
        id: RelationEndPointId,
        loader: &mut dyn LazyLoader,
    ) -> CoreResult<()> {
        self.load_lazy_end_point_of_kind(id, EndPointKind::VirtualCollection, loader)
    }

    /// Loads the data of a virtual object end point. A no-op if it is complete.
    pub fn load_lazy_virtual_object_end_point(
        &mut self,
        id: RelationEndPointId,
        loader: &mut dyn LazyLoader,
    ) -> CoreResult<()> {
        self.load_lazy_end_point_of_kind(id, EndPointKind::VirtualObject, loader)
    }

    fn load_lazy_end_point_of_kind(
        &mut self,
        id: RelationEndPointId,
        kind: EndPointKind,
        loader: &mut dyn LazyLoader,
    ) -> CoreResult<()> {
        let mapping = Arc::clone(&self.mapping);
        let definition = mapping.end_point(&id)?;
        if definition.kind() != kind {
            return Err(CoreError::invalid_operation(format!(
                "{id} is a {:?} end point",
                definition.kind()
            )));
        }
        self.load_lazy_virtual_end_point(id, definition, loader)
    }

    fn load_lazy_virtual_end_point(
        &mut self,
        id: RelationEndPointId,
        definition: &RelationEndPointDefinition,
        loader: &mut dyn LazyLoader,
    ) -> CoreResult<()> {
        if self
            .end_points
            .get_relation_end_point_without_loading(id)
            .is_some_and(RelationEndPoint::is_complete)
        {
            return Ok(());
        }
        let related = loader.load_related_object_data(definition, id.object_id())?;
        self.register_loaded_objects(&related)?;
        let mut items: Vec<ObjectId> = Vec::new();
        for item in &related {
            if !self.invalid.is_invalid(item.id) && !items.contains(&item.id) {
                items.push(item.id);
            }
        }
        debug!(tx = %self.tx, %id, count = items.len(), "virtual end point loaded");
        self.end_points.mark_complete(id, items)
    }

    // --- values and relations ---------------------------------------------

    /// Current value of a loaded object's property.
    pub fn value(&self, id: ObjectId, property: &str) -> CoreResult<Value> {
        self.invalid.ensure_valid(id)?;
        self.containers.require(id)?.value(property).cloned()
    }

    /// Changes a loaded object's property, raising the property events.
    ///
    /// Foreign keys can only be changed through their relation end point.
    pub fn set_value(&mut self, id: ObjectId, property: &str, value: Value) -> CoreResult<()> {
        self.check_object_usable(id)?;
        let is_foreign_key = self
            .mapping
            .class(id.class_id())?
            .property(property)
            .ok_or_else(|| CoreError::property_not_found(id.class_id(), property))?
            .is_foreign_key();
        if is_foreign_key {
            return Err(CoreError::invalid_operation(format!(
                "{id}.{property} is a relation and must be changed through its end point"
            )));
        }
        let old = self.containers.require(id)?.value(property)?.clone();
        if old == value {
            return Ok(());
        }
        self.events
            .property_value_changing(self.tx, id, property, &old, &value)?;
        self.containers
            .require_mut(id)?
            .set_value(property, value.clone())?;
        self.events
            .property_value_changed(self.tx, id, property, &old, &value);
        Ok(())
    }

    /// The objects currently related through `id`, loading as needed.
    pub fn related_object_ids(
        &mut self,
        id: RelationEndPointId,
        loader: &mut dyn LazyLoader,
    ) -> CoreResult<Vec<ObjectId>> {
        self.get_relation_end_point_with_lazy_load(id, loader)?;
        self.current_related(id)
    }

    /// Current opposite of a loaded real or virtual object end point.
    pub fn current_opposite(&self, id: RelationEndPointId) -> CoreResult<Option<ObjectId>> {
        match self.end_points.get_relation_end_point_without_loading(id) {
            Some(RelationEndPoint::RealObject(real)) => {
                real.opposite_object_id(self.containers.require(id.object_id())?)
            }
            Some(RelationEndPoint::VirtualObject(ep)) => ep.opposite_object_id(),
            Some(RelationEndPoint::Collection(_)) => Err(CoreError::invalid_operation(format!(
                "{id} is a collection end point"
            ))),
            None => Err(CoreError::invalid_operation(format!("{id} is not loaded"))),
        }
    }

    /// Current items of a loaded collection end point.
    pub fn current_items(&self, id: RelationEndPointId) -> CoreResult<Vec<ObjectId>> {
        match self.end_points.get_relation_end_point_without_loading(id) {
            Some(RelationEndPoint::Collection(ep)) => Ok(ep.items()?.to_vec()),
            Some(_) => Err(CoreError::invalid_operation(format!(
                "{id} is not a collection end point"
            ))),
            None => Err(CoreError::invalid_operation(format!("{id} is not loaded"))),
        }
    }

    fn current_related(&self, id: RelationEndPointId) -> CoreResult<Vec<ObjectId>> {
        match self.end_points.get_relation_end_point_without_loading(id) {
            Some(RelationEndPoint::Collection(_)) => self.current_items(id),
            _ => Ok(self.current_opposite(id)?.into_iter().collect()),
        }
    }

    /// Fails unless `id` is loaded, valid and not deleted.
    pub fn check_object_usable(&self, id: ObjectId) -> CoreResult<()> {
        self.invalid.ensure_valid(id)?;
        match self.containers.get(id) {
            None => Err(CoreError::object_not_found(id)),
            Some(container) if container.is_deleted() => Err(CoreError::object_deleted(id)),
            Some(_) => Ok(()),
        }
    }

    /// Fails unless `target` may be set as opposite of `definition`.
    pub fn check_relation_target(
        &self,
        definition: &RelationEndPointDefinition,
        target: ObjectId,
    ) -> CoreResult<()> {
        self.invalid.ensure_valid(target)?;
        if self
            .containers
            .get(target)
            .is_some_and(DataContainer::is_deleted)
        {
            return Err(CoreError::object_deleted(target));
        }
        if target.class_id() != definition.opposite_class_id() {
            return Err(CoreError::invalid_operation(format!(
                "{target} cannot be related through {}.{}, expected a {}",
                definition.class_id(),
                definition.property(),
                definition.opposite_class_id()
            )));
        }
        Ok(())
    }

    pub(crate) fn set_real_opposite(
        &mut self,
        id: RelationEndPointId,
        opposite: Option<ObjectId>,
    ) -> CoreResult<()> {
        let container = self.containers.require_mut(id.object_id())?;
        let real = self
            .end_points
            .require_mut(id)?
            .as_real_mut()
            .ok_or_else(|| CoreError::invalid_operation(format!("{id} is not a real end point")))?;
        real.set_opposite_object_id(container, opposite)
    }

    pub(crate) fn set_virtual_opposite(
        &mut self,
        id: RelationEndPointId,
        opposite: Option<ObjectId>,
    ) -> CoreResult<()> {
        self.end_points
            .require_mut(id)?
            .as_virtual_object_mut()
            .ok_or_else(|| {
                CoreError::invalid_operation(format!("{id} is not a virtual object end point"))
            })?
            .require_data_mut()?
            .set_current(opposite);
        Ok(())
    }

    pub(crate) fn insert_collection_item(
        &mut self,
        id: RelationEndPointId,
        index: Option<usize>,
        item: ObjectId,
    ) -> CoreResult<()> {
        let data = self
            .end_points
            .require_mut(id)?
            .as_collection_mut()
            .ok_or_else(|| CoreError::invalid_operation(format!("{id} is not a collection")))?
            .require_data_mut()?;
        let index = index.unwrap_or(data.len());
        data.insert(index, item)
    }

    pub(crate) fn remove_collection_item(
        &mut self,
        id: RelationEndPointId,
        item: ObjectId,
    ) -> CoreResult<()> {
        self.end_points
            .require_mut(id)?
            .as_collection_mut()
            .ok_or_else(|| CoreError::invalid_operation(format!("{id} is not a collection")))?
            .require_data_mut()?
            .remove(item)
            .map(|_| ())
            .ok_or_else(|| CoreError::invalid_operation(format!("{item} is not part of {id}")))
    }

    /// Synchronization state of an end point; `None` if the virtual side is
    /// not loaded.
    pub fn is_synchronized(&self, id: RelationEndPointId) -> CoreResult<Option<bool>> {
        self.end_points.is_synchronized(id, &self.containers)
    }

    /// Repairs a divergence between the real and virtual side of `id`.
    pub fn synchronize(&mut self, id: RelationEndPointId) -> CoreResult<()> {
        self.end_points.synchronize(id, &self.containers)?;
        trace!(tx = %self.tx, %id, "end point synchronized");
        Ok(())
    }

    // --- command factory ----------------------------------------------------

    /// Creates the command deleting `id`.
    ///
    /// Deleting an already deleted object does nothing. The command should be
    /// expanded before it is executed so the other sides of the object's
    /// relations are updated as well.
    #[must_use]
    pub fn create_delete_command(&self, id: ObjectId) -> Box<dyn Command> {
        if self
            .containers
            .get(id)
            .is_some_and(DataContainer::is_deleted)
        {
            return Box::new(NopCommand);
        }
        Box::new(DeleteCommand::new(self, id))
    }

    /// Creates the command unloading `ids`.
    #[must_use]
    pub fn create_unload_command(&self, ids: &[ObjectId]) -> Box<dyn Command> {
        Box::new(UnloadCommand::new(self, ids))
    }

    /// Creates the command unloading the data of virtual end points.
    #[must_use]
    pub fn create_unload_virtual_end_points_command(
        &self,
        ids: &[RelationEndPointId],
    ) -> Box<dyn Command> {
        Box::new(UnloadVirtualEndPointsCommand::new(self, ids))
    }

    /// Creates the command emptying the transaction.
    #[must_use]
    pub fn create_unload_all_command(&self) -> Box<dyn Command> {
        Box::new(UnloadAllCommand::new())
    }

    /// Creates the command setting a real or virtual object end point.
    #[must_use]
    pub fn create_set_related_object_command(
        &self,
        end_point: RelationEndPointId,
        related: Option<ObjectId>,
    ) -> Box<dyn Command> {
        let command = ObjectEndPointSetCommand::new(self, end_point, related);
        if command.can_execute() && command.is_noop() {
            Box::new(NopCommand)
        } else {
            Box::new(command)
        }
    }

    /// Creates the command inserting `item` into a collection end point.
    #[must_use]
    pub fn create_insert_related_object_command(
        &self,
        end_point: RelationEndPointId,
        index: Option<usize>,
        item: ObjectId,
    ) -> Box<dyn Command> {
        Box::new(CollectionEndPointInsertCommand::new(self, end_point, index, item))
    }

    /// Creates the command removing `item` from a collection end point.
    #[must_use]
    pub fn create_remove_related_object_command(
        &self,
        end_point: RelationEndPointId,
        item: ObjectId,
    ) -> Box<dyn Command> {
        Box::new(CollectionEndPointRemoveCommand::new(self, end_point, item))
    }

    // --- command effects ------------------------------------------------------

    pub(crate) fn perform_delete(&mut self, id: ObjectId) -> CoreResult<()> {
        if self.containers.require(id)?.is_new() {
            return self.discard(id);
        }
        for end_point in self.end_points.map().ids_of(id) {
            match self.end_points.require_mut(end_point)? {
                RelationEndPoint::RealObject(real) => {
                    let container = self.containers.require_mut(id)?;
                    if real.opposite_object_id(container)?.is_some() {
                        real.set_opposite_object_id(container, None)?;
                    }
                }
                RelationEndPoint::VirtualObject(ep) => {
                    if let Some(data) = ep.load_state_mut().data_mut() {
                        data.set_current(None);
                    }
                    ep.touch();
                }
                RelationEndPoint::Collection(ep) => {
                    if let Some(data) = ep.load_state_mut().data_mut() {
                        data.clear();
                    }
                    ep.touch();
                }
            }
        }
        self.containers.require_mut(id)?.delete()?;
        debug!(tx = %self.tx, %id, "object deleted");
        Ok(())
    }

    pub(crate) fn unregister_objects(
        &mut self,
        ids: &[ObjectId],
        plan: &UnregisterPlan,
    ) -> CoreResult<()> {
        self.end_points.unregister_end_points(plan)?;
        for id in ids {
            if self.containers.contains(*id) {
                self.containers.unregister(*id)?;
            }
        }
        Ok(())
    }

    pub(crate) fn unregister_all(&mut self) -> CoreResult<Vec<DataContainer>> {
        let mut unloaded = Vec::new();
        for id in self.containers.ids() {
            let mut container = self.containers.unregister(id)?;
            if container.is_new() {
                container.discard();
                self.invalid.mark_invalid(id);
            }
            unloaded.push(container);
        }
        self.end_points.reset();
        Ok(unloaded)
    }

    // --- commit and rollback --------------------------------------------------

    /// Identities with pending changes, in registration order.
    #[must_use]
    pub fn changed_object_ids(&self) -> Vec<ObjectId> {
        self.containers
            .ids()
            .into_iter()
            .filter(|id| {
                matches!(
                    self.get_state(*id),
                    ObjectState::New | ObjectState::Changed | ObjectState::Deleted
                )
            })
            .collect()
    }

    /// Returns `true` if anything would be committed.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.changed_object_ids().is_empty()
    }

    /// The changes to hand to the persistence strategy.
    ///
    /// Objects whose only change is in a virtual end point have nothing to
    /// store and are left out.
    #[must_use]
    pub fn persistable_data(&self) -> Vec<PersistableData> {
        self.containers
            .iter()
            .filter_map(|container| {
                let state = match container.state() {
                    ObjectState::New => PersistableState::New,
                    ObjectState::Changed => PersistableState::Changed,
                    ObjectState::Deleted => PersistableState::Deleted,
                    _ => return None,
                };
                Some(PersistableData {
                    id: container.id(),
                    state,
                    timestamp: container.timestamp(),
                    values: container
                        .values()
                        .map(|(name, value)| (name, value.clone()))
                        .collect(),
                })
            })
            .collect()
    }

    /// Stores the timestamps returned by the persistence strategy.
    pub fn apply_timestamps(&mut self, timestamps: &[(ObjectId, Timestamp)]) {
        for (id, timestamp) in timestamps {
            if let Some(container) = self.containers.get_mut(*id) {
                container.set_timestamp(*timestamp);
            }
        }
    }

    /// Fails with [`CoreError::MandatoryRelationNotSet`] if a changed object
    /// leaves a mandatory relation empty.
    pub fn validate_mandatory_relations(&mut self, loader: &mut dyn LazyLoader) -> CoreResult<()> {
        let mapping = Arc::clone(&self.mapping);
        for id in self.containers.ids() {
            if !matches!(self.get_state(id), ObjectState::New | ObjectState::Changed) {
                continue;
            }
            for definition in mapping.class(id.class_id())?.end_points() {
                if !definition.is_mandatory() {
                    continue;
                }
                let end_point = RelationEndPointId::new(id, definition.property());
                let empty = match definition.kind() {
                    EndPointKind::Real => self.current_opposite(end_point)?.is_none(),
                    EndPointKind::VirtualObject | EndPointKind::VirtualCollection => {
                        self.related_object_ids(end_point, loader)?.is_empty()
                    }
                    EndPointKind::Anonymous => false,
                };
                if empty {
                    return Err(CoreError::MandatoryRelationNotSet {
                        id,
                        property: definition.property().to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Accepts every pending change locally.
    ///
    /// Deleted objects are unregistered and become invalid; all other
    /// containers and end points take their current data as original.
    pub fn commit(&mut self) -> CoreResult<()> {
        self.end_points.commit_all(&self.containers)?;
        for id in self.containers.ids() {
            let Some(container) = self.containers.get(id) else {
                continue;
            };
            if container.is_deleted() {
                self.end_points.remove_end_points_of(container)?;
                let mut container = self.containers.unregister(id)?;
                container.discard();
                self.invalid.mark_invalid(id);
            } else {
                self.containers.require_mut(id)?.commit_state()?;
            }
        }
        debug!(tx = %self.tx, objects = self.containers.len(), "data committed");
        Ok(())
    }

    /// Drops every pending change.
    ///
    /// New objects are discarded and become invalid; all other containers
    /// and end points return to their original data.
    pub fn rollback(&mut self) -> CoreResult<()> {
        self.end_points.rollback_all();
        for id in self.containers.ids() {
            let is_new = self.containers.require(id)?.is_new();
            if is_new {
                self.discard(id)?;
            } else {
                self.containers.require_mut(id)?.rollback_state()?;
            }
        }
        debug!(tx = %self.tx, objects = self.containers.len(), "data rolled back");
        Ok(())
    }

    /// Takes over the pending changes of a sub-transaction.
    ///
    /// New objects are registered first, then the affected end points are
    /// loaded, then values and virtual end point data are copied, and
    /// finally deletions are applied.
    pub fn set_data_from_sub_transaction(
        &mut self,
        sub: &DataManager,
        loader: &mut dyn LazyLoader,
    ) -> CoreResult<()> {
        let mapping = Arc::clone(&self.mapping);
        for container in sub.containers.iter().filter(|c| c.is_new()) {
            if !self.containers.contains(container.id()) {
                let class = mapping.class(container.class_id())?;
                self.register_data_container(DataContainer::new_object(container.id(), class))?;
            }
        }

        let changed_end_points = sub.end_points.changed_virtual_end_points();
        for id in &changed_end_points {
            self.get_relation_end_point_with_lazy_load(*id, loader)?;
        }

        for container in sub.containers.iter() {
            if matches!(
                container.state(),
                ObjectState::New | ObjectState::Changed | ObjectState::Deleted
            ) {
                self.get_data_container_with_lazy_load(container.id(), true, loader)?;
                self.containers
                    .require_mut(container.id())?
                    .set_data_from_sub_transaction(container)?;
            }
        }

        for id in changed_end_points {
            let items = sub
                .end_points
                .get_relation_end_point_without_loading(id)
                .and_then(RelationEndPoint::current_virtual_items)
                .unwrap_or_default();
            self.end_points.set_current_virtual_data(id, items)?;
        }

        for container in sub.containers.iter().filter(|c| c.is_deleted()) {
            if self.containers.require(container.id())?.is_new() {
                self.discard(container.id())?;
            } else {
                self.containers.require_mut(container.id())?.delete()?;
            }
        }
        debug!(tx = %self.tx, sub = %sub.tx, "sub-transaction data taken over");
        Ok(())
    }

    // --- queries ----------------------------------------------------------------

    /// Runs a query and registers its results and fetched relations.
    ///
    /// Already registered objects keep their data. Deleted and invalid
    /// objects are left out of the result.
    pub fn execute_query(
        &mut self,
        query: &Query,
        loader: &mut dyn LazyLoader,
    ) -> CoreResult<Vec<ObjectId>> {
        let results = loader.execute_query(query)?;
        self.register_loaded_objects(&results)?;
        let mut ids: Vec<ObjectId> = Vec::new();
        for data in &results {
            let usable = self
                .containers
                .get(data.id)
                .is_some_and(|c| !c.is_deleted());
            if usable && !ids.contains(&data.id) {
                ids.push(data.id);
            }
        }

        let mapping = Arc::clone(&self.mapping);
        let class = mapping.class(query.class_id())?;
        let agent = FetchedRelationDataRegistrationAgent::new();
        for property in query.fetches() {
            let definition = class
                .end_point(property)
                .ok_or_else(|| CoreError::property_not_found(class.id(), *property))?;
            agent.fetch(self, definition, &ids, loader)?;
        }
        debug!(tx = %self.tx, class = %query.class_id(), count = ids.len(), "query executed");
        Ok(ids)
    }
}

impl std::fmt::Debug for DataManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataManager")
            .field("tx", &self.tx)
            .field("containers", &self.containers.len())
            .field("end_points", &self.end_points.map().len())
            .field("invalid", &self.invalid.len())
            .finish_non_exhaustive()
    }
}
