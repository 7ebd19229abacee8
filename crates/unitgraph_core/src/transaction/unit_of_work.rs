//! The public entry point: a root transaction and its sub-transactions.

use super::{
    next_transaction_id, ClientTransaction, DomainObject, EnlistedObjectManager,
    TransactionHierarchyCommandExecutor, TransactionScope,
};
use crate::commands::{execute, Command};
use crate::config::Config;
use crate::data::{DataContainer, ObjectState};
use crate::data_manager::DataManager;
use crate::error::{CoreError, CoreResult};
use crate::events::TransactionListener;
use crate::loading::{HierarchyLoader, LazyLoader};
use crate::mapping::{EndPointKind, MappingConfiguration};
use crate::persistence::{PersistenceStrategy, Query};
use crate::types::{ObjectId, RelationEndPointId, TransactionId};
use crate::value::Value;
use std::sync::Arc;
use tracing::debug;

/// A root transaction, its active sub-transactions and the objects they
/// share.
///
/// Object operations act on the current transaction: the leaf, unless a
/// [`TransactionScope`] selects another level. Ancestors of the leaf are
/// read-only, so mutating operations only succeed on the leaf.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use unitgraph_core::{InMemoryStorage, MappingBuilder, TransactionHierarchy, Value};
///
/// let mapping = MappingBuilder::new()
///     .class("Customer")
///     .property("Customer", "Name", Value::Null)
///     .build()?;
/// let mut hierarchy = TransactionHierarchy::new(mapping, Arc::new(InMemoryStorage::new()));
///
/// let customer = hierarchy.new_object("Customer")?;
/// hierarchy.set_value(&customer, "Name", "Kim")?;
/// hierarchy.commit()?;
/// # Ok::<(), unitgraph_core::CoreError>(())
/// ```
pub struct TransactionHierarchy {
    mapping: Arc<MappingConfiguration>,
    config: Arc<Config>,
    storage: Arc<dyn PersistenceStrategy>,
    levels: Vec<ClientTransaction>,
    enlisted: EnlistedObjectManager,
    current: Option<TransactionId>,
}

impl TransactionHierarchy {
    /// Creates a hierarchy with a fresh root transaction and the default
    /// configuration.
    pub fn new(
        mapping: impl Into<Arc<MappingConfiguration>>,
        storage: Arc<dyn PersistenceStrategy>,
    ) -> Self {
        Self::with_config(mapping, storage, Config::default())
    }

    /// Creates a hierarchy with a fresh root transaction.
    pub fn with_config(
        mapping: impl Into<Arc<MappingConfiguration>>,
        storage: Arc<dyn PersistenceStrategy>,
        config: Config,
    ) -> Self {
        let mapping = mapping.into();
        let config = Arc::new(config);
        let root = ClientTransaction::new(
            next_transaction_id(),
            None,
            Arc::clone(&mapping),
            Arc::clone(&config),
        );
        debug!(tx = %root.id(), "transaction hierarchy created");
        Self {
            enlisted: EnlistedObjectManager::new(root.id()),
            levels: vec![root],
            mapping,
            config,
            storage,
            current: None,
        }
    }

    /// The mapping shared by every level.
    #[must_use]
    pub fn mapping(&self) -> &Arc<MappingConfiguration> {
        &self.mapping
    }

    /// The configuration shared by every level.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The persistence strategy of the root transaction.
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn PersistenceStrategy> {
        &self.storage
    }

    /// The root transaction.
    #[must_use]
    pub fn root_transaction_id(&self) -> TransactionId {
        self.levels[0].id()
    }

    /// The innermost transaction, the only writeable one.
    #[must_use]
    pub fn leaf_transaction_id(&self) -> TransactionId {
        self.leaf().id()
    }

    /// The transaction object operations act on.
    #[must_use]
    pub fn current_transaction_id(&self) -> TransactionId {
        self.current.unwrap_or_else(|| self.leaf_transaction_id())
    }

    /// Number of levels, the root included.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// The levels, root first.
    #[must_use]
    pub fn transactions(&self) -> &[ClientTransaction] {
        &self.levels
    }

    /// A level by identity.
    #[must_use]
    pub fn transaction(&self, tx: TransactionId) -> Option<&ClientTransaction> {
        self.levels.iter().find(|level| level.id() == tx)
    }

    /// The objects handed out by this hierarchy.
    #[must_use]
    pub fn enlisted_objects(&self) -> &EnlistedObjectManager {
        &self.enlisted
    }

    /// Adds a listener to the events of `tx`.
    pub fn add_listener(
        &self,
        tx: TransactionId,
        listener: Arc<dyn TransactionListener>,
    ) -> CoreResult<()> {
        self.levels[self.index_of(tx)?].add_listener(listener);
        Ok(())
    }

    /// Makes `tx` current until the returned scope is dropped.
    pub fn enter_scope(&mut self, tx: TransactionId) -> CoreResult<TransactionScope<'_>> {
        self.index_of(tx)?;
        Ok(TransactionScope::enter(self, tx))
    }

    pub(crate) fn replace_current(&mut self, tx: Option<TransactionId>) -> Option<TransactionId> {
        std::mem::replace(&mut self.current, tx)
    }

    fn leaf(&self) -> &ClientTransaction {
        &self.levels[self.levels.len() - 1]
    }

    fn index_of(&self, tx: TransactionId) -> CoreResult<usize> {
        self.levels
            .iter()
            .position(|level| level.id() == tx)
            .ok_or_else(|| {
                CoreError::invalid_operation(format!("{tx} is not part of this hierarchy"))
            })
    }

    fn current_index(&self) -> CoreResult<usize> {
        match self.current {
            Some(tx) => self.index_of(tx),
            None => Ok(self.levels.len() - 1),
        }
    }

    /// Runs `f` on the data of level `index`, loading through its ancestors.
    fn with_data<R>(
        &mut self,
        index: usize,
        f: impl FnOnce(&mut DataManager, &mut dyn LazyLoader) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let (ancestors, rest) = self.levels.split_at_mut(index);
        let transaction = rest.first_mut().ok_or_else(|| {
            CoreError::invalid_operation(format!("no transaction at level {index}"))
        })?;
        let mut loader = HierarchyLoader::new(ancestors, self.storage.as_ref());
        f(transaction.data_mut(), &mut loader)
    }

    fn with_current<R>(
        &mut self,
        f: impl FnOnce(&mut DataManager, &mut dyn LazyLoader) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let index = self.current_index()?;
        self.with_data(index, f)
    }

    // --- sub-transactions ---------------------------------------------------

    /// Opens a sub-transaction below the leaf; the leaf becomes read-only.
    ///
    /// Objects that are invalid or deleted in the parent are invalid in the
    /// sub-transaction.
    pub fn create_sub_transaction(&mut self) -> CoreResult<TransactionId> {
        let sub_id = next_transaction_id();
        let parent = self.leaf();
        let parent_id = parent.id();
        let mut sub = ClientTransaction::new(
            sub_id,
            Some(parent_id),
            Arc::clone(&self.mapping),
            Arc::clone(&self.config),
        );
        let hidden: Vec<ObjectId> = parent
            .data()
            .invalid_objects()
            .iter()
            .chain(
                parent
                    .data()
                    .data_containers()
                    .iter()
                    .filter(|c| c.is_deleted())
                    .map(DataContainer::id),
            )
            .collect();
        for id in hidden {
            sub.data_mut().mark_invalid(id);
        }

        let last = self.levels.len() - 1;
        let parent = &mut self.levels[last];
        parent.hierarchy_manager_mut().register_sub_transaction(sub_id)?;
        parent.events().sub_transaction_created(parent_id, sub_id);
        self.levels.push(sub);
        debug!(tx = %parent_id, sub = %sub_id, depth = self.levels.len(), "sub-transaction created");
        Ok(sub_id)
    }

    /// Drops the leaf sub-transaction and its uncommitted changes; its parent
    /// becomes writeable again.
    pub fn discard_sub_transaction(&mut self) -> CoreResult<TransactionId> {
        if self.levels.len() == 1 {
            return Err(CoreError::invalid_operation(
                "the root transaction cannot be discarded",
            ));
        }
        let sub = self
            .levels
            .pop()
            .ok_or_else(|| CoreError::invalid_operation("the hierarchy is empty"))?;
        let last = self.levels.len() - 1;
        self.levels[last]
            .hierarchy_manager_mut()
            .remove_sub_transaction()?;
        sub.events().transaction_discarded(sub.id());
        debug!(tx = %sub.id(), "sub-transaction discarded");
        Ok(sub.id())
    }

    // --- commit and rollback ----------------------------------------------

    /// Commits the current transaction.
    ///
    /// A root transaction writes its changes to storage. A sub-transaction
    /// pushes them into its parent, which is unlocked for that purpose;
    /// storage is not touched.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionReadOnly`] for a transaction with an
    /// active sub-transaction, the first listener veto,
    /// [`CoreError::MandatoryRelationNotSet`] and
    /// [`CoreError::ConcurrencyViolation`]. Nothing is committed locally if
    /// any of them occurs.
    pub fn commit(&mut self) -> CoreResult<()> {
        let index = self.current_index()?;
        let tx = self.levels[index].id();
        if !self.levels[index].is_writeable() {
            return Err(CoreError::read_only(tx, "commit"));
        }
        let ids = self.notify_committing(index)?;
        if self.config.validate_mandatory_relations {
            self.with_data(index, |data, loader| data.validate_mandatory_relations(loader))?;
        }
        if index == 0 {
            let changes = self.levels[0].data().persistable_data();
            if !changes.is_empty() {
                let timestamps = self.storage.persist_data(&changes)?;
                self.levels[0].data_mut().apply_timestamps(&timestamps);
            }
        } else {
            self.commit_into_parent(index)?;
        }
        self.levels[index].data_mut().commit()?;
        Arc::clone(self.levels[index].events()).transaction_committed(tx, &ids);
        debug!(%tx, objects = ids.len(), "transaction committed");
        Ok(())
    }

    /// Raises "committing" until no further object becomes changed.
    fn notify_committing(&mut self, index: usize) -> CoreResult<Vec<ObjectId>> {
        let tx = self.levels[index].id();
        let events = Arc::clone(self.levels[index].events());
        let max_passes = self.config.max_notification_passes;
        let mut notified: Vec<ObjectId> = Vec::new();
        let mut pending = self.levels[index].data().changed_object_ids();
        let mut passes = 0;
        loop {
            passes += 1;
            if passes > max_passes {
                return Err(CoreError::invalid_operation(format!(
                    "commit notification did not settle after {max_passes} passes"
                )));
            }
            events.transaction_committing(tx, &pending)?;
            notified.extend(pending);
            pending = self.levels[index]
                .data()
                .changed_object_ids()
                .into_iter()
                .filter(|id| !notified.contains(id))
                .collect();
            if pending.is_empty() {
                return Ok(notified);
            }
        }
    }

    fn commit_into_parent(&mut self, index: usize) -> CoreResult<()> {
        let (before, rest) = self.levels.split_at_mut(index);
        let (sub, parent_index) = match (rest.first(), index.checked_sub(1)) {
            (Some(sub), Some(parent_index)) => (sub, parent_index),
            _ => return Err(CoreError::invalid_operation("no parent to commit into")),
        };
        let (ancestors, parent) = before.split_at_mut(parent_index);
        let parent = &mut parent[0];
        let _unlocked = parent.hierarchy_manager().unlock();
        let mut loader = HierarchyLoader::new(ancestors, self.storage.as_ref());
        parent
            .data_mut()
            .set_data_from_sub_transaction(sub.data(), &mut loader)
    }

    /// Drops every change of the current transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionReadOnly`] for a transaction with an
    /// active sub-transaction and the first listener veto.
    pub fn rollback(&mut self) -> CoreResult<()> {
        let index = self.current_index()?;
        let transaction = &mut self.levels[index];
        let tx = transaction.id();
        if !transaction.is_writeable() {
            return Err(CoreError::read_only(tx, "roll back"));
        }
        let events = Arc::clone(transaction.events());
        let ids = transaction.data().changed_object_ids();
        events.transaction_rolling_back(tx, &ids)?;
        transaction.data_mut().rollback()?;
        events.transaction_rolled_back(tx, &ids);
        debug!(%tx, objects = ids.len(), "transaction rolled back");
        Ok(())
    }

    /// Returns `true` if the current transaction has uncommitted changes.
    pub fn has_changes(&self) -> CoreResult<bool> {
        Ok(self.levels[self.current_index()?].data().has_changes())
    }

    // --- objects -------------------------------------------------------------

    /// Creates a new object of class `class` in the current transaction.
    pub fn new_object(&mut self, class: &str) -> CoreResult<DomainObject> {
        let class_id = self.mapping.class_by_name(class)?.id();
        let id = self.storage.create_new_object_id(class_id);
        let index = self.current_index()?;
        self.levels[index].data_mut().new_object(id)?;
        Ok(self.enlisted.enlist(id))
    }

    /// Returns the handle of `id`, loading it into the current transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ObjectNotFound`] if the object does not exist and
    /// [`CoreError::ObjectInvalid`] if it is invalid here.
    pub fn get_object(&mut self, id: ObjectId) -> CoreResult<DomainObject> {
        self.with_current(|data, loader| {
            data.get_data_container_with_lazy_load(id, true, loader)
                .map(|_| ())
        })?;
        Ok(self.enlisted.enlist(id))
    }

    /// Like [`get_object`](Self::get_object), but a missing object yields
    /// `Ok(None)`.
    pub fn try_get_object(&mut self, id: ObjectId) -> CoreResult<Option<DomainObject>> {
        let found = self.with_current(|data, loader| {
            data.get_data_container_with_lazy_load(id, false, loader)
                .map(|container| container.is_some())
        })?;
        Ok(found.then(|| self.enlisted.enlist(id)))
    }

    /// Loads many objects in one round trip.
    pub fn get_objects(&mut self, ids: &[ObjectId]) -> CoreResult<Vec<DomainObject>> {
        self.with_current(|data, loader| {
            data.get_data_containers_with_lazy_load(ids, true, loader)
                .map(|_| ())
        })?;
        Ok(ids.iter().map(|id| self.enlisted.enlist(*id)).collect())
    }

    /// State of `object` in the current transaction.
    pub fn state(&self, object: &DomainObject) -> CoreResult<ObjectState> {
        let id = self.enlisted.ensure_enlisted(object)?;
        Ok(self.levels[self.current_index()?].data().get_state(id))
    }

    /// Current value of a property, loading the object if needed.
    pub fn value(&mut self, object: &DomainObject, property: &str) -> CoreResult<Value> {
        let id = self.enlisted.ensure_enlisted(object)?;
        self.with_current(|data, loader| {
            data.get_data_container_with_lazy_load(id, true, loader)?;
            data.value(id, property)
        })
    }

    /// Changes a property value.
    pub fn set_value(
        &mut self,
        object: &DomainObject,
        property: &str,
        value: impl Into<Value>,
    ) -> CoreResult<()> {
        let id = self.enlisted.ensure_enlisted(object)?;
        let value = value.into();
        self.with_current(|data, loader| {
            data.get_data_container_with_lazy_load(id, true, loader)?;
            data.set_value(id, property, value)
        })
    }

    fn end_point_id(
        &self,
        object: ObjectId,
        property: &str,
        kinds: &[EndPointKind],
    ) -> CoreResult<RelationEndPointId> {
        let class = self.mapping.class(object.class_id())?;
        let definition = class
            .end_point(property)
            .ok_or_else(|| CoreError::property_not_found(class.id(), property))?;
        if !kinds.contains(&definition.kind()) {
            return Err(CoreError::invalid_operation(format!(
                "{}.{property} is a {:?} end point",
                class.id(),
                definition.kind()
            )));
        }
        Ok(RelationEndPointId::new(object, definition.property()))
    }

    /// The object on the other side of a one-valued relation.
    pub fn related_object(
        &mut self,
        object: &DomainObject,
        property: &str,
    ) -> CoreResult<Option<DomainObject>> {
        let id = self.enlisted.ensure_enlisted(object)?;
        let end_point = self.end_point_id(
            id,
            property,
            &[EndPointKind::Real, EndPointKind::VirtualObject],
        )?;
        let related = self.with_current(|data, loader| data.related_object_ids(end_point, loader))?;
        Ok(related.first().map(|id| self.enlisted.enlist(*id)))
    }

    /// The objects of a collection relation, in collection order.
    pub fn related_objects(
        &mut self,
        object: &DomainObject,
        property: &str,
    ) -> CoreResult<Vec<DomainObject>> {
        let id = self.enlisted.ensure_enlisted(object)?;
        let end_point = self.end_point_id(id, property, &[EndPointKind::VirtualCollection])?;
        let related = self.with_current(|data, loader| data.related_object_ids(end_point, loader))?;
        Ok(related.into_iter().map(|id| self.enlisted.enlist(id)).collect())
    }

    /// Sets a one-valued relation; the other sides follow.
    pub fn set_related_object(
        &mut self,
        object: &DomainObject,
        property: &str,
        related: Option<&DomainObject>,
    ) -> CoreResult<()> {
        let id = self.enlisted.ensure_enlisted(object)?;
        let related = related
            .map(|r| self.enlisted.ensure_enlisted(r))
            .transpose()?;
        let end_point = self.end_point_id(
            id,
            property,
            &[EndPointKind::Real, EndPointKind::VirtualObject],
        )?;
        self.with_current(|data, loader| {
            data.get_relation_end_point_with_lazy_load(end_point, loader)?;
            if let Some(related) = related {
                data.get_data_container_with_lazy_load(related, true, loader)?;
            }
            let command = data.create_set_related_object_command(end_point, related);
            execute_expanded(command, data, loader)
        })
    }

    /// Appends `item` to a collection relation.
    pub fn add_related_object(
        &mut self,
        object: &DomainObject,
        property: &str,
        item: &DomainObject,
    ) -> CoreResult<()> {
        self.insert_into_collection(object, property, None, item)
    }

    /// Inserts `item` into a collection relation at `index`.
    pub fn insert_related_object(
        &mut self,
        object: &DomainObject,
        property: &str,
        index: usize,
        item: &DomainObject,
    ) -> CoreResult<()> {
        self.insert_into_collection(object, property, Some(index), item)
    }

    fn insert_into_collection(
        &mut self,
        object: &DomainObject,
        property: &str,
        index: Option<usize>,
        item: &DomainObject,
    ) -> CoreResult<()> {
        let id = self.enlisted.ensure_enlisted(object)?;
        let item = self.enlisted.ensure_enlisted(item)?;
        let end_point = self.end_point_id(id, property, &[EndPointKind::VirtualCollection])?;
        self.with_current(|data, loader| {
            data.get_relation_end_point_with_lazy_load(end_point, loader)?;
            data.get_data_container_with_lazy_load(item, true, loader)?;
            let command = data.create_insert_related_object_command(end_point, index, item);
            execute_expanded(command, data, loader)
        })
    }

    /// Removes `item` from a collection relation.
    pub fn remove_related_object(
        &mut self,
        object: &DomainObject,
        property: &str,
        item: &DomainObject,
    ) -> CoreResult<()> {
        let id = self.enlisted.ensure_enlisted(object)?;
        let item = self.enlisted.ensure_enlisted(item)?;
        let end_point = self.end_point_id(id, property, &[EndPointKind::VirtualCollection])?;
        self.with_current(|data, loader| {
            data.get_relation_end_point_with_lazy_load(end_point, loader)?;
            data.get_data_container_with_lazy_load(item, true, loader)?;
            let command = data.create_remove_related_object_command(end_point, item);
            execute_expanded(command, data, loader)
        })
    }

    /// Deletes an object and detaches it from every related object.
    pub fn delete(&mut self, object: &DomainObject) -> CoreResult<()> {
        let id = self.enlisted.ensure_enlisted(object)?;
        self.with_current(|data, loader| {
            data.get_data_container_with_lazy_load(id, true, loader)?;
            let command = data.create_delete_command(id);
            execute_expanded(command, data, loader)
        })
    }

    /// Returns `true` if the real and virtual sides of a relation agree;
    /// `None` if the virtual side is not loaded.
    pub fn is_synchronized(
        &self,
        object: &DomainObject,
        property: &str,
    ) -> CoreResult<Option<bool>> {
        let id = self.enlisted.ensure_enlisted(object)?;
        let end_point = self.end_point_id(
            id,
            property,
            &[
                EndPointKind::Real,
                EndPointKind::VirtualObject,
                EndPointKind::VirtualCollection,
            ],
        )?;
        self.levels[self.current_index()?]
            .data()
            .is_synchronized(end_point)
    }

    /// Repairs a relation whose real and virtual sides disagree.
    pub fn synchronize(&mut self, object: &DomainObject, property: &str) -> CoreResult<()> {
        let id = self.enlisted.ensure_enlisted(object)?;
        let end_point = self.end_point_id(
            id,
            property,
            &[
                EndPointKind::Real,
                EndPointKind::VirtualObject,
                EndPointKind::VirtualCollection,
            ],
        )?;
        let index = self.current_index()?;
        self.levels[index].data_mut().synchronize(end_point)
    }

    /// Runs a query in the current transaction.
    pub fn query(&mut self, query: &Query) -> CoreResult<Vec<DomainObject>> {
        let ids = self.with_current(|data, loader| data.execute_query(query, loader))?;
        Ok(ids.into_iter().map(|id| self.enlisted.enlist(id)).collect())
    }

    // --- unloading -------------------------------------------------------------

    /// Unloads unchanged objects from the current transaction and all of its
    /// ancestors. Objects that are not loaded are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::HierarchyCommandAborted`] if any level holds
    /// changes for one of the objects; nothing is unloaded in that case.
    pub fn unload_data(&mut self, ids: &[ObjectId]) -> CoreResult<()> {
        self.execute_command_for_transaction_hierarchy(|data| data.create_unload_command(ids))
    }

    /// Like [`unload_data`](Self::unload_data), but returns `Ok(false)`
    /// instead of failing when some level cannot unload.
    pub fn try_unload_data(&mut self, ids: &[ObjectId]) -> CoreResult<bool> {
        self.try_execute_command_for_transaction_hierarchy(|data| data.create_unload_command(ids))
    }

    /// Drops the loaded data of a virtual relation in the current transaction
    /// and all of its ancestors.
    pub fn unload_virtual_end_point(
        &mut self,
        object: &DomainObject,
        property: &str,
    ) -> CoreResult<()> {
        let id = self.enlisted.ensure_enlisted(object)?;
        let end_point = self.end_point_id(
            id,
            property,
            &[EndPointKind::VirtualObject, EndPointKind::VirtualCollection],
        )?;
        self.execute_command_for_transaction_hierarchy(|data| {
            data.create_unload_virtual_end_points_command(&[end_point])
        })
    }

    /// Empties the current transaction and all of its ancestors, discarding
    /// their changes.
    pub fn unload_all(&mut self) -> CoreResult<()> {
        self.execute_command_for_transaction_hierarchy(DataManager::create_unload_all_command)
    }

    /// Runs the command built by `factory` on the current transaction and all
    /// of its ancestors.
    pub fn execute_command_for_transaction_hierarchy(
        &mut self,
        factory: impl FnMut(&DataManager) -> Box<dyn Command>,
    ) -> CoreResult<()> {
        let index = self.current_index()?;
        TransactionHierarchyCommandExecutor::new(factory)
            .execute_command_for_transaction_hierarchy(&mut self.levels[..=index])
    }

    /// Like [`execute_command_for_transaction_hierarchy`](Self::execute_command_for_transaction_hierarchy),
    /// but returns `Ok(false)` instead of failing when a level's command is
    /// not executable.
    pub fn try_execute_command_for_transaction_hierarchy(
        &mut self,
        factory: impl FnMut(&DataManager) -> Box<dyn Command>,
    ) -> CoreResult<bool> {
        let index = self.current_index()?;
        TransactionHierarchyCommandExecutor::new(factory)
            .try_execute_command_for_transaction_hierarchy(&mut self.levels[..=index])
    }
}

impl std::fmt::Debug for TransactionHierarchy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionHierarchy")
            .field("levels", &self.levels)
            .field("current", &self.current)
            .field("enlisted", &self.enlisted.len())
            .finish_non_exhaustive()
    }
}

fn execute_expanded(
    command: Box<dyn Command>,
    data: &mut DataManager,
    loader: &mut dyn LazyLoader,
) -> CoreResult<()> {
    if let Some(error) = command.get_all_exceptions().into_iter().next() {
        return Err(error);
    }
    let mut expanded = command.expand_to_all_related_objects(data, loader)?;
    execute(&mut expanded, data)
}
