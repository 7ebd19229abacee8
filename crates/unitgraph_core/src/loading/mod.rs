//! Lazy loading and eager fetch registration.
//!
//! A [`DataManager`](crate::DataManager) never decides where its data comes
//! from. It asks a [`LazyLoader`], which is backed by the persistence
//! strategy for a root transaction and by the parent transaction for a
//! sub-transaction ([`HierarchyLoader`]).

mod agents;
mod hierarchy;

pub use agents::{
    CollectionEndPointRegistrationAgent, FetchedRelationDataRegistrationAgent,
    VirtualObjectEndPointRegistrationAgent,
};
pub use hierarchy::HierarchyLoader;

use crate::data::DataContainer;
use crate::error::CoreResult;
use crate::mapping::RelationEndPointDefinition;
use crate::persistence::{ObjectData, PersistenceStrategy, Query};
use crate::types::ObjectId;

/// Source of data for one transaction.
///
/// Methods take `&mut self` because a sub-transaction loads by registering
/// data in its parent first.
pub trait LazyLoader {
    /// Loads one object. `Ok(None)` means the object does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the data source fails.
    fn load_object_data(&mut self, id: ObjectId) -> CoreResult<Option<ObjectData>>;

    /// Loads many objects, in request order.
    ///
    /// # Errors
    ///
    /// Returns an error if the data source fails.
    fn load_object_data_many(&mut self, ids: &[ObjectId]) -> CoreResult<Vec<Option<ObjectData>>> {
        ids.iter().map(|id| self.load_object_data(*id)).collect()
    }

    /// Loads the objects on the real side of the virtual end point
    /// `definition` of `owner`.
    ///
    /// # Errors
    ///
    /// Returns an error if the data source fails.
    fn load_related_object_data(
        &mut self,
        definition: &RelationEndPointDefinition,
        owner: ObjectId,
    ) -> CoreResult<Vec<ObjectData>>;

    /// Loads the related objects of many owners at once.
    ///
    /// # Errors
    ///
    /// Returns an error if the data source fails.
    fn execute_fetch_query(
        &mut self,
        definition: &RelationEndPointDefinition,
        owners: &[ObjectId],
    ) -> CoreResult<Vec<ObjectData>> {
        let mut result = Vec::new();
        for owner in owners {
            result.extend(self.load_related_object_data(definition, *owner)?);
        }
        Ok(result)
    }

    /// Runs a query.
    ///
    /// # Errors
    ///
    /// Returns an error if the data source fails.
    fn execute_query(&mut self, query: &Query) -> CoreResult<Vec<ObjectData>>;
}

/// Loads straight from a [`PersistenceStrategy`].
pub struct StorageLoader<'a> {
    storage: &'a dyn PersistenceStrategy,
}

impl<'a> StorageLoader<'a> {
    /// Wraps a persistence strategy.
    #[must_use]
    pub fn new(storage: &'a dyn PersistenceStrategy) -> Self {
        Self { storage }
    }
}

impl std::fmt::Debug for StorageLoader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageLoader").finish_non_exhaustive()
    }
}

impl LazyLoader for StorageLoader<'_> {
    fn load_object_data(&mut self, id: ObjectId) -> CoreResult<Option<ObjectData>> {
        self.storage.load_object_data(id)
    }

    fn load_object_data_many(&mut self, ids: &[ObjectId]) -> CoreResult<Vec<Option<ObjectData>>> {
        self.storage.load_object_data_many(ids)
    }

    fn load_related_object_data(
        &mut self,
        definition: &RelationEndPointDefinition,
        owner: ObjectId,
    ) -> CoreResult<Vec<ObjectData>> {
        self.storage.load_related_object_data(definition, owner)
    }

    fn execute_fetch_query(
        &mut self,
        definition: &RelationEndPointDefinition,
        owners: &[ObjectId],
    ) -> CoreResult<Vec<ObjectData>> {
        self.storage.execute_fetch_query(definition, owners)
    }

    fn execute_query(&mut self, query: &Query) -> CoreResult<Vec<ObjectData>> {
        self.storage.execute_query(query)
    }
}

/// Snapshot of a container's current data, as seen by a sub-transaction.
pub(crate) fn object_data_of(container: &DataContainer) -> ObjectData {
    ObjectData::new(
        container.id(),
        container.timestamp(),
        container.values().map(|(name, value)| (name, value.clone())),
    )
}
