//! Persistence collaborator contract.
//!
//! The core never talks to a database directly. Root transactions load and
//! save through a [`PersistenceStrategy`]; sub-transactions load from and
//! save into their parent instead.

mod memory;
mod stats;

pub use memory::InMemoryStorage;
pub use stats::{StorageStats, StorageStatsSnapshot};

use crate::error::CoreResult;
use crate::mapping::RelationEndPointDefinition;
use crate::types::{ClassId, ObjectId, Timestamp};
use crate::value::Value;
use std::collections::BTreeMap;

/// Stored data of one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectData {
    /// Identity of the object.
    pub id: ObjectId,
    /// Concurrency token of the stored version.
    pub timestamp: Option<Timestamp>,
    /// Property values, foreign keys included.
    pub values: BTreeMap<&'static str, Value>,
}

impl ObjectData {
    /// Creates object data.
    #[must_use]
    pub fn new(
        id: ObjectId,
        timestamp: Option<Timestamp>,
        values: impl IntoIterator<Item = (&'static str, Value)>,
    ) -> Self {
        Self {
            id,
            timestamp,
            values: values.into_iter().collect(),
        }
    }

    /// Value of a property, `Null` if absent.
    #[must_use]
    pub fn value(&self, property: &str) -> Value {
        self.values.get(property).cloned().unwrap_or_default()
    }
}

/// Kind of change carried by [`PersistableData`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistableState {
    /// Insert.
    New,
    /// Update.
    Changed,
    /// Delete.
    Deleted,
}

/// One object change handed to [`PersistenceStrategy::persist_data`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistableData {
    /// Identity of the object.
    pub id: ObjectId,
    /// Kind of change.
    pub state: PersistableState,
    /// Timestamp the object was loaded with; `None` for new objects.
    pub timestamp: Option<Timestamp>,
    /// Current property values.
    pub values: BTreeMap<&'static str, Value>,
}

/// Equality query over one class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    class_id: ClassId,
    filters: Vec<(&'static str, Value)>,
    fetches: Vec<&'static str>,
}

impl Query {
    /// Query for every object of `class_id`.
    #[must_use]
    pub fn new(class_id: ClassId) -> Self {
        Self {
            class_id,
            filters: Vec::new(),
            fetches: Vec::new(),
        }
    }

    /// Restricts the result to objects whose `property` equals `value`.
    #[must_use]
    pub fn filter(mut self, property: &'static str, value: impl Into<Value>) -> Self {
        self.filters.push((property, value.into()));
        self
    }

    /// Eagerly loads the relation `property` of every result.
    #[must_use]
    pub fn fetch(mut self, property: &'static str) -> Self {
        self.fetches.push(property);
        self
    }

    /// Queried class.
    #[must_use]
    pub fn class_id(&self) -> ClassId {
        self.class_id
    }

    /// Equality filters.
    #[must_use]
    pub fn filters(&self) -> &[(&'static str, Value)] {
        &self.filters
    }

    /// Relations to fetch eagerly.
    #[must_use]
    pub fn fetches(&self) -> &[&'static str] {
        &self.fetches
    }

    /// Returns `true` if `data` satisfies every filter.
    #[must_use]
    pub fn matches(&self, data: &ObjectData) -> bool {
        data.id.class_id() == self.class_id
            && self
                .filters
                .iter()
                .all(|(property, value)| data.values.get(property) == Some(value))
    }
}

/// Storage contract used by root transactions.
///
/// Implementations must be `Send + Sync`; they are shared by every
/// transaction of a hierarchy.
pub trait PersistenceStrategy: Send + Sync {
    /// Allocates the identity of a new object.
    fn create_new_object_id(&self, class_id: ClassId) -> ObjectId {
        ObjectId::random(class_id)
    }

    /// Loads one object. `Ok(None)` means the object does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be read.
    fn load_object_data(&self, id: ObjectId) -> CoreResult<Option<ObjectData>>;

    /// Loads many objects, in request order.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be read.
    fn load_object_data_many(&self, ids: &[ObjectId]) -> CoreResult<Vec<Option<ObjectData>>> {
        ids.iter().map(|id| self.load_object_data(*id)).collect()
    }

    /// Loads the objects on the real side of a virtual end point.
    ///
    /// Returns every object of the opposite class whose foreign key
    /// (`definition`'s opposite property) equals `owner`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be read.
    fn load_related_object_data(
        &self,
        definition: &RelationEndPointDefinition,
        owner: ObjectId,
    ) -> CoreResult<Vec<ObjectData>>;

    /// Loads the related objects of many owners in one round trip.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be read.
    fn execute_fetch_query(
        &self,
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
    /// Returns an error if the storage cannot be read.
    fn execute_query(&self, query: &Query) -> CoreResult<Vec<ObjectData>>;

    /// Saves a set of changes atomically and returns the new timestamps of the
    /// inserted and updated objects.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::ConcurrencyViolation`] if any object was
    /// changed in storage since it was loaded; nothing is written in that case.
    fn persist_data(&self, data: &[PersistableData]) -> CoreResult<Vec<(ObjectId, Timestamp)>>;
}
