//! In-memory persistence for tests and ephemeral hierarchies.

use super::{
    ObjectData, PersistableData, PersistableState, PersistenceStrategy, Query, StorageStats,
};
use crate::error::{CoreError, CoreResult};
use crate::mapping::RelationEndPointDefinition;
use crate::types::{ObjectId, Timestamp};
use crate::value::Value;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

#[derive(Debug, Clone)]
struct StoredRecord {
    timestamp: Timestamp,
    values: BTreeMap<&'static str, Value>,
}

#[derive(Debug, Default)]
struct StorageInner {
    records: HashMap<ObjectId, StoredRecord>,
    order: Vec<ObjectId>,
    clock: u64,
}

impl StorageInner {
    fn tick(&mut self) -> Timestamp {
        self.clock += 1;
        Timestamp::new(self.clock)
    }

    fn write(&mut self, id: ObjectId, values: BTreeMap<&'static str, Value>) -> Timestamp {
        let timestamp = self.tick();
        if self
            .records
            .insert(id, StoredRecord { timestamp, values })
            .is_none()
        {
            self.order.push(id);
        }
        timestamp
    }

    fn data(&self, id: ObjectId) -> Option<ObjectData> {
        self.records.get(&id).map(|record| ObjectData {
            id,
            timestamp: Some(record.timestamp),
            values: record.values.clone(),
        })
    }

    fn scan(&self) -> impl Iterator<Item = ObjectData> + '_ {
        self.order.iter().filter_map(|id| self.data(*id))
    }
}

/// An in-memory [`PersistenceStrategy`].
///
/// Records are kept in insertion order, which is also the order of related
/// objects and query results. Every write assigns a fresh timestamp, so
/// writes made directly through [`InMemoryStorage::insert`] or
/// [`InMemoryStorage::update`] simulate concurrent modifications.
///
/// # Thread Safety
///
/// The storage is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use unitgraph_core::{ClassId, InMemoryStorage, ObjectId, PersistenceStrategy, Value};
///
/// let storage = InMemoryStorage::new();
/// let id = ObjectId::random(ClassId::new("Order"));
/// storage.insert(id, [("OrderNumber", Value::Integer(1))]);
///
/// let data = storage.load_object_data(id).unwrap().unwrap();
/// assert_eq!(data.value("OrderNumber"), Value::Integer(1));
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    inner: RwLock<StorageInner>,
    stats: StorageStats,
}

impl InMemoryStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a record, bypassing any transaction.
    pub fn insert(
        &self,
        id: ObjectId,
        values: impl IntoIterator<Item = (&'static str, Value)>,
    ) -> Timestamp {
        self.inner.write().write(id, values.into_iter().collect())
    }

    /// Changes one property of a stored record, bypassing any transaction.
    pub fn update(&self, id: ObjectId, property: &'static str, value: Value) -> CoreResult<Timestamp> {
        let mut inner = self.inner.write();
        let mut values = inner
            .records
            .get(&id)
            .map(|record| record.values.clone())
            .ok_or_else(|| CoreError::object_not_found(id))?;
        values.insert(property, value);
        Ok(inner.write(id, values))
    }

    /// Removes a record, bypassing any transaction.
    pub fn remove(&self, id: ObjectId) -> bool {
        let mut inner = self.inner.write();
        inner.order.retain(|stored| *stored != id);
        inner.records.remove(&id).is_some()
    }

    /// Returns a copy of a stored record.
    #[must_use]
    pub fn get(&self, id: ObjectId) -> Option<ObjectData> {
        self.inner.read().data(id)
    }

    /// Returns `true` if a record exists for `id`.
    #[must_use]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.inner.read().records.contains_key(&id)
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }

    /// Round-trip counters.
    #[must_use]
    pub fn stats(&self) -> &StorageStats {
        &self.stats
    }
}

fn related(
    definition: &RelationEndPointDefinition,
) -> CoreResult<(crate::types::ClassId, &'static str)> {
    let property = definition.opposite_property().ok_or_else(|| {
        CoreError::mapping(format!(
            "{}.{} has no opposite property",
            definition.class_id(),
            definition.property()
        ))
    })?;
    Ok((definition.opposite_class_id(), property))
}

impl PersistenceStrategy for InMemoryStorage {
    fn load_object_data(&self, id: ObjectId) -> CoreResult<Option<ObjectData>> {
        self.stats.record_object_load();
        Ok(self.inner.read().data(id))
    }

    fn load_object_data_many(&self, ids: &[ObjectId]) -> CoreResult<Vec<Option<ObjectData>>> {
        self.stats.record_object_load();
        let inner = self.inner.read();
        Ok(ids.iter().map(|id| inner.data(*id)).collect())
    }

    fn load_related_object_data(
        &self,
        definition: &RelationEndPointDefinition,
        owner: ObjectId,
    ) -> CoreResult<Vec<ObjectData>> {
        self.execute_fetch_query(definition, &[owner])
    }

    fn execute_fetch_query(
        &self,
        definition: &RelationEndPointDefinition,
        owners: &[ObjectId],
    ) -> CoreResult<Vec<ObjectData>> {
        self.stats.record_related_load();
        let (class_id, property) = related(definition)?;
        let inner = self.inner.read();
        Ok(inner
            .scan()
            .filter(|data| data.id.class_id() == class_id)
            .filter(|data| {
                data.values
                    .get(property)
                    .and_then(Value::as_object_id)
                    .is_some_and(|fk| owners.contains(&fk))
            })
            .collect())
    }

    fn execute_query(&self, query: &Query) -> CoreResult<Vec<ObjectData>> {
        self.stats.record_query();
        let inner = self.inner.read();
        Ok(inner.scan().filter(|data| query.matches(data)).collect())
    }

    fn persist_data(&self, data: &[PersistableData]) -> CoreResult<Vec<(ObjectId, Timestamp)>> {
        let mut inner = self.inner.write();

        let conflicts: Vec<ObjectId> = data
            .iter()
            .filter(|item| {
                let stored = inner.records.get(&item.id).map(|r| r.timestamp);
                match item.state {
                    PersistableState::New => stored.is_some(),
                    PersistableState::Changed | PersistableState::Deleted => {
                        stored.is_none() || stored != item.timestamp
                    }
                }
            })
            .map(|item| item.id)
            .collect();
        if !conflicts.is_empty() {
            self.stats.record_conflict();
            return Err(CoreError::ConcurrencyViolation { ids: conflicts });
        }

        let mut timestamps = Vec::new();
        for item in data {
            match item.state {
                PersistableState::New | PersistableState::Changed => {
                    let timestamp = inner.write(item.id, item.values.clone());
                    timestamps.push((item.id, timestamp));
                }
                PersistableState::Deleted => {
                    inner.records.remove(&item.id);
                    inner.order.retain(|stored| *stored != item.id);
                }
            }
        }
        self.stats.record_persist();
        debug!(count = data.len(), "data persisted");
        Ok(timestamps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::MappingBuilder;
    use crate::types::{ClassId, ObjectKey};

    fn id(class: &'static str, key: u128) -> ObjectId {
        ObjectId::new(ClassId::new(class), ObjectKey::from_u128(key))
    }

    #[test]
    fn related_objects_follow_insertion_order() {
        let mapping = MappingBuilder::new()
            .class("Customer")
            .class("Order")
            .one_to_many(("Customer", "Orders"), ("Order", "Customer"))
            .build()
            .unwrap();
        let customer = id("Customer", 1);
        let storage = InMemoryStorage::new();
        storage.insert(id("Order", 3), [("Customer", Value::Object(customer))]);
        storage.insert(id("Order", 2), [("Customer", Value::Null)]);
        storage.insert(id("Order", 1), [("Customer", Value::Object(customer))]);

        let definition = mapping
            .class_by_name("Customer")
            .unwrap()
            .end_point("Orders")
            .unwrap();
        let related = storage.load_related_object_data(definition, customer).unwrap();
        let ids: Vec<_> = related.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![id("Order", 3), id("Order", 1)]);
        assert_eq!(storage.stats().snapshot().related_loads, 1);
    }

    #[test]
    fn persist_checks_timestamps() {
        let storage = InMemoryStorage::new();
        let order = id("Order", 1);
        let loaded = storage.insert(order, [("OrderNumber", Value::Integer(1))]);
        storage
            .update(order, "OrderNumber", Value::Integer(2))
            .unwrap();

        let change = PersistableData {
            id: order,
            state: PersistableState::Changed,
            timestamp: Some(loaded),
            values: BTreeMap::from([("OrderNumber", Value::Integer(3))]),
        };
        let err = storage.persist_data(&[change]).unwrap_err();
        assert_eq!(err, CoreError::ConcurrencyViolation { ids: vec![order] });
        assert_eq!(storage.get(order).unwrap().value("OrderNumber"), Value::Integer(2));
    }

    #[test]
    fn persist_inserts_updates_and_deletes() {
        let storage = InMemoryStorage::new();
        let kept = id("Order", 1);
        let removed = id("Order", 2);
        let added = id("Order", 3);
        let kept_ts = storage.insert(kept, [("OrderNumber", Value::Integer(1))]);
        let removed_ts = storage.insert(removed, [("OrderNumber", Value::Integer(2))]);

        let timestamps = storage
            .persist_data(&[
                PersistableData {
                    id: kept,
                    state: PersistableState::Changed,
                    timestamp: Some(kept_ts),
                    values: BTreeMap::from([("OrderNumber", Value::Integer(10))]),
                },
                PersistableData {
                    id: removed,
                    state: PersistableState::Deleted,
                    timestamp: Some(removed_ts),
                    values: BTreeMap::new(),
                },
                PersistableData {
                    id: added,
                    state: PersistableState::New,
                    timestamp: None,
                    values: BTreeMap::from([("OrderNumber", Value::Integer(3))]),
                },
            ])
            .unwrap();

        assert_eq!(timestamps.len(), 2);
        assert!(!storage.contains(removed));
        assert_eq!(storage.get(kept).unwrap().value("OrderNumber"), Value::Integer(10));
        assert!(storage.get(kept).unwrap().timestamp > Some(kept_ts));
        assert!(storage.contains(added));
    }

    #[test]
    fn query_filters_by_equality() {
        let storage = InMemoryStorage::new();
        storage.insert(id("Order", 1), [("OrderNumber", Value::Integer(1))]);
        storage.insert(id("Order", 2), [("OrderNumber", Value::Integer(2))]);
        storage.insert(id("Customer", 1), [("Name", Value::from("a"))]);

        let query = Query::new(ClassId::new("Order")).filter("OrderNumber", 2);
        let result = storage.execute_query(&query).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, id("Order", 2));
    }
}
