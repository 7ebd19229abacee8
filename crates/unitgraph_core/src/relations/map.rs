//! Identity-keyed storage of relation end points.

use super::RelationEndPoint;
use crate::error::{CoreError, CoreResult};
use crate::events::{TransactionEventSink, TransactionListener};
use crate::types::{ObjectId, RelationEndPointId, TransactionId};
use std::collections::BTreeMap;
use std::sync::Arc;

/// All end points of one transaction, keyed by identity.
pub struct RelationEndPointMap {
    tx: TransactionId,
    events: Arc<TransactionEventSink>,
    end_points: BTreeMap<RelationEndPointId, RelationEndPoint>,
}

impl RelationEndPointMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new(tx: TransactionId, events: Arc<TransactionEventSink>) -> Self {
        Self {
            tx,
            events,
            end_points: BTreeMap::new(),
        }
    }

    /// Adds an end point, raising the registering event.
    pub fn register(&mut self, end_point: RelationEndPoint) -> CoreResult<()> {
        let id = end_point.id();
        if self.end_points.contains_key(&id) {
            return Err(CoreError::duplicate_registration(id));
        }
        self.events
            .relation_end_point_map_registering(self.tx, &end_point)?;
        self.end_points.insert(id, end_point);
        Ok(())
    }

    /// Removes an end point, raising the unregistering event first.
    pub fn remove(&mut self, id: RelationEndPointId) -> CoreResult<RelationEndPoint> {
        if !self.end_points.contains_key(&id) {
            return Err(CoreError::invalid_operation(format!("{id} is not registered")));
        }
        self.events
            .relation_end_point_map_unregistering(self.tx, id)?;
        self.end_points
            .remove(&id)
            .ok_or_else(|| CoreError::invalid_operation(format!("{id} is not registered")))
    }

    /// Looks up an end point.
    #[must_use]
    pub fn get(&self, id: RelationEndPointId) -> Option<&RelationEndPoint> {
        self.end_points.get(&id)
    }

    /// Looks up an end point for mutation.
    pub fn get_mut(&mut self, id: RelationEndPointId) -> Option<&mut RelationEndPoint> {
        self.end_points.get_mut(&id)
    }

    /// Returns `true` if `id` is registered.
    #[must_use]
    pub fn contains(&self, id: RelationEndPointId) -> bool {
        self.end_points.contains_key(&id)
    }

    /// Identities of all end points, ordered.
    #[must_use]
    pub fn ids(&self) -> Vec<RelationEndPointId> {
        self.end_points.keys().copied().collect()
    }

    /// Identities of the end points owned by `object`.
    #[must_use]
    pub fn ids_of(&self, object: ObjectId) -> Vec<RelationEndPointId> {
        self.end_points
            .range(RelationEndPointId::new(object, "")..)
            .map(|(id, _)| *id)
            .take_while(|id| id.object_id() == object)
            .collect()
    }

    /// All end points, ordered by identity.
    pub fn iter(&self) -> impl Iterator<Item = &RelationEndPoint> + '_ {
        self.end_points.values()
    }

    /// All end points for mutation.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RelationEndPoint> + '_ {
        self.end_points.values_mut()
    }

    /// Number of end points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end_points.len()
    }

    /// Returns `true` if the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end_points.is_empty()
    }

    /// Removes one end point without raising events.
    pub(crate) fn evict(&mut self, id: RelationEndPointId) -> Option<RelationEndPoint> {
        self.end_points.remove(&id)
    }

    /// Drops every end point without raising events.
    pub(crate) fn clear(&mut self) {
        self.end_points.clear();
    }
}

impl std::fmt::Debug for RelationEndPointMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationEndPointMap")
            .field("tx", &self.tx)
            .field("len", &self.end_points.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relations::RealObjectEndPoint;
    use crate::types::{ClassId, ObjectKey};

    fn end_point(key: u128) -> RelationEndPoint {
        let owner = ObjectId::new(ClassId::new("Order"), ObjectKey::from_u128(key));
        RelationEndPoint::RealObject(RealObjectEndPoint::new(
            RelationEndPointId::new(owner, "Customer"),
            Some("Orders"),
        ))
    }

    fn map() -> RelationEndPointMap {
        let tx = TransactionId::new(1);
        RelationEndPointMap::new(tx, Arc::new(TransactionEventSink::new(tx)))
    }

    #[test]
    fn register_and_remove() {
        let mut map = map();
        let ep = end_point(1);
        let id = ep.id();
        map.register(ep.clone()).unwrap();
        assert!(map.register(ep).is_err());
        assert_eq!(map.ids_of(id.object_id()), vec![id]);

        map.remove(id).unwrap();
        assert!(map.is_empty());
        assert!(map.remove(id).is_err());
    }
}
