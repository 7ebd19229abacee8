//! Identity map of data containers.

use super::container::{DataContainer, ObjectState};
use crate::error::{CoreError, CoreResult};
use crate::events::{TransactionEventSink, TransactionListener};
use crate::types::{ObjectId, TransactionId};
use std::collections::HashMap;
use std::sync::Arc;

/// Identity map of one transaction: at most one container per [`ObjectId`].
///
/// Containers are enumerated in registration order. Removal only happens via
/// [`DataContainerMap::unregister`], which raises the unregistering event first.
pub struct DataContainerMap {
    tx: TransactionId,
    events: Arc<TransactionEventSink>,
    containers: HashMap<ObjectId, DataContainer>,
    order: Vec<ObjectId>,
}

impl DataContainerMap {
    /// Creates an empty map raising events through `events`.
    #[must_use]
    pub fn new(tx: TransactionId, events: Arc<TransactionEventSink>) -> Self {
        Self {
            tx,
            events,
            containers: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Adds a container.
    ///
    /// Fails with [`CoreError::DuplicateRegistration`] if the identity is
    /// already registered, or with the first listener veto.
    pub fn register(&mut self, container: DataContainer) -> CoreResult<()> {
        let id = container.id();
        if self.containers.contains_key(&id) {
            return Err(CoreError::duplicate_registration(id));
        }
        self.events.data_container_map_registering(self.tx, &container)?;
        self.containers.insert(id, container);
        self.order.push(id);
        Ok(())
    }

    /// Removes a container and hands it back to the caller.
    pub fn unregister(&mut self, id: ObjectId) -> CoreResult<DataContainer> {
        let container = self
            .containers
            .get(&id)
            .ok_or_else(|| CoreError::object_not_found(id))?;
        self.events.data_container_map_unregistering(self.tx, container)?;
        self.order.retain(|registered| *registered != id);
        self.containers
            .remove(&id)
            .ok_or_else(|| CoreError::object_not_found(id))
    }

    /// Removes a container without raising events.
    ///
    /// Undoes a registration whose follow-up work failed.
    pub(crate) fn evict(&mut self, id: ObjectId) -> Option<DataContainer> {
        self.order.retain(|registered| *registered != id);
        self.containers.remove(&id)
    }

    /// Looks up a container.
    #[must_use]
    pub fn get(&self, id: ObjectId) -> Option<&DataContainer> {
        self.containers.get(&id)
    }

    /// Looks up a container for mutation.
    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut DataContainer> {
        self.containers.get_mut(&id)
    }

    /// Looks up a container, failing if it is not registered.
    pub fn require(&self, id: ObjectId) -> CoreResult<&DataContainer> {
        self.get(id).ok_or_else(|| CoreError::object_not_found(id))
    }

    /// Mutable variant of [`DataContainerMap::require`].
    pub fn require_mut(&mut self, id: ObjectId) -> CoreResult<&mut DataContainer> {
        self.containers
            .get_mut(&id)
            .ok_or_else(|| CoreError::object_not_found(id))
    }

    /// Returns `true` if a container is registered for `id`.
    #[must_use]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.containers.contains_key(&id)
    }

    /// Registered identities in registration order.
    #[must_use]
    pub fn ids(&self) -> Vec<ObjectId> {
        self.order.clone()
    }

    /// Registered containers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &DataContainer> + '_ {
        self.order.iter().filter_map(|id| self.containers.get(id))
    }

    /// Number of registered containers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.containers.len()
    }

    /// Returns `true` if no container is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// State of a container, taking registration into account.
    ///
    /// A discarded container reports [`ObjectState::Discarded`]; any other
    /// container that is not (or no longer) the registered one reports
    /// [`ObjectState::Invalid`].
    #[must_use]
    pub fn state_of(&self, container: &DataContainer) -> ObjectState {
        if container.is_discarded() {
            return ObjectState::Discarded;
        }
        match self.containers.get(&container.id()) {
            Some(registered) if std::ptr::eq(registered, container) => container.state(),
            _ => ObjectState::Invalid,
        }
    }
}

impl std::fmt::Debug for DataContainerMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataContainerMap")
            .field("tx", &self.tx)
            .field("len", &self.containers.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClassId, ObjectKey};
    use crate::value::Value;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Unregistrations(Mutex<Vec<ObjectId>>);

    impl TransactionListener for Unregistrations {
        fn data_container_map_unregistering(
            &self,
            _tx: TransactionId,
            container: &DataContainer,
        ) -> CoreResult<()> {
            self.0.lock().push(container.id());
            Ok(())
        }
    }

    fn container(key: u128) -> DataContainer {
        DataContainer::for_existing(
            ObjectId::new(ClassId::new("Order"), ObjectKey::from_u128(key)),
            None,
            [("OrderNumber", Value::Integer(1))],
        )
    }

    fn map() -> (DataContainerMap, Arc<Unregistrations>) {
        let tx = TransactionId::new(1);
        let events = Arc::new(TransactionEventSink::new(tx));
        let listener = Arc::new(Unregistrations::default());
        events.add_listener(listener.clone());
        (DataContainerMap::new(tx, events), listener)
    }

    #[test]
    fn duplicate_registration_fails() {
        let (mut map, _) = map();
        map.register(container(1)).unwrap();
        let err = map.register(container(1)).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateRegistration { .. }));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn iterates_in_registration_order() {
        let (mut map, _) = map();
        for key in [3, 1, 2] {
            map.register(container(key)).unwrap();
        }
        let keys: Vec<_> = map.iter().map(|c| c.id().key()).collect();
        assert_eq!(
            keys,
            vec![
                ObjectKey::from_u128(3),
                ObjectKey::from_u128(1),
                ObjectKey::from_u128(2)
            ]
        );
    }

    #[test]
    fn unregister_raises_event_first() {
        let (mut map, listener) = map();
        let id = container(1).id();
        map.register(container(1)).unwrap();

        let removed = map.unregister(id).unwrap();
        assert_eq!(removed.id(), id);
        assert_eq!(*listener.0.lock(), vec![id]);
        assert!(map.is_empty());
        assert!(map.unregister(id).is_err());
    }

    #[test]
    fn unregistered_container_reports_invalid() {
        let (mut map, _) = map();
        let id = container(1).id();
        map.register(container(1)).unwrap();
        assert_eq!(map.state_of(map.require(id).unwrap()), ObjectState::Unchanged);

        let removed = map.unregister(id).unwrap();
        assert_eq!(map.state_of(&removed), ObjectState::Invalid);

        let mut discarded = removed;
        discarded.discard();
        assert_eq!(map.state_of(&discarded), ObjectState::Discarded);
    }
}
