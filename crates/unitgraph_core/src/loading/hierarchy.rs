//! Loading through the chain of parent transactions.

use super::{object_data_of, LazyLoader};
use crate::error::CoreResult;
use crate::mapping::RelationEndPointDefinition;
use crate::persistence::{ObjectData, PersistenceStrategy, Query};
use crate::transaction::ClientTransaction;
use crate::types::{ObjectId, RelationEndPointId};

/// Loader of a transaction whose ancestors are `ancestors` (root first).
///
/// With no ancestors it reads the persistence strategy. Otherwise every
/// request is answered from the parent's current data, which the parent
/// loads lazily in turn. Objects deleted in the parent are reported as
/// missing.
pub struct HierarchyLoader<'a> {
    ancestors: &'a mut [ClientTransaction],
    storage: &'a dyn PersistenceStrategy,
}

impl<'a> HierarchyLoader<'a> {
    /// Creates a loader over `ancestors`, ordered root first.
    #[must_use]
    pub fn new(ancestors: &'a mut [ClientTransaction], storage: &'a dyn PersistenceStrategy) -> Self {
        Self { ancestors, storage }
    }

    /// Number of transactions between this loader and the storage.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.ancestors.len()
    }

    fn parent(&mut self) -> Option<(&mut ClientTransaction, HierarchyLoader<'_>)> {
        let storage = self.storage;
        let (parent, rest) = self.ancestors.split_last_mut()?;
        Some((
            parent,
            HierarchyLoader {
                ancestors: rest,
                storage,
            },
        ))
    }
}

impl std::fmt::Debug for HierarchyLoader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HierarchyLoader")
            .field("depth", &self.ancestors.len())
            .finish_non_exhaustive()
    }
}

impl LazyLoader for HierarchyLoader<'_> {
    fn load_object_data(&mut self, id: ObjectId) -> CoreResult<Option<ObjectData>> {
        let storage = self.storage;
        match self.parent() {
            None => storage.load_object_data(id),
            Some((parent, mut loader)) => {
                let container = parent
                    .data_mut()
                    .get_data_container_with_lazy_load(id, false, &mut loader)?;
                Ok(container.filter(|c| !c.is_deleted()).map(object_data_of))
            }
        }
    }

    fn load_object_data_many(&mut self, ids: &[ObjectId]) -> CoreResult<Vec<Option<ObjectData>>> {
        let storage = self.storage;
        match self.parent() {
            None => storage.load_object_data_many(ids),
            Some((parent, mut loader)) => {
                let containers = parent
                    .data_mut()
                    .get_data_containers_with_lazy_load(ids, false, &mut loader)?;
                Ok(containers
                    .into_iter()
                    .map(|c| c.filter(|c| !c.is_deleted()).map(object_data_of))
                    .collect())
            }
        }
    }

    fn load_related_object_data(
        &mut self,
        definition: &RelationEndPointDefinition,
        owner: ObjectId,
    ) -> CoreResult<Vec<ObjectData>> {
        let storage = self.storage;
        match self.parent() {
            None => storage.load_related_object_data(definition, owner),
            Some((parent, mut loader)) => {
                let data = parent.data_mut();
                let end_point = RelationEndPointId::new(owner, definition.property());
                let items = data.related_object_ids(end_point, &mut loader)?;
                let containers = data.get_data_containers_with_lazy_load(&items, true, &mut loader)?;
                Ok(containers
                    .into_iter()
                    .flatten()
                    .filter(|c| !c.is_deleted())
                    .map(object_data_of)
                    .collect())
            }
        }
    }

    fn execute_fetch_query(
        &mut self,
        definition: &RelationEndPointDefinition,
        owners: &[ObjectId],
    ) -> CoreResult<Vec<ObjectData>> {
        if self.ancestors.is_empty() {
            return self.storage.execute_fetch_query(definition, owners);
        }
        let mut result = Vec::new();
        for owner in owners {
            result.extend(self.load_related_object_data(definition, *owner)?);
        }
        Ok(result)
    }

    fn execute_query(&mut self, query: &Query) -> CoreResult<Vec<ObjectData>> {
        let storage = self.storage;
        match self.parent() {
            None => storage.execute_query(query),
            Some((parent, mut loader)) => {
                let data = parent.data_mut();
                let ids = data.execute_query(query, &mut loader)?;
                let containers = data.get_data_containers_with_lazy_load(&ids, false, &mut loader)?;
                Ok(containers
                    .into_iter()
                    .flatten()
                    .filter(|c| !c.is_deleted())
                    .map(object_data_of)
                    .collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::data::ObjectState;
    use crate::test_support::{mapping, seeded_storage};
    use crate::types::TransactionId;
    use std::sync::Arc;

    fn root() -> ClientTransaction {
        ClientTransaction::new(
            TransactionId::new(1),
            None,
            mapping(),
            Arc::new(Config::default()),
        )
    }

    #[test]
    fn without_ancestors_reads_storage() {
        let (storage, seeded) = seeded_storage();
        let mut none: [ClientTransaction; 0] = [];
        let mut loader = HierarchyLoader::new(&mut none, &storage);

        assert_eq!(loader.depth(), 0);
        let data = loader.load_object_data(seeded.customer).unwrap().unwrap();
        assert_eq!(data.value("Name"), crate::value::Value::from("Kim"));
    }

    #[test]
    fn loads_register_in_the_parent_first() {
        let (storage, seeded) = seeded_storage();
        let mut ancestors = [root()];
        let mut loader = HierarchyLoader::new(&mut ancestors, &storage);

        let data = loader.load_object_data(seeded.order).unwrap();
        assert!(data.is_some());
        assert_eq!(
            ancestors[0].data().get_state(seeded.order),
            ObjectState::Unchanged
        );
    }

    #[test]
    fn objects_deleted_in_the_parent_are_missing() {
        let (storage, seeded) = seeded_storage();
        let mut ancestors = [root()];
        {
            let mut none: [ClientTransaction; 0] = [];
            let parent = ancestors[0].data_mut();
            let mut loader = HierarchyLoader::new(&mut none, &storage);
            parent
                .get_data_container_with_lazy_load(seeded.ticket, true, &mut loader)
                .unwrap();
            parent.perform_delete(seeded.ticket).unwrap();
        }

        let mut loader = HierarchyLoader::new(&mut ancestors, &storage);
        assert_eq!(loader.load_object_data(seeded.ticket).unwrap(), None);
    }

    #[test]
    fn related_data_comes_from_the_parent_view() {
        let (storage, seeded) = seeded_storage();
        let mut ancestors = [root()];
        let mut loader = HierarchyLoader::new(&mut ancestors, &storage);
        let mapping = mapping();
        let definition = mapping
            .end_point(&RelationEndPointId::new(seeded.order, "OrderItems"))
            .unwrap();

        let items = loader
            .load_related_object_data(definition, seeded.order)
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, seeded.item);
    }
}
