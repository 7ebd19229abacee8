//! Registration of eagerly fetched relation data.
//!
//! A fetch loads the related objects of many owners in one round trip. The
//! agents below group the result by foreign key and mark the owners' virtual
//! end points complete, so later access does not trigger a lazy load.

use super::LazyLoader;
use crate::data_manager::DataManager;
use crate::error::{CoreError, CoreResult};
use crate::mapping::{EndPointKind, RelationEndPointDefinition};
use crate::persistence::ObjectData;
use crate::types::{ObjectId, RelationEndPointId};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Groups fetched objects by the owner their foreign key points at,
/// preserving fetch order within each group.
fn group_by_foreign_key(
    data: &DataManager,
    definition: &RelationEndPointDefinition,
    related: &[ObjectData],
) -> CoreResult<HashMap<ObjectId, Vec<ObjectId>>> {
    let property = definition.opposite_property().ok_or_else(|| {
        CoreError::mapping(format!(
            "{}.{} has no opposite property",
            definition.class_id(),
            definition.property()
        ))
    })?;
    let mut groups: HashMap<ObjectId, Vec<ObjectId>> = HashMap::new();
    for item in related {
        if data.invalid_objects().is_invalid(item.id) {
            continue;
        }
        if let Some(owner) = item.value(property).as_object_id() {
            let group = groups.entry(owner).or_default();
            if !group.contains(&item.id) {
                group.push(item.id);
            }
        }
    }
    Ok(groups)
}

/// Owners whose end point `property` can still take fetched data.
fn pending_owners(
    data: &DataManager,
    definition: &RelationEndPointDefinition,
    originating: &[ObjectId],
) -> Vec<ObjectId> {
    let mut pending = Vec::new();
    for owner in originating {
        if pending.contains(owner) || !data.data_containers().contains(*owner) {
            continue;
        }
        let id = RelationEndPointId::new(*owner, definition.property());
        let complete = data
            .get_relation_end_point_without_loading(id)
            .is_some_and(|ep| ep.is_complete());
        if complete {
            trace!(%id, "end point already complete, fetched data ignored");
        } else {
            pending.push(*owner);
        }
    }
    pending
}

/// Registers fetched data into collection end points.
///
/// Every originating owner is marked complete, with an empty collection if
/// nothing was fetched for it.
#[derive(Debug, Default, Clone, Copy)]
pub struct CollectionEndPointRegistrationAgent;

impl CollectionEndPointRegistrationAgent {
    /// Marks the collection end points of `originating` complete.
    pub fn register_end_points(
        &self,
        data: &mut DataManager,
        definition: &RelationEndPointDefinition,
        originating: &[ObjectId],
        related: &[ObjectData],
    ) -> CoreResult<()> {
        let mut groups = group_by_foreign_key(data, definition, related)?;
        for owner in pending_owners(data, definition, originating) {
            let id = RelationEndPointId::new(owner, definition.property());
            let items = groups.remove(&owner).unwrap_or_default();
            data.end_point_manager_mut().mark_complete(id, items)?;
        }
        Ok(())
    }
}

/// Registers fetched data into virtual object end points.
///
/// Fails if more than one object was fetched for the same owner.
#[derive(Debug, Default, Clone, Copy)]
pub struct VirtualObjectEndPointRegistrationAgent;

impl VirtualObjectEndPointRegistrationAgent {
    /// Marks the virtual object end points of `originating` complete.
    pub fn register_end_points(
        &self,
        data: &mut DataManager,
        definition: &RelationEndPointDefinition,
        originating: &[ObjectId],
        related: &[ObjectData],
    ) -> CoreResult<()> {
        let mut groups = group_by_foreign_key(data, definition, related)?;
        for owner in pending_owners(data, definition, originating) {
            let id = RelationEndPointId::new(owner, definition.property());
            let items = groups.remove(&owner).unwrap_or_default();
            if items.len() > 1 {
                return Err(CoreError::invalid_operation(format!(
                    "fetch returned {} objects for the one-to-one relation {id}",
                    items.len()
                )));
            }
            data.end_point_manager_mut().mark_complete(id, items)?;
        }
        Ok(())
    }
}

/// Runs a fetch for one relation and hands the result to the matching agent.
#[derive(Debug, Default, Clone, Copy)]
pub struct FetchedRelationDataRegistrationAgent {
    collection: CollectionEndPointRegistrationAgent,
    virtual_object: VirtualObjectEndPointRegistrationAgent,
}

impl FetchedRelationDataRegistrationAgent {
    /// Creates the dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches the relation `definition` of every object in `originating`.
    ///
    /// Real end points load the referenced objects; virtual end points load
    /// the referencing objects and are marked complete. End points that are
    /// already complete keep their data.
    pub fn fetch(
        &self,
        data: &mut DataManager,
        definition: &RelationEndPointDefinition,
        originating: &[ObjectId],
        loader: &mut dyn LazyLoader,
    ) -> CoreResult<()> {
        match definition.kind() {
            EndPointKind::Real => {
                let mut targets = Vec::new();
                for owner in originating {
                    let Some(container) = data.data_containers().get(*owner) else {
                        continue;
                    };
                    if let Some(target) = container.value(definition.property())?.as_object_id() {
                        if !targets.contains(&target) && !data.invalid_objects().is_invalid(target) {
                            targets.push(target);
                        }
                    }
                }
                data.get_data_containers_with_lazy_load(&targets, false, loader)?;
                Ok(())
            }
            EndPointKind::VirtualObject | EndPointKind::VirtualCollection => {
                let pending = pending_owners(data, definition, originating);
                if pending.is_empty() {
                    return Ok(());
                }
                let related = loader.execute_fetch_query(definition, &pending)?;
                debug!(
                    relation = definition.property(),
                    owners = pending.len(),
                    fetched = related.len(),
                    "relation data fetched"
                );
                data.register_loaded_objects(&related)?;
                self.register_end_points(data, definition, &pending, &related)
            }
            EndPointKind::Anonymous => Err(CoreError::mapping(format!(
                "{}.{} cannot be fetched",
                definition.class_id(),
                definition.property()
            ))),
        }
    }

    /// Registers already-fetched data for `originating` into their end points.
    pub fn register_end_points(
        &self,
        data: &mut DataManager,
        definition: &RelationEndPointDefinition,
        originating: &[ObjectId],
        related: &[ObjectData],
    ) -> CoreResult<()> {
        match definition.kind() {
            EndPointKind::VirtualCollection => self
                .collection
                .register_end_points(data, definition, originating, related),
            EndPointKind::VirtualObject => self
                .virtual_object
                .register_end_points(data, definition, originating, related),
            EndPointKind::Real | EndPointKind::Anonymous => Err(CoreError::invalid_operation(
                format!(
                    "{}.{} is not a virtual end point",
                    definition.class_id(),
                    definition.property()
                ),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loading::StorageLoader;
    use crate::test_support::{data_manager, id, seeded_storage};
    use crate::value::Value;
    use std::sync::Arc;

    fn existing(id: ObjectId) -> ObjectData {
        ObjectData::new(id, None, Vec::<(&'static str, Value)>::new())
    }

    fn owned_by(id: ObjectId, order: ObjectId) -> ObjectData {
        ObjectData::new(id, None, [("Order", Value::Object(order))])
    }

    #[test]
    fn collection_agent_groups_by_owner_and_completes_empty_owners() {
        let mut data = data_manager();
        let mapping = Arc::clone(data.mapping());
        let (first, second) = (id("Order", 1), id("Order", 2));
        let definition = mapping
            .end_point(&RelationEndPointId::new(first, "OrderItems"))
            .unwrap();
        data.register_loaded_objects(&[existing(first), existing(second)])
            .unwrap();

        let related = [
            owned_by(id("OrderItem", 2), first),
            owned_by(id("OrderItem", 1), first),
        ];
        data.register_loaded_objects(&related).unwrap();
        CollectionEndPointRegistrationAgent
            .register_end_points(&mut data, definition, &[first, second], &related)
            .unwrap();

        assert_eq!(
            data.current_items(RelationEndPointId::new(first, "OrderItems"))
                .unwrap(),
            vec![id("OrderItem", 2), id("OrderItem", 1)]
        );
        assert!(data
            .current_items(RelationEndPointId::new(second, "OrderItems"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn virtual_object_agent_rejects_ambiguous_results() {
        let mut data = data_manager();
        let mapping = Arc::clone(data.mapping());
        let order = id("Order", 1);
        let definition = mapping
            .end_point(&RelationEndPointId::new(order, "OrderTicket"))
            .unwrap();
        data.register_loaded_objects(&[existing(order)]).unwrap();

        let tickets = [
            owned_by(id("OrderTicket", 1), order),
            owned_by(id("OrderTicket", 2), order),
        ];
        let err = VirtualObjectEndPointRegistrationAgent
            .register_end_points(&mut data, definition, &[order], &tickets)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
    }

    #[test]
    fn fetch_skips_complete_end_points() {
        let (storage, seeded) = seeded_storage();
        let mut data = data_manager();
        let mut loader = StorageLoader::new(&storage);
        let mapping = Arc::clone(data.mapping());
        let items = RelationEndPointId::new(seeded.order, "OrderItems");
        let definition = mapping.end_point(&items).unwrap();

        data.get_data_container_with_lazy_load(seeded.order, true, &mut loader)
            .unwrap();
        data.load_lazy_collection_end_point(items, &mut loader).unwrap();
        let before = storage.stats().snapshot();
        FetchedRelationDataRegistrationAgent::new()
            .fetch(&mut data, definition, &[seeded.order], &mut loader)
            .unwrap();

        assert_eq!(storage.stats().snapshot(), before);
        assert_eq!(data.current_items(items).unwrap(), vec![seeded.item]);
    }

    #[test]
    fn fetch_through_real_end_points_loads_targets() {
        let (storage, seeded) = seeded_storage();
        let mut data = data_manager();
        let mut loader = StorageLoader::new(&storage);
        let mapping = Arc::clone(data.mapping());
        data.get_data_container_with_lazy_load(seeded.item, true, &mut loader)
            .unwrap();
        let definition = mapping
            .end_point(&RelationEndPointId::new(seeded.item, "Order"))
            .unwrap();

        FetchedRelationDataRegistrationAgent::new()
            .fetch(&mut data, definition, &[seeded.item], &mut loader)
            .unwrap();
        assert!(data.data_containers().contains(seeded.order));
    }
}
