//! Creation, registration and unregistration of end points.

use super::{
    CollectionData, RealObjectEndPoint, RelationEndPoint, RelationEndPointMap, VirtualEndPoint,
    VirtualObjectData,
};
use crate::data::{DataContainer, DataContainerMap};
use crate::error::{CoreError, CoreResult};
use crate::events::TransactionEventSink;
use crate::mapping::{EndPointKind, MappingConfiguration, RelationEndPointDefinition};
use crate::types::{ObjectId, RelationEndPointId, TransactionId};
use std::sync::Arc;
use tracing::{trace, warn};

/// Runs `$body` against the load state of a virtual end point.
///
/// Evaluates to `None` for real end points.
macro_rules! with_load_state {
    ($end_point:expr, $state:ident => $body:expr) => {
        match $end_point {
            RelationEndPoint::VirtualObject(ep) => {
                let $state = ep.load_state_mut();
                Some($body)
            }
            RelationEndPoint::Collection(ep) => {
                let $state = ep.load_state_mut();
                Some($body)
            }
            RelationEndPoint::RealObject(_) => None,
        }
    };
}

/// End points to remove when unloading a set of data containers.
///
/// Built by [`RelationEndPointManager::create_unregister_plan`], which
/// validates that nothing in it carries unsaved changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnregisterPlan {
    real: Vec<(RelationEndPointId, Option<RelationEndPointId>)>,
    virtual_end_points: Vec<RelationEndPointId>,
}

impl UnregisterPlan {
    /// Real end points to remove, each with its original opposite.
    pub fn real_end_points(&self) -> impl Iterator<Item = RelationEndPointId> + '_ {
        self.real.iter().map(|(id, _)| *id)
    }

    /// Virtual end points owned by the unloaded objects.
    pub fn virtual_end_points(&self) -> impl Iterator<Item = RelationEndPointId> + '_ {
        self.virtual_end_points.iter().copied()
    }
}

/// One undoable step of end point registration.
#[derive(Debug, Clone, Copy)]
enum RegistrationStep {
    EndPoint(RelationEndPointId),
    Opposite {
        id: RelationEndPointId,
        created: bool,
    },
}

/// Owns the [`RelationEndPointMap`] of a transaction and keeps real and
/// virtual sides consistent.
#[derive(Debug)]
pub struct RelationEndPointManager {
    mapping: Arc<MappingConfiguration>,
    map: RelationEndPointMap,
    order_sensitive: bool,
}

impl RelationEndPointManager {
    /// Creates a manager.
    ///
    /// `order_sensitive` selects how collection changes are detected: as sets
    /// (root transactions) or as sequences (sub-transactions).
    #[must_use]
    pub fn new(
        tx: TransactionId,
        events: Arc<TransactionEventSink>,
        mapping: Arc<MappingConfiguration>,
        order_sensitive: bool,
    ) -> Self {
        Self {
            mapping,
            map: RelationEndPointMap::new(tx, events),
            order_sensitive,
        }
    }

    /// The underlying map.
    #[must_use]
    pub fn map(&self) -> &RelationEndPointMap {
        &self.map
    }

    /// Whether collection changes are order-sensitive.
    #[must_use]
    pub fn is_order_sensitive(&self) -> bool {
        self.order_sensitive
    }

    /// Looks up an end point without triggering a load.
    #[must_use]
    pub fn get_relation_end_point_without_loading(
        &self,
        id: RelationEndPointId,
    ) -> Option<&RelationEndPoint> {
        self.map.get(id)
    }

    /// Looks up a registered end point for mutation.
    pub fn require_mut(&mut self, id: RelationEndPointId) -> CoreResult<&mut RelationEndPoint> {
        self.map
            .get_mut(id)
            .ok_or_else(|| CoreError::invalid_operation(format!("{id} is not registered")))
    }

    /// Returns the virtual end point `id`, registering it incomplete if missing.
    pub fn get_or_create_virtual_end_point(
        &mut self,
        id: RelationEndPointId,
    ) -> CoreResult<&mut RelationEndPoint> {
        if !self.map.contains(id) {
            let definition = self.mapping.end_point(&id)?;
            let end_point = create_virtual(id, definition, false)?;
            trace!(%id, "virtual end point created");
            self.map.register(end_point)?;
        }
        self.require_mut(id)
    }

    /// Registers the end points of a newly registered container.
    ///
    /// Real end points register with the virtual end point their original
    /// foreign key points at. New objects get complete, empty virtual end
    /// points; virtual end points of loaded objects are created on demand.
    ///
    /// All or nothing: if any step fails, the end points registered so far are
    /// removed again and the error is returned.
    pub fn register_end_points_for_data_container(
        &mut self,
        container: &DataContainer,
    ) -> CoreResult<()> {
        let mut steps = Vec::new();
        let result = self.register_end_points(container, &mut steps);
        if result.is_err() {
            self.revert_registration(container.id(), steps);
        }
        result
    }

    fn register_end_points(
        &mut self,
        container: &DataContainer,
        steps: &mut Vec<RegistrationStep>,
    ) -> CoreResult<()> {
        let mapping = Arc::clone(&self.mapping);
        let class = mapping.class(container.class_id())?;
        for definition in class.end_points() {
            let id = RelationEndPointId::new(container.id(), definition.property());
            match definition.kind() {
                EndPointKind::Real => {
                    let end_point = RealObjectEndPoint::new(id, definition.opposite_property());
                    let original = end_point.original_opposite_object_id(container)?;
                    self.map.register(RelationEndPoint::RealObject(end_point))?;
                    steps.push(RegistrationStep::EndPoint(id));
                    if let Some(opposite) = original.and_then(|o| definition.opposite_end_point_id(o)) {
                        let created = !self.map.contains(opposite);
                        self.register_original_opposite(opposite, container.id())?;
                        steps.push(RegistrationStep::Opposite { id: opposite, created });
                    }
                }
                EndPointKind::VirtualObject | EndPointKind::VirtualCollection => {
                    if container.is_new() {
                        self.map.register(create_virtual(id, definition, true)?)?;
                        steps.push(RegistrationStep::EndPoint(id));
                    }
                }
                EndPointKind::Anonymous => {}
            }
        }
        Ok(())
    }

    fn revert_registration(&mut self, owner: ObjectId, steps: Vec<RegistrationStep>) {
        for step in steps.into_iter().rev() {
            match step {
                RegistrationStep::EndPoint(id) => {
                    self.map.evict(id);
                }
                RegistrationStep::Opposite { id, created } => {
                    if created {
                        self.map.evict(id);
                    } else if let Some(end_point) = self.map.get_mut(id) {
                        with_load_state!(end_point, state => state.revert_original_opposite(owner));
                    }
                }
            }
        }
        warn!(%owner, "end point registration reverted");
    }

    fn register_original_opposite(
        &mut self,
        virtual_id: RelationEndPointId,
        owner: ObjectId,
    ) -> CoreResult<()> {
        let end_point = self.get_or_create_virtual_end_point(virtual_id)?;
        with_load_state!(end_point, state => state.register_original_opposite(owner))
            .ok_or_else(|| CoreError::mapping(format!("{virtual_id} is not virtual")))
    }

    /// Validates that the end points of `containers` can be unregistered.
    ///
    /// Fails with [`CoreError::CannotUnload`] if a foreign key, a related
    /// virtual end point or an owned virtual end point has been changed.
    pub fn create_unregister_plan(&self, containers: &[&DataContainer]) -> CoreResult<UnregisterPlan> {
        let mut plan = UnregisterPlan::default();
        for container in containers {
            for id in self.map.ids_of(container.id()) {
                let Some(end_point) = self.map.get(id) else {
                    continue;
                };
                match end_point {
                    RelationEndPoint::RealObject(real) => {
                        if real.has_changed(container) {
                            return Err(CoreError::cannot_unload(
                                container.id(),
                                format!("relation {} has been changed", id.property()),
                            ));
                        }
                        let opposite = original_opposite(real, container)?;
                        if let Some(changed) = opposite
                            .and_then(|o| self.map.get(o))
                            .filter(|o| o.has_virtual_changes(self.order_sensitive))
                        {
                            return Err(CoreError::cannot_unload(
                                container.id(),
                                format!("related end point {} has been changed", changed.id()),
                            ));
                        }
                        plan.real.push((id, opposite));
                    }
                    virtual_end_point => {
                        if virtual_end_point.has_virtual_changes(self.order_sensitive) {
                            return Err(CoreError::cannot_unload(
                                container.id(),
                                format!("relation {} has been changed", id.property()),
                            ));
                        }
                        plan.virtual_end_points.push(id);
                    }
                }
            }
        }
        Ok(plan)
    }

    /// Executes a plan from [`RelationEndPointManager::create_unregister_plan`].
    ///
    /// Owned virtual end points that still have registered opposites stay
    /// resident as incomplete end points.
    pub fn unregister_end_points(&mut self, plan: &UnregisterPlan) -> CoreResult<()> {
        for (id, opposite) in &plan.real {
            if self.map.contains(*id) {
                self.map.remove(*id)?;
            }
            if let Some(opposite) = opposite {
                self.unregister_original_opposite(*opposite, id.object_id())?;
            }
        }
        for id in &plan.virtual_end_points {
            let Some(end_point) = self.map.get(*id) else {
                continue;
            };
            if end_point.registered_opposites().is_empty() {
                self.map.remove(*id)?;
            } else {
                self.mark_incomplete(*id)?;
            }
        }
        Ok(())
    }

    fn unregister_original_opposite(
        &mut self,
        virtual_id: RelationEndPointId,
        owner: ObjectId,
    ) -> CoreResult<()> {
        let order_sensitive = self.order_sensitive;
        let Some(end_point) = self.map.get_mut(virtual_id) else {
            return Ok(());
        };
        with_load_state!(end_point, state => state.unregister_original_opposite(owner, order_sensitive))
            .transpose()?;
        self.collect(virtual_id)
    }

    /// Removes every end point owned by `container`, releasing its registrations.
    ///
    /// Used for discarded new objects and committed deletions.
    pub fn remove_end_points_of(&mut self, container: &DataContainer) -> CoreResult<()> {
        for id in self.map.ids_of(container.id()) {
            let removed = self.map.remove(id)?;
            if let RelationEndPoint::RealObject(real) = &removed {
                if let Some(opposite) = original_opposite(real, container)? {
                    self.release_registration(opposite, container.id())?;
                }
            }
        }
        Ok(())
    }

    fn release_registration(
        &mut self,
        virtual_id: RelationEndPointId,
        owner: ObjectId,
    ) -> CoreResult<()> {
        let Some(end_point) = self.map.get_mut(virtual_id) else {
            return Ok(());
        };
        with_load_state!(end_point, state => state.release_registration(owner));
        self.collect(virtual_id)
    }

    fn collect(&mut self, id: RelationEndPointId) -> CoreResult<()> {
        if self.map.get(id).is_some_and(RelationEndPoint::can_be_collected) {
            trace!(%id, "end point collected");
            self.map.remove(id)?;
        }
        Ok(())
    }

    /// Marks a virtual end point complete with the given opposites.
    ///
    /// A no-op if it already is complete.
    pub fn mark_complete(&mut self, id: RelationEndPointId, items: Vec<ObjectId>) -> CoreResult<()> {
        match self.get_or_create_virtual_end_point(id)? {
            RelationEndPoint::Collection(ep) => {
                ep.load_state_mut().mark_complete(CollectionData::new(items));
                Ok(())
            }
            RelationEndPoint::VirtualObject(ep) => {
                if items.len() > 1 {
                    return Err(CoreError::invalid_operation(format!(
                        "{id} can hold one object, got {}",
                        items.len()
                    )));
                }
                ep.load_state_mut()
                    .mark_complete(VirtualObjectData::new(items.first().copied()));
                Ok(())
            }
            RelationEndPoint::RealObject(_) => Err(CoreError::invalid_operation(format!(
                "{id} is not a virtual end point"
            ))),
        }
    }

    /// Drops the data of a virtual end point; removes it if nothing refers to it.
    pub fn mark_incomplete(&mut self, id: RelationEndPointId) -> CoreResult<()> {
        let order_sensitive = self.order_sensitive;
        let end_point = self.require_mut(id)?;
        with_load_state!(end_point, state => state.mark_incomplete(id, order_sensitive))
            .ok_or_else(|| {
                CoreError::invalid_operation(format!("{id} is a real end point and cannot be unloaded"))
            })??;
        self.collect(id)
    }

    /// Synchronization state of an end point.
    ///
    /// For real end points this is the view of the opposite virtual end point;
    /// a real end point with a null foreign key is always synchronized. `None`
    /// means the virtual side is not loaded.
    pub fn is_synchronized(
        &self,
        id: RelationEndPointId,
        containers: &DataContainerMap,
    ) -> CoreResult<Option<bool>> {
        match self.map.get(id) {
            Some(RelationEndPoint::RealObject(real)) => {
                let container = containers.require(id.object_id())?;
                let Some(opposite) = original_opposite(real, container)? else {
                    return Ok(Some(true));
                };
                Ok(match self.map.get(opposite) {
                    Some(RelationEndPoint::VirtualObject(ep)) => {
                        ep.load_state().is_opposite_synchronized(id.object_id())
                    }
                    Some(RelationEndPoint::Collection(ep)) => {
                        ep.load_state().is_opposite_synchronized(id.object_id())
                    }
                    _ => None,
                })
            }
            Some(RelationEndPoint::VirtualObject(ep)) => Ok(ep.load_state().is_synchronized()),
            Some(RelationEndPoint::Collection(ep)) => Ok(ep.load_state().is_synchronized()),
            None => Err(CoreError::invalid_operation(format!("{id} is not registered"))),
        }
    }

    /// Repairs a divergence between a real end point and its virtual counterpart.
    ///
    /// A real end point is adopted into its opposite's data; a virtual end
    /// point drops the items that no real end point confirms.
    pub fn synchronize(&mut self, id: RelationEndPointId, containers: &DataContainerMap) -> CoreResult<()> {
        let opposite = match self.map.get(id) {
            Some(RelationEndPoint::RealObject(real)) => {
                original_opposite(real, containers.require(id.object_id())?)?
            }
            Some(_) => {
                let end_point = self.require_mut(id)?;
                with_load_state!(end_point, state => state.synchronize());
                return Ok(());
            }
            None => return Err(CoreError::invalid_operation(format!("{id} is not registered"))),
        };
        if let Some(end_point) = opposite.and_then(|o| self.map.get_mut(o)) {
            if end_point.is_complete() {
                with_load_state!(end_point, state => state.synchronize_opposite(id.object_id()))
                    .transpose()?;
            }
        }
        Ok(())
    }

    /// Accepts all relation changes.
    ///
    /// Registrations of real end points whose foreign key changed move from the
    /// old opposite to the new one before the virtual data is committed.
    pub fn commit_all(&mut self, containers: &DataContainerMap) -> CoreResult<()> {
        let mut moves = Vec::new();
        for end_point in self.map.iter() {
            let RelationEndPoint::RealObject(real) = end_point else {
                continue;
            };
            let Some(container) = containers.get(real.id().object_id()) else {
                continue;
            };
            if real.opposite_property().is_none() || !real.has_changed(container) {
                continue;
            }
            let old = original_opposite(real, container)?;
            let new = real.opposite_end_point_id(container)?;
            moves.push((container.id(), old, new));
        }
        for (owner, old, new) in moves {
            if let Some(old) = old {
                self.release_registration(old, owner)?;
            }
            if let Some(new) = new {
                let end_point = self.get_or_create_virtual_end_point(new)?;
                with_load_state!(end_point, state => state.adopt_registration(owner));
            }
        }
        for end_point in self.map.iter_mut() {
            match end_point {
                RelationEndPoint::RealObject(ep) => ep.reset_touched(),
                RelationEndPoint::VirtualObject(ep) => ep.commit(),
                RelationEndPoint::Collection(ep) => ep.commit(),
            }
        }
        Ok(())
    }

    /// Restores the original data of every virtual end point.
    pub fn rollback_all(&mut self) {
        for end_point in self.map.iter_mut() {
            match end_point {
                RelationEndPoint::RealObject(ep) => ep.reset_touched(),
                RelationEndPoint::VirtualObject(ep) => ep.rollback(),
                RelationEndPoint::Collection(ep) => ep.rollback(),
            }
        }
    }

    /// Drops every end point without raising events.
    pub fn reset(&mut self) {
        self.map.clear();
    }

    /// Replaces the current data of a complete virtual end point.
    pub fn set_current_virtual_data(
        &mut self,
        id: RelationEndPointId,
        items: Vec<ObjectId>,
    ) -> CoreResult<()> {
        match self.require_mut(id)? {
            RelationEndPoint::Collection(ep) => {
                ep.require_data_mut()?.replace_current(items);
                ep.touch();
            }
            RelationEndPoint::VirtualObject(ep) => {
                ep.require_data_mut()?.set_current(items.first().copied());
                ep.touch();
            }
            RelationEndPoint::RealObject(_) => {
                return Err(CoreError::invalid_operation(format!(
                    "{id} is not a virtual end point"
                )))
            }
        }
        Ok(())
    }

    /// Virtual end points whose data changed.
    #[must_use]
    pub fn changed_virtual_end_points(&self) -> Vec<RelationEndPointId> {
        self.map
            .iter()
            .filter(|ep| ep.has_virtual_changes(self.order_sensitive))
            .map(RelationEndPoint::id)
            .collect()
    }

    /// Marks an end point as written.
    pub fn touch(&mut self, id: RelationEndPointId) -> CoreResult<()> {
        self.require_mut(id)?.touch();
        Ok(())
    }
}

fn create_virtual(
    id: RelationEndPointId,
    definition: &RelationEndPointDefinition,
    complete: bool,
) -> CoreResult<RelationEndPoint> {
    let opposite = definition
        .opposite_property()
        .ok_or_else(|| CoreError::mapping(format!("{id} has no opposite property")))?;
    match definition.kind() {
        EndPointKind::VirtualObject => Ok(RelationEndPoint::VirtualObject(if complete {
            VirtualEndPoint::complete(id, opposite, VirtualObjectData::default())
        } else {
            VirtualEndPoint::incomplete(id, opposite)
        })),
        EndPointKind::VirtualCollection => Ok(RelationEndPoint::Collection(if complete {
            VirtualEndPoint::complete(id, opposite, CollectionData::default())
        } else {
            VirtualEndPoint::incomplete(id, opposite)
        })),
        EndPointKind::Real | EndPointKind::Anonymous => Err(CoreError::invalid_operation(
            format!("{id} is not a virtual end point"),
        )),
    }
}

fn original_opposite(
    real: &RealObjectEndPoint,
    container: &DataContainer,
) -> CoreResult<Option<RelationEndPointId>> {
    Ok(real
        .original_opposite_object_id(container)?
        .zip(real.opposite_property())
        .map(|(object, property)| RelationEndPointId::new(object, property)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::MappingBuilder;
    use crate::types::{ClassId, ObjectKey};
    use crate::value::Value;

    fn mapping() -> Arc<MappingConfiguration> {
        Arc::new(
            MappingBuilder::new()
                .class("Customer")
                .class("Order")
                .one_to_many(("Customer", "Orders"), ("Order", "Customer"))
                .build()
                .unwrap(),
        )
    }

    fn customer() -> ObjectId {
        ObjectId::new(ClassId::new("Customer"), ObjectKey::from_u128(100))
    }

    fn order(key: u128) -> ObjectId {
        ObjectId::new(ClassId::new("Order"), ObjectKey::from_u128(key))
    }

    fn orders_of_customer() -> RelationEndPointId {
        RelationEndPointId::new(customer(), "Orders")
    }

    fn order_container(key: u128, customer: Option<ObjectId>) -> DataContainer {
        DataContainer::for_existing(order(key), None, [("Customer", Value::from(customer))])
    }

    fn setup() -> (RelationEndPointManager, DataContainerMap) {
        let tx = TransactionId::new(1);
        let events = Arc::new(TransactionEventSink::new(tx));
        (
            RelationEndPointManager::new(tx, Arc::clone(&events), mapping(), false),
            DataContainerMap::new(tx, events),
        )
    }

    fn register(
        manager: &mut RelationEndPointManager,
        containers: &mut DataContainerMap,
        container: DataContainer,
    ) {
        manager.register_end_points_for_data_container(&container).unwrap();
        containers.register(container).unwrap();
    }

    struct VetoOpposite(RelationEndPointId);

    impl crate::events::TransactionListener for VetoOpposite {
        fn relation_end_point_map_registering(
            &self,
            _tx: TransactionId,
            end_point: &RelationEndPoint,
        ) -> CoreResult<()> {
            if end_point.id() == self.0 {
                return Err(CoreError::invalid_operation("vetoed"));
            }
            Ok(())
        }
    }

    #[test]
    fn failed_registration_leaves_no_end_points_behind() {
        let tx = TransactionId::new(1);
        let events = Arc::new(TransactionEventSink::new(tx));
        events.add_listener(Arc::new(VetoOpposite(orders_of_customer())));
        let mut manager = RelationEndPointManager::new(tx, events, mapping(), false);

        let container = order_container(1, Some(customer()));
        assert!(manager.register_end_points_for_data_container(&container).is_err());
        assert!(manager.map().is_empty());
    }

    #[test]
    fn real_registration_creates_incomplete_opposite() {
        let (mut manager, mut containers) = setup();
        register(&mut manager, &mut containers, order_container(1, Some(customer())));

        let opposite = manager
            .get_relation_end_point_without_loading(orders_of_customer())
            .unwrap();
        assert!(!opposite.is_complete());
        assert_eq!(opposite.registered_opposites().len(), 1);
        assert_eq!(
            manager
                .is_synchronized(RelationEndPointId::new(order(1), "Customer"), &containers)
                .unwrap(),
            None
        );
    }

    #[test]
    fn completion_synchronizes_registered_real_end_points() {
        let (mut manager, mut containers) = setup();
        register(&mut manager, &mut containers, order_container(1, Some(customer())));
        register(&mut manager, &mut containers, order_container(2, Some(customer())));
        manager.mark_complete(orders_of_customer(), vec![order(1)]).unwrap();

        let sync = |manager: &RelationEndPointManager, key| {
            manager
                .is_synchronized(RelationEndPointId::new(order(key), "Customer"), &containers)
                .unwrap()
        };
        assert_eq!(sync(&manager, 1), Some(true));
        assert_eq!(sync(&manager, 2), Some(false));

        manager
            .synchronize(RelationEndPointId::new(order(2), "Customer"), &containers)
            .unwrap();
        assert_eq!(sync(&manager, 2), Some(true));
        let items = manager
            .get_relation_end_point_without_loading(orders_of_customer())
            .and_then(RelationEndPoint::current_virtual_items)
            .unwrap();
        assert_eq!(items, vec![order(1), order(2)]);
    }

    #[test]
    fn unregister_plan_rejects_changed_opposite() {
        let (mut manager, mut containers) = setup();
        register(&mut manager, &mut containers, order_container(1, Some(customer())));
        manager.mark_complete(orders_of_customer(), vec![order(1)]).unwrap();
        manager
            .set_current_virtual_data(orders_of_customer(), vec![])
            .unwrap();

        let container = containers.require(order(1)).unwrap();
        let err = manager.create_unregister_plan(&[container]).unwrap_err();
        assert!(matches!(err, CoreError::CannotUnload { .. }));
    }

    #[test]
    fn unregistering_marks_opposite_incomplete() {
        let (mut manager, mut containers) = setup();
        register(&mut manager, &mut containers, order_container(1, Some(customer())));
        register(&mut manager, &mut containers, order_container(2, Some(customer())));
        manager
            .mark_complete(orders_of_customer(), vec![order(1), order(2)])
            .unwrap();

        let plan = manager
            .create_unregister_plan(&[containers.require(order(1)).unwrap()])
            .unwrap();
        manager.unregister_end_points(&plan).unwrap();

        let opposite = manager
            .get_relation_end_point_without_loading(orders_of_customer())
            .unwrap();
        assert!(!opposite.is_complete());
        assert_eq!(opposite.registered_opposites().into_iter().collect::<Vec<_>>(), vec![order(2)]);
    }

    #[test]
    fn last_unregistration_collects_incomplete_opposite() {
        let (mut manager, mut containers) = setup();
        register(&mut manager, &mut containers, order_container(1, Some(customer())));

        let plan = manager
            .create_unregister_plan(&[containers.require(order(1)).unwrap()])
            .unwrap();
        manager.unregister_end_points(&plan).unwrap();
        assert!(manager.map().is_empty());
    }

    #[test]
    fn commit_moves_registration_to_new_opposite() {
        let (mut manager, mut containers) = setup();
        register(&mut manager, &mut containers, order_container(1, None));
        manager.mark_complete(orders_of_customer(), vec![]).unwrap();

        containers
            .require_mut(order(1))
            .unwrap()
            .set_value("Customer", Value::Object(customer()))
            .unwrap();
        manager
            .set_current_virtual_data(orders_of_customer(), vec![order(1)])
            .unwrap();
        manager.commit_all(&containers).unwrap();

        let opposite = manager
            .get_relation_end_point_without_loading(orders_of_customer())
            .unwrap();
        assert!(!opposite.has_virtual_changes(false));
        assert!(opposite.registered_opposites().contains(&order(1)));
    }
}
