//! Unloading of objects and relation data.

use super::{notify_unloading_until_stable, raise_first, Command, ExpandedCommand, Phase};
use crate::data::{DataContainer, ObjectState};
use crate::data_manager::DataManager;
use crate::error::{CoreError, CoreResult};
use crate::events::TransactionListener;
use crate::loading::LazyLoader;
use crate::relations::UnregisterPlan;
use crate::types::{ObjectId, RelationEndPointId};
use std::sync::Arc;
use tracing::debug;

/// Removes unchanged objects from a transaction so they are reloaded on next
/// access.
///
/// Identities that are not loaded are skipped. Changed, new or deleted
/// objects, and objects whose relations have pending changes, cannot be
/// unloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnloadCommand {
    ids: Vec<ObjectId>,
    plan: UnregisterPlan,
    exceptions: Vec<CoreError>,
    phase: Phase,
}

impl UnloadCommand {
    /// Creates a command unloading `ids` from `data`.
    #[must_use]
    pub fn new(data: &DataManager, ids: &[ObjectId]) -> Self {
        let mut registered: Vec<ObjectId> = Vec::new();
        for id in ids {
            if data.data_containers().contains(*id) && !registered.contains(id) {
                registered.push(*id);
            }
        }
        let mut exceptions = Vec::new();
        let containers: Vec<&DataContainer> = registered
            .iter()
            .filter_map(|id| data.data_containers().get(*id))
            .collect();
        for container in &containers {
            let state = container.state();
            if state != ObjectState::Unchanged {
                exceptions.push(CoreError::cannot_unload(
                    container.id(),
                    format!("the object is {state:?}"),
                ));
            }
        }
        let plan = if exceptions.is_empty() {
            data.end_point_manager()
                .create_unregister_plan(&containers)
                .unwrap_or_else(|error| {
                    exceptions.push(error);
                    UnregisterPlan::default()
                })
        } else {
            UnregisterPlan::default()
        };
        Self {
            ids: registered,
            plan,
            exceptions,
            phase: Phase::default(),
        }
    }

    /// The loaded objects this command unloads.
    #[must_use]
    pub fn object_ids(&self) -> &[ObjectId] {
        &self.ids
    }
}

impl Command for UnloadCommand {
    fn get_all_exceptions(&self) -> Vec<CoreError> {
        self.exceptions.clone()
    }

    fn begin(&mut self, data: &mut DataManager) -> CoreResult<()> {
        raise_first(&self.exceptions)?;
        self.phase = Phase::Begun;
        if self.ids.is_empty() {
            return Ok(());
        }
        let events = Arc::clone(data.events());
        events.objects_unloading(data.transaction_id(), &self.ids, data)
    }

    fn perform(&mut self, data: &mut DataManager) -> CoreResult<()> {
        raise_first(&self.exceptions)?;
        self.phase.perform("unload")?;
        data.unregister_objects(&self.ids, &self.plan)?;
        debug!(tx = %data.transaction_id(), count = self.ids.len(), "objects unloaded");
        Ok(())
    }

    fn end(&mut self, data: &mut DataManager) -> CoreResult<()> {
        raise_first(&self.exceptions)?;
        if self.phase.is_performed() && !self.ids.is_empty() {
            Arc::clone(data.events()).objects_unloaded(data.transaction_id(), &self.ids);
        }
        Ok(())
    }

    fn expand_to_all_related_objects(
        self: Box<Self>,
        _data: &mut DataManager,
        _loader: &mut dyn LazyLoader,
    ) -> CoreResult<ExpandedCommand> {
        Ok(ExpandedCommand::new(vec![self]))
    }
}

/// Drops the data of complete virtual end points so they are reloaded on
/// next access.
///
/// Unknown and already incomplete end points are skipped. The owners of the
/// affected end points are notified as unloading and unloaded; their own
/// property data stays loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnloadVirtualEndPointsCommand {
    end_points: Vec<RelationEndPointId>,
    exceptions: Vec<CoreError>,
    notified: Vec<ObjectId>,
    phase: Phase,
}

impl UnloadVirtualEndPointsCommand {
    /// Creates a command unloading `end_points` in `data`.
    #[must_use]
    pub fn new(data: &DataManager, end_points: &[RelationEndPointId]) -> Self {
        let order_sensitive = data.end_point_manager().is_order_sensitive();
        let mut targets = Vec::new();
        let mut exceptions = Vec::new();
        for id in end_points {
            let Some(end_point) = data.get_relation_end_point_without_loading(*id) else {
                continue;
            };
            if !end_point.is_virtual() {
                exceptions.push(CoreError::cannot_unload(
                    id,
                    "real end points are unloaded with their object",
                ));
            } else if !end_point.is_complete() || targets.contains(id) {
                continue;
            } else if !end_point.can_be_marked_incomplete(order_sensitive) {
                exceptions.push(CoreError::cannot_unload(id, "the relation has been changed"));
            } else {
                targets.push(*id);
            }
        }
        Self {
            end_points: targets,
            exceptions,
            notified: Vec::new(),
            phase: Phase::default(),
        }
    }

    /// The complete end points this command unloads.
    #[must_use]
    pub fn end_points(&self) -> &[RelationEndPointId] {
        &self.end_points
    }

    fn owners(&self) -> Vec<ObjectId> {
        let mut owners: Vec<ObjectId> = Vec::new();
        for id in &self.end_points {
            if !owners.contains(&id.object_id()) {
                owners.push(id.object_id());
            }
        }
        owners
    }
}

impl Command for UnloadVirtualEndPointsCommand {
    fn get_all_exceptions(&self) -> Vec<CoreError> {
        self.exceptions.clone()
    }

    fn begin(&mut self, data: &mut DataManager) -> CoreResult<()> {
        raise_first(&self.exceptions)?;
        let owners = self.owners();
        self.notified = notify_unloading_until_stable(data, |_| owners.clone())?;
        self.phase = Phase::Begun;
        Ok(())
    }

    fn perform(&mut self, data: &mut DataManager) -> CoreResult<()> {
        raise_first(&self.exceptions)?;
        self.phase.perform("unload virtual end points")?;
        for id in &self.end_points {
            if data
                .get_relation_end_point_without_loading(*id)
                .is_some_and(|ep| ep.is_complete())
            {
                data.end_point_manager_mut().mark_incomplete(*id)?;
            }
        }
        debug!(
            tx = %data.transaction_id(),
            count = self.end_points.len(),
            "virtual end points unloaded"
        );
        Ok(())
    }

    fn end(&mut self, data: &mut DataManager) -> CoreResult<()> {
        raise_first(&self.exceptions)?;
        if !self.phase.is_performed() {
            return Ok(());
        }
        let events = Arc::clone(data.events());
        let tx = data.transaction_id();
        for id in &self.end_points {
            events.virtual_relation_end_point_state_updated(tx, *id, None);
        }
        if !self.notified.is_empty() {
            events.objects_unloaded(tx, &self.notified);
        }
        Ok(())
    }

    fn expand_to_all_related_objects(
        self: Box<Self>,
        _data: &mut DataManager,
        _loader: &mut dyn LazyLoader,
    ) -> CoreResult<ExpandedCommand> {
        Ok(ExpandedCommand::new(vec![self]))
    }
}

/// Empties a transaction.
///
/// `begin` notifies every registered object as unloading, repeating for
/// objects registered by listeners until a pass adds nothing. `perform`
/// unregisters every container (new ones are discarded and become invalid)
/// and drops all end points. `end` reports the unloaded objects only if
/// `perform` ran.
#[derive(Debug, Default)]
pub struct UnloadAllCommand {
    notified: Vec<ObjectId>,
    unloaded: Vec<DataContainer>,
    phase: Phase,
}

impl UnloadAllCommand {
    /// Creates the command.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Objects notified as unloading by `begin`.
    #[must_use]
    pub fn notified_objects(&self) -> &[ObjectId] {
        &self.notified
    }

    /// The containers removed by `perform`.
    #[must_use]
    pub fn unloaded_containers(&self) -> &[DataContainer] {
        &self.unloaded
    }

    /// Returns `true` once `perform` has run.
    #[must_use]
    pub fn was_performed(&self) -> bool {
        self.phase.is_performed()
    }
}

impl Command for UnloadAllCommand {
    fn get_all_exceptions(&self) -> Vec<CoreError> {
        Vec::new()
    }

    fn begin(&mut self, data: &mut DataManager) -> CoreResult<()> {
        self.notified = notify_unloading_until_stable(data, |data| data.data_containers().ids())?;
        self.phase = Phase::Begun;
        Ok(())
    }

    fn perform(&mut self, data: &mut DataManager) -> CoreResult<()> {
        self.phase.perform("unload all")?;
        self.unloaded = data.unregister_all()?;
        debug!(
            tx = %data.transaction_id(),
            count = self.unloaded.len(),
            "transaction unloaded"
        );
        Ok(())
    }

    fn end(&mut self, data: &mut DataManager) -> CoreResult<()> {
        if !self.phase.is_performed() || self.unloaded.is_empty() {
            return Ok(());
        }
        let ids: Vec<ObjectId> = self.unloaded.iter().map(DataContainer::id).collect();
        Arc::clone(data.events()).objects_unloaded(data.transaction_id(), &ids);
        Ok(())
    }

    fn expand_to_all_related_objects(
        self: Box<Self>,
        _data: &mut DataManager,
        _loader: &mut dyn LazyLoader,
    ) -> CoreResult<ExpandedCommand> {
        Ok(ExpandedCommand::new(vec![self]))
    }
}
