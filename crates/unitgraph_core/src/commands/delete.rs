//! Object deletion.

use super::{
    raise_first, CollectionEndPointRemoveCommand, Command, ExpandedCommand,
    ObjectEndPointSetCommand,
};
use crate::data_manager::DataManager;
use crate::error::{CoreError, CoreResult};
use crate::events::TransactionListener;
use crate::loading::LazyLoader;
use crate::mapping::EndPointKind;
use crate::types::{ObjectId, RelationEndPointId};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Deletes one object.
///
/// New objects are discarded and become invalid at once; existing objects
/// are marked deleted and removed from storage on commit. The object's own
/// end points are cleared by `perform`; the other sides of its relations
/// are handled by the commands added in
/// [`expand_to_all_related_objects`](Command::expand_to_all_related_objects).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteCommand {
    id: ObjectId,
    exceptions: Vec<CoreError>,
}

impl DeleteCommand {
    /// Creates a command deleting `id`, which must be loaded.
    #[must_use]
    pub fn new(data: &DataManager, id: ObjectId) -> Self {
        let exceptions = data.check_object_usable(id).err().into_iter().collect();
        Self { id, exceptions }
    }

    /// The object to delete.
    #[must_use]
    pub fn object_id(&self) -> ObjectId {
        self.id
    }
}

impl Command for DeleteCommand {
    fn get_all_exceptions(&self) -> Vec<CoreError> {
        self.exceptions.clone()
    }

    fn begin(&mut self, data: &mut DataManager) -> CoreResult<()> {
        raise_first(&self.exceptions)?;
        Arc::clone(data.events()).object_deleting(data.transaction_id(), self.id)
    }

    fn perform(&mut self, data: &mut DataManager) -> CoreResult<()> {
        raise_first(&self.exceptions)?;
        data.perform_delete(self.id)
    }

    fn end(&mut self, data: &mut DataManager) -> CoreResult<()> {
        raise_first(&self.exceptions)?;
        Arc::clone(data.events()).object_deleted(data.transaction_id(), self.id);
        Ok(())
    }

    /// Adds one relation command per distinct end point referencing the
    /// deleted object: removal from opposite collections and nulling of
    /// opposite object end points.
    fn expand_to_all_related_objects(
        self: Box<Self>,
        data: &mut DataManager,
        loader: &mut dyn LazyLoader,
    ) -> CoreResult<ExpandedCommand> {
        if !self.exceptions.is_empty() {
            return Ok(ExpandedCommand::new(vec![self]));
        }
        let id = self.id;
        let mapping = Arc::clone(data.mapping());
        let class = mapping.class(id.class_id())?;
        let mut seen = BTreeSet::new();
        let mut related: Vec<Box<dyn Command>> = Vec::new();

        for definition in class.end_points() {
            let end_point = RelationEndPointId::new(id, definition.property());
            let Some(opposite) = mapping.opposite(definition)? else {
                continue;
            };
            match definition.kind() {
                EndPointKind::Real => {
                    let Some(target) = data.current_opposite(end_point)? else {
                        continue;
                    };
                    let opposite_end_point = RelationEndPointId::new(target, opposite.property());
                    if !seen.insert(opposite_end_point) {
                        continue;
                    }
                    data.get_relation_end_point_with_lazy_load(opposite_end_point, loader)?;
                    if opposite.kind() == EndPointKind::VirtualCollection {
                        if data.current_items(opposite_end_point)?.contains(&id) {
                            related.push(Box::new(CollectionEndPointRemoveCommand::new(
                                data,
                                opposite_end_point,
                                id,
                            )));
                        }
                    } else if data.current_opposite(opposite_end_point)? == Some(id) {
                        related.push(Box::new(ObjectEndPointSetCommand::new(
                            data,
                            opposite_end_point,
                            None,
                        )));
                    }
                }
                EndPointKind::VirtualObject | EndPointKind::VirtualCollection => {
                    data.get_relation_end_point_with_lazy_load(end_point, loader)?;
                    for item in data.related_object_ids(end_point, loader)? {
                        let item_real = RelationEndPointId::new(item, opposite.property());
                        if seen.insert(item_real) {
                            related.push(Box::new(ObjectEndPointSetCommand::new(
                                data, item_real, None,
                            )));
                        }
                    }
                }
                EndPointKind::Anonymous => {}
            }
        }

        debug!(%id, related = related.len(), "delete expanded");
        let mut commands: Vec<Box<dyn Command>> = vec![self];
        commands.extend(related);
        Ok(ExpandedCommand::new(commands))
    }
}
