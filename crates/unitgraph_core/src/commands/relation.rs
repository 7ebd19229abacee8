//! Relation modification commands.
//!
//! Each command changes one end point. Expanding it yields the commands for
//! the other sides of the relation as well, so the real and virtual sides
//! stay consistent once all of them have been performed.

use super::{raise_first, Command, ExpandedCommand, MutationKind, PerformHooks};
use crate::data_manager::DataManager;
use crate::error::{CoreError, CoreResult};
use crate::events::TransactionListener;
use crate::loading::LazyLoader;
use crate::mapping::{EndPointKind, RelationEndPointDefinition};
use crate::types::{ObjectId, RelationEndPointId};
use std::sync::Arc;

/// Checks shared by every relation command: the end point must be mapped
/// with one of `kinds`, its owner must be usable and `related` (if any) must
/// be a valid target.
fn validate(
    data: &DataManager,
    end_point: RelationEndPointId,
    kinds: &[EndPointKind],
    related: Option<ObjectId>,
) -> Vec<CoreError> {
    let mut exceptions = Vec::new();
    match data.mapping().end_point(&end_point) {
        Ok(definition) => {
            if !kinds.contains(&definition.kind()) {
                exceptions.push(CoreError::invalid_operation(format!(
                    "{end_point} is a {:?} end point",
                    definition.kind()
                )));
            }
            if let Some(related) = related {
                if let Err(error) = data.check_relation_target(definition, related) {
                    exceptions.push(error);
                }
            }
        }
        Err(error) => exceptions.push(error),
    }
    if let Err(error) = data.check_object_usable(end_point.object_id()) {
        exceptions.push(error);
    }
    exceptions
}

fn opposite_of(
    data: &DataManager,
    end_point: RelationEndPointId,
) -> CoreResult<Option<(RelationEndPointDefinition, &'static str, EndPointKind)>> {
    let mapping = data.mapping();
    let definition = mapping.end_point(&end_point)?;
    let Some(opposite) = mapping.opposite(definition)? else {
        return Ok(None);
    };
    Ok(Some((
        definition.clone(),
        opposite.property(),
        opposite.kind(),
    )))
}

/// Sets the opposite of a real or virtual object end point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEndPointSetCommand {
    end_point: RelationEndPointId,
    kind: MutationKind,
    old: Option<ObjectId>,
    new: Option<ObjectId>,
    exceptions: Vec<CoreError>,
}

impl ObjectEndPointSetCommand {
    /// Creates a command setting `end_point` to `new`.
    ///
    /// The current opposite is read from `data`; a virtual end point must be
    /// loaded already.
    #[must_use]
    pub fn new(data: &DataManager, end_point: RelationEndPointId, new: Option<ObjectId>) -> Self {
        let mut exceptions = validate(
            data,
            end_point,
            &[EndPointKind::Real, EndPointKind::VirtualObject],
            new,
        );
        let kind = match data.mapping().end_point(&end_point).map(|d| d.kind()) {
            Ok(EndPointKind::VirtualObject) => MutationKind::VirtualObjectSet,
            _ => MutationKind::RealObjectSet,
        };
        let mut old = None;
        if exceptions.is_empty() {
            match data.current_opposite(end_point) {
                Ok(current) => old = current,
                Err(error) => exceptions.push(error),
            }
        }
        Self {
            end_point,
            kind,
            old,
            new,
            exceptions,
        }
    }

    /// The end point being changed.
    #[must_use]
    pub fn end_point(&self) -> RelationEndPointId {
        self.end_point
    }

    /// Real or virtual object mutation.
    #[must_use]
    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    /// Opposite before the change.
    #[must_use]
    pub fn old_related_object(&self) -> Option<ObjectId> {
        self.old
    }

    /// Opposite after the change.
    #[must_use]
    pub fn new_related_object(&self) -> Option<ObjectId> {
        self.new
    }

    /// Returns `true` if the command would not change anything.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.old == self.new
    }
}

impl Command for ObjectEndPointSetCommand {
    fn get_all_exceptions(&self) -> Vec<CoreError> {
        self.exceptions.clone()
    }

    fn begin(&mut self, data: &mut DataManager) -> CoreResult<()> {
        raise_first(&self.exceptions)?;
        Arc::clone(data.events()).relation_changing(
            data.transaction_id(),
            self.end_point,
            self.old,
            self.new,
        )
    }

    fn perform(&mut self, data: &mut DataManager) -> CoreResult<()> {
        raise_first(&self.exceptions)?;
        let (end_point, new) = (self.end_point, self.new);
        match self.kind {
            MutationKind::RealObjectSet => PerformHooks::run(self.kind, data, end_point, |data| {
                data.set_real_opposite(end_point, new)
            }),
            _ => PerformHooks::run(self.kind, data, end_point, |data| {
                data.set_virtual_opposite(end_point, new)
            }),
        }
    }

    fn end(&mut self, data: &mut DataManager) -> CoreResult<()> {
        raise_first(&self.exceptions)?;
        Arc::clone(data.events()).relation_changed(
            data.transaction_id(),
            self.end_point,
            self.old,
            self.new,
        );
        Ok(())
    }

    fn expand_to_all_related_objects(
        self: Box<Self>,
        data: &mut DataManager,
        loader: &mut dyn LazyLoader,
    ) -> CoreResult<ExpandedCommand> {
        if !self.exceptions.is_empty() || self.is_noop() {
            return Ok(ExpandedCommand::new(vec![self]));
        }
        let Some((definition, opposite_property, opposite_kind)) = opposite_of(data, self.end_point)?
        else {
            return Ok(ExpandedCommand::new(vec![self]));
        };
        let owner = self.end_point.object_id();
        let mut related: Vec<Box<dyn Command>> = Vec::new();

        match self.kind {
            MutationKind::RealObjectSet => {
                if let Some(old) = self.old {
                    let old_end_point = RelationEndPointId::new(old, opposite_property);
                    data.get_relation_end_point_with_lazy_load(old_end_point, loader)?;
                    related.push(if opposite_kind == EndPointKind::VirtualCollection {
                        Box::new(CollectionEndPointRemoveCommand::new(data, old_end_point, owner))
                    } else {
                        Box::new(ObjectEndPointSetCommand::new(data, old_end_point, None))
                    });
                }
                if let Some(new) = self.new {
                    let new_end_point = RelationEndPointId::new(new, opposite_property);
                    data.get_relation_end_point_with_lazy_load(new_end_point, loader)?;
                    if opposite_kind == EndPointKind::VirtualCollection {
                        related.push(Box::new(CollectionEndPointInsertCommand::new(
                            data,
                            new_end_point,
                            None,
                            owner,
                        )));
                    } else {
                        let previous = data.current_opposite(new_end_point)?;
                        related.push(Box::new(ObjectEndPointSetCommand::new(
                            data,
                            new_end_point,
                            Some(owner),
                        )));
                        if let Some(previous) = previous.filter(|p| *p != owner) {
                            let previous_real = RelationEndPointId::new(previous, definition.property());
                            related.push(Box::new(ObjectEndPointSetCommand::new(
                                data,
                                previous_real,
                                None,
                            )));
                        }
                    }
                }
            }
            MutationKind::VirtualObjectSet => {
                if let Some(old) = self.old {
                    let old_real = RelationEndPointId::new(old, opposite_property);
                    related.push(Box::new(ObjectEndPointSetCommand::new(data, old_real, None)));
                }
                if let Some(new) = self.new {
                    data.get_data_container_with_lazy_load(new, true, loader)?;
                    let new_real = RelationEndPointId::new(new, opposite_property);
                    let previous = data.current_opposite(new_real)?;
                    related.push(Box::new(ObjectEndPointSetCommand::new(
                        data,
                        new_real,
                        Some(owner),
                    )));
                    if let Some(previous) = previous.filter(|p| *p != owner) {
                        let previous_virtual = RelationEndPointId::new(previous, definition.property());
                        data.get_relation_end_point_with_lazy_load(previous_virtual, loader)?;
                        related.push(Box::new(ObjectEndPointSetCommand::new(
                            data,
                            previous_virtual,
                            None,
                        )));
                    }
                }
            }
            MutationKind::CollectionInsert | MutationKind::CollectionRemove => {}
        }

        let mut commands: Vec<Box<dyn Command>> = vec![self];
        commands.extend(related);
        Ok(ExpandedCommand::new(commands))
    }
}

/// Inserts an object into a collection end point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionEndPointInsertCommand {
    end_point: RelationEndPointId,
    index: Option<usize>,
    item: ObjectId,
    exceptions: Vec<CoreError>,
}

impl CollectionEndPointInsertCommand {
    /// Creates a command inserting `item` at `index`, or appending it if
    /// `index` is `None`. The collection must be loaded already.
    #[must_use]
    pub fn new(
        data: &DataManager,
        end_point: RelationEndPointId,
        index: Option<usize>,
        item: ObjectId,
    ) -> Self {
        let mut exceptions = validate(
            data,
            end_point,
            &[EndPointKind::VirtualCollection],
            Some(item),
        );
        if exceptions.is_empty() {
            match data.current_items(end_point) {
                Ok(items) if items.contains(&item) => exceptions.push(
                    CoreError::invalid_operation(format!("{item} is already part of {end_point}")),
                ),
                Ok(items) if index.is_some_and(|i| i > items.len()) => {
                    exceptions.push(CoreError::invalid_operation(format!(
                        "index {} is out of range for {end_point} with {} items",
                        index.unwrap_or_default(),
                        items.len()
                    )));
                }
                Ok(_) => {}
                Err(error) => exceptions.push(error),
            }
        }
        Self {
            end_point,
            index,
            item,
            exceptions,
        }
    }

    /// The collection end point.
    #[must_use]
    pub fn end_point(&self) -> RelationEndPointId {
        self.end_point
    }

    /// The inserted object.
    #[must_use]
    pub fn item(&self) -> ObjectId {
        self.item
    }
}

impl Command for CollectionEndPointInsertCommand {
    fn get_all_exceptions(&self) -> Vec<CoreError> {
        self.exceptions.clone()
    }

    fn begin(&mut self, data: &mut DataManager) -> CoreResult<()> {
        raise_first(&self.exceptions)?;
        Arc::clone(data.events()).relation_changing(
            data.transaction_id(),
            self.end_point,
            None,
            Some(self.item),
        )
    }

    fn perform(&mut self, data: &mut DataManager) -> CoreResult<()> {
        raise_first(&self.exceptions)?;
        let (end_point, index, item) = (self.end_point, self.index, self.item);
        PerformHooks::run(MutationKind::CollectionInsert, data, end_point, |data| {
            data.insert_collection_item(end_point, index, item)
        })
    }

    fn end(&mut self, data: &mut DataManager) -> CoreResult<()> {
        raise_first(&self.exceptions)?;
        Arc::clone(data.events()).relation_changed(
            data.transaction_id(),
            self.end_point,
            None,
            Some(self.item),
        );
        Ok(())
    }

    fn expand_to_all_related_objects(
        self: Box<Self>,
        data: &mut DataManager,
        loader: &mut dyn LazyLoader,
    ) -> CoreResult<ExpandedCommand> {
        if !self.exceptions.is_empty() {
            return Ok(ExpandedCommand::new(vec![self]));
        }
        let Some((definition, opposite_property, _)) = opposite_of(data, self.end_point)? else {
            return Ok(ExpandedCommand::new(vec![self]));
        };
        let owner = self.end_point.object_id();
        let item = self.item;
        data.get_data_container_with_lazy_load(item, true, loader)?;

        let item_real = RelationEndPointId::new(item, opposite_property);
        let previous = data.current_opposite(item_real)?;
        let mut commands: Vec<Box<dyn Command>> = vec![self];
        commands.push(Box::new(ObjectEndPointSetCommand::new(
            data,
            item_real,
            Some(owner),
        )));
        if let Some(previous) = previous.filter(|p| *p != owner) {
            let previous_collection = RelationEndPointId::new(previous, definition.property());
            data.get_relation_end_point_with_lazy_load(previous_collection, loader)?;
            if data.current_items(previous_collection)?.contains(&item) {
                commands.push(Box::new(CollectionEndPointRemoveCommand::new(
                    data,
                    previous_collection,
                    item,
                )));
            }
        }
        Ok(ExpandedCommand::new(commands))
    }
}

/// Removes an object from a collection end point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionEndPointRemoveCommand {
    end_point: RelationEndPointId,
    item: ObjectId,
    exceptions: Vec<CoreError>,
}

impl CollectionEndPointRemoveCommand {
    /// Creates a command removing `item`. The collection must be loaded already.
    #[must_use]
    pub fn new(data: &DataManager, end_point: RelationEndPointId, item: ObjectId) -> Self {
        let mut exceptions = validate(data, end_point, &[EndPointKind::VirtualCollection], None);
        if exceptions.is_empty() {
            match data.current_items(end_point) {
                Ok(items) if !items.contains(&item) => exceptions.push(
                    CoreError::invalid_operation(format!("{item} is not part of {end_point}")),
                ),
                Ok(_) => {}
                Err(error) => exceptions.push(error),
            }
        }
        Self {
            end_point,
            item,
            exceptions,
        }
    }

    /// The collection end point.
    #[must_use]
    pub fn end_point(&self) -> RelationEndPointId {
        self.end_point
    }

    /// The removed object.
    #[must_use]
    pub fn item(&self) -> ObjectId {
        self.item
    }
}

impl Command for CollectionEndPointRemoveCommand {
    fn get_all_exceptions(&self) -> Vec<CoreError> {
        self.exceptions.clone()
    }

    fn begin(&mut self, data: &mut DataManager) -> CoreResult<()> {
        raise_first(&self.exceptions)?;
        Arc::clone(data.events()).relation_changing(
            data.transaction_id(),
            self.end_point,
            Some(self.item),
            None,
        )
    }

    fn perform(&mut self, data: &mut DataManager) -> CoreResult<()> {
        raise_first(&self.exceptions)?;
        let (end_point, item) = (self.end_point, self.item);
        PerformHooks::run(MutationKind::CollectionRemove, data, end_point, |data| {
            data.remove_collection_item(end_point, item)
        })
    }

    fn end(&mut self, data: &mut DataManager) -> CoreResult<()> {
        raise_first(&self.exceptions)?;
        Arc::clone(data.events()).relation_changed(
            data.transaction_id(),
            self.end_point,
            Some(self.item),
            None,
        );
        Ok(())
    }

    fn expand_to_all_related_objects(
        self: Box<Self>,
        data: &mut DataManager,
        _loader: &mut dyn LazyLoader,
    ) -> CoreResult<ExpandedCommand> {
        if !self.exceptions.is_empty() {
            return Ok(ExpandedCommand::new(vec![self]));
        }
        let Some((_, opposite_property, _)) = opposite_of(data, self.end_point)? else {
            return Ok(ExpandedCommand::new(vec![self]));
        };
        let item_real = RelationEndPointId::new(self.item, opposite_property);
        let unset = ObjectEndPointSetCommand::new(data, item_real, None);
        Ok(ExpandedCommand::new(vec![self, Box::new(unset)]))
    }
}
