//! Cross-cutting steps around relation mutations.
//!
//! Relation commands do not wrap each other. Instead each mutation kind has a
//! fixed list of steps that run immediately before and after the mutation
//! itself, inside `perform`.

use crate::data_manager::DataManager;
use crate::error::{CoreError, CoreResult};
use crate::events::TransactionListener;
use crate::types::RelationEndPointId;
use std::sync::Arc;

/// The kind of end point mutation a relation command performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    /// The foreign key of a real end point is replaced.
    RealObjectSet,
    /// The opposite of a virtual object end point is replaced.
    VirtualObjectSet,
    /// An item is inserted into a collection end point.
    CollectionInsert,
    /// An item is removed from a collection end point.
    CollectionRemove,
}

impl MutationKind {
    /// Returns `true` if the mutated end point is virtual.
    #[must_use]
    pub fn is_virtual(self) -> bool {
        !matches!(self, Self::RealObjectSet)
    }
}

/// One step of the perform pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformStep {
    /// Fails unless the end point is registered and complete.
    RequireCompleteEndPoint,
    /// Marks the end point as written.
    TouchEndPoint,
    /// Raises `virtual_relation_end_point_state_updated` for the end point.
    RaiseVirtualStateUpdated,
}

const REAL_BEFORE: &[PerformStep] = &[];
const REAL_AFTER: &[PerformStep] = &[PerformStep::TouchEndPoint];
const VIRTUAL_BEFORE: &[PerformStep] = &[PerformStep::RequireCompleteEndPoint];
const VIRTUAL_AFTER: &[PerformStep] = &[
    PerformStep::TouchEndPoint,
    PerformStep::RaiseVirtualStateUpdated,
];

/// The step lists of every [`MutationKind`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PerformHooks;

impl PerformHooks {
    /// Steps that run before the mutation.
    #[must_use]
    pub fn before(kind: MutationKind) -> &'static [PerformStep] {
        if kind.is_virtual() {
            VIRTUAL_BEFORE
        } else {
            REAL_BEFORE
        }
    }

    /// Steps that run after the mutation.
    #[must_use]
    pub fn after(kind: MutationKind) -> &'static [PerformStep] {
        if kind.is_virtual() {
            VIRTUAL_AFTER
        } else {
            REAL_AFTER
        }
    }

    /// Runs `mutation` on `end_point` surrounded by the steps of `kind`.
    pub fn run(
        kind: MutationKind,
        data: &mut DataManager,
        end_point: RelationEndPointId,
        mutation: impl FnOnce(&mut DataManager) -> CoreResult<()>,
    ) -> CoreResult<()> {
        for step in Self::before(kind) {
            apply(*step, data, end_point)?;
        }
        mutation(data)?;
        for step in Self::after(kind) {
            apply(*step, data, end_point)?;
        }
        Ok(())
    }
}

fn apply(step: PerformStep, data: &mut DataManager, end_point: RelationEndPointId) -> CoreResult<()> {
    match step {
        PerformStep::RequireCompleteEndPoint => {
            let complete = data
                .get_relation_end_point_without_loading(end_point)
                .is_some_and(|ep| ep.is_complete());
            if complete {
                Ok(())
            } else {
                Err(CoreError::invalid_operation(format!(
                    "{end_point} must be loaded before it is changed"
                )))
            }
        }
        PerformStep::TouchEndPoint => data.end_point_manager_mut().touch(end_point),
        PerformStep::RaiseVirtualStateUpdated => {
            let order_sensitive = data.end_point_manager().is_order_sensitive();
            let has_changed = data
                .get_relation_end_point_without_loading(end_point)
                .filter(|ep| ep.is_complete())
                .map(|ep| ep.has_virtual_changes(order_sensitive));
            let events = Arc::clone(data.events());
            events.virtual_relation_end_point_state_updated(
                data.transaction_id(),
                end_point,
                has_changed,
            );
            Ok(())
        }
    }
}
