//! Staged mutations.
//!
//! Every mutation of a transaction's object graph is a [`Command`] that runs
//! in three phases. `begin` raises the "-ing" events (listeners may veto),
//! `perform` applies the change without raising anything, and `end` raises
//! the "-ed" events. Validation failures are collected up front by
//! [`Command::get_all_exceptions`]; a command with failures raises the first
//! one from every phase and never mutates anything.

mod composite;
mod delete;
mod exception;
mod pipeline;
mod relation;
mod unload;

pub use composite::{CompositeCommand, ExpandedCommand};
pub use delete::DeleteCommand;
pub use exception::{ExceptionCommand, NopCommand};
pub use pipeline::{MutationKind, PerformHooks, PerformStep};
pub use relation::{
    CollectionEndPointInsertCommand, CollectionEndPointRemoveCommand, ObjectEndPointSetCommand,
};
pub use unload::{UnloadAllCommand, UnloadCommand, UnloadVirtualEndPointsCommand};

use crate::data_manager::DataManager;
use crate::error::{CoreError, CoreResult};
use crate::events::TransactionListener;
use crate::loading::LazyLoader;
use crate::types::ObjectId;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::trace;

/// A staged mutation of one transaction.
///
/// Phases must be called in order, each exactly once: `begin`, `perform`,
/// `end`. Callers check [`Command::get_all_exceptions`] first; the
/// [`execute`] helper and the hierarchy executor do this for them.
pub trait Command: std::fmt::Debug {
    /// Validation failures found without mutating anything, in discovery order.
    ///
    /// An empty result means the command can be executed.
    fn get_all_exceptions(&self) -> Vec<CoreError>;

    /// Raises the "-ing" notifications of the mutation.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure, or the first listener veto.
    fn begin(&mut self, data: &mut DataManager) -> CoreResult<()>;

    /// Applies the mutation.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure. Commands that remove state fail
    /// with [`CoreError::InvalidOperation`] unless `begin` ran first. Failures
    /// discovered while the state is being changed propagate unmodified.
    fn perform(&mut self, data: &mut DataManager) -> CoreResult<()>;

    /// Raises the "-ed" notifications of the mutation.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure.
    fn end(&mut self, data: &mut DataManager) -> CoreResult<()>;

    /// Expands the command into the set of commands that keeps every related
    /// object consistent.
    ///
    /// The result contains this command first. Related end points are loaded
    /// through `loader` as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if related data cannot be loaded.
    fn expand_to_all_related_objects(
        self: Box<Self>,
        data: &mut DataManager,
        loader: &mut dyn LazyLoader,
    ) -> CoreResult<ExpandedCommand>;

    /// Returns `true` if the command has no validation failures.
    fn can_execute(&self) -> bool {
        self.get_all_exceptions().is_empty()
    }
}

/// Progress of a command through `begin`, `perform` and `end`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum Phase {
    #[default]
    Created,
    Begun,
    Performed,
}

impl Phase {
    /// Moves to [`Phase::Performed`]; `perform` must follow exactly one `begin`.
    pub(crate) fn perform(&mut self, command: &str) -> CoreResult<()> {
        if *self != Self::Begun {
            return Err(CoreError::invalid_operation(format!(
                "{command} cannot perform in phase {self:?}"
            )));
        }
        *self = Self::Performed;
        Ok(())
    }

    pub(crate) fn is_performed(self) -> bool {
        self == Self::Performed
    }
}

/// Returns the first failure in `exceptions` as an error.
pub(crate) fn raise_first(exceptions: &[CoreError]) -> CoreResult<()> {
    match exceptions.first() {
        Some(error) => Err(error.clone()),
        None => Ok(()),
    }
}

/// Runs a command through all three phases.
///
/// Nothing is called if the command reports validation failures.
///
/// # Errors
///
/// Returns the first validation failure or the first error of a phase.
pub fn execute(command: &mut dyn Command, data: &mut DataManager) -> CoreResult<()> {
    if let Some(error) = command.get_all_exceptions().into_iter().next() {
        return Err(error);
    }
    trace!(tx = %data.transaction_id(), ?command, "executing command");
    command.begin(data)?;
    command.perform(data)?;
    command.end(data)
}

/// Raises "objects unloading" until a pass finds nothing new to notify.
///
/// `candidates` is asked for the objects to notify after every pass;
/// listeners may register further objects while being notified, and those
/// are notified in the next pass. Returns every notified identity in
/// notification order.
pub(crate) fn notify_unloading_until_stable(
    data: &mut DataManager,
    mut candidates: impl FnMut(&DataManager) -> Vec<ObjectId>,
) -> CoreResult<Vec<ObjectId>> {
    let events = Arc::clone(data.events());
    let tx = data.transaction_id();
    let max_passes = data.config().max_notification_passes;
    let mut notified = Vec::new();
    let mut seen = BTreeSet::new();
    let mut passes = 0;
    loop {
        let pending: Vec<ObjectId> = candidates(data)
            .into_iter()
            .filter(|id| !seen.contains(id))
            .collect();
        if pending.is_empty() {
            return Ok(notified);
        }
        passes += 1;
        if passes > max_passes {
            return Err(CoreError::invalid_operation(format!(
                "unloading notification did not settle after {max_passes} passes"
            )));
        }
        trace!(%tx, pass = passes, count = pending.len(), "notifying objects unloading");
        events.objects_unloading(tx, &pending, data)?;
        seen.extend(pending.iter().copied());
        notified.extend(pending);
    }
}
