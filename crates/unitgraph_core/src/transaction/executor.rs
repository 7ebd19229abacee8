//! Execution of one command on every level of a transaction hierarchy.

use super::ClientTransaction;
use crate::commands::Command;
use crate::data_manager::DataManager;
use crate::error::{CoreError, CoreResult};
use crate::types::TransactionId;
use tracing::{debug, trace};

/// Drives a command through a transaction and all of its ancestors.
///
/// The factory builds one command per level. Nothing runs unless every
/// command is executable. `begin` and `perform` run from the target up to the
/// root, `end` runs from the root down to the target. Read-only ancestors are
/// unlocked for the duration of their `perform` only.
pub struct TransactionHierarchyCommandExecutor<F> {
    factory: F,
}

impl<F> TransactionHierarchyCommandExecutor<F>
where
    F: FnMut(&DataManager) -> Box<dyn Command>,
{
    /// Creates an executor using `factory` to build each level's command.
    pub fn new(factory: F) -> Self {
        Self { factory }
    }

    /// Executes the command on `levels`, ordered root first; the last level
    /// is the target.
    ///
    /// Returns `Ok(false)` without running anything if a command is not
    /// executable.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a phase.
    pub fn try_execute_command_for_transaction_hierarchy(
        &mut self,
        levels: &mut [ClientTransaction],
    ) -> CoreResult<bool> {
        let mut commands = self.create_commands(levels);
        if let Some((tx, error)) = first_failure(levels, &commands) {
            debug!(%tx, %error, "hierarchy command not executable");
            return Ok(false);
        }
        run(levels, &mut commands)?;
        Ok(true)
    }

    /// Executes the command on `levels`, ordered root first; the last level
    /// is the target.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::HierarchyCommandAborted`] wrapping the first
    /// validation failure if any command is not executable; nothing runs in
    /// that case. Errors raised by a phase propagate unmodified.
    pub fn execute_command_for_transaction_hierarchy(
        &mut self,
        levels: &mut [ClientTransaction],
    ) -> CoreResult<()> {
        let mut commands = self.create_commands(levels);
        if let Some((tx, error)) = first_failure(levels, &commands) {
            debug!(%tx, %error, "hierarchy command aborted");
            return Err(CoreError::hierarchy_aborted(tx, error));
        }
        run(levels, &mut commands)
    }

    /// One command per level, target first.
    fn create_commands(&mut self, levels: &[ClientTransaction]) -> Vec<(usize, Box<dyn Command>)> {
        (0..levels.len())
            .rev()
            .map(|index| (index, (self.factory)(levels[index].data())))
            .collect()
    }
}

impl<F> std::fmt::Debug for TransactionHierarchyCommandExecutor<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionHierarchyCommandExecutor")
            .finish_non_exhaustive()
    }
}

fn first_failure(
    levels: &[ClientTransaction],
    commands: &[(usize, Box<dyn Command>)],
) -> Option<(TransactionId, CoreError)> {
    commands.iter().find_map(|(index, command)| {
        command
            .get_all_exceptions()
            .into_iter()
            .next()
            .map(|error| (levels[*index].id(), error))
    })
}

fn run(levels: &mut [ClientTransaction], commands: &mut [(usize, Box<dyn Command>)]) -> CoreResult<()> {
    for (index, command) in commands.iter_mut() {
        trace!(tx = %levels[*index].id(), "hierarchy begin");
        command.begin(levels[*index].data_mut())?;
    }
    for (index, command) in commands.iter_mut() {
        let _unlocked = levels[*index].hierarchy_manager().unlock();
        trace!(tx = %levels[*index].id(), "hierarchy perform");
        command.perform(levels[*index].data_mut())?;
    }
    for (index, command) in commands.iter_mut().rev() {
        trace!(tx = %levels[*index].id(), "hierarchy end");
        command.end(levels[*index].data_mut())?;
    }
    Ok(())
}
