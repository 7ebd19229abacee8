//! Commands that never mutate.

use super::{Command, ExpandedCommand};
use crate::data_manager::DataManager;
use crate::error::{CoreError, CoreResult};
use crate::loading::LazyLoader;

/// Carries a failure that is already known when the command is created.
///
/// Every phase raises the failure, so an invalid mutation can sit inside a
/// composite without special handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionCommand {
    error: CoreError,
}

impl ExceptionCommand {
    /// Wraps `error`.
    #[must_use]
    pub fn new(error: CoreError) -> Self {
        Self { error }
    }

    /// The wrapped failure.
    #[must_use]
    pub fn error(&self) -> &CoreError {
        &self.error
    }
}

impl Command for ExceptionCommand {
    fn get_all_exceptions(&self) -> Vec<CoreError> {
        vec![self.error.clone()]
    }

    fn begin(&mut self, _data: &mut DataManager) -> CoreResult<()> {
        Err(self.error.clone())
    }

    fn perform(&mut self, _data: &mut DataManager) -> CoreResult<()> {
        Err(self.error.clone())
    }

    fn end(&mut self, _data: &mut DataManager) -> CoreResult<()> {
        Err(self.error.clone())
    }

    fn expand_to_all_related_objects(
        self: Box<Self>,
        _data: &mut DataManager,
        _loader: &mut dyn LazyLoader,
    ) -> CoreResult<ExpandedCommand> {
        Ok(ExpandedCommand::new(vec![self]))
    }
}

/// A command with nothing to do, used when a mutation would not change anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NopCommand;

impl Command for NopCommand {
    fn get_all_exceptions(&self) -> Vec<CoreError> {
        Vec::new()
    }

    fn begin(&mut self, _data: &mut DataManager) -> CoreResult<()> {
        Ok(())
    }

    fn perform(&mut self, _data: &mut DataManager) -> CoreResult<()> {
        Ok(())
    }

    fn end(&mut self, _data: &mut DataManager) -> CoreResult<()> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::data_manager;
    use crate::types::{ClassId, ObjectId, ObjectKey};

    #[test]
    fn every_phase_raises_the_wrapped_error() {
        let error = CoreError::object_invalid(ObjectId::new(
            ClassId::new("Order"),
            ObjectKey::from_u128(1),
        ));
        let mut command = ExceptionCommand::new(error.clone());
        let mut data = data_manager();

        assert_eq!(command.get_all_exceptions(), vec![error.clone()]);
        assert!(!command.can_execute());
        assert_eq!(command.begin(&mut data), Err(error.clone()));
        assert_eq!(command.perform(&mut data), Err(error.clone()));
        assert_eq!(command.end(&mut data), Err(error));
    }

    #[test]
    fn nop_command_succeeds() {
        let mut data = data_manager();
        assert!(super::super::execute(&mut NopCommand, &mut data).is_ok());
    }
}
