//! Ordered aggregation of commands.

use super::{raise_first, Command};
use crate::data_manager::DataManager;
use crate::error::{CoreError, CoreResult};
use crate::loading::LazyLoader;

/// Runs its children as one command.
///
/// `begin` and `perform` visit the children in order, `end` visits them in
/// reverse. If any child reports a validation failure, every phase raises the
/// first one and no child is called.
#[derive(Debug, Default)]
pub struct CompositeCommand {
    commands: Vec<Box<dyn Command>>,
}

impl CompositeCommand {
    /// Creates a composite over `commands`.
    #[must_use]
    pub fn new(commands: Vec<Box<dyn Command>>) -> Self {
        Self { commands }
    }

    /// Appends a child.
    pub fn push(&mut self, command: Box<dyn Command>) {
        self.commands.push(command);
    }

    /// The children, in execution order.
    #[must_use]
    pub fn commands(&self) -> &[Box<dyn Command>] {
        &self.commands
    }

    /// Number of children.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if there are no children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Unwraps the children.
    #[must_use]
    pub fn into_commands(self) -> Vec<Box<dyn Command>> {
        self.commands
    }
}

impl Command for CompositeCommand {
    fn get_all_exceptions(&self) -> Vec<CoreError> {
        self.commands
            .iter()
            .flat_map(|command| command.get_all_exceptions())
            .collect()
    }

    fn begin(&mut self, data: &mut DataManager) -> CoreResult<()> {
        raise_first(&self.get_all_exceptions())?;
        for command in &mut self.commands {
            command.begin(data)?;
        }
        Ok(())
    }

    fn perform(&mut self, data: &mut DataManager) -> CoreResult<()> {
        raise_first(&self.get_all_exceptions())?;
        for command in &mut self.commands {
            command.perform(data)?;
        }
        Ok(())
    }

    fn end(&mut self, data: &mut DataManager) -> CoreResult<()> {
        raise_first(&self.get_all_exceptions())?;
        for command in self.commands.iter_mut().rev() {
            command.end(data)?;
        }
        Ok(())
    }

    fn expand_to_all_related_objects(
        self: Box<Self>,
        data: &mut DataManager,
        loader: &mut dyn LazyLoader,
    ) -> CoreResult<ExpandedCommand> {
        let mut expanded = Vec::new();
        for command in self.commands {
            expanded.extend(
                command
                    .expand_to_all_related_objects(data, loader)?
                    .into_commands(),
            );
        }
        Ok(ExpandedCommand::new(expanded))
    }
}

/// The result of [`Command::expand_to_all_related_objects`].
///
/// Behaves like a [`CompositeCommand`]; expanding it again returns it unchanged.
#[derive(Debug, Default)]
pub struct ExpandedCommand {
    inner: CompositeCommand,
}

impl ExpandedCommand {
    /// Creates an expanded command over `commands`.
    #[must_use]
    pub fn new(commands: Vec<Box<dyn Command>>) -> Self {
        Self {
            inner: CompositeCommand::new(commands),
        }
    }

    /// The nested commands, in execution order.
    #[must_use]
    pub fn commands(&self) -> &[Box<dyn Command>] {
        self.inner.commands()
    }

    /// Number of nested commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if there are no nested commands.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Unwraps the nested commands.
    #[must_use]
    pub fn into_commands(self) -> Vec<Box<dyn Command>> {
        self.inner.into_commands()
    }

    /// Merges another expansion into this one.
    #[must_use]
    pub fn combine_with(mut self, other: ExpandedCommand) -> Self {
        for command in other.into_commands() {
            self.inner.push(command);
        }
        self
    }
}

impl Command for ExpandedCommand {
    fn get_all_exceptions(&self) -> Vec<CoreError> {
        self.inner.get_all_exceptions()
    }

    fn begin(&mut self, data: &mut DataManager) -> CoreResult<()> {
        self.inner.begin(data)
    }

    fn perform(&mut self, data: &mut DataManager) -> CoreResult<()> {
        self.inner.perform(data)
    }

    fn end(&mut self, data: &mut DataManager) -> CoreResult<()> {
        self.inner.end(data)
    }

    fn expand_to_all_related_objects(
        self: Box<Self>,
        _data: &mut DataManager,
        _loader: &mut dyn LazyLoader,
    ) -> CoreResult<ExpandedCommand> {
        Ok(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{ExceptionCommand, NopCommand};
    use crate::test_support::data_manager;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug)]
    struct Tracking {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Tracking {
        fn boxed(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Box<dyn Command> {
            Box::new(Self {
                name,
                log: Arc::clone(log),
            })
        }

        fn record(&self, phase: &str) {
            self.log.lock().push(format!("{phase}:{}", self.name));
        }
    }

    impl Command for Tracking {
        fn get_all_exceptions(&self) -> Vec<CoreError> {
            Vec::new()
        }

        fn begin(&mut self, _data: &mut DataManager) -> CoreResult<()> {
            self.record("begin");
            Ok(())
        }

        fn perform(&mut self, _data: &mut DataManager) -> CoreResult<()> {
            self.record("perform");
            Ok(())
        }

        fn end(&mut self, _data: &mut DataManager) -> CoreResult<()> {
            self.record("end");
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

    #[test]
    fn end_runs_in_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut composite = CompositeCommand::new(vec![
            Tracking::boxed("1", &log),
            Tracking::boxed("2", &log),
            Tracking::boxed("3", &log),
        ]);
        let mut data = data_manager();

        crate::commands::execute(&mut composite, &mut data).unwrap();
        assert_eq!(
            *log.lock(),
            vec![
                "begin:1", "begin:2", "begin:3", "perform:1", "perform:2", "perform:3", "end:3",
                "end:2", "end:1"
            ]
        );
    }

    #[test]
    fn failing_child_blocks_every_phase() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let error = CoreError::invalid_operation("rejected");
        let mut composite = CompositeCommand::new(vec![
            Tracking::boxed("1", &log),
            Box::new(ExceptionCommand::new(error.clone())),
            Box::new(NopCommand),
        ]);
        let mut data = data_manager();

        assert_eq!(composite.get_all_exceptions(), vec![error.clone()]);
        assert_eq!(composite.begin(&mut data), Err(error.clone()));
        assert_eq!(composite.perform(&mut data), Err(error.clone()));
        assert_eq!(composite.end(&mut data), Err(error));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn expanded_command_is_its_own_expansion() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let expanded = ExpandedCommand::new(vec![Tracking::boxed("1", &log)])
            .combine_with(ExpandedCommand::new(vec![Tracking::boxed("2", &log)]));
        let mut data = data_manager();
        let mut loader = crate::test_support::NoLoader;

        let again = Box::new(expanded)
            .expand_to_all_related_objects(&mut data, &mut loader)
            .unwrap();
        assert_eq!(again.len(), 2);
    }
}
