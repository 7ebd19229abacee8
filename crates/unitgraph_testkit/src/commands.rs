//! Call-order tracking commands.
//!
//! Composite and hierarchy tests build [`TrackingCommand`]s sharing one
//! [`CallLog`] and assert on the order of the recorded phase calls.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;
use unitgraph_core::commands::{Command, ExpandedCommand};
use unitgraph_core::{CoreError, CoreResult, DataManager, LazyLoader};

/// One phase call made on a [`TrackingCommand`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Name of the command.
    pub command: String,
    /// `"begin"`, `"perform"` or `"end"`.
    pub phase: &'static str,
    /// Transaction the phase ran in.
    pub tx: u64,
    /// Whether the transaction was writeable during the call.
    pub writeable: bool,
}

impl std::fmt::Display for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.command, self.phase)
    }
}

/// Shared, ordered record of phase calls.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl CallLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// All calls, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// All calls as `"command.phase"`, in order.
    pub fn entries(&self) -> Vec<String> {
        self.calls.lock().iter().map(ToString::to_string).collect()
    }

    /// Returns `true` if nothing was called.
    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    fn record(&self, command: &str, phase: &'static str, data: &DataManager) {
        trace!(command, phase, tx = %data.transaction_id(), "tracked command phase");
        self.calls.lock().push(Call {
            command: command.to_owned(),
            phase,
            tx: data.transaction_id().as_u64(),
            writeable: data.is_writeable(),
        });
    }
}

/// A command that only records its phase calls.
///
/// It can carry validation failures, in which case every phase raises the
/// first one without recording, and it can be told to fail in `perform`.
#[derive(Debug)]
pub struct TrackingCommand {
    name: String,
    log: CallLog,
    exceptions: Vec<CoreError>,
    fail_perform: bool,
}

impl TrackingCommand {
    /// Creates an executable command named `name`.
    pub fn new(name: impl Into<String>, log: &CallLog) -> Self {
        Self {
            name: name.into(),
            log: log.clone(),
            exceptions: Vec::new(),
            fail_perform: false,
        }
    }

    /// Adds a validation failure.
    pub fn with_exception(mut self, error: CoreError) -> Self {
        self.exceptions.push(error);
        self
    }

    /// Makes `perform` fail after recording the call.
    pub fn failing_perform(mut self) -> Self {
        self.fail_perform = true;
        self
    }

    /// Boxes the command.
    pub fn boxed(self) -> Box<dyn Command> {
        Box::new(self)
    }

    fn raise_first(&self) -> CoreResult<()> {
        match self.exceptions.first() {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

impl Command for TrackingCommand {
    fn get_all_exceptions(&self) -> Vec<CoreError> {
        self.exceptions.clone()
    }

    fn begin(&mut self, data: &mut DataManager) -> CoreResult<()> {
        self.raise_first()?;
        self.log.record(&self.name, "begin", data);
        Ok(())
    }

    fn perform(&mut self, data: &mut DataManager) -> CoreResult<()> {
        self.raise_first()?;
        self.log.record(&self.name, "perform", data);
        if self.fail_perform {
            return Err(CoreError::invalid_operation(format!(
                "{} failed in perform",
                self.name
            )));
        }
        Ok(())
    }

    fn end(&mut self, data: &mut DataManager) -> CoreResult<()> {
        self.raise_first()?;
        self.log.record(&self.name, "end", data);
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
