//! One level of a transaction hierarchy.

use super::hierarchy::TransactionHierarchyManager;
use crate::config::Config;
use crate::data_manager::DataManager;
use crate::events::{
    LoggingTransactionListener, ReadOnlyTransactionListener, TransactionEventSink,
    TransactionListener,
};
use crate::mapping::MappingConfiguration;
use crate::types::TransactionId;
use std::sync::Arc;

/// A root or sub-transaction: its data, its event sink and its place in the
/// hierarchy.
pub struct ClientTransaction {
    id: TransactionId,
    events: Arc<TransactionEventSink>,
    hierarchy: TransactionHierarchyManager,
    data: DataManager,
}

impl ClientTransaction {
    /// Creates a writeable transaction below `parent`.
    ///
    /// Every transaction gets a [`ReadOnlyTransactionListener`] bound to its
    /// writeable flag, and a [`LoggingTransactionListener`] when
    /// [`Config::log_events`] is set.
    pub(crate) fn new(
        id: TransactionId,
        parent: Option<TransactionId>,
        mapping: Arc<MappingConfiguration>,
        config: Arc<Config>,
    ) -> Self {
        let hierarchy = TransactionHierarchyManager::new(id, parent);
        let events = Arc::new(TransactionEventSink::new(id));
        events.add_listener(Arc::new(ReadOnlyTransactionListener::new(Arc::clone(
            hierarchy.writeable_flag(),
        ))));
        if config.log_events {
            events.add_listener(Arc::new(LoggingTransactionListener));
        }
        let data = DataManager::new(
            id,
            mapping,
            config,
            Arc::clone(&events),
            Arc::clone(hierarchy.writeable_flag()),
            parent.is_some(),
        );
        Self {
            id,
            events,
            hierarchy,
            data,
        }
    }

    /// Identity of the transaction.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// The parent transaction; `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<TransactionId> {
        self.hierarchy.parent()
    }

    /// Returns `true` for the root transaction.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.hierarchy.is_root()
    }

    /// Returns `true` unless a sub-transaction is active.
    #[must_use]
    pub fn is_writeable(&self) -> bool {
        self.hierarchy.is_writeable()
    }

    /// The event sink of the transaction.
    #[must_use]
    pub fn events(&self) -> &Arc<TransactionEventSink> {
        &self.events
    }

    /// Adds a listener to the transaction's event sink.
    pub fn add_listener(&self, listener: Arc<dyn TransactionListener>) {
        self.events.add_listener(listener);
    }

    /// The parent/child links of the transaction.
    #[must_use]
    pub fn hierarchy_manager(&self) -> &TransactionHierarchyManager {
        &self.hierarchy
    }

    pub(crate) fn hierarchy_manager_mut(&mut self) -> &mut TransactionHierarchyManager {
        &mut self.hierarchy
    }

    /// The data of the transaction.
    #[must_use]
    pub fn data(&self) -> &DataManager {
        &self.data
    }

    /// The data of the transaction, for mutation.
    pub fn data_mut(&mut self) -> &mut DataManager {
        &mut self.data
    }
}

impl std::fmt::Debug for ClientTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientTransaction")
            .field("id", &self.id)
            .field("parent", &self.hierarchy.parent())
            .field("writeable", &self.hierarchy.is_writeable())
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}
