//! Scoped selection of the current transaction.

use super::TransactionHierarchy;
use crate::types::TransactionId;
use std::ops::{Deref, DerefMut};
use tracing::trace;

/// Makes one transaction the current transaction of its hierarchy.
///
/// Object operations issued through the scope act on that transaction. The
/// previously current transaction is restored when the scope is dropped,
/// including while unwinding.
pub struct TransactionScope<'a> {
    hierarchy: &'a mut TransactionHierarchy,
    tx: TransactionId,
    previous: Option<TransactionId>,
}

impl<'a> TransactionScope<'a> {
    pub(crate) fn enter(hierarchy: &'a mut TransactionHierarchy, tx: TransactionId) -> Self {
        let previous = hierarchy.replace_current(Some(tx));
        trace!(%tx, ?previous, "transaction scope entered");
        Self {
            hierarchy,
            tx,
            previous,
        }
    }

    /// The transaction made current by this scope.
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        self.tx
    }

    /// Leaves the scope; same as dropping it.
    pub fn leave(self) {}
}

impl Deref for TransactionScope<'_> {
    type Target = TransactionHierarchy;

    fn deref(&self) -> &Self::Target {
        self.hierarchy
    }
}

impl DerefMut for TransactionScope<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.hierarchy
    }
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        self.hierarchy.replace_current(self.previous);
        trace!(tx = %self.tx, "transaction scope left");
    }
}

impl std::fmt::Debug for TransactionScope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionScope")
            .field("tx", &self.tx)
            .field("previous", &self.previous)
            .finish_non_exhaustive()
    }
}
