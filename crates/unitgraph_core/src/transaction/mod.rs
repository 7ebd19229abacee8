//! Transaction hierarchies.
//!
//! A [`TransactionHierarchy`] is a chain of [`ClientTransaction`]s: one root
//! and at most one active sub-transaction per level. Only the leaf is
//! writeable; ancestors are locked by their [`TransactionHierarchyManager`]
//! and unlocked only for the `perform` phase of commands run by the
//! [`TransactionHierarchyCommandExecutor`] and while a sub-transaction
//! commits into its parent.

mod client;
mod enlistment;
mod executor;
mod hierarchy;
mod scope;
mod unit_of_work;

pub use client::ClientTransaction;
pub use enlistment::{DomainObject, EnlistedObjectManager};
pub use executor::TransactionHierarchyCommandExecutor;
pub use hierarchy::{TransactionHierarchyManager, UnlockGuard};
pub use scope::TransactionScope;
pub use unit_of_work::TransactionHierarchy;

use crate::types::TransactionId;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates a process-wide unique transaction ID.
pub(crate) fn next_transaction_id() -> TransactionId {
    TransactionId::new(NEXT_TRANSACTION_ID.fetch_add(1, Ordering::SeqCst))
}
