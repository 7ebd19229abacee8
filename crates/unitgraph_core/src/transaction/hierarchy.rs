//! Parent/child links and the read-only flag of one transaction level.

use crate::error::{CoreError, CoreResult};
use crate::types::TransactionId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Links one transaction to its parent and its active sub-transaction.
///
/// A transaction is writeable while it has no sub-transaction. The flag is
/// shared with the transaction's data manager and its read-only listener,
/// which rejects every mutating event while the flag is cleared.
#[derive(Debug)]
pub struct TransactionHierarchyManager {
    tx: TransactionId,
    parent: Option<TransactionId>,
    sub: Option<TransactionId>,
    writeable: Arc<AtomicBool>,
}

impl TransactionHierarchyManager {
    /// Creates the manager of a writeable transaction.
    #[must_use]
    pub fn new(tx: TransactionId, parent: Option<TransactionId>) -> Self {
        Self {
            tx,
            parent,
            sub: None,
            writeable: Arc::new(AtomicBool::new(true)),
        }
    }

    /// The managed transaction.
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        self.tx
    }

    /// The parent transaction; `None` for a root.
    #[must_use]
    pub fn parent(&self) -> Option<TransactionId> {
        self.parent
    }

    /// The active sub-transaction, if any.
    #[must_use]
    pub fn sub_transaction(&self) -> Option<TransactionId> {
        self.sub
    }

    /// Returns `true` for a root transaction.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Returns `true` if the transaction may be mutated.
    #[must_use]
    pub fn is_writeable(&self) -> bool {
        self.writeable.load(Ordering::SeqCst)
    }

    /// The shared writeable flag.
    #[must_use]
    pub fn writeable_flag(&self) -> &Arc<AtomicBool> {
        &self.writeable
    }

    /// Records a new sub-transaction; the transaction becomes read-only.
    pub fn register_sub_transaction(&mut self, sub: TransactionId) -> CoreResult<()> {
        if let Some(existing) = self.sub {
            return Err(CoreError::invalid_operation(format!(
                "{} already has the sub-transaction {existing}",
                self.tx
            )));
        }
        self.sub = Some(sub);
        self.writeable.store(false, Ordering::SeqCst);
        trace!(tx = %self.tx, %sub, "transaction locked for sub-transaction");
        Ok(())
    }

    /// Forgets the sub-transaction; the transaction becomes writeable again.
    pub fn remove_sub_transaction(&mut self) -> CoreResult<TransactionId> {
        let sub = self.sub.take().ok_or_else(|| {
            CoreError::invalid_operation(format!("{} has no sub-transaction", self.tx))
        })?;
        self.writeable.store(true, Ordering::SeqCst);
        trace!(tx = %self.tx, %sub, "transaction unlocked");
        Ok(sub)
    }

    /// Makes the transaction writeable until the returned guard is dropped.
    ///
    /// The previous state is restored on drop, also while unwinding.
    #[must_use = "the transaction is locked again when the guard is dropped"]
    pub fn unlock(&self) -> UnlockGuard {
        let was_writeable = self.writeable.swap(true, Ordering::SeqCst);
        if !was_writeable {
            trace!(tx = %self.tx, "read-only transaction unlocked");
        }
        UnlockGuard {
            tx: self.tx,
            writeable: Arc::clone(&self.writeable),
            was_writeable,
        }
    }
}

/// Scoped write access to a read-only transaction.
#[derive(Debug)]
pub struct UnlockGuard {
    tx: TransactionId,
    writeable: Arc<AtomicBool>,
    was_writeable: bool,
}

impl Drop for UnlockGuard {
    fn drop(&mut self) {
        self.writeable.store(self.was_writeable, Ordering::SeqCst);
        if !self.was_writeable {
            trace!(tx = %self.tx, "transaction locked again");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_transaction_locks_parent() {
        let mut manager = TransactionHierarchyManager::new(TransactionId::new(1), None);
        assert!(manager.is_root());
        assert!(manager.is_writeable());

        manager.register_sub_transaction(TransactionId::new(2)).unwrap();
        assert!(!manager.is_writeable());
        assert_eq!(manager.sub_transaction(), Some(TransactionId::new(2)));
        assert!(manager
            .register_sub_transaction(TransactionId::new(3))
            .is_err());

        assert_eq!(manager.remove_sub_transaction().unwrap(), TransactionId::new(2));
        assert!(manager.is_writeable());
        assert!(manager.remove_sub_transaction().is_err());
    }

    #[test]
    fn unlock_guard_restores_read_only_state() {
        let mut manager = TransactionHierarchyManager::new(TransactionId::new(1), None);
        manager.register_sub_transaction(TransactionId::new(2)).unwrap();

        {
            let _guard = manager.unlock();
            assert!(manager.is_writeable());
        }
        assert!(!manager.is_writeable());
    }

    #[test]
    fn unlock_guard_restores_on_panic() {
        let mut manager = TransactionHierarchyManager::new(TransactionId::new(1), None);
        manager.register_sub_transaction(TransactionId::new(2)).unwrap();
        let flag = Arc::clone(manager.writeable_flag());

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = manager.unlock();
            panic!("perform failed");
        }));
        assert!(result.is_err());
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[test]
    fn unlocking_a_writeable_transaction_keeps_it_writeable() {
        let manager = TransactionHierarchyManager::new(TransactionId::new(1), None);
        drop(manager.unlock());
        assert!(manager.is_writeable());
    }
}
