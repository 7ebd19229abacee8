//! Error types for UnitGraph core.

use crate::types::{ClassId, ObjectId, TransactionId};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in UnitGraph core operations.
///
/// Errors are `Clone` so that a failure discovered while a command is built
/// can be re-raised from every phase of that command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// No data exists for the requested object.
    #[error("object not found: {id}")]
    ObjectNotFound {
        /// The identity that was looked up.
        id: ObjectId,
    },

    /// The object is invalid in this transaction (discarded, or deleted and committed).
    #[error("object invalid: {id}")]
    ObjectInvalid {
        /// The invalid object.
        id: ObjectId,
    },

    /// The object has been deleted in this transaction.
    #[error("object deleted: {id}")]
    ObjectDeleted {
        /// The deleted object.
        id: ObjectId,
    },

    /// The object handle belongs to a different transaction hierarchy.
    #[error("object {id} is not enlisted in this transaction hierarchy")]
    ObjectNotEnlisted {
        /// The object whose handle was rejected.
        id: ObjectId,
    },

    /// An identity was registered twice in the same map.
    #[error("duplicate registration: {key}")]
    DuplicateRegistration {
        /// Description of the duplicate key.
        key: String,
    },

    /// A property or relation end point does not exist in the mapping.
    #[error("property {property} not defined on class {class_id}")]
    PropertyNotFound {
        /// Class that was searched.
        class_id: ClassId,
        /// Property name.
        property: String,
    },

    /// The mapping configuration is inconsistent.
    #[error("mapping error: {message}")]
    Mapping {
        /// Description of the problem.
        message: String,
    },

    /// The transaction is read-only because a sub-transaction is active.
    #[error("{transaction} is read-only: cannot {operation}")]
    TransactionReadOnly {
        /// The read-only transaction.
        transaction: TransactionId,
        /// The rejected operation.
        operation: String,
    },

    /// Unloading was rejected because of pending changes.
    #[error("cannot unload {target}: {reason}")]
    CannotUnload {
        /// The object or end point that could not be unloaded.
        target: String,
        /// Why the unload was rejected.
        reason: String,
    },

    /// A mandatory relation is empty at commit time.
    #[error("mandatory relation {property} of {id} is not set")]
    MandatoryRelationNotSet {
        /// Object owning the relation.
        id: ObjectId,
        /// Relation property.
        property: String,
    },

    /// The stored data changed since it was loaded.
    #[error("concurrency violation on {} object(s): {ids:?}", .ids.len())]
    ConcurrencyViolation {
        /// Objects whose timestamps did not match.
        ids: Vec<ObjectId>,
    },

    /// A command failed its pre-check on one level of the transaction hierarchy.
    #[error("command aborted in {transaction}: {cause}")]
    HierarchyCommandAborted {
        /// Level whose pre-check failed.
        transaction: TransactionId,
        /// First failure reported by that level.
        #[source]
        cause: Box<CoreError>,
    },

    /// The persistence collaborator failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the failure.
        message: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates an object-not-found error.
    pub fn object_not_found(id: ObjectId) -> Self {
        Self::ObjectNotFound { id }
    }

    /// Creates an object-invalid error.
    pub fn object_invalid(id: ObjectId) -> Self {
        Self::ObjectInvalid { id }
    }

    /// Creates an object-deleted error.
    pub fn object_deleted(id: ObjectId) -> Self {
        Self::ObjectDeleted { id }
    }

    /// Creates a duplicate registration error.
    pub fn duplicate_registration(key: impl ToString) -> Self {
        Self::DuplicateRegistration {
            key: key.to_string(),
        }
    }

    /// Creates a property-not-found error.
    pub fn property_not_found(class_id: ClassId, property: impl Into<String>) -> Self {
        Self::PropertyNotFound {
            class_id,
            property: property.into(),
        }
    }

    /// Creates a mapping error.
    pub fn mapping(message: impl Into<String>) -> Self {
        Self::Mapping {
            message: message.into(),
        }
    }

    /// Creates a read-only transaction error.
    pub fn read_only(transaction: TransactionId, operation: impl Into<String>) -> Self {
        Self::TransactionReadOnly {
            transaction,
            operation: operation.into(),
        }
    }

    /// Creates a cannot-unload error.
    pub fn cannot_unload(target: impl ToString, reason: impl Into<String>) -> Self {
        Self::CannotUnload {
            target: target.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Wraps a pre-check failure of one hierarchy level.
    pub fn hierarchy_aborted(transaction: TransactionId, cause: CoreError) -> Self {
        Self::HierarchyCommandAborted {
            transaction,
            cause: Box::new(cause),
        }
    }

    /// Returns the innermost cause, unwrapping hierarchy aborts.
    #[must_use]
    pub fn root_cause(&self) -> &CoreError {
        match self {
            Self::HierarchyCommandAborted { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}
