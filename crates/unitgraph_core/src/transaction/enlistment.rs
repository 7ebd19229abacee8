//! Object handles and their registration in a hierarchy.

use crate::error::{CoreError, CoreResult};
use crate::types::{ClassId, ObjectId, TransactionId};
use std::collections::HashMap;
use std::fmt;
use tracing::trace;

/// Handle of an object enlisted in one transaction hierarchy.
///
/// The handle stays the same for the lifetime of the hierarchy, across
/// sub-transactions, unloading and reloading. Its state in a given
/// transaction is queried through the hierarchy.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DomainObject {
    id: ObjectId,
    root: TransactionId,
}

impl DomainObject {
    /// Identity of the object.
    #[must_use]
    pub const fn id(&self) -> ObjectId {
        self.id
    }

    /// Class of the object.
    #[must_use]
    pub const fn class_id(&self) -> ClassId {
        self.id.class_id()
    }

    /// Root transaction of the hierarchy the object is enlisted in.
    #[must_use]
    pub const fn root_transaction_id(&self) -> TransactionId {
        self.root
    }
}

impl fmt::Debug for DomainObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DomainObject({} in {})", self.id, self.root)
    }
}

impl fmt::Display for DomainObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.id, f)
    }
}

/// Objects handed out by one hierarchy.
///
/// Enlistment is permanent: an object that becomes invalid stays enlisted so
/// that its handle keeps reporting [`crate::ObjectState::Invalid`].
#[derive(Debug)]
pub struct EnlistedObjectManager {
    root: TransactionId,
    objects: HashMap<ObjectId, DomainObject>,
}

impl EnlistedObjectManager {
    /// Creates an empty manager for the hierarchy rooted at `root`.
    #[must_use]
    pub fn new(root: TransactionId) -> Self {
        Self {
            root,
            objects: HashMap::new(),
        }
    }

    /// Returns the handle of `id`, enlisting it first if needed.
    pub fn enlist(&mut self, id: ObjectId) -> DomainObject {
        let root = self.root;
        *self.objects.entry(id).or_insert_with(|| {
            trace!(%root, %id, "object enlisted");
            DomainObject { id, root }
        })
    }

    /// The handle of `id`, if it is enlisted.
    #[must_use]
    pub fn get_enlisted_object(&self, id: ObjectId) -> Option<DomainObject> {
        self.objects.get(&id).copied()
    }

    /// Returns `true` if `object` was handed out by this hierarchy.
    #[must_use]
    pub fn is_enlisted(&self, object: &DomainObject) -> bool {
        object.root == self.root && self.objects.contains_key(&object.id)
    }

    /// Returns the identity behind `object`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ObjectNotEnlisted`] if the handle belongs to a
    /// different hierarchy.
    pub fn ensure_enlisted(&self, object: &DomainObject) -> CoreResult<ObjectId> {
        if self.is_enlisted(object) {
            Ok(object.id)
        } else {
            Err(CoreError::ObjectNotEnlisted { id: object.id })
        }
    }

    /// Identities of all enlisted objects, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self.objects.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Number of enlisted objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns `true` if nothing is enlisted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
