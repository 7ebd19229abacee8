//! Tracking of invalid objects.

use crate::error::{CoreError, CoreResult};
use crate::types::ObjectId;
use std::collections::BTreeSet;
use tracing::trace;

/// Set of identities that are invalid in one transaction.
///
/// An identity becomes invalid when a new object is discarded, or when a
/// deletion is committed. Invalid identities cannot be loaded again.
#[derive(Debug, Clone, Default)]
pub struct InvalidObjectManager {
    ids: BTreeSet<ObjectId>,
}

impl InvalidObjectManager {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `id` invalid. Returns `false` if it already was.
    pub fn mark_invalid(&mut self, id: ObjectId) -> bool {
        let inserted = self.ids.insert(id);
        if inserted {
            trace!(%id, "object marked invalid");
        }
        inserted
    }

    /// Makes `id` valid again, e.g. when a sub-transaction is discarded.
    pub fn mark_not_invalid(&mut self, id: ObjectId) -> CoreResult<()> {
        if self.ids.remove(&id) {
            Ok(())
        } else {
            Err(CoreError::invalid_operation(format!("{id} is not invalid")))
        }
    }

    /// Returns `true` if `id` is invalid.
    #[must_use]
    pub fn is_invalid(&self, id: ObjectId) -> bool {
        self.ids.contains(&id)
    }

    /// Fails with [`CoreError::ObjectInvalid`] if `id` is invalid.
    pub fn ensure_valid(&self, id: ObjectId) -> CoreResult<()> {
        if self.is_invalid(id) {
            Err(CoreError::object_invalid(id))
        } else {
            Ok(())
        }
    }

    /// All invalid identities, ordered.
    pub fn iter(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.ids.iter().copied()
    }

    /// Number of invalid identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` if no identity is invalid.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
