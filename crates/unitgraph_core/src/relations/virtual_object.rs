//! Single-object virtual end points.

use super::virtual_state::{EndPointData, VirtualEndPoint};
use crate::error::CoreResult;
use crate::types::ObjectId;

/// Original and current opposite of a virtual object end point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VirtualObjectData {
    original: Option<ObjectId>,
    current: Option<ObjectId>,
}

impl VirtualObjectData {
    /// Creates unchanged data.
    #[must_use]
    pub fn new(opposite: Option<ObjectId>) -> Self {
        Self {
            original: opposite,
            current: opposite,
        }
    }

    /// Current opposite object.
    #[must_use]
    pub fn current(&self) -> Option<ObjectId> {
        self.current
    }

    /// Opposite object as of the last load or commit.
    #[must_use]
    pub fn original(&self) -> Option<ObjectId> {
        self.original
    }

    /// Replaces the current opposite.
    pub fn set_current(&mut self, opposite: Option<ObjectId>) {
        self.current = opposite;
    }
}

impl EndPointData for VirtualObjectData {
    fn contains_original(&self, id: ObjectId) -> bool {
        self.original == Some(id)
    }

    fn original_items(&self) -> Vec<ObjectId> {
        self.original.into_iter().collect()
    }

    fn current_items(&self) -> Vec<ObjectId> {
        self.current.into_iter().collect()
    }

    fn add_original(&mut self, id: ObjectId) {
        if self.current == self.original {
            self.current = Some(id);
        }
        self.original = Some(id);
    }

    fn remove_original(&mut self, id: ObjectId) {
        if self.original == Some(id) {
            self.original = None;
        }
        if self.current == Some(id) {
            self.current = None;
        }
    }

    fn has_changed(&self, _order_sensitive: bool) -> bool {
        self.original != self.current
    }

    fn commit(&mut self) {
        self.original = self.current;
    }

    fn rollback(&mut self) {
        self.current = self.original;
    }
}

/// Virtual end point holding at most one related object.
pub type VirtualObjectEndPoint = VirtualEndPoint<VirtualObjectData>;

impl VirtualEndPoint<VirtualObjectData> {
    /// Current opposite, failing if incomplete.
    pub fn opposite_object_id(&self) -> CoreResult<Option<ObjectId>> {
        self.require_data().map(VirtualObjectData::current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClassId, ObjectKey};

    #[test]
    fn adopt_follows_unchanged_current() {
        let ticket = ObjectId::new(ClassId::new("OrderTicket"), ObjectKey::from_u128(1));
        let mut data = VirtualObjectData::new(None);
        data.add_original(ticket);
        assert_eq!(data.current(), Some(ticket));
        assert!(!data.has_changed(false));

        data.set_current(None);
        assert!(data.has_changed(false));
        data.rollback();
        assert_eq!(data.current(), Some(ticket));
    }
}
