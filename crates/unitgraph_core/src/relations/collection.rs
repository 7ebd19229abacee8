//! Collection-shaped virtual end points.

use super::virtual_state::{EndPointData, VirtualEndPoint};
use crate::error::{CoreError, CoreResult};
use crate::types::ObjectId;
use std::collections::BTreeSet;

/// Original and current items of a collection end point.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CollectionData {
    original: Vec<ObjectId>,
    current: Vec<ObjectId>,
}

impl CollectionData {
    /// Creates unchanged data.
    #[must_use]
    pub fn new(items: Vec<ObjectId>) -> Self {
        Self {
            original: items.clone(),
            current: items,
        }
    }

    /// Current items in order.
    #[must_use]
    pub fn items(&self) -> &[ObjectId] {
        &self.current
    }

    /// Items as of the last load or commit.
    #[must_use]
    pub fn original(&self) -> &[ObjectId] {
        &self.original
    }

    /// Returns `true` if `id` is a current item.
    #[must_use]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.current.contains(&id)
    }

    /// Number of current items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.current.len()
    }

    /// Returns `true` if there are no current items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    /// Inserts `id` at `index`.
    pub fn insert(&mut self, index: usize, id: ObjectId) -> CoreResult<()> {
        if self.current.contains(&id) {
            return Err(CoreError::invalid_operation(format!(
                "collection already contains {id}"
            )));
        }
        if index > self.current.len() {
            return Err(CoreError::invalid_operation(format!(
                "index {index} out of range for {} items",
                self.current.len()
            )));
        }
        self.current.insert(index, id);
        Ok(())
    }

    /// Removes `id`, returning its former index.
    pub fn remove(&mut self, id: ObjectId) -> Option<usize> {
        let index = self.current.iter().position(|item| *item == id)?;
        self.current.remove(index);
        Some(index)
    }

    /// Removes every current item.
    pub fn clear(&mut self) {
        self.current.clear();
    }

    /// Replaces the current items.
    pub fn replace_current(&mut self, items: Vec<ObjectId>) {
        self.current = items;
    }
}

impl EndPointData for CollectionData {
    fn contains_original(&self, id: ObjectId) -> bool {
        self.original.contains(&id)
    }

    fn original_items(&self) -> Vec<ObjectId> {
        self.original.clone()
    }

    fn current_items(&self) -> Vec<ObjectId> {
        self.current.clone()
    }

    fn add_original(&mut self, id: ObjectId) {
        if !self.original.contains(&id) {
            self.original.push(id);
        }
        if !self.current.contains(&id) {
            self.current.push(id);
        }
    }

    fn remove_original(&mut self, id: ObjectId) {
        self.original.retain(|item| *item != id);
        self.current.retain(|item| *item != id);
    }

    fn has_changed(&self, order_sensitive: bool) -> bool {
        if order_sensitive {
            self.original != self.current
        } else {
            self.original.len() != self.current.len()
                || self.original.iter().collect::<BTreeSet<_>>()
                    != self.current.iter().collect::<BTreeSet<_>>()
        }
    }

    fn commit(&mut self) {
        self.original = self.current.clone();
    }

    fn rollback(&mut self) {
        self.current = self.original.clone();
    }
}

/// Virtual end point holding a collection of related objects.
pub type CollectionEndPoint = VirtualEndPoint<CollectionData>;

impl VirtualEndPoint<CollectionData> {
    /// Current items, failing if incomplete.
    pub fn items(&self) -> CoreResult<&[ObjectId]> {
        self.require_data().map(CollectionData::items)
    }
}
