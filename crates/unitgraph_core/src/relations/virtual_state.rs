//! Load and synchronization state shared by virtual end points.
//!
//! A virtual end point is *incomplete* until its data is loaded. While
//! incomplete it only remembers which real end points have registered with
//! it (by their original foreign key). Once complete, every registered real
//! end point is classified:
//!
//! - *synchronized* if the loaded data contains its owner,
//! - *unsynchronized* if it does not.
//!
//! Items of the loaded data with no registered real end point are kept as
//! *items without end points*. The end point is synchronized when both the
//! unsynchronized set and the items-without set are empty.

use crate::error::{CoreError, CoreResult};
use crate::types::{ObjectId, RelationEndPointId};
use std::collections::BTreeSet;

/// Original and current data of a virtual end point.
pub trait EndPointData: Clone + std::fmt::Debug {
    /// Returns `true` if `id` is part of the original data.
    fn contains_original(&self, id: ObjectId) -> bool;

    /// Items of the original data.
    fn original_items(&self) -> Vec<ObjectId>;

    /// Items of the current data.
    fn current_items(&self) -> Vec<ObjectId>;

    /// Adds `id` to the original and current data.
    fn add_original(&mut self, id: ObjectId);

    /// Removes `id` from the original and current data.
    fn remove_original(&mut self, id: ObjectId);

    /// Returns `true` if the current data differs from the original.
    ///
    /// With `order_sensitive` unset, collections compare as sets.
    fn has_changed(&self, order_sensitive: bool) -> bool;

    /// Accepts the current data as original.
    fn commit(&mut self);

    /// Restores the original data.
    fn rollback(&mut self);
}

/// Data of a complete virtual end point plus the classification of its opposites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteState<D> {
    pub(crate) data: D,
    synchronized: BTreeSet<ObjectId>,
    unsynchronized: BTreeSet<ObjectId>,
    items_without_end_points: BTreeSet<ObjectId>,
}

impl<D: EndPointData> CompleteState<D> {
    /// Loaded data.
    pub fn data(&self) -> &D {
        &self.data
    }

    /// Owners of registered real end points that agree with the data.
    pub fn synchronized(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.synchronized.iter().copied()
    }

    /// Owners of registered real end points that the data does not contain.
    pub fn unsynchronized(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.unsynchronized.iter().copied()
    }

    /// Items of the data without a registered real end point.
    pub fn items_without_end_points(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.items_without_end_points.iter().copied()
    }
}

/// Load state of a virtual end point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState<D> {
    /// Data not loaded; only the registered real end points are known.
    Incomplete {
        /// Owners of real end points whose original foreign key points here.
        registered: BTreeSet<ObjectId>,
    },
    /// Data loaded.
    Complete(CompleteState<D>),
}

impl<D: EndPointData> LoadState<D> {
    /// Incomplete state without registrations.
    #[must_use]
    pub fn incomplete() -> Self {
        Self::Incomplete {
            registered: BTreeSet::new(),
        }
    }

    /// Complete state for data without opposites, e.g. of a new object.
    #[must_use]
    pub fn complete(data: D) -> Self {
        Self::Complete(CompleteState {
            data,
            synchronized: BTreeSet::new(),
            unsynchronized: BTreeSet::new(),
            items_without_end_points: BTreeSet::new(),
        })
    }

    /// Returns `true` once data is loaded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }

    /// Loaded data, if complete.
    #[must_use]
    pub fn data(&self) -> Option<&D> {
        match self {
            Self::Complete(state) => Some(&state.data),
            Self::Incomplete { .. } => None,
        }
    }

    /// Loaded data for mutation, if complete.
    pub fn data_mut(&mut self) -> Option<&mut D> {
        match self {
            Self::Complete(state) => Some(&mut state.data),
            Self::Incomplete { .. } => None,
        }
    }

    /// Complete state, if any.
    #[must_use]
    pub fn as_complete(&self) -> Option<&CompleteState<D>> {
        match self {
            Self::Complete(state) => Some(state),
            Self::Incomplete { .. } => None,
        }
    }

    /// Owners of all registered real end points.
    #[must_use]
    pub fn registered_opposites(&self) -> BTreeSet<ObjectId> {
        match self {
            Self::Incomplete { registered } => registered.clone(),
            Self::Complete(state) => state
                .synchronized
                .union(&state.unsynchronized)
                .copied()
                .collect(),
        }
    }

    /// Registers a real end point whose original foreign key points here.
    pub fn register_original_opposite(&mut self, owner: ObjectId) {
        match self {
            Self::Incomplete { registered } => {
                registered.insert(owner);
            }
            Self::Complete(state) => {
                if state.data.contains_original(owner) {
                    state.items_without_end_points.remove(&owner);
                    state.synchronized.insert(owner);
                } else {
                    state.unsynchronized.insert(owner);
                }
            }
        }
    }

    /// Reverses [`LoadState::register_original_opposite`].
    pub(crate) fn revert_original_opposite(&mut self, owner: ObjectId) {
        match self {
            Self::Incomplete { registered } => {
                registered.remove(&owner);
            }
            Self::Complete(state) => {
                if state.synchronized.remove(&owner) {
                    state.items_without_end_points.insert(owner);
                } else {
                    state.unsynchronized.remove(&owner);
                }
            }
        }
    }

    /// Unregisters a real end point whose original foreign key pointed here.
    ///
    /// Removing a synchronized opposite from complete data would leave the data
    /// inconsistent, so the end point falls back to incomplete. That is only
    /// possible while the data is unchanged.
    pub fn unregister_original_opposite(
        &mut self,
        owner: ObjectId,
        order_sensitive: bool,
    ) -> CoreResult<()> {
        match self {
            Self::Incomplete { registered } => {
                registered.remove(&owner);
                Ok(())
            }
            Self::Complete(state) => {
                if state.unsynchronized.remove(&owner) {
                    return Ok(());
                }
                if !state.synchronized.contains(&owner) {
                    return Ok(());
                }
                if state.data.has_changed(order_sensitive) {
                    return Err(CoreError::invalid_operation(format!(
                        "cannot unregister {owner} from changed relation data"
                    )));
                }
                state.synchronized.remove(&owner);
                let mut registered: BTreeSet<ObjectId> =
                    state.synchronized.union(&state.unsynchronized).copied().collect();
                registered.remove(&owner);
                *self = Self::Incomplete { registered };
                Ok(())
            }
        }
    }

    /// Moves a registration out without touching completeness.
    ///
    /// Used when committing a changed foreign key.
    pub(crate) fn release_registration(&mut self, owner: ObjectId) {
        match self {
            Self::Incomplete { registered } => {
                registered.remove(&owner);
            }
            Self::Complete(state) => {
                state.synchronized.remove(&owner);
                state.unsynchronized.remove(&owner);
            }
        }
    }

    /// Registers an opposite whose committed foreign key now points here.
    pub(crate) fn adopt_registration(&mut self, owner: ObjectId) {
        match self {
            Self::Incomplete { registered } => {
                registered.insert(owner);
            }
            Self::Complete(state) => {
                if state.data.current_items().contains(&owner) {
                    state.items_without_end_points.remove(&owner);
                    state.synchronized.insert(owner);
                } else {
                    state.unsynchronized.insert(owner);
                }
            }
        }
    }

    /// Marks the data complete and synchronizes the registered opposites.
    ///
    /// A second call on a complete state is a no-op.
    pub fn mark_complete(&mut self, data: D) {
        let Self::Incomplete { registered } = self else {
            return;
        };
        let items: BTreeSet<ObjectId> = data.original_items().into_iter().collect();
        let synchronized = registered.intersection(&items).copied().collect();
        let unsynchronized = registered.difference(&items).copied().collect();
        let items_without_end_points = items.difference(registered).copied().collect();
        *self = Self::Complete(CompleteState {
            data,
            synchronized,
            unsynchronized,
            items_without_end_points,
        });
    }

    /// Returns `true` if the state may fall back to incomplete.
    #[must_use]
    pub fn can_be_marked_incomplete(&self, order_sensitive: bool) -> bool {
        match self {
            Self::Incomplete { .. } => true,
            Self::Complete(state) => !state.data.has_changed(order_sensitive),
        }
    }

    /// Drops the loaded data, keeping the registrations.
    pub fn mark_incomplete(&mut self, id: RelationEndPointId, order_sensitive: bool) -> CoreResult<()> {
        if !self.can_be_marked_incomplete(order_sensitive) {
            return Err(CoreError::cannot_unload(id, "the relation has been changed"));
        }
        let registered = self.registered_opposites();
        *self = Self::Incomplete { registered };
        Ok(())
    }

    /// Returns `true` if the end point may be removed from the map.
    ///
    /// Complete data stays resident; incomplete end points are collectable once
    /// no real end point is registered.
    #[must_use]
    pub fn can_be_collected(&self) -> bool {
        match self {
            Self::Incomplete { registered } => registered.is_empty(),
            Self::Complete(_) => false,
        }
    }

    /// `None` while incomplete.
    #[must_use]
    pub fn is_synchronized(&self) -> Option<bool> {
        self.as_complete().map(|state| {
            state.unsynchronized.is_empty() && state.items_without_end_points.is_empty()
        })
    }

    /// Whether the real end point owned by `owner` agrees with this data.
    ///
    /// `None` while incomplete or if `owner` is not registered.
    #[must_use]
    pub fn is_opposite_synchronized(&self, owner: ObjectId) -> Option<bool> {
        let state = self.as_complete()?;
        if state.synchronized.contains(&owner) {
            Some(true)
        } else if state.unsynchronized.contains(&owner) {
            Some(false)
        } else {
            None
        }
    }

    /// Removes the items without end points from the data.
    pub fn synchronize(&mut self) {
        if let Self::Complete(state) = self {
            for item in std::mem::take(&mut state.items_without_end_points) {
                state.data.remove_original(item);
            }
        }
    }

    /// Adopts an unsynchronized real end point into the data.
    pub fn synchronize_opposite(&mut self, owner: ObjectId) -> CoreResult<()> {
        match self {
            Self::Complete(state) => {
                if state.unsynchronized.remove(&owner) {
                    state.data.add_original(owner);
                    state.synchronized.insert(owner);
                }
                Ok(())
            }
            Self::Incomplete { .. } => Err(CoreError::invalid_operation(format!(
                "cannot synchronize {owner} with incomplete relation data"
            ))),
        }
    }

    /// Returns `false` while incomplete.
    #[must_use]
    pub fn has_changed(&self, order_sensitive: bool) -> bool {
        self.data().is_some_and(|d| d.has_changed(order_sensitive))
    }

    /// Accepts the current data.
    pub fn commit(&mut self) {
        if let Self::Complete(state) = self {
            state.data.commit();
            let items: BTreeSet<ObjectId> = state.data.original_items().into_iter().collect();
            state.items_without_end_points.retain(|item| items.contains(item));
        }
    }

    /// Restores the original data.
    pub fn rollback(&mut self) {
        if let Some(data) = self.data_mut() {
            data.rollback();
        }
    }
}

/// Virtual end point of either shape.
///
/// The shape-specific operations live with the data types,
/// [`CollectionData`](super::CollectionData) and
/// [`VirtualObjectData`](super::VirtualObjectData).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualEndPoint<D> {
    id: RelationEndPointId,
    opposite_property: &'static str,
    pub(crate) state: LoadState<D>,
    touched: bool,
}

impl<D: EndPointData> VirtualEndPoint<D> {
    /// Creates an incomplete end point.
    #[must_use]
    pub fn incomplete(id: RelationEndPointId, opposite_property: &'static str) -> Self {
        Self {
            id,
            opposite_property,
            state: LoadState::incomplete(),
            touched: false,
        }
    }

    /// Creates a complete end point, e.g. for a new object.
    #[must_use]
    pub fn complete(id: RelationEndPointId, opposite_property: &'static str, data: D) -> Self {
        Self {
            id,
            opposite_property,
            state: LoadState::complete(data),
            touched: false,
        }
    }

    /// Identity of the end point.
    #[must_use]
    pub fn id(&self) -> RelationEndPointId {
        self.id
    }

    /// Property of the real end points on the other side.
    #[must_use]
    pub fn opposite_property(&self) -> &'static str {
        self.opposite_property
    }

    /// Load state.
    #[must_use]
    pub fn load_state(&self) -> &LoadState<D> {
        &self.state
    }

    /// Load state for mutation.
    pub fn load_state_mut(&mut self) -> &mut LoadState<D> {
        &mut self.state
    }

    /// Returns `true` once data is loaded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state.is_complete()
    }

    /// Returns `true` if written since the last commit or rollback.
    #[must_use]
    pub fn is_touched(&self) -> bool {
        self.touched
    }

    /// Marks the end point as written.
    pub fn touch(&mut self) {
        self.touched = true;
    }

    /// Loaded data, failing if incomplete.
    pub fn require_data(&self) -> CoreResult<&D> {
        self.state.data().ok_or_else(|| self.incomplete_error())
    }

    /// Loaded data for mutation, failing if incomplete.
    pub fn require_data_mut(&mut self) -> CoreResult<&mut D> {
        let id = self.id;
        self.state
            .data_mut()
            .ok_or_else(|| CoreError::invalid_operation(format!("{id} is not loaded")))
    }

    /// Accepts the current data.
    pub fn commit(&mut self) {
        self.state.commit();
        self.touched = false;
    }

    /// Restores the original data.
    pub fn rollback(&mut self) {
        self.state.rollback();
        self.touched = false;
    }

    fn incomplete_error(&self) -> CoreError {
        CoreError::invalid_operation(format!("{} is not loaded", self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::super::CollectionData;
    use super::*;
    use crate::types::{ClassId, ObjectKey};

    fn order(key: u128) -> ObjectId {
        ObjectId::new(ClassId::new("Order"), ObjectKey::from_u128(key))
    }

    fn end_point_id() -> RelationEndPointId {
        RelationEndPointId::new(
            ObjectId::new(ClassId::new("Customer"), ObjectKey::from_u128(100)),
            "Orders",
        )
    }

    #[test]
    fn completion_classifies_registered_opposites() {
        let mut state: LoadState<CollectionData> = LoadState::incomplete();
        state.register_original_opposite(order(1));
        state.register_original_opposite(order(2));
        assert_eq!(state.is_synchronized(), None);

        state.mark_complete(CollectionData::new(vec![order(1), order(3)]));

        assert_eq!(state.is_opposite_synchronized(order(1)), Some(true));
        assert_eq!(state.is_opposite_synchronized(order(2)), Some(false));
        let complete = state.as_complete().unwrap();
        assert_eq!(complete.items_without_end_points().collect::<Vec<_>>(), vec![order(3)]);
        assert_eq!(state.is_synchronized(), Some(false));
    }

    #[test]
    fn mark_complete_is_idempotent() {
        let mut state: LoadState<CollectionData> = LoadState::incomplete();
        state.mark_complete(CollectionData::new(vec![order(1)]));
        state.mark_complete(CollectionData::new(vec![order(2)]));
        assert_eq!(state.data().unwrap().current_items(), vec![order(1)]);
    }

    #[test]
    fn late_registration_resolves_item_without_end_point() {
        let mut state: LoadState<CollectionData> = LoadState::incomplete();
        state.mark_complete(CollectionData::new(vec![order(1)]));
        assert_eq!(state.is_synchronized(), Some(false));

        state.register_original_opposite(order(1));
        assert_eq!(state.is_synchronized(), Some(true));
    }

    #[test]
    fn synchronize_drops_items_without_end_points() {
        let mut state: LoadState<CollectionData> = LoadState::incomplete();
        state.register_original_opposite(order(1));
        state.mark_complete(CollectionData::new(vec![order(1), order(2)]));

        state.synchronize();
        assert_eq!(state.data().unwrap().current_items(), vec![order(1)]);
        assert_eq!(state.is_synchronized(), Some(true));
    }

    #[test]
    fn synchronize_opposite_adopts_item() {
        let mut state: LoadState<CollectionData> = LoadState::incomplete();
        state.register_original_opposite(order(2));
        state.mark_complete(CollectionData::new(vec![]));

        state.synchronize_opposite(order(2)).unwrap();
        assert_eq!(state.is_opposite_synchronized(order(2)), Some(true));
        assert_eq!(state.data().unwrap().original_items(), vec![order(2)]);
        assert!(!state.has_changed(true));
    }

    #[test]
    fn unregistering_synchronized_opposite_marks_incomplete() {
        let mut state: LoadState<CollectionData> = LoadState::incomplete();
        state.register_original_opposite(order(1));
        state.register_original_opposite(order(2));
        state.mark_complete(CollectionData::new(vec![order(1), order(2)]));

        state.unregister_original_opposite(order(1), false).unwrap();
        assert!(!state.is_complete());
        assert_eq!(state.registered_opposites().into_iter().collect::<Vec<_>>(), vec![order(2)]);
    }

    #[test]
    fn changed_data_cannot_be_marked_incomplete() {
        let mut state: LoadState<CollectionData> = LoadState::incomplete();
        state.mark_complete(CollectionData::new(vec![order(1)]));
        state.data_mut().unwrap().remove(order(1));

        assert!(!state.can_be_marked_incomplete(false));
        let err = state.mark_incomplete(end_point_id(), false).unwrap_err();
        assert!(matches!(err, CoreError::CannotUnload { .. }));
    }

    #[test]
    fn collectable_only_when_incomplete_and_unreferenced() {
        let mut state: LoadState<CollectionData> = LoadState::incomplete();
        assert!(state.can_be_collected());
        state.register_original_opposite(order(1));
        assert!(!state.can_be_collected());
        state.mark_complete(CollectionData::new(vec![order(1)]));
        assert!(!state.can_be_collected());
    }
}
