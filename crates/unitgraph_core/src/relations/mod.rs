//! Relation end points.
//!
//! Every bidirectional relation has a real side, which stores the foreign key
//! in its owner's [`DataContainer`](crate::DataContainer), and a virtual side,
//! which is computed from the real sides and loaded lazily. End points are
//! addressed by [`RelationEndPointId`] in a [`RelationEndPointMap`]; they hold
//! no references to each other.

mod collection;
mod manager;
mod map;
mod real;
mod virtual_object;
mod virtual_state;

pub use collection::{CollectionData, CollectionEndPoint};
pub use manager::{RelationEndPointManager, UnregisterPlan};
pub use map::RelationEndPointMap;
pub use real::RealObjectEndPoint;
pub use virtual_object::{VirtualObjectData, VirtualObjectEndPoint};
pub use virtual_state::{CompleteState, EndPointData, LoadState, VirtualEndPoint};

use crate::types::{ObjectId, RelationEndPointId};
use std::collections::BTreeSet;

/// One side of a relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationEndPoint {
    /// Foreign-key side.
    RealObject(RealObjectEndPoint),
    /// Single-object virtual side.
    VirtualObject(VirtualObjectEndPoint),
    /// Collection virtual side.
    Collection(CollectionEndPoint),
}

impl RelationEndPoint {
    /// Identity of the end point.
    #[must_use]
    pub fn id(&self) -> RelationEndPointId {
        match self {
            Self::RealObject(ep) => ep.id(),
            Self::VirtualObject(ep) => ep.id(),
            Self::Collection(ep) => ep.id(),
        }
    }

    /// Owning object.
    #[must_use]
    pub fn object_id(&self) -> ObjectId {
        self.id().object_id()
    }

    /// Returns `true` for virtual end points.
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        !matches!(self, Self::RealObject(_))
    }

    /// Real end points are always complete.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        match self {
            Self::RealObject(_) => true,
            Self::VirtualObject(ep) => ep.is_complete(),
            Self::Collection(ep) => ep.is_complete(),
        }
    }

    /// Returns `true` if written since the last commit or rollback.
    #[must_use]
    pub fn is_touched(&self) -> bool {
        match self {
            Self::RealObject(ep) => ep.is_touched(),
            Self::VirtualObject(ep) => ep.is_touched(),
            Self::Collection(ep) => ep.is_touched(),
        }
    }

    /// Marks the end point as written.
    pub fn touch(&mut self) {
        match self {
            Self::RealObject(ep) => ep.touch(),
            Self::VirtualObject(ep) => ep.touch(),
            Self::Collection(ep) => ep.touch(),
        }
    }

    /// Whether the virtual data changed. Always `false` for real end points,
    /// whose changes live in the data container.
    #[must_use]
    pub fn has_virtual_changes(&self, order_sensitive: bool) -> bool {
        match self {
            Self::RealObject(_) => false,
            Self::VirtualObject(ep) => ep.load_state().has_changed(order_sensitive),
            Self::Collection(ep) => ep.load_state().has_changed(order_sensitive),
        }
    }

    /// See [`LoadState::can_be_collected`]. Real end points live as long as their container.
    #[must_use]
    pub fn can_be_collected(&self) -> bool {
        match self {
            Self::RealObject(_) => false,
            Self::VirtualObject(ep) => ep.load_state().can_be_collected(),
            Self::Collection(ep) => ep.load_state().can_be_collected(),
        }
    }

    /// See [`LoadState::can_be_marked_incomplete`].
    #[must_use]
    pub fn can_be_marked_incomplete(&self, order_sensitive: bool) -> bool {
        match self {
            Self::RealObject(_) => false,
            Self::VirtualObject(ep) => ep.load_state().can_be_marked_incomplete(order_sensitive),
            Self::Collection(ep) => ep.load_state().can_be_marked_incomplete(order_sensitive),
        }
    }

    /// Owners of the real end points registered with a virtual end point.
    #[must_use]
    pub fn registered_opposites(&self) -> BTreeSet<ObjectId> {
        match self {
            Self::RealObject(_) => BTreeSet::new(),
            Self::VirtualObject(ep) => ep.load_state().registered_opposites(),
            Self::Collection(ep) => ep.load_state().registered_opposites(),
        }
    }

    /// Current opposite objects of a virtual end point, `None` while incomplete.
    #[must_use]
    pub fn current_virtual_items(&self) -> Option<Vec<ObjectId>> {
        match self {
            Self::RealObject(_) => None,
            Self::VirtualObject(ep) => ep.load_state().data().map(EndPointData::current_items),
            Self::Collection(ep) => ep.load_state().data().map(EndPointData::current_items),
        }
    }

    /// Real end point, if this is one.
    #[must_use]
    pub fn as_real(&self) -> Option<&RealObjectEndPoint> {
        match self {
            Self::RealObject(ep) => Some(ep),
            _ => None,
        }
    }

    /// Mutable real end point, if this is one.
    pub fn as_real_mut(&mut self) -> Option<&mut RealObjectEndPoint> {
        match self {
            Self::RealObject(ep) => Some(ep),
            _ => None,
        }
    }

    /// Virtual object end point, if this is one.
    #[must_use]
    pub fn as_virtual_object(&self) -> Option<&VirtualObjectEndPoint> {
        match self {
            Self::VirtualObject(ep) => Some(ep),
            _ => None,
        }
    }

    /// Mutable virtual object end point, if this is one.
    pub fn as_virtual_object_mut(&mut self) -> Option<&mut VirtualObjectEndPoint> {
        match self {
            Self::VirtualObject(ep) => Some(ep),
            _ => None,
        }
    }

    /// Collection end point, if this is one.
    #[must_use]
    pub fn as_collection(&self) -> Option<&CollectionEndPoint> {
        match self {
            Self::Collection(ep) => Some(ep),
            _ => None,
        }
    }

    /// Mutable collection end point, if this is one.
    pub fn as_collection_mut(&mut self) -> Option<&mut CollectionEndPoint> {
        match self {
            Self::Collection(ep) => Some(ep),
            _ => None,
        }
    }
}
