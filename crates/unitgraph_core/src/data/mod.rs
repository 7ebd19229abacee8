//! Data containers, the identity map and invalid-object tracking.

mod container;
mod invalid;
mod map;

pub use container::{DataContainer, ObjectState};
pub use invalid::InvalidObjectManager;
pub use map::DataContainerMap;
