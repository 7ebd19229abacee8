//! # UnitGraph Core
//!
//! Identity-mapped unit of work with nested transactions.
//!
//! A [`TransactionHierarchy`] tracks domain objects as [`DataContainer`]s in
//! an identity map, one per transaction. Relations between objects are kept
//! as relation end points: the real side stores a foreign key, the virtual
//! side (a one-valued back reference or a collection) is loaded lazily and
//! kept consistent with the real side by bidirectional commands.
//!
//! ## Design Principles
//!
//! - Every mutation is a [`Command`](commands::Command) with `begin`,
//!   `perform` and `end` phases; listeners can veto during `begin`
//! - Sub-transactions load from and commit into their parent; the parent is
//!   read-only while a sub-transaction is active
//! - Unloading runs on the whole hierarchy or not at all
//! - Persistence is a collaborator behind [`PersistenceStrategy`]
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use unitgraph_core::{InMemoryStorage, MappingBuilder, ObjectState, TransactionHierarchy, Value};
//!
//! let mapping = MappingBuilder::new()
//!     .class("Customer")
//!     .class("Order")
//!     .property("Customer", "Name", Value::Null)
//!     .one_to_many(("Customer", "Orders"), ("Order", "Customer"))
//!     .build()?;
//! let mut hierarchy = TransactionHierarchy::new(mapping, Arc::new(InMemoryStorage::new()));
//!
//! let customer = hierarchy.new_object("Customer")?;
//! let order = hierarchy.new_object("Order")?;
//! hierarchy.set_related_object(&order, "Customer", Some(&customer))?;
//! assert_eq!(hierarchy.related_objects(&customer, "Orders")?, vec![order]);
//!
//! hierarchy.commit()?;
//! assert_eq!(hierarchy.state(&order)?, ObjectState::Unchanged);
//! # Ok::<(), unitgraph_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod commands;
mod config;
pub mod data;
mod data_manager;
mod error;
mod events;
pub mod loading;
mod mapping;
pub mod persistence;
pub mod relations;
pub mod transaction;
mod types;
mod value;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use data::{DataContainer, DataContainerMap, InvalidObjectManager, ObjectState};
pub use data_manager::DataManager;
pub use error::{CoreError, CoreResult};
pub use events::{
    LoggingTransactionListener, ReadOnlyTransactionListener, TransactionEventSink,
    TransactionListener,
};
pub use loading::LazyLoader;
pub use mapping::{
    ClassDefinition, EndPointKind, MappingBuilder, MappingConfiguration, PropertyDefinition,
    RelationEndPointDefinition,
};
pub use persistence::{
    InMemoryStorage, ObjectData, PersistableData, PersistableState, PersistenceStrategy, Query,
};
pub use transaction::{ClientTransaction, DomainObject, TransactionHierarchy, TransactionScope};
pub use types::{ClassId, ObjectId, ObjectKey, RelationEndPointId, Timestamp, TransactionId};
pub use value::Value;
