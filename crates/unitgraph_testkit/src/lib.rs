//! # UnitGraph Testkit
//!
//! Test utilities for UnitGraph.
//!
//! This crate provides:
//! - The order-processing mapping and seeded in-memory storage
//! - A [`TestHierarchy`] with a recording listener on its root transaction
//! - Recording and vetoing transaction listeners
//! - Call-order tracking commands
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use unitgraph_testkit::prelude::*;
//!
//! let (mut hierarchy, seed) = TestHierarchy::seeded();
//! let order = hierarchy.get_object(seed.order).unwrap();
//! assert_eq!(hierarchy.related_objects(&order, "OrderItems").unwrap().len(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod commands;
pub mod fixtures;
pub mod generators;
pub mod listeners;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::commands::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::listeners::*;
}

pub use commands::*;
pub use fixtures::*;
pub use generators::*;
pub use listeners::*;

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Routes `tracing` output of the core to the test writer.
///
/// The filter comes from `RUST_LOG` and defaults to `warn`. Safe to call from
/// every test; only the first call installs the subscriber.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
