//! Storage round-trip counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters of storage round trips.
///
/// All counters are atomic and monotonically increasing.
#[derive(Debug, Default)]
pub struct StorageStats {
    /// Single and bulk object loads.
    object_loads: AtomicU64,
    /// Related-object loads, fetch queries included.
    related_loads: AtomicU64,
    /// Query executions.
    queries: AtomicU64,
    /// Successful `persist_data` calls.
    persists: AtomicU64,
    /// Rejected `persist_data` calls.
    conflicts: AtomicU64,
}

impl StorageStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_object_load(&self) {
        self.object_loads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_related_load(&self) {
        self.related_loads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_query(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_persist(&self) {
        self.persists.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> StorageStatsSnapshot {
        StorageStatsSnapshot {
            object_loads: self.object_loads.load(Ordering::Relaxed),
            related_loads: self.related_loads.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
            persists: self.persists.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`StorageStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StorageStatsSnapshot {
    /// Single and bulk object loads.
    pub object_loads: u64,
    /// Related-object loads, fetch queries included.
    pub related_loads: u64,
    /// Query executions.
    pub queries: u64,
    /// Successful `persist_data` calls.
    pub persists: u64,
    /// Rejected `persist_data` calls.
    pub conflicts: u64,
}

impl StorageStatsSnapshot {
    /// Total number of read round trips.
    #[must_use]
    pub fn reads(&self) -> u64 {
        self.object_loads + self.related_loads + self.queries
    }
}
