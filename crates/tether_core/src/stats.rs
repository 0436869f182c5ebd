//! Session statistics.
//!
//! Counters for collection loads, flush-time row work and second-level
//! cache traffic. Statistics are observational only and never on the
//! correctness path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Statistics for one session's collection engine.
///
/// All counters are atomic and can be read while operations are in
/// progress. Values are monotonically increasing.
#[derive(Debug, Default)]
pub struct SessionStats {
    /// Collections materialized from storage.
    loads: AtomicU64,
    /// Collection loads satisfied from the cache region.
    cache_hits: AtomicU64,
    /// Flush actions that issued row-level delta writes.
    collections_updated: AtomicU64,
    /// Flush actions that removed a collection's full row set.
    collections_removed: AtomicU64,
    /// Flush actions that recreated a collection from scratch.
    collections_recreated: AtomicU64,
    /// Cache entries published after commit.
    cache_puts: AtomicU64,
    /// Cache writes skipped because their preconditions failed.
    cache_writes_skipped: AtomicU64,
    /// Cumulative time spent executing flush actions, in nanoseconds.
    update_nanos: AtomicU64,
}

impl SessionStats {
    /// Creates a new stats instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a storage-driven materialization.
    pub(crate) fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a cache-satisfied materialization.
    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a flush action with its elapsed time.
    pub(crate) fn record_collection_update(&self, elapsed: Duration) {
        self.collections_updated.fetch_add(1, Ordering::Relaxed);
        self.update_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Records a full row-set removal.
    pub(crate) fn record_collection_removed(&self) {
        self.collections_removed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a collection recreate.
    pub(crate) fn record_collection_recreated(&self) {
        self.collections_recreated.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a cache entry published after commit.
    pub(crate) fn record_cache_put(&self) {
        self.cache_puts.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a cache write that degraded to a skip.
    pub(crate) fn record_cache_write_skipped(&self) {
        self.cache_writes_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of storage-driven loads.
    #[must_use]
    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    /// Returns the number of cache-satisfied loads.
    #[must_use]
    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    /// Returns the number of executed flush actions.
    #[must_use]
    pub fn collections_updated(&self) -> u64 {
        self.collections_updated.load(Ordering::Relaxed)
    }

    /// Returns the number of full row-set removals.
    #[must_use]
    pub fn collections_removed(&self) -> u64 {
        self.collections_removed.load(Ordering::Relaxed)
    }

    /// Returns the number of recreates.
    #[must_use]
    pub fn collections_recreated(&self) -> u64 {
        self.collections_recreated.load(Ordering::Relaxed)
    }

    /// Returns the number of cache puts.
    #[must_use]
    pub fn cache_puts(&self) -> u64 {
        self.cache_puts.load(Ordering::Relaxed)
    }

    /// Returns the number of skipped cache writes.
    #[must_use]
    pub fn cache_writes_skipped(&self) -> u64 {
        self.cache_writes_skipped.load(Ordering::Relaxed)
    }

    /// Returns the cumulative flush-action time.
    #[must_use]
    pub fn update_time(&self) -> Duration {
        Duration::from_nanos(self.update_nanos.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let stats = SessionStats::new();
        assert_eq!(stats.loads(), 0);
        assert_eq!(stats.cache_puts(), 0);
        assert_eq!(stats.update_time(), Duration::ZERO);
    }

    #[test]
    fn update_accumulates_time() {
        let stats = SessionStats::new();
        stats.record_collection_update(Duration::from_millis(2));
        stats.record_collection_update(Duration::from_millis(3));

        assert_eq!(stats.collections_updated(), 2);
        assert_eq!(stats.update_time(), Duration::from_millis(5));
    }

    #[test]
    fn cache_counters_are_independent() {
        let stats = SessionStats::new();
        stats.record_cache_put();
        stats.record_cache_write_skipped();
        stats.record_cache_write_skipped();

        assert_eq!(stats.cache_puts(), 1);
        assert_eq!(stats.cache_writes_skipped(), 2);
    }
}
