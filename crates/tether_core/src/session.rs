//! Session context.
//!
//! The engine does not own the unit-of-work; it only needs two things from
//! it: whether the session is still open (lazy loads are refused against a
//! closed session), and which collections the session currently tracks
//! (a detached collection must not be written back to the cache).

use crate::error::{CollectionError, CollectionResult};
use crate::stats::SessionStats;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tether_persister::{CollectionKey, CollectionRole};

/// The slice of a session the collection engine depends on.
///
/// One `SessionContext` per logical session. Operations on a given
/// collection are strictly sequential within a session; the context itself
/// is thread-safe so flush actions and post-transaction callbacks can hold
/// it across suspension points.
#[derive(Debug)]
pub struct SessionContext {
    /// Whether the session is still open.
    open: AtomicBool,
    /// Collections currently tracked by this session.
    tracked: RwLock<HashSet<CollectionKey>>,
    /// Statistics sink.
    stats: Arc<SessionStats>,
}

impl SessionContext {
    /// Creates a new open session context.
    #[must_use]
    pub fn new() -> Self {
        Self {
            open: AtomicBool::new(true),
            tracked: RwLock::new(HashSet::new()),
            stats: Arc::new(SessionStats::new()),
        }
    }

    /// Returns true while the session is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Closes the session. Lazy loads fail afterwards.
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    /// Fails with a lazy access error if the session is closed.
    pub fn ensure_open(&self, role: &CollectionRole) -> CollectionResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(CollectionError::lazy_access(role.clone()))
        }
    }

    /// Starts tracking a collection.
    pub fn track_collection(&self, key: CollectionKey) {
        self.tracked.write().insert(key);
    }

    /// Stops tracking a collection (eviction, detach, reference replaced).
    ///
    /// Returns true if the collection was tracked.
    pub fn forget_collection(&self, key: &CollectionKey) -> bool {
        self.tracked.write().remove(key)
    }

    /// Returns true if the session tracks the collection.
    #[must_use]
    pub fn contains_collection(&self, key: &CollectionKey) -> bool {
        self.tracked.read().contains(key)
    }

    /// Returns the number of tracked collections.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.tracked.read().len()
    }

    /// Returns the session's statistics sink.
    #[must_use]
    pub fn stats(&self) -> Arc<SessionStats> {
        Arc::clone(&self.stats)
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_persister::OwnerKey;

    fn key() -> CollectionKey {
        CollectionKey::new(
            OwnerKey::from_bytes([3u8; 16]),
            CollectionRole::new("Order.lines"),
        )
    }

    #[test]
    fn new_session_is_open() {
        let session = SessionContext::new();
        assert!(session.is_open());
        assert!(session.ensure_open(&CollectionRole::new("r")).is_ok());
    }

    #[test]
    fn closed_session_refuses_lazy_access() {
        let session = SessionContext::new();
        session.close();

        let result = session.ensure_open(&CollectionRole::new("Order.lines"));
        assert!(matches!(result, Err(CollectionError::LazyAccess { .. })));
    }

    #[test]
    fn tracking_roundtrip() {
        let session = SessionContext::new();
        let key = key();

        assert!(!session.contains_collection(&key));
        session.track_collection(key.clone());
        assert!(session.contains_collection(&key));
        assert_eq!(session.tracked_count(), 1);

        assert!(session.forget_collection(&key));
        assert!(!session.contains_collection(&key));
    }

    #[test]
    fn forget_untracked_returns_false() {
        let session = SessionContext::new();
        assert!(!session.forget_collection(&key()));
    }
}
