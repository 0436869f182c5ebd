//! Collection flush action.

use crate::cache::CollectionCacheEntry;
use crate::collection::PersistentCollection;
use crate::error::{CollectionError, CollectionResult};
use crate::flush::listener::{CollectionListeners, CollectionUpdateEvent};
use crate::session::SessionContext;
use std::sync::Arc;
use std::time::Instant;
use tether_persister::{CacheKey, CollectionKey, CollectionPersister, SoftLock};
use tracing::{debug, warn};

/// Flush-time decision and execution unit for one collection.
///
/// Executed once per dirty (or cache-relevant) collection during flush.
/// The action decides between no-op, full removal, recreate and row-level
/// delta, dispatches the injected pre/post observers around the row-write
/// phase, and carries the cache soft lock from flush time to the
/// post-transaction callback.
///
/// # Cache reconciliation
///
/// The cache write is two-phase. [`before_execution`] acquires a soft lock
/// on the collection's cache key, invalidating concurrent readers. After
/// the enclosing transaction's outcome is known,
/// [`after_transaction_completion`] either publishes a freshly
/// disassembled entry under that lock (commit) or releases the lock
/// without writing (rollback), so no reader ever observes an entry from an
/// uncommitted transaction. Every acquired lock is consumed by exactly one
/// publish or release.
///
/// [`before_execution`]: CollectionFlushAction::before_execution
/// [`after_transaction_completion`]: CollectionFlushAction::after_transaction_completion
#[derive(Debug)]
pub struct CollectionFlushAction<P: CollectionPersister> {
    persister: Arc<P>,
    key: CollectionKey,
    empty_snapshot: bool,
    listeners: CollectionListeners,
    cache_lock: Option<(CacheKey, SoftLock)>,
}

impl<P: CollectionPersister> CollectionFlushAction<P> {
    /// Creates a flush action.
    ///
    /// `empty_snapshot` is true when the collection had no prior row
    /// representation (a brand-new owner).
    pub fn new(
        persister: Arc<P>,
        key: CollectionKey,
        empty_snapshot: bool,
        listeners: CollectionListeners,
    ) -> Self {
        Self {
            persister,
            key,
            empty_snapshot,
            listeners,
            cache_lock: None,
        }
    }

    /// Returns the identity of the collection this action flushes.
    #[must_use]
    pub fn key(&self) -> &CollectionKey {
        &self.key
    }

    /// Returns true while the action holds a cache soft lock.
    #[must_use]
    pub fn holds_cache_lock(&self) -> bool {
        self.cache_lock.is_some()
    }

    /// Acquires the cache soft lock ahead of row writes.
    ///
    /// A no-op when the persister has no cache region. Concurrent readers
    /// treat the locked key as a miss from here until
    /// [`after_transaction_completion`](Self::after_transaction_completion)
    /// consumes the lock.
    pub async fn before_execution(&mut self) -> CollectionResult<()> {
        if self.cache_lock.is_some() {
            return Err(CollectionError::invariant(
                "before_execution called twice on one flush action",
            ));
        }
        if let Some(cache) = self.persister.cache() {
            let cache_key = cache.generate_key(&self.key);
            let lock = cache.lock(&cache_key).await?;
            debug!(key = %self.key, "cache key soft-locked for pending flush");
            self.cache_lock = Some((cache_key, lock));
        }
        Ok(())
    }

    /// Executes the row-write decision table.
    ///
    /// Any row-write failure aborts the remaining writes for this
    /// collection and propagates; sibling collections' actions are
    /// independent of this one.
    pub async fn execute(
        &self,
        collection: &mut PersistentCollection<P::Codec>,
        session: &SessionContext,
    ) -> CollectionResult<()> {
        let stats = session.stats();
        let started = Instant::now();
        let persister = &*self.persister;
        let codec = persister.element_codec();
        let affected_by_filters = persister.is_affected_by_enabled_filters();
        let event = CollectionUpdateEvent {
            key: self.key.clone(),
        };

        self.listeners.fire_pre(&event)?;

        if !collection.was_initialized() {
            if !collection.has_queued_operations() {
                return Err(CollectionError::invariant(
                    "flushing an uninitialized collection with no queued operations",
                ));
            }
            // no row work: queued rows were written with the owning
            // entity; this action only drives cache synchronization
            debug!(key = %self.key, "uninitialized collection; cache synchronization only");
        } else if !affected_by_filters && collection.is_empty() {
            if !self.empty_snapshot {
                persister.remove_all(&self.key).await?;
                stats.record_collection_removed();
                debug!(key = %self.key, "emptied collection; full row set removed");
            }
        } else if collection.needs_recreate(persister) {
            if affected_by_filters {
                // recreating from a filtered view would silently drop the
                // hidden rows
                return Err(CollectionError::filter_conflict(self.key.clone()));
            }
            if !self.empty_snapshot {
                persister.remove_all(&self.key).await?;
            }
            let rows = collection.current_rows();
            persister.recreate(&self.key, &rows).await?;
            stats.record_collection_recreated();
            debug!(key = %self.key, rows = rows.len(), "collection recreated");
        } else {
            let delta = collection.compute_delta(persister);
            if !delta.deletes.is_empty() {
                persister.delete_rows(&self.key, &delta.deletes).await?;
            }
            if !delta.updates.is_empty() {
                persister.update_rows(&self.key, &delta.updates).await?;
            }
            if !delta.inserts.is_empty() {
                persister.insert_rows(&self.key, &delta.inserts).await?;
            }
            debug!(
                key = %self.key,
                deletes = delta.deletes.len(),
                updates = delta.updates.len(),
                inserts = delta.inserts.len(),
                "collection delta written"
            );
        }

        collection.after_action(codec);
        self.listeners.fire_post(&event)?;
        stats.record_collection_update(started.elapsed());
        Ok(())
    }

    /// Reconciles the cache once the transaction outcome is known.
    ///
    /// On success, a still-attached, initialized collection is
    /// disassembled and published under the soft lock; a failed
    /// disassembly or refused put degrades to a skipped cache write, never
    /// to an error, because the transaction has already committed. On failure
    /// the lock is released without writing, leaving the key invalidated.
    pub async fn after_transaction_completion(
        &mut self,
        success: bool,
        collection: &PersistentCollection<P::Codec>,
        session: &SessionContext,
    ) -> CollectionResult<()> {
        let Some(cache) = self.persister.cache() else {
            return Ok(());
        };
        let Some((cache_key, lock)) = self.cache_lock.take() else {
            return Ok(());
        };
        let stats = session.stats();

        if success && collection.was_initialized() && session.contains_collection(&self.key) {
            let entry_bytes = CollectionCacheEntry::create(collection, &*self.persister)
                .and_then(|entry| entry.to_bytes());
            match entry_bytes {
                Ok(bytes) => match cache.put_if_locked(&cache_key, bytes, &lock).await {
                    Ok(true) => {
                        stats.record_cache_put();
                        debug!(key = %self.key, "cache entry published after commit");
                    }
                    Ok(false) => {
                        stats.record_cache_write_skipped();
                    }
                    Err(err) => {
                        warn!(key = %self.key, error = %err, "cache write failed after commit; skipping");
                        stats.record_cache_write_skipped();
                        if let Err(err) = cache.release(&cache_key, lock).await {
                            warn!(key = %self.key, error = %err, "cache lock release failed");
                        }
                    }
                },
                Err(err) => {
                    // stale in-memory state must not poison the cache
                    warn!(key = %self.key, error = %err, "disassembly failed; skipping cache write");
                    stats.record_cache_write_skipped();
                    if let Err(err) = cache.release(&cache_key, lock).await {
                        warn!(key = %self.key, error = %err, "cache lock release failed");
                    }
                }
            }
        } else {
            if success {
                stats.record_cache_write_skipped();
            }
            if let Err(err) = cache.release(&cache_key, lock).await {
                warn!(key = %self.key, error = %err, "cache lock release failed");
            }
        }
        Ok(())
    }
}
