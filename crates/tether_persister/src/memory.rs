//! In-memory cache region for testing and embedded use.

use crate::cache::{CacheKey, CacheRegion, SoftLock};
use crate::error::PersisterResult;
use crate::types::CollectionKey;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// State of one cache slot.
#[derive(Debug, Clone)]
enum Slot {
    /// A readable entry.
    Value(Vec<u8>),
    /// One or more pending writers hold soft locks; readers miss.
    Locked { locks: Vec<u64> },
}

/// An in-memory [`CacheRegion`].
///
/// Implements the full soft-lock protocol and is suitable for:
/// - Unit and integration tests
/// - Single-process embedding where a shared cache still pays off across
///   sessions
///
/// # Thread Safety
///
/// The region is thread-safe and can be shared across sessions.
#[derive(Debug, Default)]
pub struct InMemoryCacheRegion {
    slots: RwLock<HashMap<CacheKey, Slot>>,
    next_lock: AtomicU64,
}

impl InMemoryCacheRegion {
    /// Creates a new empty cache region.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an entry directly, bypassing the lock protocol.
    ///
    /// This is the load-path write: a session that materialized a collection
    /// from storage may prime the cache for later sessions. The write is
    /// refused (returns `false`) while any soft lock is held on the key.
    pub fn put(&self, key: &CacheKey, entry: Vec<u8>) -> bool {
        let mut slots = self.slots.write();
        if matches!(slots.get(key), Some(Slot::Locked { .. })) {
            return false;
        }
        slots.insert(key.clone(), Slot::Value(entry));
        true
    }

    /// Returns the number of readable entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .values()
            .filter(|slot| matches!(slot, Slot::Value(_)))
            .count()
    }

    /// Returns true when no entry is readable.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry and lock.
    pub fn clear(&self) {
        self.slots.write().clear();
    }
}

#[async_trait]
impl CacheRegion for InMemoryCacheRegion {
    fn generate_key(&self, key: &CollectionKey) -> CacheKey {
        CacheKey::new(key.clone())
    }

    async fn get(&self, key: &CacheKey) -> PersisterResult<Option<Vec<u8>>> {
        let slots = self.slots.read();
        match slots.get(key) {
            Some(Slot::Value(bytes)) => Ok(Some(bytes.clone())),
            Some(Slot::Locked { .. }) | None => Ok(None),
        }
    }

    async fn lock(&self, key: &CacheKey) -> PersisterResult<SoftLock> {
        let id = self.next_lock.fetch_add(1, Ordering::SeqCst);
        let mut slots = self.slots.write();
        let slot = slots
            .entry(key.clone())
            .or_insert_with(|| Slot::Locked { locks: Vec::new() });
        match slot {
            Slot::Locked { locks } => locks.push(id),
            Slot::Value(_) => *slot = Slot::Locked { locks: vec![id] },
        }
        Ok(SoftLock::new(id))
    }

    async fn put_if_locked(
        &self,
        key: &CacheKey,
        entry: Vec<u8>,
        lock: &SoftLock,
    ) -> PersisterResult<bool> {
        let mut slots = self.slots.write();
        let Some(slot) = slots.get_mut(key) else {
            return Ok(false);
        };
        let Slot::Locked { locks } = &mut *slot else {
            return Ok(false);
        };
        if !locks.contains(&lock.id()) {
            return Ok(false);
        }
        if locks.len() == 1 {
            *slot = Slot::Value(entry);
            Ok(true)
        } else {
            // a competing writer is still pending; stay invalidated
            locks.retain(|id| *id != lock.id());
            Ok(false)
        }
    }

    async fn release(&self, key: &CacheKey, lock: SoftLock) -> PersisterResult<()> {
        let mut slots = self.slots.write();
        let emptied = match slots.get_mut(key) {
            Some(Slot::Locked { locks }) => {
                locks.retain(|id| *id != lock.id());
                locks.is_empty()
            }
            _ => false,
        };
        if emptied {
            slots.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CollectionRole, OwnerKey};

    fn key(region: &InMemoryCacheRegion) -> CacheKey {
        region.generate_key(&CollectionKey::new(
            OwnerKey::from_bytes([1u8; 16]),
            CollectionRole::new("Order.lines"),
        ))
    }

    #[tokio::test]
    async fn empty_region_misses() {
        let region = InMemoryCacheRegion::new();
        let ck = key(&region);
        assert_eq!(region.get(&ck).await.unwrap(), None);
        assert!(region.is_empty());
    }

    #[tokio::test]
    async fn seeded_entry_is_readable() {
        let region = InMemoryCacheRegion::new();
        let ck = key(&region);

        assert!(region.put(&ck, vec![1, 2, 3]));
        assert_eq!(region.get(&ck).await.unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(region.len(), 1);
    }

    #[tokio::test]
    async fn locked_key_reads_as_miss() {
        let region = InMemoryCacheRegion::new();
        let ck = key(&region);
        region.put(&ck, vec![1]);

        let _lock = region.lock(&ck).await.unwrap();
        assert_eq!(region.get(&ck).await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_refused_while_locked() {
        let region = InMemoryCacheRegion::new();
        let ck = key(&region);

        let _lock = region.lock(&ck).await.unwrap();
        assert!(!region.put(&ck, vec![9]));
    }

    #[tokio::test]
    async fn put_if_locked_publishes_under_sole_lock() {
        let region = InMemoryCacheRegion::new();
        let ck = key(&region);

        let lock = region.lock(&ck).await.unwrap();
        assert!(region.put_if_locked(&ck, vec![4, 5], &lock).await.unwrap());
        assert_eq!(region.get(&ck).await.unwrap(), Some(vec![4, 5]));
    }

    #[tokio::test]
    async fn put_if_locked_refused_with_competing_lock() {
        let region = InMemoryCacheRegion::new();
        let ck = key(&region);

        let mine = region.lock(&ck).await.unwrap();
        let theirs = region.lock(&ck).await.unwrap();

        assert!(!region.put_if_locked(&ck, vec![1], &mine).await.unwrap());
        // still invalidated: the competing lock is outstanding
        assert_eq!(region.get(&ck).await.unwrap(), None);

        // the survivor can still publish
        assert!(region.put_if_locked(&ck, vec![2], &theirs).await.unwrap());
        assert_eq!(region.get(&ck).await.unwrap(), Some(vec![2]));
    }

    #[tokio::test]
    async fn put_if_locked_refused_with_stale_lock() {
        let region = InMemoryCacheRegion::new();
        let ck = key(&region);

        let lock = region.lock(&ck).await.unwrap();
        region.release(&ck, lock.clone()).await.unwrap();

        assert!(!region.put_if_locked(&ck, vec![1], &lock).await.unwrap());
        assert_eq!(region.get(&ck).await.unwrap(), None);
    }

    #[tokio::test]
    async fn release_leaves_key_invalidated() {
        let region = InMemoryCacheRegion::new();
        let ck = key(&region);
        region.put(&ck, vec![7]);

        let lock = region.lock(&ck).await.unwrap();
        region.release(&ck, lock).await.unwrap();

        // the old value does not come back
        assert_eq!(region.get(&ck).await.unwrap(), None);
    }

    #[tokio::test]
    async fn release_keeps_remaining_locks() {
        let region = InMemoryCacheRegion::new();
        let ck = key(&region);

        let first = region.lock(&ck).await.unwrap();
        let second = region.lock(&ck).await.unwrap();
        region.release(&ck, first).await.unwrap();

        // key still locked by the second writer
        assert!(!region.put(&ck, vec![1]));
        region.release(&ck, second).await.unwrap();
        assert!(region.put(&ck, vec![1]));
    }

    #[tokio::test]
    async fn clear_drops_everything() {
        let region = InMemoryCacheRegion::new();
        let ck = key(&region);
        region.put(&ck, vec![1]);
        region.clear();
        assert!(region.is_empty());
    }
}
