//! Cache region capability and soft-lock protocol.

use crate::error::PersisterResult;
use crate::types::CollectionKey;
use async_trait::async_trait;
use std::fmt;

/// Key addressing one collection's entry within a cache region.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(CollectionKey);

impl CacheKey {
    /// Creates a cache key for a collection.
    pub fn new(key: CollectionKey) -> Self {
        Self(key)
    }

    /// Returns the underlying collection key.
    #[must_use]
    pub fn collection_key(&self) -> &CollectionKey {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Marker handed out by [`CacheRegion::lock`].
///
/// While any soft lock is held on a key, readers must treat the entry as a
/// miss. A writer may publish a new value only through
/// [`CacheRegion::put_if_locked`] with the exact lock it was handed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftLock {
    id: u64,
}

impl SoftLock {
    /// Creates a soft lock with the given region-unique id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self { id }
    }

    /// Returns the lock id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }
}

/// A shared cache region holding disassembled collection entries.
///
/// Entries cross the region boundary as opaque bytes; the engine owns the
/// entry format. The soft-lock protocol is the only cross-session ordering
/// guarantee the engine relies on:
///
/// 1. at flush time the writer acquires a lock, invalidating readers,
/// 2. after commit it publishes through `put_if_locked`,
/// 3. after rollback it releases the lock without writing, leaving the key
///    invalidated rather than corrupted.
///
/// Every acquired lock must be consumed by exactly one `put_if_locked` or
/// `release` call.
#[async_trait]
pub trait CacheRegion: Send + Sync {
    /// Derives the cache key for a collection.
    fn generate_key(&self, key: &CollectionKey) -> CacheKey;

    /// Reads the entry bytes for a key.
    ///
    /// A key under soft lock reads as a miss.
    async fn get(&self, key: &CacheKey) -> PersisterResult<Option<Vec<u8>>>;

    /// Acquires a soft lock on a key ahead of a pending write.
    ///
    /// Multiple transactions may hold locks on the same key concurrently;
    /// the key stays invalidated until every lock is consumed.
    async fn lock(&self, key: &CacheKey) -> PersisterResult<SoftLock>;

    /// Publishes entry bytes under a held lock, consuming the lock.
    ///
    /// Returns `true` if the value was written. Returns `false`, without
    /// writing, when another transaction still holds a competing lock on
    /// the key; the caller's lock is consumed either way.
    async fn put_if_locked(
        &self,
        key: &CacheKey,
        entry: Vec<u8>,
        lock: &SoftLock,
    ) -> PersisterResult<bool>;

    /// Releases a held lock without writing, leaving the key invalidated.
    async fn release(&self, key: &CacheKey, lock: SoftLock) -> PersisterResult<()>;
}
