//! # Tether Core
//!
//! Collection persistence and cache-synchronization engine.
//!
//! Tether keeps lazily-loaded, owner-attached collections synchronized
//! with relational storage and a shared second-level cache. This crate
//! provides:
//! - [`PersistentCollection`]: the lifecycle state machine around a mapped
//!   collection value, with deferred materialization, a delayed-operation
//!   queue, and snapshot-vs-current diffing
//! - [`Snapshot`] and [`DelayedOperation`]: the diffing and queueing
//!   support types
//! - [`CollectionCacheEntry`]: the disassembled, cache-safe form of a
//!   collection's contents
//! - [`CollectionFlushAction`]: the flush-time decision table plus
//!   two-phase cache reconciliation across transaction boundaries
//! - [`SessionContext`] and [`SessionStats`]: the session slice the engine
//!   depends on
//!
//! ## Key Invariants
//!
//! - Materialization is atomic: a failed load leaves the collection
//!   uninitialized
//! - Queued operations replay in enqueue order, exactly once, after
//!   materialization
//! - Row writes execute in delete, update, insert order
//! - No reader ever observes a cache entry from an uncommitted transaction

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod collection;
mod config;
mod delayed;
mod error;
mod flush;
mod session;
mod snapshot;
mod stats;
mod types;

pub use cache::{CollectionCacheEntry, DisassembledRow};
pub use collection::{Contents, PersistentCollection, RowDelta};
pub use config::CollectionConfig;
pub use delayed::DelayedOperation;
pub use error::{CollectionError, CollectionResult};
pub use flush::{
    CollectionFlushAction, CollectionListeners, CollectionUpdateEvent,
    PostCollectionUpdateListener, PreCollectionUpdateListener,
};
pub use session::SessionContext;
pub use snapshot::Snapshot;
pub use stats::SessionStats;
pub use types::LoadState;

pub use tether_codec::{CborCodec, CodecError, CodecResult, ElementCodec};
pub use tether_persister::{
    CacheKey, CacheRegion, CollectionKey, CollectionPersister, CollectionRole, CollectionRow,
    CollectionShape, IndexKey, InMemoryCacheRegion, OwnerKey, PersisterError, PersisterResult,
    RowIndex, SoftLock,
};
