//! Collection persister trait definition.

use crate::cache::CacheRegion;
use crate::error::PersisterResult;
use crate::types::{CollectionKey, CollectionRow, CollectionShape};
use async_trait::async_trait;
use std::sync::Arc;
use tether_codec::ElementCodec;

/// Element type shorthand for a persister.
pub type Element<P> = <<P as CollectionPersister>::Codec as ElementCodec>::Element;

/// The mapping-aware component that reads and writes rows for one
/// collection role.
///
/// The engine computes which rows changed; the persister knows how to turn
/// those rows into storage operations. All row methods are asynchronous:
/// they are the engine's suspension points, and a failed call must leave
/// storage in a state the caller's transaction layer can roll back.
///
/// # Invariants
///
/// - `load` returns every row for the owner, with `index` populated for
///   indexed shapes
/// - row writes apply in the order given within one call
/// - `requires_recreate` is a stable property of the mapping, not of any
///   one collection instance
#[async_trait]
pub trait CollectionPersister: Send + Sync {
    /// Codec for this mapping's element type.
    type Codec: ElementCodec;

    /// Returns the element codec.
    fn element_codec(&self) -> &Self::Codec;

    /// Returns the shape of the mapped collection.
    fn shape(&self) -> CollectionShape;

    /// Whether an enabled data filter restricts this collection's rows.
    fn is_affected_by_enabled_filters(&self) -> bool;

    /// Whether this mapping must be fully deleted and reinserted instead of
    /// updated by row-level delta (e.g. array-like indexed mappings).
    fn requires_recreate(&self) -> bool;

    /// Returns the cache region backing this role, if the mapping is cached.
    fn cache(&self) -> Option<Arc<dyn CacheRegion>>;

    /// Reads all rows for one owner.
    async fn load(&self, key: &CollectionKey) -> PersisterResult<Vec<CollectionRow<Element<Self>>>>;

    /// Deletes every row for one owner.
    async fn remove_all(&self, key: &CollectionKey) -> PersisterResult<()>;

    /// Bulk-inserts the full current contents, after any `remove_all`.
    async fn recreate(
        &self,
        key: &CollectionKey,
        rows: &[CollectionRow<Element<Self>>],
    ) -> PersisterResult<()>;

    /// Deletes the given rows.
    async fn delete_rows(
        &self,
        key: &CollectionKey,
        rows: &[CollectionRow<Element<Self>>],
    ) -> PersisterResult<()>;

    /// Updates the given rows in place (indexed shapes).
    async fn update_rows(
        &self,
        key: &CollectionKey,
        rows: &[CollectionRow<Element<Self>>],
    ) -> PersisterResult<()>;

    /// Inserts the given rows.
    async fn insert_rows(
        &self,
        key: &CollectionKey,
        rows: &[CollectionRow<Element<Self>>],
    ) -> PersisterResult<()>;
}
