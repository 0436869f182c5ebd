//! Test fixtures: elements, persisters and cache regions.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tether_codec::{CodecError, CodecResult, ElementCodec};
use tether_persister::{
    CacheKey, CacheRegion, CollectionKey, CollectionPersister, CollectionRow, CollectionShape,
    IndexKey, InMemoryCacheRegion, PersisterError, PersisterResult, SoftLock,
};

/// A collection element with identity distinct from stored state.
///
/// Two widgets are equal when their ids match; the label is the mutable
/// payload the codec's dirty check compares. This mirrors the contract
/// set-shaped collections require of their elements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Widget {
    /// Stable identity.
    pub id: u64,
    /// Mutable payload.
    pub label: String,
}

impl Widget {
    /// Creates a widget.
    pub fn new(id: u64, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
        }
    }
}

impl PartialEq for Widget {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Widget {}

impl Hash for Widget {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Element codec for [`Widget`].
#[derive(Debug, Default)]
pub struct WidgetCodec;

impl ElementCodec for WidgetCodec {
    type Element = Widget;
    type Disassembled = (u64, String);

    fn deep_copy(&self, element: &Widget) -> Widget {
        element.clone()
    }

    fn is_dirty(&self, loaded: &Widget, current: &Widget) -> bool {
        loaded.label != current.label
    }

    fn disassemble(&self, element: &Widget) -> CodecResult<(u64, String)> {
        if element.label == "poison" {
            return Err(CodecError::disassembly("poisoned widget"));
        }
        Ok((element.id, element.label.clone()))
    }

    fn assemble(&self, state: &(u64, String)) -> CodecResult<Widget> {
        Ok(Widget::new(state.0, state.1.clone()))
    }
}

/// Shorthand for an unindexed widget row.
pub fn widget_row(id: u64, label: impl Into<String>) -> CollectionRow<Widget> {
    CollectionRow::element(Widget::new(id, label))
}

/// A mutation to drive against a collection, directly or queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Add a widget.
    Add(Widget),
    /// Remove a widget.
    Remove(Widget),
    /// Remove every widget.
    Clear,
}

/// One recorded persister call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersisterCall {
    /// A storage load.
    Load,
    /// Full row-set removal.
    RemoveAll,
    /// Bulk reinsert with the given row count.
    Recreate(usize),
    /// Row deletes with the given row count.
    DeleteRows(usize),
    /// Row updates with the given row count.
    UpdateRows(usize),
    /// Row inserts with the given row count.
    InsertRows(usize),
}

/// A scripted [`CollectionPersister`] over [`Widget`] elements.
///
/// Records every call, returns a configured row set from `load`, and
/// supports failure injection plus the filter/recreate mapping toggles the
/// flush decision table branches on.
pub struct ScriptedPersister {
    codec: WidgetCodec,
    shape: CollectionShape,
    rows: Mutex<Vec<CollectionRow<Widget>>>,
    calls: Mutex<Vec<PersisterCall>>,
    fail_next_load: AtomicBool,
    filtered: AtomicBool,
    recreate_required: AtomicBool,
    cache: Option<Arc<dyn CacheRegion>>,
}

impl ScriptedPersister {
    /// Creates a persister for a set-shaped mapping.
    #[must_use]
    pub fn set() -> Self {
        Self::with_shape(CollectionShape::Set)
    }

    /// Creates a persister for a list-shaped mapping.
    #[must_use]
    pub fn list() -> Self {
        Self::with_shape(CollectionShape::List)
    }

    /// Creates a persister for a map-shaped mapping.
    #[must_use]
    pub fn map() -> Self {
        Self::with_shape(CollectionShape::Map)
    }

    /// Creates a persister for the given shape.
    #[must_use]
    pub fn with_shape(shape: CollectionShape) -> Self {
        Self {
            codec: WidgetCodec,
            shape,
            rows: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            fail_next_load: AtomicBool::new(false),
            filtered: AtomicBool::new(false),
            recreate_required: AtomicBool::new(false),
            cache: None,
        }
    }

    /// Sets the rows `load` returns.
    #[must_use]
    pub fn with_rows(self, rows: Vec<CollectionRow<Widget>>) -> Self {
        *self.rows.lock() = rows;
        self
    }

    /// Attaches a cache region.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn CacheRegion>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Makes the next `load` fail with a storage error.
    pub fn fail_next_load(&self) {
        self.fail_next_load.store(true, Ordering::SeqCst);
    }

    /// Enables the row-filter flag.
    pub fn enable_filters(&self) {
        self.filtered.store(true, Ordering::SeqCst);
    }

    /// Marks the mapping as delta-incapable (recreate required).
    pub fn require_recreate(&self) {
        self.recreate_required.store(true, Ordering::SeqCst);
    }

    /// Returns the recorded calls in order.
    #[must_use]
    pub fn calls(&self) -> Vec<PersisterCall> {
        self.calls.lock().clone()
    }

    /// Returns the recorded calls excluding loads.
    #[must_use]
    pub fn write_calls(&self) -> Vec<PersisterCall> {
        self.calls
            .lock()
            .iter()
            .filter(|call| !matches!(call, PersisterCall::Load))
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for ScriptedPersister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedPersister")
            .field("shape", &self.shape)
            .field("calls", &self.calls.lock().len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CollectionPersister for ScriptedPersister {
    type Codec = WidgetCodec;

    fn element_codec(&self) -> &WidgetCodec {
        &self.codec
    }

    fn shape(&self) -> CollectionShape {
        self.shape
    }

    fn is_affected_by_enabled_filters(&self) -> bool {
        self.filtered.load(Ordering::SeqCst)
    }

    fn requires_recreate(&self) -> bool {
        self.recreate_required.load(Ordering::SeqCst)
    }

    fn cache(&self) -> Option<Arc<dyn CacheRegion>> {
        self.cache.as_ref().map(Arc::clone)
    }

    async fn load(&self, _key: &CollectionKey) -> PersisterResult<Vec<CollectionRow<Widget>>> {
        self.calls.lock().push(PersisterCall::Load);
        if self.fail_next_load.swap(false, Ordering::SeqCst) {
            return Err(PersisterError::storage("scripted load failure"));
        }
        Ok(self.rows.lock().clone())
    }

    async fn remove_all(&self, _key: &CollectionKey) -> PersisterResult<()> {
        self.calls.lock().push(PersisterCall::RemoveAll);
        Ok(())
    }

    async fn recreate(
        &self,
        _key: &CollectionKey,
        rows: &[CollectionRow<Widget>],
    ) -> PersisterResult<()> {
        self.calls.lock().push(PersisterCall::Recreate(rows.len()));
        Ok(())
    }

    async fn delete_rows(
        &self,
        _key: &CollectionKey,
        rows: &[CollectionRow<Widget>],
    ) -> PersisterResult<()> {
        self.calls.lock().push(PersisterCall::DeleteRows(rows.len()));
        Ok(())
    }

    async fn update_rows(
        &self,
        _key: &CollectionKey,
        rows: &[CollectionRow<Widget>],
    ) -> PersisterResult<()> {
        self.calls.lock().push(PersisterCall::UpdateRows(rows.len()));
        Ok(())
    }

    async fn insert_rows(
        &self,
        _key: &CollectionKey,
        rows: &[CollectionRow<Widget>],
    ) -> PersisterResult<()> {
        self.calls.lock().push(PersisterCall::InsertRows(rows.len()));
        Ok(())
    }
}

/// One recorded cache-region call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheCall {
    /// Entry read.
    Get,
    /// Soft lock acquired, with its id.
    Lock(u64),
    /// Publish attempt under a lock id, and whether it was written.
    Put(u64, bool),
    /// Lock released without writing, with its id.
    Release(u64),
}

/// A [`CacheRegion`] decorator that logs every protocol call.
///
/// Delegates to an [`InMemoryCacheRegion`], so lock semantics are real;
/// tests assert on the recorded protocol (e.g. exactly one `Put` under the
/// lock acquired at flush, or a `Release` with zero `Put`s after
/// rollback).
#[derive(Debug, Default)]
pub struct RecordingCacheRegion {
    inner: InMemoryCacheRegion,
    log: Mutex<Vec<CacheCall>>,
}

impl RecordingCacheRegion {
    /// Creates an empty recording region.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the underlying region.
    #[must_use]
    pub fn inner(&self) -> &InMemoryCacheRegion {
        &self.inner
    }

    /// Returns the recorded calls in order.
    #[must_use]
    pub fn log(&self) -> Vec<CacheCall> {
        self.log.lock().clone()
    }

    /// Returns the recorded puts.
    #[must_use]
    pub fn puts(&self) -> Vec<CacheCall> {
        self.log
            .lock()
            .iter()
            .filter(|call| matches!(call, CacheCall::Put(_, _)))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CacheRegion for RecordingCacheRegion {
    fn generate_key(&self, key: &CollectionKey) -> CacheKey {
        self.inner.generate_key(key)
    }

    async fn get(&self, key: &CacheKey) -> PersisterResult<Option<Vec<u8>>> {
        self.log.lock().push(CacheCall::Get);
        self.inner.get(key).await
    }

    async fn lock(&self, key: &CacheKey) -> PersisterResult<SoftLock> {
        let lock = self.inner.lock(key).await?;
        self.log.lock().push(CacheCall::Lock(lock.id()));
        Ok(lock)
    }

    async fn put_if_locked(
        &self,
        key: &CacheKey,
        entry: Vec<u8>,
        lock: &SoftLock,
    ) -> PersisterResult<bool> {
        let written = self.inner.put_if_locked(key, entry, lock).await?;
        self.log.lock().push(CacheCall::Put(lock.id(), written));
        Ok(written)
    }

    async fn release(&self, key: &CacheKey, lock: SoftLock) -> PersisterResult<()> {
        self.log.lock().push(CacheCall::Release(lock.id()));
        self.inner.release(key, lock).await
    }
}

/// Shorthand for a map row fixture.
pub fn keyed_row(key: i64, id: u64, label: impl Into<String>) -> CollectionRow<Widget> {
    CollectionRow::at_key(IndexKey::Int(key), Widget::new(id, label))
}
