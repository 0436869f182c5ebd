//! Persistent collection state machine and diffing.

use crate::cache::{CollectionCacheEntry, DisassembledRow};
use crate::collection::Contents;
use crate::config::CollectionConfig;
use crate::delayed::DelayedOperation;
use crate::error::{CollectionError, CollectionResult};
use crate::session::SessionContext;
use crate::snapshot::Snapshot;
use crate::types::LoadState;
use tether_codec::ElementCodec;
use tether_persister::{
    CollectionKey, CollectionPersister, CollectionRole, CollectionRow, CollectionShape, IndexKey,
    OwnerKey, RowIndex,
};
use tracing::{debug, warn};

/// The minimal set of row writes needed to reconcile storage with the
/// current contents.
///
/// Rows execute strictly in delete, update, insert order so key reuse never
/// trips a unique constraint.
#[derive(Debug, Clone)]
pub struct RowDelta<E> {
    /// Rows present in the snapshot but gone (or stale) in current contents.
    pub deletes: Vec<CollectionRow<E>>,
    /// Rows whose identity persisted but whose stored value changed.
    pub updates: Vec<CollectionRow<E>>,
    /// Rows present in current contents but absent from the snapshot.
    pub inserts: Vec<CollectionRow<E>>,
}

impl<E> RowDelta<E> {
    /// Creates an empty delta.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            deletes: Vec::new(),
            updates: Vec::new(),
            inserts: Vec::new(),
        }
    }

    /// Returns true when no row needs writing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.updates.is_empty() && self.inserts.is_empty()
    }

    /// Returns the total number of row writes.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.deletes.len() + self.updates.len() + self.inserts.len()
    }
}

/// The stateful wrapper around a mapped collection value.
///
/// One instance exists per (owner entity, collection role) pair per
/// session. The wrapper defers materialization until first access, queues
/// mutations that can be resolved without a storage round trip, and diffs
/// its contents against the load-time snapshot to produce row-level writes.
///
/// # Lifecycle
///
/// `Uninitialized → Initializing → Initialized`, driven by [`read`] (or the
/// [`begin_read`]/[`read_from`]/[`end_read`] bracket a row loader uses
/// directly). A failed load leaves the collection `Uninitialized`. The
/// direct-construction path ([`from_existing`]) starts `Initialized`.
///
/// [`read`]: PersistentCollection::read
/// [`begin_read`]: PersistentCollection::begin_read
/// [`read_from`]: PersistentCollection::read_from
/// [`end_read`]: PersistentCollection::end_read
/// [`from_existing`]: PersistentCollection::from_existing
#[derive(Debug)]
pub struct PersistentCollection<C: ElementCodec> {
    role: CollectionRole,
    owner: OwnerKey,
    shape: CollectionShape,
    config: CollectionConfig,
    state: LoadState,
    dirty: bool,
    directly_accessible: bool,
    contents: Contents<C::Element>,
    snapshot: Option<Snapshot<C::Element>>,
    queue: Vec<DelayedOperation<C::Element>>,
    read_buffer: Option<Vec<CollectionRow<C::Element>>>,
    cached_size: Option<usize>,
}

impl<C: ElementCodec> PersistentCollection<C> {
    /// Creates a lazy, uninitialized collection.
    #[must_use]
    pub fn new(
        role: CollectionRole,
        owner: OwnerKey,
        shape: CollectionShape,
        config: CollectionConfig,
    ) -> Self {
        Self {
            role,
            owner,
            shape,
            config,
            state: LoadState::Uninitialized,
            dirty: false,
            directly_accessible: false,
            contents: Contents::empty(shape),
            snapshot: None,
            queue: Vec::new(),
            read_buffer: None,
            cached_size: None,
        }
    }

    /// Wraps a pre-existing in-memory collection (merge/refresh path).
    ///
    /// The collection starts `Initialized` and dirty (it has never been
    /// written) with no snapshot; the first flush computes the full insert
    /// set against an empty snapshot.
    #[must_use]
    pub fn from_existing(
        role: CollectionRole,
        owner: OwnerKey,
        config: CollectionConfig,
        contents: Contents<C::Element>,
    ) -> Self {
        let shape = contents.shape();
        Self {
            role,
            owner,
            shape,
            config,
            state: LoadState::Initialized,
            dirty: true,
            directly_accessible: true,
            contents,
            snapshot: None,
            queue: Vec::new(),
            read_buffer: None,
            cached_size: None,
        }
    }

    /// Returns the collection role.
    #[must_use]
    pub fn role(&self) -> &CollectionRole {
        &self.role
    }

    /// Returns the owning entity's key.
    #[must_use]
    pub fn owner_key(&self) -> OwnerKey {
        self.owner
    }

    /// Returns this collection's identity.
    #[must_use]
    pub fn key(&self) -> CollectionKey {
        CollectionKey::new(self.owner, self.role.clone())
    }

    /// Returns the mapped shape.
    #[must_use]
    pub fn shape(&self) -> CollectionShape {
        self.shape
    }

    /// Returns the materialization state.
    #[must_use]
    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Returns true once the collection has materialized.
    #[must_use]
    pub fn was_initialized(&self) -> bool {
        self.state.is_initialized()
    }

    /// Returns true when the collection has unflushed changes.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns true when mutations are queued awaiting materialization.
    #[must_use]
    pub fn has_queued_operations(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Returns the queued operations in enqueue order.
    #[must_use]
    pub fn queued_operations(&self) -> &[DelayedOperation<C::Element>] {
        &self.queue
    }

    /// Returns true when constructed from a pre-existing in-memory value.
    #[must_use]
    pub fn is_directly_accessible(&self) -> bool {
        self.directly_accessible
    }

    /// Returns the size known without materializing, if any.
    #[must_use]
    pub fn cached_size(&self) -> Option<usize> {
        self.cached_size
    }

    /// Records a size learned from a count query, usable before
    /// materialization.
    pub fn set_cached_size(&mut self, size: usize) {
        self.cached_size = Some(size);
    }

    /// Returns true when the live contents are empty.
    ///
    /// Only meaningful once initialized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    /// Returns every current element as a row, in iteration order.
    #[must_use]
    pub fn current_rows(&self) -> Vec<CollectionRow<C::Element>> {
        self.contents.to_rows()
    }

    // === Materialization ===

    /// Forces materialization if the collection is still uninitialized.
    ///
    /// Tries the persister's cache region first (when enabled), falling
    /// back to a storage load. Fails with
    /// [`CollectionError::LazyAccess`] if the session is closed. A failed
    /// load leaves the collection uninitialized.
    pub async fn read<P>(&mut self, session: &SessionContext, persister: &P) -> CollectionResult<()>
    where
        P: CollectionPersister<Codec = C>,
    {
        if self.state.is_initialized() {
            return Ok(());
        }
        session.ensure_open(&self.role)?;

        if self.config.cache_enabled {
            if let Some(cache) = persister.cache() {
                let cache_key = cache.generate_key(&self.key());
                match cache.get(&cache_key).await {
                    Ok(Some(bytes)) => match CollectionCacheEntry::from_bytes(&bytes) {
                        Ok(entry) => {
                            entry.assemble(self, persister)?;
                            session.stats().record_cache_hit();
                            debug!(role = %self.role, "collection assembled from cache");
                            return Ok(());
                        }
                        Err(err) => {
                            warn!(role = %self.role, error = %err, "bad cache entry; loading from storage");
                        }
                    },
                    Ok(None) => {}
                    Err(err) => {
                        warn!(role = %self.role, error = %err, "cache read failed; loading from storage");
                    }
                }
            }
        }

        self.begin_read()?;
        let rows = match persister.load(&self.key()).await {
            Ok(rows) => rows,
            Err(err) => {
                self.cancel_read();
                return Err(err.into());
            }
        };
        for row in rows {
            self.read_from(row)?;
        }
        self.end_read(persister)?;
        session.stats().record_load();
        debug!(role = %self.role, len = self.contents.len(), "collection materialized from storage");
        Ok(())
    }

    /// Opens the load bracket: subsequent rows go to a side buffer, never
    /// into the live collection, so element equality and hashing are not
    /// consulted on partially-loaded elements.
    pub fn begin_read(&mut self) -> CollectionResult<()> {
        match self.state {
            LoadState::Uninitialized => {
                self.state = LoadState::Initializing;
                self.read_buffer = Some(Vec::new());
                Ok(())
            }
            LoadState::Initializing => Err(CollectionError::invariant(
                "begin_read while a load is already in flight",
            )),
            LoadState::Initialized => Err(CollectionError::invariant(
                "begin_read on an initialized collection",
            )),
        }
    }

    /// Buffers one row read from storage.
    pub fn read_from(&mut self, row: CollectionRow<C::Element>) -> CollectionResult<()> {
        match self.read_buffer.as_mut() {
            Some(buffer) => {
                buffer.push(row);
                Ok(())
            }
            None => Err(CollectionError::invariant(
                "read_from outside a begin_read/end_read bracket",
            )),
        }
    }

    /// Closes the load bracket: flushes the buffer into the live collection
    /// in one pass, captures the snapshot, and replays queued operations.
    pub fn end_read<P>(&mut self, persister: &P) -> CollectionResult<()>
    where
        P: CollectionPersister<Codec = C>,
    {
        let Some(mut rows) = self.read_buffer.take() else {
            return Err(CollectionError::invariant("end_read without begin_read"));
        };
        if self.shape == CollectionShape::List {
            rows.sort_by_key(|row| match row.index {
                Some(RowIndex::Position(position)) => position,
                _ => usize::MAX,
            });
        }

        let mut contents = Contents::empty(self.shape);
        for row in rows {
            let applied = match row.index {
                Some(RowIndex::Key(key)) => contents.put(key, row.element).map(|_| ()),
                _ => contents.add(row.element).map(|_| ()),
            };
            if let Err(err) = applied {
                self.cancel_read();
                return Err(err);
            }
        }

        self.contents = contents;
        self.after_initialize(persister.element_codec())
    }

    /// Abandons an in-flight load, restoring the pre-load state.
    pub fn cancel_read(&mut self) {
        self.read_buffer = None;
        if self.state.is_loading() {
            self.state = LoadState::Uninitialized;
        }
    }

    /// Reinitializes from disassembled cache state, bypassing storage.
    ///
    /// A no-op when the collection is already initialized, which makes
    /// cache-entry assembly idempotent.
    pub fn initialize_from_cache<P>(
        &mut self,
        persister: &P,
        rows: &[DisassembledRow<C::Disassembled>],
    ) -> CollectionResult<()>
    where
        P: CollectionPersister<Codec = C>,
    {
        if self.state.is_initialized() {
            return Ok(());
        }
        if self.state.is_loading() {
            return Err(CollectionError::invariant(
                "initialize_from_cache while a load is in flight",
            ));
        }

        let codec = persister.element_codec();
        let mut contents = Contents::empty(self.shape);
        for row in rows {
            let element = codec.assemble(&row.state)?;
            match &row.index {
                Some(RowIndex::Key(key)) => {
                    contents.put(key.clone(), element)?;
                }
                _ => {
                    contents.add(element)?;
                }
            }
        }
        self.contents = contents;
        self.after_initialize(codec)
    }

    /// Completes materialization: snapshot, then queued-operation replay.
    ///
    /// The snapshot is captured from the loaded contents before replay so
    /// the next flush delta reproduces exactly the queued mutations.
    fn after_initialize(&mut self, codec: &C) -> CollectionResult<()> {
        self.state = LoadState::Initialized;
        self.cached_size = None;
        self.snapshot = Some(Snapshot::capture(&self.contents, codec));

        if !self.queue.is_empty() {
            let ops = std::mem::take(&mut self.queue);
            let replayed = ops.len();
            for op in ops {
                self.apply_delayed(op)?;
            }
            self.mark_dirty();
            debug!(role = %self.role, replayed, "replayed queued operations");
        }
        Ok(())
    }

    fn apply_delayed(&mut self, op: DelayedOperation<C::Element>) -> CollectionResult<()> {
        match op {
            DelayedOperation::Add(element) => {
                self.contents.add(element)?;
            }
            DelayedOperation::Remove(element) => {
                self.contents.remove(&element)?;
            }
            DelayedOperation::Clear => {
                self.contents.clear();
            }
        }
        Ok(())
    }

    // === Mutation ===

    /// Adds an element.
    ///
    /// Initialized collections apply directly; a no-op add (duplicate into
    /// a set) does not dirty. On an uninitialized collection the add is
    /// queued when queueing is enabled, in which case the returned flag
    /// reflects the queued intent rather than the eventual replay outcome.
    pub async fn add<P>(
        &mut self,
        session: &SessionContext,
        persister: &P,
        element: C::Element,
    ) -> CollectionResult<bool>
    where
        P: CollectionPersister<Codec = C>,
    {
        if self.state.is_initialized() {
            let added = self.contents.add(element)?;
            if added {
                self.mark_dirty();
            }
            return Ok(added);
        }
        self.ensure_not_loading()?;

        if self.queueing_enabled() {
            if self.shape == CollectionShape::Set {
                if let Some(true) = self.element_existence(&element) {
                    return Ok(false);
                }
            }
            self.queue.push(DelayedOperation::Add(element));
            return Ok(true);
        }

        self.read(session, persister).await?;
        let added = self.contents.add(element)?;
        if added {
            self.mark_dirty();
        }
        Ok(added)
    }

    /// Removes an element.
    ///
    /// Removing an absent element is a no-op and does not dirty. On an
    /// uninitialized collection the removal is queued when queueing is
    /// enabled and the element is not locally known to be absent.
    pub async fn remove<P>(
        &mut self,
        session: &SessionContext,
        persister: &P,
        element: C::Element,
    ) -> CollectionResult<bool>
    where
        P: CollectionPersister<Codec = C>,
    {
        if self.state.is_initialized() {
            let removed = self.contents.remove(&element)?;
            if removed {
                self.mark_dirty();
            }
            return Ok(removed);
        }
        self.ensure_not_loading()?;

        if self.queueing_enabled() {
            match self.element_existence(&element) {
                Some(false) => return Ok(false),
                _ => {
                    self.queue.push(DelayedOperation::Remove(element));
                    return Ok(true);
                }
            }
        }

        self.read(session, persister).await?;
        let removed = self.contents.remove(&element)?;
        if removed {
            self.mark_dirty();
        }
        Ok(removed)
    }

    /// Removes every element.
    pub async fn clear<P>(
        &mut self,
        session: &SessionContext,
        persister: &P,
    ) -> CollectionResult<()>
    where
        P: CollectionPersister<Codec = C>,
    {
        if self.state.is_initialized() {
            if self.contents.clear() > 0 {
                self.mark_dirty();
            }
            return Ok(());
        }
        self.ensure_not_loading()?;

        if self.queueing_enabled() {
            self.queue.push(DelayedOperation::Clear);
            return Ok(());
        }

        self.read(session, persister).await?;
        if self.contents.clear() > 0 {
            self.mark_dirty();
        }
        Ok(())
    }

    /// Inserts or replaces a map entry, returning the replaced element.
    ///
    /// Map mutations are never queued: the entry's fate depends on the
    /// loaded value under its key, so a put forces materialization.
    pub async fn put<P>(
        &mut self,
        session: &SessionContext,
        persister: &P,
        key: IndexKey,
        element: C::Element,
    ) -> CollectionResult<Option<C::Element>>
    where
        P: CollectionPersister<Codec = C>,
    {
        self.ensure_not_loading()?;
        self.read(session, persister).await?;

        let candidate = element.clone();
        let replaced = self.contents.put(key, element)?;
        let changed = match &replaced {
            None => true,
            // identity-equal values can still differ in stored state
            Some(old) => {
                old != &candidate || persister.element_codec().is_dirty(old, &candidate)
            }
        };
        if changed {
            self.mark_dirty();
        }
        Ok(replaced)
    }

    /// Removes a map entry by key, returning the removed element.
    pub async fn remove_key<P>(
        &mut self,
        session: &SessionContext,
        persister: &P,
        key: &IndexKey,
    ) -> CollectionResult<Option<C::Element>>
    where
        P: CollectionPersister<Codec = C>,
    {
        self.ensure_not_loading()?;
        self.read(session, persister).await?;

        let removed = self.contents.remove_key(key)?;
        if removed.is_some() {
            self.mark_dirty();
        }
        Ok(removed)
    }

    /// Returns true when an equal element is present, materializing only
    /// when existence cannot be resolved locally.
    pub async fn contains<P>(
        &mut self,
        session: &SessionContext,
        persister: &P,
        element: &C::Element,
    ) -> CollectionResult<bool>
    where
        P: CollectionPersister<Codec = C>,
    {
        if !self.state.is_initialized() {
            if let Some(known) = self.element_existence(element) {
                return Ok(known);
            }
            self.read(session, persister).await?;
        }
        Ok(self.contents.contains(element))
    }

    /// Returns the element count, using the cached size when the collection
    /// is uninitialized and no mutations are pending.
    pub async fn len<P>(
        &mut self,
        session: &SessionContext,
        persister: &P,
    ) -> CollectionResult<usize>
    where
        P: CollectionPersister<Codec = C>,
    {
        if !self.state.is_initialized() && self.queue.is_empty() {
            if let Some(size) = self.cached_size {
                return Ok(size);
            }
        }
        self.read(session, persister).await?;
        Ok(self.contents.len())
    }

    /// Returns the element at a list position.
    ///
    /// Sets have no indexes; requesting one is an unsupported operation.
    pub fn get_position(&self, position: usize) -> CollectionResult<Option<&C::Element>> {
        self.ensure_initialized("positional lookup")?;
        self.contents.get_position(position)
    }

    /// Returns the element under a map key.
    pub fn get_key(&self, key: &IndexKey) -> CollectionResult<Option<&C::Element>> {
        self.ensure_initialized("keyed lookup")?;
        self.contents.get_key(key)
    }

    // === Snapshot & diffing ===

    /// Returns the snapshot, computing and storing one from the current
    /// contents if none exists yet.
    pub fn get_snapshot<P>(&mut self, persister: &P) -> Snapshot<C::Element>
    where
        P: CollectionPersister<Codec = C>,
    {
        if self.snapshot.is_none() {
            self.snapshot = Some(Snapshot::capture(
                &self.contents,
                persister.element_codec(),
            ));
        }
        match &self.snapshot {
            Some(snapshot) => snapshot.clone(),
            None => Snapshot::empty(self.shape),
        }
    }

    /// Dirty check: true iff snapshot and current contents have equal
    /// cardinality and no element's stored value differs from its current
    /// value. Short-circuits on the first difference. A collection without
    /// a snapshot is never snapshot-equal.
    pub fn equals_snapshot<P>(&self, persister: &P) -> bool
    where
        P: CollectionPersister<Codec = C>,
    {
        let codec = persister.element_codec();
        let Some(snapshot) = &self.snapshot else {
            return false;
        };
        if snapshot.len() != self.contents.len() {
            return false;
        }
        match &self.contents {
            Contents::Set(items) => items.iter().all(|element| {
                snapshot
                    .stored_for(element)
                    .is_some_and(|old| !codec.is_dirty(old, element))
            }),
            Contents::List(items) => items.iter().enumerate().all(|(position, element)| {
                snapshot
                    .at_position(position)
                    .is_some_and(|old| !codec.is_dirty(old, element))
            }),
            Contents::Map(entries) => entries.iter().all(|(key, element)| {
                snapshot
                    .for_key(key)
                    .is_some_and(|old| !codec.is_dirty(old, element))
            }),
        }
    }

    /// Returns the row-delete candidates: elements present in the snapshot
    /// but absent, or stale under the same identity, in current contents.
    pub fn get_deletes<P>(&self, persister: &P) -> Vec<CollectionRow<C::Element>>
    where
        P: CollectionPersister<Codec = C>,
    {
        let codec = persister.element_codec();
        let empty;
        let snapshot = match &self.snapshot {
            Some(snapshot) => snapshot,
            None => {
                empty = Snapshot::empty(self.shape);
                &empty
            }
        };

        match (snapshot, &self.contents) {
            (Snapshot::Set(stored), Contents::Set(current)) => {
                let mut deletes: Vec<CollectionRow<C::Element>> = stored
                    .iter()
                    .filter(|old| !current.contains(*old))
                    .cloned()
                    .map(CollectionRow::element)
                    .collect();
                // same identity, stale stored value: the row must be
                // rewritten, so the old row is deleted and reinserted
                for element in current {
                    if let Some(old) = snapshot.stored_for(element) {
                        if codec.is_dirty(old, element) {
                            deletes.push(CollectionRow::element(old.clone()));
                        }
                    }
                }
                deletes
            }
            (Snapshot::List(stored), Contents::List(current)) => (current.len()..stored.len())
                .map(|position| CollectionRow::at_position(position, stored[position].clone()))
                .collect(),
            (Snapshot::Map(stored), Contents::Map(current)) => stored
                .iter()
                .filter(|(key, _)| {
                    current
                        .binary_search_by(|(current_key, _)| current_key.cmp(key))
                        .is_err()
                })
                .map(|(key, element)| CollectionRow::at_key(key.clone(), element.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Computes the full delete/update/insert delta against the snapshot.
    ///
    /// A missing snapshot counts as empty: everything currently present
    /// becomes an insert.
    pub fn compute_delta<P>(&self, persister: &P) -> RowDelta<C::Element>
    where
        P: CollectionPersister<Codec = C>,
    {
        let codec = persister.element_codec();
        let deletes = self.get_deletes(persister);
        let mut updates = Vec::new();
        let mut inserts = Vec::new();

        let empty;
        let snapshot = match &self.snapshot {
            Some(snapshot) => snapshot,
            None => {
                empty = Snapshot::empty(self.shape);
                &empty
            }
        };

        match (snapshot, &self.contents) {
            (Snapshot::Set(_), Contents::Set(current)) => {
                for element in current {
                    match snapshot.stored_for(element) {
                        Some(old) if !codec.is_dirty(old, element) => {}
                        _ => inserts.push(CollectionRow::element(element.clone())),
                    }
                }
            }
            (Snapshot::List(stored), Contents::List(current)) => {
                for (position, element) in current.iter().enumerate() {
                    if position < stored.len() {
                        if codec.is_dirty(&stored[position], element) {
                            updates.push(CollectionRow::at_position(position, element.clone()));
                        }
                    } else {
                        inserts.push(CollectionRow::at_position(position, element.clone()));
                    }
                }
            }
            (Snapshot::Map(_), Contents::Map(current)) => {
                for (key, element) in current {
                    match snapshot.for_key(key) {
                        Some(old) => {
                            if codec.is_dirty(old, element) {
                                updates.push(CollectionRow::at_key(key.clone(), element.clone()));
                            }
                        }
                        None => inserts.push(CollectionRow::at_key(key.clone(), element.clone())),
                    }
                }
            }
            _ => {}
        }

        RowDelta {
            deletes,
            updates,
            inserts,
        }
    }

    /// Whether this collection's mapping must be fully deleted and
    /// reinserted instead of updated by row-level delta.
    pub fn needs_recreate<P>(&self, persister: &P) -> bool
    where
        P: CollectionPersister<Codec = C>,
    {
        persister.requires_recreate()
    }

    /// Disassembles every current element into its cache-safe state, in
    /// iteration order.
    pub fn disassemble<P>(
        &self,
        persister: &P,
    ) -> CollectionResult<Vec<DisassembledRow<C::Disassembled>>>
    where
        P: CollectionPersister<Codec = C>,
    {
        let codec = persister.element_codec();
        self.contents
            .to_rows()
            .into_iter()
            .map(|row| {
                Ok(DisassembledRow {
                    index: row.index,
                    state: codec.disassemble(&row.element)?,
                })
            })
            .collect()
    }

    /// Post-flush bookkeeping: the collection is clean again and the
    /// snapshot now reflects the just-written contents.
    pub(crate) fn after_action(&mut self, codec: &C) {
        if !self.state.is_initialized() {
            return;
        }
        self.dirty = false;
        self.snapshot = Some(Snapshot::capture(&self.contents, codec));
    }

    /// Detaches the collection from its owner: the snapshot is dropped and
    /// the next load cycle starts fresh.
    pub fn dereference(&mut self) {
        self.snapshot = None;
        self.cached_size = None;
        self.dirty = false;
    }

    // === Internals ===

    fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    fn queueing_enabled(&self) -> bool {
        self.config.queue_operations && self.shape != CollectionShape::Map
    }

    /// Resolves element existence without a storage round trip: newest
    /// queued operation wins, then a cached size of zero.
    fn element_existence(&self, element: &C::Element) -> Option<bool> {
        for op in self.queue.iter().rev() {
            match op {
                DelayedOperation::Add(queued) if queued == element => return Some(true),
                DelayedOperation::Remove(queued) if queued == element => return Some(false),
                DelayedOperation::Clear => return Some(false),
                _ => {}
            }
        }
        if self.cached_size == Some(0) {
            return Some(false);
        }
        None
    }

    fn ensure_not_loading(&self) -> CollectionResult<()> {
        if self.state.is_loading() {
            Err(CollectionError::invariant(
                "mutation while a load is in flight",
            ))
        } else {
            Ok(())
        }
    }

    fn ensure_initialized(&self, what: &str) -> CollectionResult<()> {
        if self.state.is_initialized() {
            Ok(())
        } else {
            Err(CollectionError::invariant(format!(
                "{what} on an uninitialized collection"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use std::hash::{Hash, Hasher};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use tether_codec::CodecResult;
    use tether_persister::{CacheRegion, InMemoryCacheRegion, PersisterError, PersisterResult};

    /// Element with identity (`id`) distinct from stored state (`revision`).
    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Part {
        id: u64,
        revision: u32,
    }

    impl Part {
        fn new(id: u64) -> Self {
            Self { id, revision: 0 }
        }

        fn rev(id: u64, revision: u32) -> Self {
            Self { id, revision }
        }
    }

    impl PartialEq for Part {
        fn eq(&self, other: &Self) -> bool {
            self.id == other.id
        }
    }

    impl Eq for Part {}

    impl Hash for Part {
        fn hash<H: Hasher>(&self, state: &mut H) {
            self.id.hash(state);
        }
    }

    struct PartCodec;

    impl ElementCodec for PartCodec {
        type Element = Part;
        type Disassembled = (u64, u32);

        fn deep_copy(&self, element: &Part) -> Part {
            element.clone()
        }

        fn is_dirty(&self, loaded: &Part, current: &Part) -> bool {
            loaded.revision != current.revision
        }

        fn disassemble(&self, element: &Part) -> CodecResult<(u64, u32)> {
            Ok((element.id, element.revision))
        }

        fn assemble(&self, state: &(u64, u32)) -> CodecResult<Part> {
            Ok(Part::rev(state.0, state.1))
        }
    }

    struct StubPersister {
        codec: PartCodec,
        shape: CollectionShape,
        rows: Vec<CollectionRow<Part>>,
        load_calls: AtomicUsize,
        fail_next_load: AtomicBool,
        recreate: bool,
        cache: Option<Arc<InMemoryCacheRegion>>,
    }

    impl StubPersister {
        fn with_shape(shape: CollectionShape, rows: Vec<CollectionRow<Part>>) -> Self {
            Self {
                codec: PartCodec,
                shape,
                rows,
                load_calls: AtomicUsize::new(0),
                fail_next_load: AtomicBool::new(false),
                recreate: false,
                cache: None,
            }
        }

        fn set(elements: &[Part]) -> Self {
            Self::with_shape(
                CollectionShape::Set,
                elements.iter().cloned().map(CollectionRow::element).collect(),
            )
        }

        fn with_cache(mut self, cache: Arc<InMemoryCacheRegion>) -> Self {
            self.cache = Some(cache);
            self
        }

        fn fail_next_load(self) -> Self {
            self.fail_next_load.store(true, Ordering::SeqCst);
            self
        }

        fn load_calls(&self) -> usize {
            self.load_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CollectionPersister for StubPersister {
        type Codec = PartCodec;

        fn element_codec(&self) -> &PartCodec {
            &self.codec
        }

        fn shape(&self) -> CollectionShape {
            self.shape
        }

        fn is_affected_by_enabled_filters(&self) -> bool {
            false
        }

        fn requires_recreate(&self) -> bool {
            self.recreate
        }

        fn cache(&self) -> Option<Arc<dyn CacheRegion>> {
            self.cache
                .as_ref()
                .map(|cache| Arc::clone(cache) as Arc<dyn CacheRegion>)
        }

        async fn load(&self, _key: &CollectionKey) -> PersisterResult<Vec<CollectionRow<Part>>> {
            self.load_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_next_load.swap(false, Ordering::SeqCst) {
                return Err(PersisterError::storage("injected load failure"));
            }
            Ok(self.rows.clone())
        }

        async fn remove_all(&self, _key: &CollectionKey) -> PersisterResult<()> {
            Ok(())
        }

        async fn recreate(
            &self,
            _key: &CollectionKey,
            _rows: &[CollectionRow<Part>],
        ) -> PersisterResult<()> {
            Ok(())
        }

        async fn delete_rows(
            &self,
            _key: &CollectionKey,
            _rows: &[CollectionRow<Part>],
        ) -> PersisterResult<()> {
            Ok(())
        }

        async fn update_rows(
            &self,
            _key: &CollectionKey,
            _rows: &[CollectionRow<Part>],
        ) -> PersisterResult<()> {
            Ok(())
        }

        async fn insert_rows(
            &self,
            _key: &CollectionKey,
            _rows: &[CollectionRow<Part>],
        ) -> PersisterResult<()> {
            Ok(())
        }
    }

    fn collection(shape: CollectionShape) -> PersistentCollection<PartCodec> {
        PersistentCollection::new(
            CollectionRole::new("Machine.parts"),
            OwnerKey::from_bytes([1u8; 16]),
            shape,
            CollectionConfig::default(),
        )
    }

    fn ids(rows: &[CollectionRow<Part>]) -> Vec<u64> {
        rows.iter().map(|row| row.element.id).collect()
    }

    // === Materialization ===

    #[tokio::test]
    async fn read_materializes_from_storage() {
        let session = SessionContext::new();
        let persister = StubPersister::set(&[Part::new(1), Part::new(2)]);
        let mut parts = collection(CollectionShape::Set);

        assert_eq!(parts.state(), LoadState::Uninitialized);
        parts.read(&session, &persister).await.unwrap();

        assert_eq!(parts.state(), LoadState::Initialized);
        assert_eq!(parts.current_rows().len(), 2);
        assert!(!parts.is_dirty());
        assert_eq!(session.stats().loads(), 1);
    }

    #[tokio::test]
    async fn read_is_idempotent() {
        let session = SessionContext::new();
        let persister = StubPersister::set(&[Part::new(1)]);
        let mut parts = collection(CollectionShape::Set);

        parts.read(&session, &persister).await.unwrap();
        parts.read(&session, &persister).await.unwrap();

        assert_eq!(persister.load_calls(), 1);
    }

    #[tokio::test]
    async fn failed_load_leaves_collection_uninitialized() {
        let session = SessionContext::new();
        let persister = StubPersister::set(&[Part::new(1)]).fail_next_load();
        let mut parts = collection(CollectionShape::Set);

        let result = parts.read(&session, &persister).await;
        assert!(matches!(result, Err(CollectionError::Persister(_))));
        assert_eq!(parts.state(), LoadState::Uninitialized);

        // the next attempt succeeds cleanly
        parts.read(&session, &persister).await.unwrap();
        assert_eq!(parts.state(), LoadState::Initialized);
    }

    #[tokio::test]
    async fn closed_session_refuses_forced_read() {
        let session = SessionContext::new();
        session.close();
        let persister = StubPersister::set(&[]);
        let mut parts = collection(CollectionShape::Set);

        let result = parts.read(&session, &persister).await;
        assert!(matches!(result, Err(CollectionError::LazyAccess { .. })));
        assert_eq!(persister.load_calls(), 0);
    }

    #[test]
    fn read_bracket_buffers_rows() {
        let persister = StubPersister::set(&[]);
        let mut parts = collection(CollectionShape::Set);

        parts.begin_read().unwrap();
        assert_eq!(parts.state(), LoadState::Initializing);
        parts.read_from(CollectionRow::element(Part::new(1))).unwrap();
        parts.read_from(CollectionRow::element(Part::new(2))).unwrap();
        // nothing visible until the bracket closes
        assert!(parts.is_empty());

        parts.end_read(&persister).unwrap();
        assert_eq!(parts.state(), LoadState::Initialized);
        assert_eq!(parts.current_rows().len(), 2);
    }

    #[test]
    fn read_from_outside_bracket_is_an_invariant_violation() {
        let mut parts = collection(CollectionShape::Set);
        let result = parts.read_from(CollectionRow::element(Part::new(1)));
        assert!(matches!(result, Err(CollectionError::Invariant { .. })));
    }

    #[test]
    fn begin_read_twice_is_an_invariant_violation() {
        let mut parts = collection(CollectionShape::Set);
        parts.begin_read().unwrap();
        assert!(matches!(
            parts.begin_read(),
            Err(CollectionError::Invariant { .. })
        ));
    }

    #[test]
    fn list_rows_load_in_position_order() {
        let persister = StubPersister::with_shape(CollectionShape::List, Vec::new());
        let mut parts = collection(CollectionShape::List);

        parts.begin_read().unwrap();
        parts
            .read_from(CollectionRow::at_position(1, Part::new(20)))
            .unwrap();
        parts
            .read_from(CollectionRow::at_position(0, Part::new(10)))
            .unwrap();
        parts.end_read(&persister).unwrap();

        assert_eq!(ids(&parts.current_rows()), vec![10, 20]);
    }

    // === Mutation on an initialized collection ===

    #[tokio::test]
    async fn add_marks_dirty_on_actual_change() {
        let session = SessionContext::new();
        let persister = StubPersister::set(&[Part::new(1)]);
        let mut parts = collection(CollectionShape::Set);
        parts.read(&session, &persister).await.unwrap();

        assert!(parts.add(&session, &persister, Part::new(2)).await.unwrap());
        assert!(parts.is_dirty());
    }

    #[tokio::test]
    async fn duplicate_add_does_not_dirty() {
        let session = SessionContext::new();
        let persister = StubPersister::set(&[Part::new(1)]);
        let mut parts = collection(CollectionShape::Set);
        parts.read(&session, &persister).await.unwrap();

        assert!(!parts.add(&session, &persister, Part::new(1)).await.unwrap());
        assert!(!parts.is_dirty());
    }

    #[tokio::test]
    async fn removing_absent_element_does_not_dirty() {
        let session = SessionContext::new();
        let persister = StubPersister::set(&[Part::new(1)]);
        let mut parts = collection(CollectionShape::Set);
        parts.read(&session, &persister).await.unwrap();

        assert!(!parts.remove(&session, &persister, Part::new(9)).await.unwrap());
        assert!(!parts.is_dirty());
    }

    #[tokio::test]
    async fn clear_on_empty_does_not_dirty() {
        let session = SessionContext::new();
        let persister = StubPersister::set(&[]);
        let mut parts = collection(CollectionShape::Set);
        parts.read(&session, &persister).await.unwrap();

        parts.clear(&session, &persister).await.unwrap();
        assert!(!parts.is_dirty());
    }

    // === Queueing on an uninitialized collection ===

    #[tokio::test]
    async fn uninitialized_add_queues_without_loading() {
        let session = SessionContext::new();
        let persister = StubPersister::set(&[Part::new(1)]);
        let mut parts = collection(CollectionShape::Set);

        assert!(parts.add(&session, &persister, Part::new(3)).await.unwrap());
        assert!(parts.has_queued_operations());
        assert_eq!(parts.state(), LoadState::Uninitialized);
        assert_eq!(persister.load_calls(), 0);
    }

    #[tokio::test]
    async fn queued_operations_replay_in_enqueue_order() {
        let session = SessionContext::new();
        let persister = StubPersister::set(&[Part::new(1), Part::new(2)]);
        let mut parts = collection(CollectionShape::Set);

        parts.add(&session, &persister, Part::new(3)).await.unwrap();
        parts.remove(&session, &persister, Part::new(1)).await.unwrap();

        parts.read(&session, &persister).await.unwrap();

        let mut current = ids(&parts.current_rows());
        current.sort_unstable();
        assert_eq!(current, vec![2, 3]);
        assert!(parts.is_dirty());
        assert!(!parts.has_queued_operations());
    }

    #[tokio::test]
    async fn replay_snapshot_reflects_loaded_contents() {
        let session = SessionContext::new();
        let persister = StubPersister::set(&[Part::new(1), Part::new(2)]);
        let mut parts = collection(CollectionShape::Set);

        parts.add(&session, &persister, Part::new(3)).await.unwrap();
        parts.remove(&session, &persister, Part::new(1)).await.unwrap();
        parts.read(&session, &persister).await.unwrap();

        // the flush delta reproduces exactly the queued mutations
        let deletes = parts.get_deletes(&persister);
        assert_eq!(ids(&deletes), vec![1]);
        let delta = parts.compute_delta(&persister);
        assert_eq!(ids(&delta.inserts), vec![3]);
        assert!(delta.updates.is_empty());
    }

    #[tokio::test]
    async fn queue_resolves_existence_locally() {
        let session = SessionContext::new();
        let persister = StubPersister::set(&[Part::new(1)]);
        let mut parts = collection(CollectionShape::Set);

        parts.add(&session, &persister, Part::new(5)).await.unwrap();

        // queued add answers contains without a storage round trip
        assert!(parts.contains(&session, &persister, &Part::new(5)).await.unwrap());
        assert_eq!(persister.load_calls(), 0);

        // a queued add of an already-queued element is refused
        assert!(!parts.add(&session, &persister, Part::new(5)).await.unwrap());

        parts.remove(&session, &persister, Part::new(5)).await.unwrap();
        assert!(!parts.contains(&session, &persister, &Part::new(5)).await.unwrap());
        assert_eq!(persister.load_calls(), 0);
    }

    #[tokio::test]
    async fn queued_clear_discards_loaded_contents() {
        let session = SessionContext::new();
        let persister = StubPersister::set(&[Part::new(1), Part::new(2)]);
        let mut parts = collection(CollectionShape::Set);

        parts.clear(&session, &persister).await.unwrap();
        parts.add(&session, &persister, Part::new(9)).await.unwrap();
        parts.read(&session, &persister).await.unwrap();

        assert_eq!(ids(&parts.current_rows()), vec![9]);
    }

    #[tokio::test]
    async fn queueing_disabled_forces_materialization() {
        let session = SessionContext::new();
        let persister = StubPersister::set(&[Part::new(1)]);
        let mut parts = PersistentCollection::<PartCodec>::new(
            CollectionRole::new("Machine.parts"),
            OwnerKey::from_bytes([1u8; 16]),
            CollectionShape::Set,
            CollectionConfig::new().queue_operations(false),
        );

        assert!(parts.add(&session, &persister, Part::new(2)).await.unwrap());
        assert_eq!(parts.state(), LoadState::Initialized);
        assert_eq!(persister.load_calls(), 1);
        assert!(parts.is_dirty());
    }

    #[tokio::test]
    async fn map_put_forces_materialization() {
        let session = SessionContext::new();
        let persister = StubPersister::with_shape(
            CollectionShape::Map,
            vec![CollectionRow::at_key(IndexKey::Int(1), Part::new(1))],
        );
        let mut parts = collection(CollectionShape::Map);

        let replaced = parts
            .put(&session, &persister, IndexKey::Int(2), Part::new(2))
            .await
            .unwrap();
        assert!(replaced.is_none());
        assert_eq!(parts.state(), LoadState::Initialized);
        assert!(parts.is_dirty());
    }

    #[tokio::test]
    async fn cached_size_answers_len_without_loading() {
        let session = SessionContext::new();
        let persister = StubPersister::set(&[Part::new(1), Part::new(2)]);
        let mut parts = collection(CollectionShape::Set);
        parts.set_cached_size(2);

        assert_eq!(parts.len(&session, &persister).await.unwrap(), 2);
        assert_eq!(persister.load_calls(), 0);

        // a cached size of zero resolves removals to no-ops
        parts.set_cached_size(0);
        assert!(!parts.remove(&session, &persister, Part::new(1)).await.unwrap());
        assert_eq!(persister.load_calls(), 0);
    }

    // === Snapshot & diffing ===

    #[tokio::test]
    async fn equals_snapshot_is_reflexive_after_read() {
        let session = SessionContext::new();
        let persister = StubPersister::set(&[Part::new(1), Part::new(2)]);
        let mut parts = collection(CollectionShape::Set);
        parts.read(&session, &persister).await.unwrap();

        assert!(parts.equals_snapshot(&persister));
    }

    #[tokio::test]
    async fn equals_snapshot_detects_cardinality_change() {
        let session = SessionContext::new();
        let persister = StubPersister::set(&[Part::new(1)]);
        let mut parts = collection(CollectionShape::Set);
        parts.read(&session, &persister).await.unwrap();

        parts.add(&session, &persister, Part::new(2)).await.unwrap();
        assert!(!parts.equals_snapshot(&persister));
    }

    #[tokio::test]
    async fn set_diff_matches_spec_example() {
        // snapshot {a, b, c}, current {b, c, d}
        let session = SessionContext::new();
        let persister = StubPersister::set(&[Part::new(1), Part::new(2), Part::new(3)]);
        let mut parts = collection(CollectionShape::Set);
        parts.read(&session, &persister).await.unwrap();

        parts.remove(&session, &persister, Part::new(1)).await.unwrap();
        parts.add(&session, &persister, Part::new(4)).await.unwrap();

        assert_eq!(ids(&parts.get_deletes(&persister)), vec![1]);
        let delta = parts.compute_delta(&persister);
        assert_eq!(ids(&delta.inserts), vec![4]);
        assert!(delta.updates.is_empty());
    }

    #[tokio::test]
    async fn stale_set_element_is_deleted_and_reinserted() {
        let session = SessionContext::new();
        let persister = StubPersister::set(&[Part::new(1)]);
        let mut parts = collection(CollectionShape::Set);
        parts.read(&session, &persister).await.unwrap();

        // same identity, new revision
        parts.remove(&session, &persister, Part::new(1)).await.unwrap();
        parts.add(&session, &persister, Part::rev(1, 7)).await.unwrap();

        let delta = parts.compute_delta(&persister);
        assert_eq!(delta.deletes.len(), 1);
        assert_eq!(delta.deletes[0].element.revision, 0);
        assert_eq!(delta.inserts.len(), 1);
        assert_eq!(delta.inserts[0].element.revision, 7);
        assert!(!parts.equals_snapshot(&persister));
    }

    #[tokio::test]
    async fn list_shrink_deletes_trailing_positions() {
        let session = SessionContext::new();
        let persister = StubPersister::with_shape(
            CollectionShape::List,
            vec![
                CollectionRow::at_position(0, Part::new(1)),
                CollectionRow::at_position(1, Part::new(2)),
                CollectionRow::at_position(2, Part::new(3)),
            ],
        );
        let mut parts = collection(CollectionShape::List);
        parts.read(&session, &persister).await.unwrap();

        parts.remove(&session, &persister, Part::new(3)).await.unwrap();

        let deletes = parts.get_deletes(&persister);
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].index, Some(RowIndex::Position(2)));
    }

    #[tokio::test]
    async fn map_delta_covers_all_three_row_kinds() {
        let session = SessionContext::new();
        let persister = StubPersister::with_shape(
            CollectionShape::Map,
            vec![
                CollectionRow::at_key(IndexKey::Int(1), Part::new(1)),
                CollectionRow::at_key(IndexKey::Int(2), Part::new(2)),
            ],
        );
        let mut parts = collection(CollectionShape::Map);
        parts.read(&session, &persister).await.unwrap();

        parts.remove_key(&session, &persister, &IndexKey::Int(1)).await.unwrap();
        parts
            .put(&session, &persister, IndexKey::Int(2), Part::rev(2, 5))
            .await
            .unwrap();
        parts
            .put(&session, &persister, IndexKey::Int(3), Part::new(3))
            .await
            .unwrap();

        let delta = parts.compute_delta(&persister);
        assert_eq!(delta.deletes.len(), 1);
        assert_eq!(delta.deletes[0].index, Some(RowIndex::Key(IndexKey::Int(1))));
        assert_eq!(delta.updates.len(), 1);
        assert_eq!(delta.updates[0].element.revision, 5);
        assert_eq!(delta.inserts.len(), 1);
        assert_eq!(ids(&delta.inserts), vec![3]);
        assert!(parts.is_dirty());
    }

    #[tokio::test]
    async fn map_put_of_identical_value_does_not_dirty() {
        let session = SessionContext::new();
        let persister = StubPersister::with_shape(
            CollectionShape::Map,
            vec![CollectionRow::at_key(IndexKey::Int(1), Part::new(1))],
        );
        let mut parts = collection(CollectionShape::Map);
        parts.read(&session, &persister).await.unwrap();

        parts
            .put(&session, &persister, IndexKey::Int(1), Part::new(1))
            .await
            .unwrap();
        assert!(!parts.is_dirty());
    }

    #[test]
    fn positional_lookup_on_set_is_unsupported() {
        let persister = StubPersister::set(&[]);
        let mut parts = collection(CollectionShape::Set);
        parts.begin_read().unwrap();
        parts.end_read(&persister).unwrap();

        let result = parts.get_position(0);
        assert!(matches!(result, Err(CollectionError::Unsupported { .. })));
    }

    // === Direct construction ===

    #[tokio::test]
    async fn from_existing_starts_initialized_and_dirty() {
        let persister = StubPersister::set(&[]);
        let mut contents = Contents::empty(CollectionShape::Set);
        contents.add(Part::new(1)).unwrap();
        contents.add(Part::new(2)).unwrap();

        let parts = PersistentCollection::<PartCodec>::from_existing(
            CollectionRole::new("Machine.parts"),
            OwnerKey::from_bytes([1u8; 16]),
            CollectionConfig::default(),
            contents,
        );

        assert!(parts.was_initialized());
        assert!(parts.is_dirty());
        assert!(parts.is_directly_accessible());

        // no snapshot: the first flush inserts everything
        let delta = parts.compute_delta(&persister);
        assert_eq!(delta.inserts.len(), 2);
        assert!(delta.deletes.is_empty());
        assert!(!parts.equals_snapshot(&persister));
    }

    // === Cache-assisted materialization ===

    #[tokio::test]
    async fn read_assembles_from_cache_without_storage() {
        let session = SessionContext::new();
        let region = Arc::new(InMemoryCacheRegion::new());
        let persister = StubPersister::set(&[Part::new(1)]).with_cache(Arc::clone(&region));
        let mut parts = collection(CollectionShape::Set);

        let entry = CollectionCacheEntry::from_rows(vec![
            DisassembledRow {
                index: None,
                state: (1u64, 0u32),
            },
            DisassembledRow {
                index: None,
                state: (2u64, 3u32),
            },
        ]);
        let cache_key = region.generate_key(&parts.key());
        assert!(region.put(&cache_key, entry.to_bytes().unwrap()));

        parts.read(&session, &persister).await.unwrap();

        assert_eq!(persister.load_calls(), 0);
        assert_eq!(session.stats().cache_hits(), 1);
        let mut current = ids(&parts.current_rows());
        current.sort_unstable();
        assert_eq!(current, vec![1, 2]);
    }

    #[tokio::test]
    async fn cache_miss_falls_back_to_storage() {
        let session = SessionContext::new();
        let region = Arc::new(InMemoryCacheRegion::new());
        let persister = StubPersister::set(&[Part::new(1)]).with_cache(region);
        let mut parts = collection(CollectionShape::Set);

        parts.read(&session, &persister).await.unwrap();

        assert_eq!(persister.load_calls(), 1);
        assert_eq!(session.stats().cache_hits(), 0);
    }

    #[tokio::test]
    async fn assemble_is_idempotent() {
        let session = SessionContext::new();
        let persister = StubPersister::set(&[Part::new(1)]);
        let mut parts = collection(CollectionShape::Set);
        parts.read(&session, &persister).await.unwrap();
        parts.add(&session, &persister, Part::new(2)).await.unwrap();

        let entry = CollectionCacheEntry::from_rows(vec![DisassembledRow {
            index: None,
            state: (9u64, 0u32),
        }]);
        // assembling into an initialized collection is a no-op
        entry.assemble(&mut parts, &persister).unwrap();
        assert_eq!(parts.current_rows().len(), 2);
    }

    #[tokio::test]
    async fn disassemble_assemble_reproduces_contents() {
        let session = SessionContext::new();
        let persister = StubPersister::set(&[Part::rev(1, 4), Part::rev(2, 8)]);
        let mut parts = collection(CollectionShape::Set);
        parts.read(&session, &persister).await.unwrap();

        let entry = CollectionCacheEntry::create(&parts, &persister).unwrap();
        let mut rebuilt = collection(CollectionShape::Set);
        entry.assemble(&mut rebuilt, &persister).unwrap();

        assert!(rebuilt.was_initialized());
        let mut expected = parts
            .current_rows()
            .iter()
            .map(|row| (row.element.id, row.element.revision))
            .collect::<Vec<_>>();
        expected.sort_unstable();
        let mut actual = rebuilt
            .current_rows()
            .iter()
            .map(|row| (row.element.id, row.element.revision))
            .collect::<Vec<_>>();
        actual.sort_unstable();
        assert_eq!(expected, actual);
    }

    // === Bookkeeping ===

    #[tokio::test]
    async fn after_action_resets_dirty_and_resnapshots() {
        let session = SessionContext::new();
        let persister = StubPersister::set(&[Part::new(1)]);
        let mut parts = collection(CollectionShape::Set);
        parts.read(&session, &persister).await.unwrap();
        parts.add(&session, &persister, Part::new(2)).await.unwrap();
        assert!(parts.is_dirty());

        parts.after_action(persister.element_codec());

        assert!(!parts.is_dirty());
        assert!(parts.equals_snapshot(&persister));
        assert!(parts.compute_delta(&persister).is_empty());
    }

    #[tokio::test]
    async fn dereference_clears_snapshot() {
        let session = SessionContext::new();
        let persister = StubPersister::set(&[Part::new(1)]);
        let mut parts = collection(CollectionShape::Set);
        parts.read(&session, &persister).await.unwrap();

        parts.dereference();
        assert!(!parts.equals_snapshot(&persister));
    }
}
