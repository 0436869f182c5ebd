//! Collection-update observers.
//!
//! Listener lists are owned by the session factory and injected into each
//! flush action at construction; the engine never looks observers up
//! through ambient state.

use crate::error::CollectionResult;
use std::fmt;
use std::sync::Arc;
use tether_persister::CollectionKey;

/// Event payload passed to collection-update observers.
#[derive(Debug, Clone)]
pub struct CollectionUpdateEvent {
    /// Identity of the collection being written.
    pub key: CollectionKey,
}

/// Observer invoked synchronously before a collection's row writes.
///
/// A returned error aborts the flush action; failures are never swallowed.
pub trait PreCollectionUpdateListener: Send + Sync {
    /// Called before the row-write phase.
    fn on_pre_update(&self, event: &CollectionUpdateEvent) -> CollectionResult<()>;
}

/// Observer invoked synchronously after a collection's row writes.
pub trait PostCollectionUpdateListener: Send + Sync {
    /// Called after the row-write phase.
    fn on_post_update(&self, event: &CollectionUpdateEvent) -> CollectionResult<()>;
}

/// Ordered pre/post collection-update listener lists.
#[derive(Clone, Default)]
pub struct CollectionListeners {
    pre: Vec<Arc<dyn PreCollectionUpdateListener>>,
    post: Vec<Arc<dyn PostCollectionUpdateListener>>,
}

impl CollectionListeners {
    /// Creates empty listener lists.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a pre-update listener.
    #[must_use]
    pub fn with_pre(mut self, listener: Arc<dyn PreCollectionUpdateListener>) -> Self {
        self.pre.push(listener);
        self
    }

    /// Appends a post-update listener.
    #[must_use]
    pub fn with_post(mut self, listener: Arc<dyn PostCollectionUpdateListener>) -> Self {
        self.post.push(listener);
        self
    }

    /// Invokes every pre-update listener in order.
    pub fn fire_pre(&self, event: &CollectionUpdateEvent) -> CollectionResult<()> {
        for listener in &self.pre {
            listener.on_pre_update(event)?;
        }
        Ok(())
    }

    /// Invokes every post-update listener in order.
    pub fn fire_post(&self, event: &CollectionUpdateEvent) -> CollectionResult<()> {
        for listener in &self.post {
            listener.on_post_update(event)?;
        }
        Ok(())
    }
}

impl fmt::Debug for CollectionListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionListeners")
            .field("pre", &self.pre.len())
            .field("post", &self.post.len())
            .finish()
    }
}
