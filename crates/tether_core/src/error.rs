//! Error types for the collection engine.

use tether_codec::CodecError;
use tether_persister::{CollectionKey, CollectionRole, CollectionShape, PersisterError};
use thiserror::Error;

/// Result type for collection engine operations.
pub type CollectionResult<T> = Result<T, CollectionError>;

/// Errors that can occur in the collection engine.
#[derive(Debug, Error)]
pub enum CollectionError {
    /// An internal invariant was violated. Always a bug; never retried.
    #[error("invariant violated: {message}")]
    Invariant {
        /// Description of the violated invariant.
        message: String,
    },

    /// A lazy load was forced while the owning session is closed.
    #[error("cannot lazily initialize collection {role}: session is closed")]
    LazyAccess {
        /// Role of the collection whose load was forced.
        role: CollectionRole,
    },

    /// The requested operation is structurally invalid for the shape.
    #[error("unsupported operation on {shape} collection: {message}")]
    Unsupported {
        /// Shape of the collection.
        shape: CollectionShape,
        /// Description of the invalid request.
        message: String,
    },

    /// A recreate was requested while a row filter is enabled.
    ///
    /// Filters and recreate are mutually exclusive: recreating from a
    /// filtered view would silently drop the rows the filter hides.
    #[error("cannot recreate collection {key} while a filter is enabled")]
    FilterConflict {
        /// Identity of the conflicting collection.
        key: CollectionKey,
    },

    /// A row operation failed in the persister.
    #[error("persister error: {0}")]
    Persister(#[from] PersisterError),

    /// An element codec failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl CollectionError {
    /// Creates an invariant violation error.
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }

    /// Creates a lazy access error.
    #[must_use]
    pub fn lazy_access(role: CollectionRole) -> Self {
        Self::LazyAccess { role }
    }

    /// Creates an unsupported operation error.
    pub fn unsupported(shape: CollectionShape, message: impl Into<String>) -> Self {
        Self::Unsupported {
            shape,
            message: message.into(),
        }
    }

    /// Creates a filter conflict error.
    #[must_use]
    pub fn filter_conflict(key: CollectionKey) -> Self {
        Self::FilterConflict { key }
    }
}
