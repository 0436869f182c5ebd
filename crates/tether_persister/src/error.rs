//! Error types for persister and cache operations.

use thiserror::Error;

/// Result type for persister operations.
pub type PersisterResult<T> = Result<T, PersisterError>;

/// Errors that can occur in the storage or cache layer.
///
/// The collection engine never retries these; retry policy belongs to the
/// caller's transaction layer.
#[derive(Debug, Error)]
pub enum PersisterError {
    /// A row-level storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the failure.
        message: String,
    },

    /// The storage call timed out.
    #[error("storage call timed out after {millis} ms")]
    Timeout {
        /// Elapsed time before the timeout fired.
        millis: u64,
    },

    /// The storage call was cancelled by the caller.
    #[error("storage call cancelled")]
    Cancelled,

    /// A cache region operation failed.
    #[error("cache error: {message}")]
    Cache {
        /// Description of the failure.
        message: String,
    },
}

impl PersisterError {
    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a cache error.
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub const fn timeout(millis: u64) -> Self {
        Self::Timeout { millis }
    }
}
