//! Core type definitions.

use std::fmt;

/// Materialization state of a persistent collection.
///
/// The lifecycle is strictly `Uninitialized → Initializing → Initialized`.
/// A failed load returns the collection to `Uninitialized`; there is no
/// partially-initialized state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Created lazily; contents not yet materialized.
    Uninitialized,
    /// A load is in flight; rows are being buffered.
    Initializing,
    /// Contents are materialized and live.
    Initialized,
}

impl LoadState {
    /// Returns true once the collection has materialized.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        matches!(self, Self::Initialized)
    }

    /// Returns true while a load is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Initializing)
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Initializing => write!(f, "initializing"),
            Self::Initialized => write!(f, "initialized"),
        }
    }
}
