//! Collection snapshots.
//!
//! A snapshot is the immutable copy of a collection's contents taken when
//! it materializes (or at first flush for directly-constructed
//! collections). It exists only to feed the diffing algorithm and is never
//! mutated in place.

use crate::collection::Contents;
use std::hash::Hash;
use tether_codec::ElementCodec;
use tether_persister::{CollectionShape, IndexKey};

/// Immutable, shape-matched copy of a collection's elements.
///
/// Set snapshots are order-independent multisets keyed by the element's
/// own equality; list snapshots are position-indexed; map snapshots are
/// key-indexed.
#[derive(Debug, Clone)]
pub enum Snapshot<E> {
    /// Order-independent copies.
    Set(Vec<E>),
    /// Position-indexed copies.
    List(Vec<E>),
    /// Key-indexed copies.
    Map(Vec<(IndexKey, E)>),
}

impl<E: Clone + Eq + Hash> Snapshot<E> {
    /// Captures a snapshot of the given contents, deep-copying every
    /// element through the codec.
    pub fn capture<C>(contents: &Contents<E>, codec: &C) -> Self
    where
        C: ElementCodec<Element = E>,
    {
        match contents {
            Contents::Set(items) => Self::Set(items.iter().map(|e| codec.deep_copy(e)).collect()),
            Contents::List(items) => Self::List(items.iter().map(|e| codec.deep_copy(e)).collect()),
            Contents::Map(entries) => Self::Map(
                entries
                    .iter()
                    .map(|(k, e)| (k.clone(), codec.deep_copy(e)))
                    .collect(),
            ),
        }
    }

    /// Creates an empty snapshot of the given shape.
    #[must_use]
    pub fn empty(shape: CollectionShape) -> Self {
        match shape {
            CollectionShape::Set => Self::Set(Vec::new()),
            CollectionShape::List => Self::List(Vec::new()),
            CollectionShape::Map => Self::Map(Vec::new()),
        }
    }

    /// Returns the shape this snapshot was taken from.
    #[must_use]
    pub fn shape(&self) -> CollectionShape {
        match self {
            Self::Set(_) => CollectionShape::Set,
            Self::List(_) => CollectionShape::List,
            Self::Map(_) => CollectionShape::Map,
        }
    }

    /// Returns the number of stored copies.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Set(items) | Self::List(items) => items.len(),
            Self::Map(entries) => entries.len(),
        }
    }

    /// Returns true when the snapshot holds no copies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the stored copy identity-equal to `element`.
    ///
    /// This is the set-diff lookup; the element's own equality contract
    /// decides identity.
    #[must_use]
    pub fn stored_for(&self, element: &E) -> Option<&E> {
        match self {
            Self::Set(items) | Self::List(items) => items.iter().find(|e| *e == element),
            Self::Map(entries) => entries.iter().map(|(_, e)| e).find(|e| *e == element),
        }
    }

    /// Returns the copy stored at a list position.
    #[must_use]
    pub fn at_position(&self, position: usize) -> Option<&E> {
        match self {
            Self::List(items) => items.get(position),
            Self::Set(_) | Self::Map(_) => None,
        }
    }

    /// Returns the copy stored under a map key.
    #[must_use]
    pub fn for_key(&self, key: &IndexKey) -> Option<&E> {
        match self {
            Self::Map(entries) => entries
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, e)| e),
            Self::Set(_) | Self::List(_) => None,
        }
    }
}
