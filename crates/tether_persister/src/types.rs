//! Collection vocabulary types.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier naming which mapped collection of an entity type this is,
/// e.g. `"Order.lines"`.
///
/// Roles are stable across sessions and are half of a collection's cache
/// identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CollectionRole(String);

impl CollectionRole {
    /// Creates a new collection role.
    pub fn new(role: impl Into<String>) -> Self {
        Self(role.into())
    }

    /// Returns the role name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the entity instance that owns a collection.
///
/// Owner keys are 128-bit identifiers that are immutable once assigned and
/// never reused.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OwnerKey([u8; 16]);

impl OwnerKey {
    /// Creates an owner key from raw bytes.
    #[inline]
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Creates a new random owner key.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().into_bytes())
    }

    /// Creates an owner key from a UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid.into_bytes())
    }

    /// Returns the raw bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Converts to a UUID.
    #[must_use]
    pub fn to_uuid(&self) -> Uuid {
        Uuid::from_bytes(self.0)
    }
}

impl Default for OwnerKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerKey({})", self.to_uuid())
    }
}

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uuid())
    }
}

/// Identity of one collection instance: the owning entity plus the role.
///
/// There is at most one tracked collection per key per session, and at most
/// one cache entry per key at any time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionKey {
    /// The owning entity.
    pub owner: OwnerKey,
    /// The mapped collection role.
    pub role: CollectionRole,
}

impl CollectionKey {
    /// Creates a collection key.
    pub fn new(owner: OwnerKey, role: CollectionRole) -> Self {
        Self { owner, role }
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.role, self.owner)
    }
}

/// Shape of a mapped collection.
///
/// Tether models the closed set of shapes the engine knows how to diff:
/// order-independent sets, positional lists, and key-indexed maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionShape {
    /// Order-independent, equality-deduplicated elements.
    Set,
    /// Positionally indexed elements.
    List,
    /// Key-indexed entries.
    Map,
}

impl fmt::Display for CollectionShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set => write!(f, "set"),
            Self::List => write!(f, "list"),
            Self::Map => write!(f, "map"),
        }
    }
}

/// Key of an entry within a map-shaped collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IndexKey {
    /// Integer key.
    Int(i64),
    /// Text key.
    Text(String),
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Index of a row within an indexed collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RowIndex {
    /// Position within a list.
    Position(usize),
    /// Key within a map.
    Key(IndexKey),
}

/// One row-level element, with its index when the shape is indexed.
///
/// Rows flow in both directions: the persister reads them out of storage
/// during materialization, and the engine hands them back as the payload of
/// row-level writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRow<E> {
    /// Index of the row; `None` for set-shaped collections.
    pub index: Option<RowIndex>,
    /// The element value.
    pub element: E,
}

impl<E> CollectionRow<E> {
    /// Creates an unindexed row.
    pub fn element(element: E) -> Self {
        Self {
            index: None,
            element,
        }
    }

    /// Creates a row at a list position.
    pub fn at_position(position: usize, element: E) -> Self {
        Self {
            index: Some(RowIndex::Position(position)),
            element,
        }
    }

    /// Creates a row at a map key.
    pub fn at_key(key: IndexKey, element: E) -> Self {
        Self {
            index: Some(RowIndex::Key(key)),
            element,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_key_is_stable() {
        let bytes = [7u8; 16];
        let key = OwnerKey::from_bytes(bytes);
        assert_eq!(key.as_bytes(), &bytes);
        assert_eq!(OwnerKey::from_uuid(key.to_uuid()), key);
    }

    #[test]
    fn collection_key_display() {
        let owner = OwnerKey::from_bytes([0u8; 16]);
        let key = CollectionKey::new(owner, CollectionRole::new("Order.lines"));
        assert!(format!("{key}").starts_with("Order.lines@"));
    }

    #[test]
    fn index_keys_order() {
        let a = IndexKey::Int(1);
        let b = IndexKey::Int(2);
        assert!(a < b);
    }

    #[test]
    fn row_constructors_set_index() {
        let row = CollectionRow::at_position(3, "x");
        assert_eq!(row.index, Some(RowIndex::Position(3)));

        let row = CollectionRow::element("x");
        assert!(row.index.is_none());
    }
}
