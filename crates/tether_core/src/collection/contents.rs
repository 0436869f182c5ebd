//! Live collection contents, one variant per mapped shape.

use crate::error::{CollectionError, CollectionResult};
use std::hash::Hash;
use tether_persister::{CollectionRow, CollectionShape, IndexKey};

/// The underlying value a [`PersistentCollection`](super::PersistentCollection)
/// wraps.
///
/// Shape-specific behavior lives here; the lifecycle machinery above is
/// shape-agnostic. Sets keep insertion order and deduplicate by element
/// equality. Maps keep entries ordered by key so diffs and disassembly are
/// deterministic.
#[derive(Debug, Clone)]
pub enum Contents<E> {
    /// Insertion-ordered, equality-deduplicated elements.
    Set(Vec<E>),
    /// Positional elements.
    List(Vec<E>),
    /// Key-ordered entries.
    Map(Vec<(IndexKey, E)>),
}

impl<E: Clone + Eq + Hash> Contents<E> {
    /// Creates empty contents of the given shape.
    #[must_use]
    pub fn empty(shape: CollectionShape) -> Self {
        match shape {
            CollectionShape::Set => Self::Set(Vec::new()),
            CollectionShape::List => Self::List(Vec::new()),
            CollectionShape::Map => Self::Map(Vec::new()),
        }
    }

    /// Returns the shape of these contents.
    #[must_use]
    pub fn shape(&self) -> CollectionShape {
        match self {
            Self::Set(_) => CollectionShape::Set,
            Self::List(_) => CollectionShape::List,
            Self::Map(_) => CollectionShape::Map,
        }
    }

    /// Returns the number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Set(items) | Self::List(items) => items.len(),
            Self::Map(entries) => entries.len(),
        }
    }

    /// Returns true when there are no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true when an equal element is present.
    #[must_use]
    pub fn contains(&self, element: &E) -> bool {
        match self {
            Self::Set(items) | Self::List(items) => items.contains(element),
            Self::Map(entries) => entries.iter().any(|(_, e)| e == element),
        }
    }

    /// Adds an element to a set or list.
    ///
    /// Returns true if the contents changed (a set refuses duplicates).
    /// Map-shaped contents reject this; use [`put`](Self::put).
    pub fn add(&mut self, element: E) -> CollectionResult<bool> {
        match self {
            Self::Set(items) => {
                if items.contains(&element) {
                    Ok(false)
                } else {
                    items.push(element);
                    Ok(true)
                }
            }
            Self::List(items) => {
                items.push(element);
                Ok(true)
            }
            Self::Map(_) => Err(CollectionError::unsupported(
                CollectionShape::Map,
                "add without a key; use put",
            )),
        }
    }

    /// Inserts or replaces a map entry, keeping entries key-ordered.
    ///
    /// Returns the replaced element, if any. Set- and list-shaped contents
    /// reject this.
    pub fn put(&mut self, key: IndexKey, element: E) -> CollectionResult<Option<E>> {
        match self {
            Self::Map(entries) => match entries.binary_search_by(|(k, _)| k.cmp(&key)) {
                Ok(pos) => {
                    let (_, old) = std::mem::replace(&mut entries[pos], (key, element));
                    Ok(Some(old))
                }
                Err(pos) => {
                    entries.insert(pos, (key, element));
                    Ok(None)
                }
            },
            other => Err(CollectionError::unsupported(
                other.shape(),
                "put requires a map-shaped collection",
            )),
        }
    }

    /// Removes the first element equal to `element` from a set or list.
    ///
    /// Returns true if an element was removed. Map-shaped contents reject
    /// removal by element; use [`remove_key`](Self::remove_key).
    pub fn remove(&mut self, element: &E) -> CollectionResult<bool> {
        match self {
            Self::Set(items) | Self::List(items) => {
                match items.iter().position(|e| e == element) {
                    Some(pos) => {
                        items.remove(pos);
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
            Self::Map(_) => Err(CollectionError::unsupported(
                CollectionShape::Map,
                "remove by element; use remove_key",
            )),
        }
    }

    /// Removes a map entry by key, returning the removed element.
    pub fn remove_key(&mut self, key: &IndexKey) -> CollectionResult<Option<E>> {
        match self {
            Self::Map(entries) => match entries.binary_search_by(|(k, _)| k.cmp(key)) {
                Ok(pos) => Ok(Some(entries.remove(pos).1)),
                Err(_) => Ok(None),
            },
            other => Err(CollectionError::unsupported(
                other.shape(),
                "remove_key requires a map-shaped collection",
            )),
        }
    }

    /// Removes every element, returning how many were removed.
    pub fn clear(&mut self) -> usize {
        match self {
            Self::Set(items) | Self::List(items) => {
                let removed = items.len();
                items.clear();
                removed
            }
            Self::Map(entries) => {
                let removed = entries.len();
                entries.clear();
                removed
            }
        }
    }

    /// Returns the element stored under a map key.
    pub fn get_key(&self, key: &IndexKey) -> CollectionResult<Option<&E>> {
        match self {
            Self::Map(entries) => Ok(entries
                .binary_search_by(|(k, _)| k.cmp(key))
                .ok()
                .map(|pos| &entries[pos].1)),
            other => Err(CollectionError::unsupported(
                other.shape(),
                "keyed lookup requires a map-shaped collection",
            )),
        }
    }

    /// Returns the element at a list position.
    ///
    /// Sets have no indexes; maps are addressed by key.
    pub fn get_position(&self, position: usize) -> CollectionResult<Option<&E>> {
        match self {
            Self::List(items) => Ok(items.get(position)),
            other => Err(CollectionError::unsupported(
                other.shape(),
                "positional lookup requires a list-shaped collection",
            )),
        }
    }

    /// Returns every element as a row, in iteration order.
    #[must_use]
    pub fn to_rows(&self) -> Vec<CollectionRow<E>> {
        match self {
            Self::Set(items) => items.iter().cloned().map(CollectionRow::element).collect(),
            Self::List(items) => items
                .iter()
                .cloned()
                .enumerate()
                .map(|(position, element)| CollectionRow::at_position(position, element))
                .collect(),
            Self::Map(entries) => entries
                .iter()
                .map(|(key, element)| CollectionRow::at_key(key.clone(), element.clone()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_deduplicates() {
        let mut contents = Contents::empty(CollectionShape::Set);
        assert!(contents.add(1).unwrap());
        assert!(!contents.add(1).unwrap());
        assert_eq!(contents.len(), 1);
    }

    #[test]
    fn list_allows_duplicates() {
        let mut contents = Contents::empty(CollectionShape::List);
        assert!(contents.add(1).unwrap());
        assert!(contents.add(1).unwrap());
        assert_eq!(contents.len(), 2);
    }

    #[test]
    fn map_put_keeps_key_order() {
        let mut contents = Contents::empty(CollectionShape::Map);
        contents.put(IndexKey::Int(2), "b").unwrap();
        contents.put(IndexKey::Int(1), "a").unwrap();

        let rows = contents.to_rows();
        assert_eq!(rows[0].index, Some(tether_persister::RowIndex::Key(IndexKey::Int(1))));
        assert_eq!(rows[1].index, Some(tether_persister::RowIndex::Key(IndexKey::Int(2))));
    }

    #[test]
    fn map_put_replaces() {
        let mut contents = Contents::empty(CollectionShape::Map);
        assert_eq!(contents.put(IndexKey::Int(1), "a").unwrap(), None);
        assert_eq!(contents.put(IndexKey::Int(1), "b").unwrap(), Some("a"));
        assert_eq!(contents.len(), 1);
    }

    #[test]
    fn remove_absent_is_noop() {
        let mut contents = Contents::empty(CollectionShape::Set);
        contents.add(1).unwrap();
        assert!(!contents.remove(&2).unwrap());
        assert_eq!(contents.len(), 1);
    }

    #[test]
    fn map_rejects_add() {
        let mut contents: Contents<i32> = Contents::empty(CollectionShape::Map);
        let result = contents.add(1);
        assert!(matches!(result, Err(CollectionError::Unsupported { .. })));
    }

    #[test]
    fn set_rejects_positional_lookup() {
        let mut contents = Contents::empty(CollectionShape::Set);
        contents.add(1).unwrap();
        let result = contents.get_position(0);
        assert!(matches!(result, Err(CollectionError::Unsupported { .. })));
    }

    #[test]
    fn clear_reports_removed_count() {
        let mut contents = Contents::empty(CollectionShape::List);
        contents.add(1).unwrap();
        contents.add(2).unwrap();
        assert_eq!(contents.clear(), 2);
        assert!(contents.is_empty());
    }

    #[test]
    fn list_rows_carry_positions() {
        let mut contents = Contents::empty(CollectionShape::List);
        contents.add("a").unwrap();
        contents.add("b").unwrap();

        let rows = contents.to_rows();
        assert_eq!(rows[0].index, Some(tether_persister::RowIndex::Position(0)));
        assert_eq!(rows[1].index, Some(tether_persister::RowIndex::Position(1)));
    }
}
