//! Disassembled collection cache entries.

use crate::collection::PersistentCollection;
use crate::error::CollectionResult;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use tether_codec::{CodecError, ElementCodec};
use tether_persister::{CollectionPersister, RowIndex};

/// One disassembled element, with its index when the shape is indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisassembledRow<D> {
    /// Index of the row; `None` for set-shaped collections.
    pub index: Option<RowIndex>,
    /// The element's cache-safe state.
    pub state: D,
}

/// The disassembled (cache-safe) representation of a collection's
/// contents.
///
/// Entries are produced at flush time by disassembling a collection
/// through its element codec, shipped through a cache region as opaque
/// bytes, and consumed to reinitialize a collection in another session
/// without hitting storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionCacheEntry<D> {
    rows: Vec<DisassembledRow<D>>,
}

impl<D> CollectionCacheEntry<D>
where
    D: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Disassembles a collection's current contents into an entry.
    ///
    /// Fails only if disassembly itself fails; codec errors propagate.
    pub fn create<P>(
        collection: &PersistentCollection<P::Codec>,
        persister: &P,
    ) -> CollectionResult<Self>
    where
        P: CollectionPersister,
        P::Codec: ElementCodec<Disassembled = D>,
    {
        Ok(Self {
            rows: collection.disassemble(persister)?,
        })
    }

    /// Wraps already-disassembled rows.
    #[must_use]
    pub fn from_rows(rows: Vec<DisassembledRow<D>>) -> Self {
        Self { rows }
    }

    /// Returns the disassembled rows in iteration order.
    #[must_use]
    pub fn rows(&self) -> &[DisassembledRow<D>] {
        &self.rows
    }

    /// Returns the number of disassembled rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true when the entry holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Reinitializes a collection from this entry.
    ///
    /// Idempotent: assembling into an already-initialized collection is a
    /// no-op.
    pub fn assemble<P>(
        &self,
        collection: &mut PersistentCollection<P::Codec>,
        persister: &P,
    ) -> CollectionResult<()>
    where
        P: CollectionPersister,
        P::Codec: ElementCodec<Disassembled = D>,
    {
        collection.initialize_from_cache(persister, &self.rows)
    }

    /// Serializes the entry for cache transport.
    pub fn to_bytes(&self) -> CollectionResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)
            .map_err(|e| CodecError::invalid_format(format!("cache entry encode: {e}")))?;
        Ok(bytes)
    }

    /// Deserializes an entry from cache transport bytes.
    pub fn from_bytes(bytes: &[u8]) -> CollectionResult<Self> {
        let entry = ciborium::from_reader(bytes)
            .map_err(|e| CodecError::invalid_format(format!("cache entry decode: {e}")))?;
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_persister::IndexKey;

    #[test]
    fn bytes_roundtrip() {
        let entry = CollectionCacheEntry::from_rows(vec![
            DisassembledRow {
                index: None,
                state: vec![1u8, 2, 3],
            },
            DisassembledRow {
                index: Some(RowIndex::Key(IndexKey::Text("k".into()))),
                state: vec![4u8],
            },
        ]);

        let bytes = entry.to_bytes().unwrap();
        let back: CollectionCacheEntry<Vec<u8>> = CollectionCacheEntry::from_bytes(&bytes).unwrap();

        assert_eq!(entry, back);
    }

    #[test]
    fn from_bytes_rejects_garbage() {
        let result: CollectionResult<CollectionCacheEntry<Vec<u8>>> =
            CollectionCacheEntry::from_bytes(&[0xff, 0x13]);
        assert!(result.is_err());
    }

    #[test]
    fn empty_entry() {
        let entry: CollectionCacheEntry<Vec<u8>> = CollectionCacheEntry::from_rows(Vec::new());
        assert!(entry.is_empty());
        assert_eq!(entry.len(), 0);
    }
}
