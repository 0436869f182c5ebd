//! Serde/CBOR element codec.

use crate::element::ElementCodec;
use crate::error::{CodecError, CodecResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;

/// An [`ElementCodec`] for elements that serialize with serde.
///
/// The disassembled state is the element's CBOR encoding, which makes
/// entries safe to ship across sessions through a shared cache region.
/// Dirtiness is full-value inequality, which is correct for value-typed
/// elements where identity and value coincide; entity-referencing elements
/// usually want a hand-written codec with identity-scoped equality instead.
pub struct CborCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> CborCodec<T> {
    /// Creates a new CBOR codec.
    #[must_use]
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for CborCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Debug for CborCodec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CborCodec").finish()
    }
}

impl<T> ElementCodec for CborCodec<T>
where
    T: Clone + Eq + Hash + Debug + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    type Element = T;
    type Disassembled = Vec<u8>;

    fn deep_copy(&self, element: &T) -> T {
        element.clone()
    }

    fn is_dirty(&self, loaded: &T, current: &T) -> bool {
        loaded != current
    }

    fn disassemble(&self, element: &T) -> CodecResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(element, &mut bytes)
            .map_err(|e| CodecError::disassembly(e.to_string()))?;
        Ok(bytes)
    }

    fn assemble(&self, state: &Vec<u8>) -> CodecResult<T> {
        ciborium::from_reader(state.as_slice()).map_err(|e| CodecError::assembly(e.to_string()))
    }
}
