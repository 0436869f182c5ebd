//! Element codec trait.

use crate::error::CodecResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::hash::Hash;

/// Converts a single collection element to and from its cache-safe
/// representation, and compares element values for the dirty check.
///
/// Identity of an element across load and current state is the element's
/// own `Eq`/`Hash` contract: set-shaped collections diff by element
/// equality, so element types must implement *stable* equality (typically
/// over the element's identifier, not its mutable payload). The codec's
/// [`is_dirty`](ElementCodec::is_dirty) then decides whether two
/// identity-equal values differ in their stored representation.
///
/// # Example
///
/// ```rust,ignore
/// use tether_codec::{CodecResult, ElementCodec};
///
/// struct LineCodec;
///
/// impl ElementCodec for LineCodec {
///     type Element = OrderLine;
///     type Disassembled = (u64, String, u32);
///
///     fn deep_copy(&self, line: &OrderLine) -> OrderLine {
///         line.clone()
///     }
///
///     fn is_dirty(&self, loaded: &OrderLine, current: &OrderLine) -> bool {
///         loaded.quantity != current.quantity
///     }
///
///     fn disassemble(&self, line: &OrderLine) -> CodecResult<Self::Disassembled> {
///         Ok((line.id, line.sku.clone(), line.quantity))
///     }
///
///     fn assemble(&self, state: &Self::Disassembled) -> CodecResult<OrderLine> {
///         Ok(OrderLine { id: state.0, sku: state.1.clone(), quantity: state.2 })
///     }
/// }
/// ```
pub trait ElementCodec: Send + Sync + 'static {
    /// The live element type.
    type Element: Clone + Eq + Hash + Debug + Send + Sync + 'static;

    /// The cache-safe disassembled state of one element.
    ///
    /// Disassembled states cross session boundaries through a cache region,
    /// so they must be serde-serializable.
    type Disassembled: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Returns a deep copy of an element for snapshotting.
    ///
    /// The copy must be independent of the original: later mutation of the
    /// live element must not change the copy.
    fn deep_copy(&self, element: &Self::Element) -> Self::Element;

    /// Returns true when the stored value differs from the current value.
    ///
    /// `loaded` is the snapshot copy; `current` is the live element with
    /// the same identity.
    fn is_dirty(&self, loaded: &Self::Element, current: &Self::Element) -> bool;

    /// Disassembles an element into its cache-safe state.
    fn disassemble(&self, element: &Self::Element) -> CodecResult<Self::Disassembled>;

    /// Assembles an element back from its cache-safe state.
    fn assemble(&self, state: &Self::Disassembled) -> CodecResult<Self::Element>;
}
