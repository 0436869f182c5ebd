//! Cache-safe collection state.
//!
//! A [`CollectionCacheEntry`] is the disassembled form of a collection's
//! contents: the shape a second-level cache stores and other sessions
//! assemble from without touching storage.

mod entry;

pub use entry::{CollectionCacheEntry, DisassembledRow};
