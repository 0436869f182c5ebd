//! # Tether Codec
//!
//! Element codec layer for Tether collections.
//!
//! A persistent collection never interprets its elements itself. Everything
//! element-shaped goes through an [`ElementCodec`]: taking deep copies for
//! snapshots, deciding whether a stored value went stale, and converting
//! elements to and from the cache-safe "disassembled" form.
//!
//! This crate provides:
//! - The [`ElementCodec`] trait
//! - [`CborCodec`], a ready-made codec for serde-serializable elements whose
//!   disassembled state is canonical CBOR bytes
//! - [`CodecError`] / [`CodecResult`]

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod element;
mod error;

pub use cbor::CborCodec;
pub use element::ElementCodec;
pub use error::{CodecError, CodecResult};
