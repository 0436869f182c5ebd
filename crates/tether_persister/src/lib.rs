//! # Tether Persister
//!
//! Capability layer consumed by the Tether collection engine.
//!
//! The engine never talks to storage or to a cache directly. It computes
//! row-level deltas and hands them to a [`CollectionPersister`], the
//! mapping-aware component that knows how to read rows into elements and
//! how to emit row inserts, updates, deletes and full recreates. Cache
//! access goes through a [`CacheRegion`] with a soft-lock protocol that
//! keeps concurrent transactions from trusting half-committed entries.
//!
//! This crate provides:
//! - The collection vocabulary types ([`CollectionRole`], [`OwnerKey`],
//!   [`CollectionKey`], [`CollectionShape`], [`RowIndex`], [`CollectionRow`])
//! - The asynchronous [`CollectionPersister`] trait
//! - The [`CacheRegion`] trait with [`CacheKey`] and [`SoftLock`]
//! - [`InMemoryCacheRegion`] for tests and embedded use

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod error;
mod memory;
mod persister;
mod types;

pub use cache::{CacheKey, CacheRegion, SoftLock};
pub use error::{PersisterError, PersisterResult};
pub use memory::InMemoryCacheRegion;
pub use persister::{CollectionPersister, Element};
pub use types::{CollectionKey, CollectionRole, CollectionRow, CollectionShape, IndexKey, OwnerKey, RowIndex};
