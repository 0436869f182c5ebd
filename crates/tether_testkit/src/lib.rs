//! # Tether Testkit
//!
//! Test utilities for Tether.
//!
//! This crate provides:
//! - The [`Widget`] element fixture with identity-scoped equality and its
//!   [`WidgetCodec`]
//! - [`ScriptedPersister`], a recording persister with failure injection
//! - [`RecordingCacheRegion`], a cache region that logs every protocol call
//! - Property-based generators for mutation sequences using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tether_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn my_test() {
//!     let persister = ScriptedPersister::set().with_rows(vec![
//!         widget_row(1, "a"),
//!     ]);
//!     // ... drive a PersistentCollection against it
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
