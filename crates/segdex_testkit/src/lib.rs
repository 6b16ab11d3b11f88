//! # segdex testkit
//!
//! Test utilities for segdex.
//!
//! This crate provides:
//! - Temporary indexes backed by an in-memory content store
//! - A recovery service that records what it was asked to repair
//! - Property-based generators using proptest
//! - Crash simulation by damaging index files between runs
//! - Cross-module integration helpers and concurrent stress runs
//!
//! ## Usage
//!
//! ```rust,ignore
//! use segdex_testkit::prelude::*;
//!
//! #[test]
//! fn buffered_batch_is_visible() {
//!     with_temp_index(|index| {
//!         index.save(&add_batch(&["a"])).unwrap();
//!         assert!(index.document_exists(&"a".into()));
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod content;
pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::content::*;
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::stress::*;
}

pub use content::*;
pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use stress::*;
