//! # segdex storage
//!
//! Byte-store backends underneath segdex segment files and transaction log
//! records.
//!
//! Backends are **opaque byte stores**: they append, read back and sync raw
//! bytes and know nothing about documents, segments or log framing. The
//! index layer owns every file format.
//!
//! ## Available Backends
//!
//! - [`FileBackend`] - one OS file per backend, used for `documents.dat`
//!   inside persistent segment directories and for `record.wal` files
//! - [`InMemoryBackend`] - a growable buffer for tests
//!
//! ## Example
//!
//! ```rust
//! use segdex_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"segment bytes").unwrap();
//! assert_eq!(backend.read_at(offset, 7).unwrap(), b"segment");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
