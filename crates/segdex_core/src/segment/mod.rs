//! Index segments.
//!
//! Documents live in one of two kinds of segment:
//!
//! - **Memory segments** hold small recent batches and are lost on crash;
//!   the transaction log covers them until they are flushed
//! - **Persistent segments** are directories of framed records listed in the
//!   segment registry
//!
//! ## Record Format
//!
//! ```text
//! | record_len (4) | flags (1) | id_len (2) | id | payload (N) | crc32 (4) |
//! ```
//!
//! Flags: `0x01` = tombstone. The payload is the CBOR-encoded document.

mod memory;
mod reader;
mod record;
mod store;

pub use memory::{MemorySegment, MemorySnapshot};
pub use reader::IndexReader;
pub use record::{scan_records, SegmentRecord, SegmentRecordFlags};
pub use store::{PersistentStore, PersistentView};
