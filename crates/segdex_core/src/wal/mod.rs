//! Transaction log for crash recovery.
//!
//! Every mutation batch gets its own log record before any segment is
//! touched. The record only lists ids; bodies are rebuilt from the content
//! store by the recovery service. A record that survives a restart marks its
//! ids as compromised.
//!
//! ## Record Format
//!
//! ```text
//! | magic (4) | version (2) | length (4) | payload (N) | crc32 (4) |
//!
//! payload = | log id (16) | added ids | removed ids |
//! ids     = | count (4) | count x (len (2) | utf-8) |
//! ```
//!
//! ## Recovery Policy
//!
//! - **Truncated record**: tolerated, the record is deleted with a warning
//! - **CRC mismatch**: fatal, `Err(ChecksumMismatch)`
//! - **Invalid magic or future version**: fatal, `Err(TransactionLog)`

mod log;
mod record;

pub use log::TransactionLog;
pub use record::{compute_crc32, LogRecord, LOG_MAGIC, LOG_VERSION};
