//! Error types for the index manager.

use std::io;
use thiserror::Error;

/// Result type for index operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors that can occur while managing the index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] segdex_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Document encoding or decoding failed.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// Generic index I/O or corruption failure.
    #[error("index error: {message}")]
    Index {
        /// Description of the failure.
        message: String,
    },

    /// A mutation batch could not be applied.
    #[error("transaction failed: {message}")]
    Transaction {
        /// Description of the failure.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<Box<IndexError>>,
    },

    /// Transaction log or directory lock failure.
    #[error("transaction log error: {message}")]
    TransactionLog {
        /// Description of the failure.
        message: String,
    },

    /// The index was set up with invalid configuration.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the problem.
        message: String,
    },

    /// No reader could be assembled from any layer.
    #[error("no index readers found")]
    ReaderNotFound,

    /// An argument was rejected.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// The segment set changed underneath an aggregation pass.
    #[error("concurrent modification: {message}")]
    ConcurrentModification {
        /// Description of the conflicting change.
        message: String,
    },

    /// The index was closed.
    #[error("index is closed")]
    IndexClosed,

    /// Another process holds the index directory lock.
    #[error("index locked: another process has exclusive access")]
    IndexLocked,

    /// Checksum mismatch in a segment or log record.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Expected checksum.
        expected: u32,
        /// Actual checksum.
        actual: u32,
    },
}

impl IndexError {
    /// Creates a generic index error.
    pub fn index(message: impl Into<String>) -> Self {
        Self::Index {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a transaction error without an underlying cause.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps `source` as the cause of a failed transaction.
    pub fn transaction_failed(message: impl Into<String>, source: IndexError) -> Self {
        Self::Transaction {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a transaction log error.
    pub fn transaction_log(message: impl Into<String>) -> Self {
        Self::TransactionLog {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a concurrent modification error.
    pub fn concurrent_modification(message: impl Into<String>) -> Self {
        Self::ConcurrentModification {
            message: message.into(),
        }
    }

    /// Returns true for errors that a shutdown flush may swallow.
    #[must_use]
    pub fn is_concurrent_modification(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }
}
