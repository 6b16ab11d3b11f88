//! Core type definitions.

use crate::error::{IndexError, IndexResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of an indexed document.
///
/// Ids are opaque strings handed out by the content layer (object ids,
/// node UUIDs). The index never interprets them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Creates a document id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifier of a transaction log record.
///
/// Log ids are random so concurrent writers never collide on a log
/// directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionLogId(Uuid);

impl TransactionLogId {
    /// Generates a fresh log id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a log id from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Returns the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Parses the hyphenated string form used for log directory names.
    pub fn parse(s: &str) -> IndexResult<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| IndexError::transaction_log(format!("invalid log id {s:?}: {e}")))
    }
}

impl fmt::Display for TransactionLogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Key by which aggregation policies identify a segment.
///
/// Memory segments use their creation counter; persistent segments use the
/// registry counter encoded in their name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentKey(pub u64);

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seg:{}", self.0)
    }
}

const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Name of a persistent segment: `"_"` followed by the base-36 counter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentName(String);

impl SegmentName {
    /// Builds the name for a registry counter value.
    #[must_use]
    pub fn from_counter(counter: u32) -> Self {
        let mut digits = Vec::new();
        let mut n = counter;
        loop {
            digits.push(BASE36_DIGITS[(n % 36) as usize]);
            n /= 36;
            if n == 0 {
                break;
            }
        }
        digits.reverse();
        let mut name = String::with_capacity(digits.len() + 1);
        name.push('_');
        name.extend(digits.into_iter().map(char::from));
        Self(name)
    }

    /// Parses a segment directory name.
    pub fn parse(name: &str) -> IndexResult<Self> {
        Self::counter_of(name)?;
        Ok(Self(name.to_string()))
    }

    fn counter_of(name: &str) -> IndexResult<u64> {
        let digits = name
            .strip_prefix('_')
            .filter(|d| !d.is_empty())
            .ok_or_else(|| IndexError::invalid_argument(format!("bad segment name {name:?}")))?;
        u64::from_str_radix(digits, 36)
            .map_err(|_| IndexError::invalid_argument(format!("bad segment name {name:?}")))
    }

    /// Returns the policy key derived from the counter.
    #[must_use]
    pub fn key(&self) -> SegmentKey {
        // Names are validated on construction.
        SegmentKey(Self::counter_of(&self.0).unwrap_or(u64::MAX))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SegmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
