//! Transaction log record encoding.

use crate::error::{IndexError, IndexResult};
use crate::types::{DocumentId, TransactionLogId};
use std::collections::BTreeSet;

/// Magic bytes identifying a transaction log record.
pub const LOG_MAGIC: [u8; 4] = *b"SDXL";

/// Current log format version.
pub const LOG_VERSION: u16 = 1;

/// magic (4) + version (2) + length (4)
const HEADER_SIZE: usize = 10;
const CRC_SIZE: usize = 4;

/// Ids touched by one open mutation batch.
///
/// Updated ids are logged together with added ids: both carry a body that
/// may be missing from the index after a crash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Record id, also the name of its directory.
    pub id: TransactionLogId,
    /// Added and updated ids.
    pub added: BTreeSet<DocumentId>,
    /// Removed ids.
    pub removed: BTreeSet<DocumentId>,
}

impl LogRecord {
    /// Every id the record mentions.
    #[must_use]
    pub fn ids(&self) -> BTreeSet<DocumentId> {
        self.added.union(&self.removed).cloned().collect()
    }

    /// Encodes the record inside its envelope.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::TransactionLog`] if an id or set is too large
    /// for the format.
    pub fn encode(&self) -> IndexResult<Vec<u8>> {
        let mut payload = Vec::new();
        payload.extend_from_slice(self.id.as_bytes());
        encode_ids(&mut payload, &self.added)?;
        encode_ids(&mut payload, &self.removed)?;

        let len = u32::try_from(payload.len())
            .map_err(|_| IndexError::transaction_log("log record too large"))?;
        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        buf.extend_from_slice(&LOG_MAGIC);
        buf.extend_from_slice(&LOG_VERSION.to_le_bytes());
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&payload);

        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    /// Decodes a record.
    ///
    /// Returns `Ok(None)` when the bytes stop short of a full record, which
    /// is what a crash during the write leaves behind.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::ChecksumMismatch`] for a complete record with a
    /// bad checksum and [`IndexError::TransactionLog`] for bad magic, an
    /// unknown version or a malformed payload.
    pub fn decode(data: &[u8]) -> IndexResult<Option<Self>> {
        if data.len() < HEADER_SIZE {
            return Ok(None);
        }
        if data[0..4] != LOG_MAGIC {
            return Err(IndexError::transaction_log("invalid log magic"));
        }
        let version = u16::from_le_bytes([data[4], data[5]]);
        if version > LOG_VERSION {
            return Err(IndexError::transaction_log(format!(
                "unsupported log version: {version}"
            )));
        }
        let len = u32::from_le_bytes([data[6], data[7], data[8], data[9]]) as usize;
        let total = HEADER_SIZE + len + CRC_SIZE;
        if data.len() < total {
            return Ok(None);
        }

        let stored = u32::from_le_bytes([
            data[total - 4],
            data[total - 3],
            data[total - 2],
            data[total - 1],
        ]);
        let computed = compute_crc32(&data[..total - CRC_SIZE]);
        if stored != computed {
            return Err(IndexError::ChecksumMismatch {
                expected: stored,
                actual: computed,
            });
        }

        let payload = &data[HEADER_SIZE..HEADER_SIZE + len];
        let id: [u8; 16] = payload
            .get(..16)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| IndexError::transaction_log("log record missing id"))?;
        let mut cursor = 16;
        let added = decode_ids(payload, &mut cursor)?;
        let removed = decode_ids(payload, &mut cursor)?;

        Ok(Some(Self {
            id: TransactionLogId::from_bytes(id),
            added,
            removed,
        }))
    }
}

fn encode_ids(buf: &mut Vec<u8>, ids: &BTreeSet<DocumentId>) -> IndexResult<()> {
    let count = u32::try_from(ids.len())
        .map_err(|_| IndexError::transaction_log("too many ids in log record"))?;
    buf.extend_from_slice(&count.to_le_bytes());
    for id in ids {
        let bytes = id.as_str().as_bytes();
        let len = u16::try_from(bytes.len())
            .map_err(|_| IndexError::transaction_log(format!("document id too long: {id}")))?;
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(bytes);
    }
    Ok(())
}

fn decode_ids(payload: &[u8], cursor: &mut usize) -> IndexResult<BTreeSet<DocumentId>> {
    let truncated = || IndexError::transaction_log("unexpected end of log payload");

    let count: [u8; 4] = payload
        .get(*cursor..*cursor + 4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(truncated)?;
    *cursor += 4;

    let mut ids = BTreeSet::new();
    for _ in 0..u32::from_le_bytes(count) {
        let len: [u8; 2] = payload
            .get(*cursor..*cursor + 2)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(truncated)?;
        *cursor += 2;
        let len = u16::from_le_bytes(len) as usize;
        let bytes = payload.get(*cursor..*cursor + len).ok_or_else(truncated)?;
        *cursor += len;
        let id = std::str::from_utf8(bytes)
            .map_err(|_| IndexError::transaction_log("document id is not UTF-8"))?;
        ids.insert(DocumentId::from(id));
    }
    Ok(ids)
}

/// Computes CRC32 (IEEE polynomial) of data.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}
