//! Segment record types.

use crate::error::{IndexError, IndexResult};
use crate::types::DocumentId;
use crate::wal::compute_crc32;

/// Flags for segment records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentRecordFlags(u8);

impl SegmentRecordFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Record is a tombstone (document deleted).
    pub const TOMBSTONE: Self = Self(0x01);

    /// Returns the raw byte value.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self.0
    }

    /// Checks if tombstone flag is set.
    #[must_use]
    pub const fn is_tombstone(self) -> bool {
        self.0 & 0x01 != 0
    }
}

/// A record in a segment's data file.
///
/// ```text
/// | record_len (4) | flags (1) | id_len (2) | id | payload | crc32 (4) |
/// ```
///
/// `record_len` counts the whole record; the payload is the CBOR document,
/// empty for tombstones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRecord {
    /// Document identifier.
    pub id: DocumentId,
    /// Record flags.
    pub flags: SegmentRecordFlags,
    /// Encoded document, empty for tombstones.
    pub payload: Vec<u8>,
}

impl SegmentRecord {
    /// record_len (4) + flags (1) + id_len (2)
    const HEADER_SIZE: usize = 7;
    const CRC_SIZE: usize = 4;

    /// Creates a put record.
    #[must_use]
    pub fn put(id: DocumentId, payload: Vec<u8>) -> Self {
        Self {
            id,
            flags: SegmentRecordFlags::NONE,
            payload,
        }
    }

    /// Creates a tombstone record.
    #[must_use]
    pub fn tombstone(id: DocumentId) -> Self {
        Self {
            id,
            flags: SegmentRecordFlags::TOMBSTONE,
            payload: Vec::new(),
        }
    }

    /// Returns whether this is a tombstone.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.flags.is_tombstone()
    }

    /// Encodes the record to bytes.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidArgument`] if the id or payload does not
    /// fit the length fields.
    pub fn encode(&self) -> IndexResult<Vec<u8>> {
        let id = self.id.as_str().as_bytes();
        let id_len = u16::try_from(id.len())
            .map_err(|_| IndexError::invalid_argument(format!("document id too long: {}", self.id)))?;
        let record_len = Self::HEADER_SIZE + id.len() + self.payload.len() + Self::CRC_SIZE;
        let record_len_u32 = u32::try_from(record_len).map_err(|_| {
            IndexError::invalid_argument(format!("document {} too large", self.id))
        })?;

        let mut buf = Vec::with_capacity(record_len);
        buf.extend_from_slice(&record_len_u32.to_le_bytes());
        buf.push(self.flags.as_byte());
        buf.extend_from_slice(&id_len.to_le_bytes());
        buf.extend_from_slice(id);
        buf.extend_from_slice(&self.payload);

        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    /// Decodes the record at the start of `data`.
    ///
    /// Returns the record and its encoded length, or `Ok(None)` if `data`
    /// ends before the record does.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::ChecksumMismatch`] for a complete record with a
    /// bad checksum and [`IndexError::Index`] for a malformed one.
    pub fn decode(data: &[u8]) -> IndexResult<Option<(Self, usize)>> {
        if data.len() < Self::HEADER_SIZE {
            return Ok(None);
        }
        let record_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        // Zero-filled tail left by a crash.
        if record_len == 0 {
            return Ok(None);
        }
        if record_len < Self::HEADER_SIZE + Self::CRC_SIZE {
            return Err(IndexError::index(format!("invalid record length {record_len}")));
        }
        if data.len() < record_len {
            return Ok(None);
        }

        let stored_crc = u32::from_le_bytes([
            data[record_len - 4],
            data[record_len - 3],
            data[record_len - 2],
            data[record_len - 1],
        ]);
        let computed_crc = compute_crc32(&data[..record_len - 4]);
        if stored_crc != computed_crc {
            return Err(IndexError::ChecksumMismatch {
                expected: stored_crc,
                actual: computed_crc,
            });
        }

        let flags = SegmentRecordFlags(data[4]);
        let id_len = u16::from_le_bytes([data[5], data[6]]) as usize;
        let id_end = Self::HEADER_SIZE + id_len;
        if id_end > record_len - Self::CRC_SIZE {
            return Err(IndexError::index("record id overruns record"));
        }
        let id = std::str::from_utf8(&data[Self::HEADER_SIZE..id_end])
            .map_err(|_| IndexError::index("record id is not UTF-8"))?;
        let payload = data[id_end..record_len - Self::CRC_SIZE].to_vec();

        Ok(Some((
            Self {
                id: DocumentId::from(id),
                flags,
                payload,
            },
            record_len,
        )))
    }
}

/// Decodes every complete record in a data file.
///
/// Returns `(offset, len, record)` triples and the length of the valid
/// prefix; a torn record at the tail is left out of both.
pub fn scan_records(data: &[u8]) -> IndexResult<(Vec<(u64, usize, SegmentRecord)>, u64)> {
    let mut records = Vec::new();
    let mut offset = 0usize;
    while offset < data.len() {
        match SegmentRecord::decode(&data[offset..])? {
            Some((record, len)) => {
                records.push((offset as u64, len, record));
                offset += len;
            }
            None => break,
        }
    }
    Ok((records, offset as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_and_tombstone_decode() {
        let put = SegmentRecord::put(DocumentId::from("doc-1"), vec![1, 2, 3]);
        let tomb = SegmentRecord::tombstone(DocumentId::from("doc-1"));

        let mut data = put.encode().unwrap();
        let first_len = data.len();
        let tomb_bytes = tomb.encode().unwrap();
        data.extend(&tomb_bytes);

        let (records, valid) = scan_records(&data).unwrap();
        assert_eq!(valid, data.len() as u64);
        assert_eq!(records[0], (0, first_len, put));
        assert_eq!(records[1], (first_len as u64, tomb_bytes.len(), tomb));
        assert!(records[1].2.is_tombstone());
    }

    #[test]
    fn torn_tail_is_excluded() {
        let a = SegmentRecord::put(DocumentId::from("a"), vec![9; 20]).encode().unwrap();
        let b = SegmentRecord::put(DocumentId::from("b"), vec![7; 20]).encode().unwrap();
        let mut data = a.clone();
        data.extend_from_slice(&b[..b.len() - 5]);

        let (records, valid) = scan_records(&data).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(valid, a.len() as u64);
    }

    #[test]
    fn corrupted_payload_is_detected() {
        let mut data = SegmentRecord::put(DocumentId::from("a"), vec![1; 8]).encode().unwrap();
        data[9] ^= 0x01;
        assert!(matches!(
            SegmentRecord::decode(&data),
            Err(IndexError::ChecksumMismatch { .. })
        ));
    }
}
