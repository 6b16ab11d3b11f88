//! Indexed document records.
//!
//! A [`Document`] is the opaque unit the content layer hands to the index:
//! an id plus named fields, each holding one or more string values. The
//! manager never looks inside fields except to report field names.

use crate::error::{IndexError, IndexResult};
use crate::types::DocumentId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A document as stored in memory and persistent segments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    id: DocumentId,
    fields: BTreeMap<String, Vec<String>>,
}

impl Document {
    /// Creates a document with no fields.
    pub fn new(id: impl Into<DocumentId>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Adds a value to `field`.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_field(field, value);
        self
    }

    /// Adds a value to `field` in place.
    pub fn add_field(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields
            .entry(field.into())
            .or_default()
            .push(value.into());
    }

    /// Returns the document id.
    #[must_use]
    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    /// Returns the values of `field`.
    #[must_use]
    pub fn field(&self, field: &str) -> Option<&[String]> {
        self.fields.get(field).map(Vec::as_slice)
    }

    /// Iterates over field names.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Encodes the document as CBOR.
    pub fn encode(&self) -> IndexResult<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| IndexError::codec(format!("encode document {}: {e}", self.id)))?;
        Ok(buf)
    }

    /// Decodes a document from CBOR.
    pub fn decode(bytes: &[u8]) -> IndexResult<Self> {
        ciborium::from_reader(bytes).map_err(|e| IndexError::codec(format!("decode document: {e}")))
    }

    /// Returns the encoded size, used for segment byte accounting.
    pub fn encoded_size(&self) -> IndexResult<u64> {
        Ok(self.encode()?.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_accumulate_values() {
        let doc = Document::new("doc-1")
            .with_field("cmis:name", "report.pdf")
            .with_field("cmis:secondaryObjectTypeIds", "a")
            .with_field("cmis:secondaryObjectTypeIds", "b");

        assert_eq!(doc.field("cmis:name"), Some(&["report.pdf".to_string()][..]));
        assert_eq!(doc.field("cmis:secondaryObjectTypeIds").map(<[String]>::len), Some(2));
        assert_eq!(
            doc.field_names().collect::<Vec<_>>(),
            vec!["cmis:name", "cmis:secondaryObjectTypeIds"]
        );
    }

    #[test]
    fn cbor_encoding_is_lossless() {
        let doc = Document::new("doc-7").with_field("title", "Quarterly numbers");
        let bytes = doc.encode().unwrap();
        assert_eq!(Document::decode(&bytes).unwrap(), doc);
        assert_eq!(doc.encoded_size().unwrap(), bytes.len() as u64);
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert!(matches!(
            Document::decode(&[0xff, 0x00, 0x13]),
            Err(IndexError::Codec { .. })
        ));
    }
}
