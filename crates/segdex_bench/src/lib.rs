//! Benchmark utilities.

use rand::distributions::Alphanumeric;
use rand::Rng;
use segdex_core::{Document, IndexTransaction};

/// Generate a random body of `size` alphanumeric characters.
pub fn random_body(size: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(size)
        .map(char::from)
        .collect()
}

/// Generate random payload bytes.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate `count` documents named `{prefix}-{n}`.
pub fn generate_documents(prefix: &str, count: usize, body_size: usize) -> Vec<Document> {
    (0..count)
        .map(|n| {
            Document::new(format!("{prefix}-{n}"))
                .with_field("title", format!("title {n}"))
                .with_field("body", random_body(body_size))
        })
        .collect()
}

/// Build a batch adding `documents`.
pub fn add_batch(documents: &[Document]) -> IndexTransaction {
    IndexTransaction::from_parts(documents.iter().cloned(), [], [])
        .unwrap_or_else(|_| IndexTransaction::new())
}
