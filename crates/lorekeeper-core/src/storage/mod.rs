//! Document source abstraction for index hydration.
//!
//! The index owns no durable state. On startup the hosting process hands it
//! a [`DocumentSource`] and calls
//! [`KnowledgeIndex::hydrate_from`](crate::KnowledgeIndex::hydrate_from),
//! which loads every record and rebuilds in one shot. After that the source
//! is out of the loop: successful ingests and deletes are reported back to
//! the caller, and recording them durably is the caller's job.

use crate::index::types::{DocId, DocumentRecord};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors surfaced by a document source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The backing store could not be read
    #[error("Failed to load documents: {0}")]
    LoadFailed(String),
    /// A stored record could not be decoded
    #[error("Malformed document record: {0}")]
    Malformed(String),
}

/// A read-only provider of the full durable document set.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Loads every stored document record.
    async fn load_all(&self) -> Result<Vec<DocumentRecord>, SourceError>;
}

/// In-memory document source, used in tests and as the default backing for
/// short-lived processes.
#[derive(Debug, Default)]
pub struct InMemoryDocumentSource {
    records: RwLock<BTreeMap<DocId, DocumentRecord>>,
}

impl InMemoryDocumentSource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a source pre-populated with `records`.
    pub fn with_records(records: Vec<DocumentRecord>) -> Self {
        let source = Self::new();
        for record in records {
            source.put(record);
        }
        source
    }

    /// Inserts or replaces a record.
    pub fn put(&self, record: DocumentRecord) {
        self.records.write().insert(record.doc_id, record);
    }

    /// Removes a record, returning whether it existed.
    pub fn remove(&self, doc_id: DocId) -> bool {
        self.records.write().remove(&doc_id).is_some()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns `true` if no records are stored.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl DocumentSource for InMemoryDocumentSource {
    async fn load_all(&self) -> Result<Vec<DocumentRecord>, SourceError> {
        Ok(self.records.read().values().cloned().collect())
    }
}
