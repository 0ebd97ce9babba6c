//! Corpus file loading.
//!
//! A corpus is a JSON array of entries, the same shape the extraction
//! pipeline writes out:
//!
//! ```json
//! [
//!   {
//!     "id": 1,
//!     "content": "Docker keeps container builds reproducible",
//!     "concepts": ["docker", "containers"],
//!     "skill_level": "beginner"
//!   }
//! ]
//! ```
//!
//! `skill_level` defaults to `"beginner"` when omitted.

use anyhow::{Context, Result};
use lorekeeper_core::index::{Concept, DocId, DocumentRecord, SkillLevel};
use lorekeeper_core::storage::InMemoryDocumentSource;
use lorekeeper_core::KnowledgeIndex;
use serde::Deserialize;
use std::path::Path;

/// One corpus entry as written by the extraction pipeline.
#[derive(Debug, Deserialize)]
struct CorpusEntry {
    id: u64,
    content: String,
    #[serde(default)]
    concepts: Vec<String>,
    #[serde(default)]
    skill_level: Option<SkillLevel>,
}

impl CorpusEntry {
    fn into_record(self) -> DocumentRecord {
        DocumentRecord {
            doc_id: DocId::from_u64(self.id),
            content: self.content,
            concepts: self.concepts.iter().map(|name| Concept::named(name)).collect(),
            skill_level: self.skill_level.unwrap_or(SkillLevel::Beginner),
            cluster_id: None,
            created_at: 0,
        }
    }
}

/// Reads a corpus file and hydrates the index from it. Returns the number
/// of documents indexed.
pub async fn load_into(index: &KnowledgeIndex, path: &Path) -> Result<usize> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read corpus file: {}", path.display()))?;
    let entries: Vec<CorpusEntry> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse corpus file: {}", path.display()))?;

    let records = entries.into_iter().map(CorpusEntry::into_record).collect();
    let source = InMemoryDocumentSource::with_records(records);
    let loaded = index
        .hydrate_from(&source)
        .await
        .context("Failed to build the index from the corpus")?;
    Ok(loaded)
}
