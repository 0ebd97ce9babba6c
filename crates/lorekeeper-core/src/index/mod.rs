//! Knowledge index internals.
//!
//! Two leaf engines do the real work: [`VectorIndex`] scores documents
//! against queries with tf-idf cosine similarity, and [`ClusterEngine`]
//! groups documents by Jaccard similarity over their concept sets. Neither
//! is thread-safe on its own; [`KnowledgeIndex`] is the single mutation
//! gateway that coordinates both behind a reader/writer lock.

pub mod cluster;
pub mod engine;
pub mod tokenizer;
pub mod types;
pub mod vector;

pub use cluster::ClusterEngine;
pub use engine::KnowledgeIndex;
pub use types::{
    Cluster, ClusterId, Concept, DocId, DocumentRecord, IndexError, IndexStats, IngestStage,
    SearchHit, SkillLevel,
};
pub use vector::VectorIndex;
