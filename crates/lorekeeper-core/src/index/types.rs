use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Returns the current Unix timestamp (seconds since UNIX_EPOCH).
///
/// Uses `instant::SystemTime` which provides cross-platform timing.
/// If the system time is before UNIX_EPOCH (extremely unlikely),
/// returns 0 instead of panicking.
pub fn get_current_timestamp() -> u64 {
    instant::SystemTime::now()
        .duration_since(instant::SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Unique document identifier.
///
/// Assigned by the caller (the ingestion pipeline owns ID allocation) and
/// never reused. Re-ingesting an existing ID replaces the document.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct DocId(u64);

impl DocId {
    /// Creates a DocId from a raw u64 value.
    pub fn from_u64(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw u64 value of this ID.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Unique cluster identifier.
///
/// Assigned by the cluster engine when a document founds a new cluster.
/// Opaque to callers; ordering is only used for deterministic tie-breaks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ClusterId(u64);

impl ClusterId {
    /// Creates a ClusterId from a raw u64 value.
    pub fn from_u64(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw u64 value of this ID.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Skill level of a document, as judged by the upstream concept extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillLevel {
    Beginner,
    Intermediate,
    Advanced,
}

/// A single concept extracted from a document.
///
/// Produced upstream by the concept extractor before `ingest` is called.
/// The core compares documents by concept *name* only; `category` and
/// `confidence` are carried for the persistence layer but never interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    /// Concept name (the clustering key)
    pub name: String,
    /// Broad category assigned by the extractor (e.g. "tool", "language")
    pub category: String,
    /// Extractor confidence in `[0.0, 1.0]`
    pub confidence: f32,
}

impl Concept {
    /// Creates a concept with the given name and default category/confidence.
    ///
    /// Convenient for tests and examples where only the name matters.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            category: "general".to_string(),
            confidence: 1.0,
        }
    }
}

/// An indexed document as the core owns it.
///
/// `content` is immutable once indexed; re-ingestion with the same `doc_id`
/// replaces the whole record. If `cluster_id` is set, the referenced
/// cluster's member set contains `doc_id` and vice versa; the coordinator
/// maintains this bidirectional invariant across every mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Unique document identifier (caller-assigned)
    pub doc_id: DocId,
    /// Raw text content the term vector is derived from
    pub content: String,
    /// Concepts extracted upstream, in extractor order
    pub concepts: Vec<Concept>,
    /// Skill level judged by the extractor
    pub skill_level: SkillLevel,
    /// Owning cluster, if assignment has completed
    pub cluster_id: Option<ClusterId>,
    /// Unix timestamp when the document was first indexed
    pub created_at: u64,
}

/// A document cluster and its evolving signature.
///
/// Created implicitly by the first document that fails to match any existing
/// cluster at the similarity threshold, and deleted as soon as its member
/// set becomes empty; an empty cluster never persists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    /// Opaque cluster identifier
    pub cluster_id: ClusterId,
    /// Display name derived from the founding signature (never user input)
    pub name: String,
    /// Signature: top-N most frequent concept names across members
    pub primary_concepts: Vec<String>,
    /// Skill level of the founding document (pinned, not recomputed)
    pub skill_level: SkillLevel,
    /// Member documents
    pub members: BTreeSet<DocId>,
}

impl Cluster {
    /// Number of member documents. Always equals `members.len()`.
    pub fn doc_count(&self) -> usize {
        self.members.len()
    }
}

/// A ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    /// Matching document
    pub doc_id: DocId,
    /// Cosine similarity against the query vector, in `(0.0, 1.0]`
    pub score: f32,
    /// The document's owning cluster
    pub cluster_id: Option<ClusterId>,
    /// The document's skill level
    pub skill_level: SkillLevel,
}

/// Snapshot of index size metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    /// Number of indexed documents
    pub document_count: usize,
    /// Number of distinct terms in the corpus frequency table
    pub term_count: usize,
    /// Number of live clusters
    pub cluster_count: usize,
}

/// The two structures an `ingest` must update as one logical unit.
///
/// Used by [`IndexError::PartialFailure`] to report exactly which stage
/// succeeded, so callers can retry safely (re-ingest is always a full
/// replace, never a duplicate-append).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    /// Term-vector index update
    VectorIndex,
    /// Cluster assignment
    ClusterEngine,
}

impl std::fmt::Display for IngestStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestStage::VectorIndex => write!(f, "vector index"),
            IngestStage::ClusterEngine => write!(f, "cluster engine"),
        }
    }
}

/// Error types for index operations.
#[derive(Debug, Clone, Error)]
pub enum IndexError {
    /// Caller-supplied input was rejected before any state changed
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// An ingest applied to one structure but not the other
    #[error("Ingest partially applied: {failed} failed after {succeeded} succeeded: {reason}")]
    PartialFailure {
        /// Stage that completed before the failure
        succeeded: IngestStage,
        /// Stage that failed
        failed: IngestStage,
        /// Underlying failure description
        reason: String,
    },
    /// A document referenced a cluster that no longer exists
    #[error("Cluster {0:?} not found")]
    ClusterNotFound(ClusterId),
    /// An internal invariant was violated (triggers automatic rebuild)
    #[error("Index corruption detected: {0}")]
    Corruption(String),
    /// The external document source failed during hydration
    #[error("Storage error: {0}")]
    Storage(String),
}
