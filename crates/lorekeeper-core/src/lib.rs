//! # Lorekeeper Core
//!
//! In-memory search and clustering core for the Lorekeeper knowledge base.
//!
//! This crate owns the two structures that power "find what I know" and
//! "group what I know": a tf-idf term-vector index with ranked cosine
//! similarity search, and a concept-set clustering engine that groups
//! documents by Jaccard similarity over their extracted concepts. Both are
//! coordinated by a single mutation gateway so readers never observe a
//! document present in one structure but not the other.
//!
//! ## Modules
//!
//! - [`index`] - Vector index, cluster engine, and the [`KnowledgeIndex`]
//!   coordinator
//! - [`storage`] - Hydration seam toward the external persistence layer
//! - [`config`] - Production configuration constants
//!
//! ## Usage
//!
//! ```
//! use lorekeeper_core::index::{Concept, DocId, KnowledgeIndex, SkillLevel};
//!
//! let index = KnowledgeIndex::new();
//! let cluster_id = index.ingest(
//!     DocId::from_u64(1),
//!     "Docker keeps container builds reproducible",
//!     vec![Concept::named("docker"), Concept::named("containers")],
//!     SkillLevel::Beginner,
//! )?;
//!
//! let hits = index.search("docker", 10);
//! assert_eq!(hits[0].doc_id, DocId::from_u64(1));
//! assert_eq!(hits[0].cluster_id, Some(cluster_id));
//! # Ok::<(), lorekeeper_core::index::IndexError>(())
//! ```
//!
//! Upstream concerns (concept extraction, file ingestion, HTTP, durable
//! persistence) live outside this crate; the core only defines the
//! [`storage::DocumentSource`] interface they plug into.

pub mod config;
pub mod index;
pub mod storage;

pub use index::KnowledgeIndex;
