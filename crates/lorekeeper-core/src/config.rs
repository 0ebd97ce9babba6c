//! Production configuration constants.
//!
//! This module contains the constants that define the production behavior of
//! the Lorekeeper core. They are referenced throughout the codebase and in
//! benchmarks to keep tuning in one place.

// =============================================================================
// Tokenization
// =============================================================================

/// Minimum token length kept by the tokenizer.
///
/// Single-character fragments ("a", "x", stray digits) carry almost no
/// discriminative weight and inflate the vocabulary, so tokens shorter than
/// this are discarded before indexing.
pub const MIN_TOKEN_LEN: usize = 2;

// =============================================================================
// Clustering
// =============================================================================

/// Jaccard similarity threshold for joining an existing cluster.
///
/// A document joins the best-scoring cluster only when
/// `|A ∩ B| / |A ∪ B| >= SIMILARITY_THRESHOLD` against that cluster's
/// signature. Below the threshold the document founds a new cluster. The
/// comparison is inclusive, so a score of exactly 0.5 joins.
pub const SIMILARITY_THRESHOLD: f32 = 0.5;

/// Number of concept names kept in a cluster's signature.
///
/// A cluster's `primary_concepts` are the top-N most frequent concept names
/// across its members, maintained incrementally as membership changes.
pub const PRIMARY_CONCEPT_COUNT: usize = 5;

// =============================================================================
// Search
// =============================================================================

/// Default number of ranked results returned by search frontends.
pub const DEFAULT_TOP_K: usize = 10;
