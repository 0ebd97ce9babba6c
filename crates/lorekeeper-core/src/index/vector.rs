//! Tf-idf term-vector index with ranked cosine similarity search.
//!
//! # Weighting
//!
//! - term frequency: `tf(t, d) = count(t in d) / total_tokens(d)`
//! - inverse document frequency: `idf(t) = ln(total_docs / (1 + doc_freq(t)))`
//!   (add-one smoothing, never divides by zero)
//! - a document's vector is the raw `tf * idf` vector normalized to unit
//!   L2 norm, so cosine similarity reduces to a dot product
//!
//! # Incremental maintenance
//!
//! The index stores the idf-*independent* parts (per-document term counts
//! and the corpus document-frequency table) and derives weights from the
//! live frequency table whenever a vector is read or scored. Any sequence of
//! [`add_document`](VectorIndex::add_document) /
//! [`remove_document`](VectorIndex::remove_document) calls is therefore
//! observationally identical to a single [`rebuild`](VectorIndex::rebuild)
//! over the same final document set: vectors are a pure function of state
//! that both paths maintain identically.
//!
//! # Thread Safety
//!
//! This type is **not** thread-safe. The coordinator wraps it in a
//! reader/writer lock.

use super::tokenizer::term_counts;
use super::types::{DocId, IndexError};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, instrument};

/// Per-document term statistics.
///
/// A document with zero indexable tokens keeps an entry with an empty counts
/// map: an explicit empty vector, never an omitted one.
#[derive(Debug, Clone, Default)]
struct DocTerms {
    /// Occurrences per term, ordered so weight accumulation is
    /// bit-deterministic
    counts: BTreeMap<String, u32>,
    /// Total kept tokens (tf denominator)
    total: u32,
}

/// Sparse tf-idf index over the document corpus.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    /// Term statistics per indexed document
    documents: HashMap<DocId, DocTerms>,
    /// Corpus frequency table: term -> number of documents containing it
    doc_freq: HashMap<String, usize>,
}

impl VectorIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a fresh index from a document collection.
    ///
    /// Used for startup hydration and corruption recovery. This is also the
    /// correctness oracle for the incremental path: an index maintained by
    /// `add_document`/`remove_document` must be indistinguishable from one
    /// rebuilt over the equivalent final document set.
    pub fn rebuild<'a, I>(docs: I) -> Self
    where
        I: IntoIterator<Item = (DocId, &'a str)>,
    {
        let mut index = Self::new();
        for (doc_id, content) in docs {
            index.insert_terms(doc_id, content);
        }
        index
    }

    /// Adds a document, replacing any previous version of the same ID.
    ///
    /// If `doc_id` is already indexed its old term contributions are
    /// retracted from the frequency table first, so repeated identical calls
    /// leave the index unchanged (replace, never duplicate-accumulate).
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Corruption`] if retracting the old version finds
    /// the frequency table out of sync with the stored vector.
    #[instrument(skip_all, fields(doc_id = doc_id.as_u64(), content_len = content.len()))]
    pub fn add_document(&mut self, doc_id: DocId, content: &str) -> Result<(), IndexError> {
        if self.documents.contains_key(&doc_id) {
            self.retract_terms(doc_id)?;
        }
        self.insert_terms(doc_id, content);
        Ok(())
    }

    /// Removes a document and retracts its term contributions.
    ///
    /// Returns `Ok(false)` if the document was not indexed. Vocabulary
    /// cleanup is lazy only in the sense that a term whose frequency reaches
    /// zero is dropped from the table and simply stops contributing to
    /// scoring.
    #[instrument(skip_all, fields(doc_id = doc_id.as_u64()))]
    pub fn remove_document(&mut self, doc_id: DocId) -> Result<bool, IndexError> {
        if !self.documents.contains_key(&doc_id) {
            return Ok(false);
        }
        self.retract_terms(doc_id)?;
        Ok(true)
    }

    /// Returns the document's unit-normalized term vector.
    ///
    /// `None` if the document is not indexed. A document with zero indexable
    /// tokens (or whose every term currently weighs zero) yields an explicit
    /// empty map: it matches no query with nonzero score.
    pub fn term_vector(&self, doc_id: DocId) -> Option<HashMap<String, f32>> {
        let doc = self.documents.get(&doc_id)?;
        let mut weights: HashMap<String, f32> = HashMap::new();
        let mut norm_sq = 0.0f32;

        for (term, &count) in &doc.counts {
            let weight = self.raw_weight(count, doc.total, term);
            norm_sq += weight * weight;
            weights.insert(term.clone(), weight);
        }

        let norm = norm_sq.sqrt();
        if norm <= 0.0 {
            return Some(HashMap::new());
        }
        for weight in weights.values_mut() {
            *weight /= norm;
        }
        weights.retain(|_, w| *w != 0.0);
        Some(weights)
    }

    /// Ranked similarity search over documents passing `filter`.
    ///
    /// The query is tokenized and weighted exactly like a document, using
    /// the current idf table, then scored by dot product against every
    /// candidate's unit vector. Results are the top `top_k` by score
    /// descending, ties broken by ascending `doc_id`; candidates with no
    /// positive similarity are never returned. An empty query (or one whose
    /// every token is discarded) returns an empty list, never an error.
    pub fn search<F>(&self, query: &str, top_k: usize, filter: F) -> Vec<(DocId, f32)>
    where
        F: Fn(DocId) -> bool,
    {
        if top_k == 0 {
            return Vec::new();
        }

        let Some(query_weights) = self.query_vector(query) else {
            return Vec::new();
        };

        let mut scored: Vec<(DocId, f32)> = Vec::new();
        for (&doc_id, doc) in &self.documents {
            if doc.total == 0 || !filter(doc_id) {
                continue;
            }

            // Single pass over the document's terms accumulates both the
            // vector norm and the dot product with the query.
            let mut norm_sq = 0.0f32;
            let mut dot = 0.0f32;
            for (term, &count) in &doc.counts {
                let weight = self.raw_weight(count, doc.total, term);
                norm_sq += weight * weight;
                if let Some(query_weight) = query_weights.get(term) {
                    dot += weight * query_weight;
                }
            }

            let norm = norm_sq.sqrt();
            if norm <= 0.0 {
                continue;
            }
            let score = dot / norm;
            if score > 0.0 {
                scored.push((doc_id, score));
            }
        }

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(top_k);
        scored
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Returns `true` if no documents are indexed.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Returns `true` if the document is indexed.
    pub fn contains(&self, doc_id: DocId) -> bool {
        self.documents.contains_key(&doc_id)
    }

    /// Number of distinct terms in the corpus frequency table.
    pub fn term_count(&self) -> usize {
        self.doc_freq.len()
    }

    /// Number of documents containing `term` (0 if absent).
    pub fn doc_freq(&self, term: &str) -> usize {
        self.doc_freq.get(term).copied().unwrap_or(0)
    }

    /// Verifies internal invariants.
    ///
    /// Checks that every stored term appears in the frequency table and that
    /// each table entry equals the true document count. Used by the
    /// coordinator's defensive corruption detection.
    pub fn verify(&self) -> Result<(), IndexError> {
        let mut recount: HashMap<&str, usize> = HashMap::new();
        for (doc_id, doc) in &self.documents {
            for term in doc.counts.keys() {
                if !self.doc_freq.contains_key(term) {
                    return Err(IndexError::Corruption(format!(
                        "document {} references term {:?} absent from the frequency table",
                        doc_id.as_u64(),
                        term
                    )));
                }
                *recount.entry(term.as_str()).or_insert(0) += 1;
            }
        }
        for (term, &count) in &self.doc_freq {
            if recount.get(term.as_str()).copied().unwrap_or(0) != count {
                return Err(IndexError::Corruption(format!(
                    "frequency table entry {:?} = {} does not match true count",
                    term, count
                )));
            }
        }
        Ok(())
    }

    /// Inverse document frequency with add-one smoothing.
    fn idf(&self, term: &str) -> f32 {
        let total_docs = self.documents.len();
        if total_docs == 0 {
            return 0.0;
        }
        let df = self.doc_freq(term);
        ((total_docs as f32) / ((1 + df) as f32)).ln()
    }

    /// Raw (unnormalized) tf-idf weight for one term of one document.
    fn raw_weight(&self, count: u32, total: u32, term: &str) -> f32 {
        if total == 0 {
            return 0.0;
        }
        let tf = count as f32 / total as f32;
        tf * self.idf(term)
    }

    /// Tokenizes and weights a query into a unit vector.
    ///
    /// Returns `None` when the query yields no tokens or only zero weights.
    fn query_vector(&self, query: &str) -> Option<BTreeMap<String, f32>> {
        let (counts, total) = term_counts(query);
        if total == 0 {
            return None;
        }

        let mut weights: BTreeMap<String, f32> = BTreeMap::new();
        let mut norm_sq = 0.0f32;
        for (term, count) in counts {
            let weight = self.raw_weight(count, total, &term);
            norm_sq += weight * weight;
            weights.insert(term, weight);
        }

        let norm = norm_sq.sqrt();
        if norm <= 0.0 {
            debug!("query carries no weight against the current corpus");
            return None;
        }
        for weight in weights.values_mut() {
            *weight /= norm;
        }
        Some(weights)
    }

    /// Indexes the document's terms and bumps the frequency table.
    fn insert_terms(&mut self, doc_id: DocId, content: &str) {
        let (counts, total) = term_counts(content);
        for term in counts.keys() {
            *self.doc_freq.entry(term.clone()).or_insert(0) += 1;
        }
        self.documents.insert(doc_id, DocTerms { counts, total });
    }

    /// Retracts the document's term contributions from the frequency table.
    fn retract_terms(&mut self, doc_id: DocId) -> Result<(), IndexError> {
        let Some(doc) = self.documents.remove(&doc_id) else {
            return Ok(());
        };
        for term in doc.counts.keys() {
            match self.doc_freq.get_mut(term) {
                Some(count) if *count > 1 => *count -= 1,
                Some(_) => {
                    self.doc_freq.remove(term);
                }
                None => {
                    return Err(IndexError::Corruption(format!(
                        "retracting document {} found term {:?} missing from the frequency table",
                        doc_id.as_u64(),
                        term
                    )));
                }
            }
        }
        Ok(())
    }
}
