//! Index coordinator: the single mutation gateway over the vector index
//! and the cluster engine.
//!
//! Every `ingest`/`delete`/`rebuild` updates both structures as one logical
//! unit inside a writer critical section, so readers never observe a
//! document present in one structure but absent from the other. Searches
//! take the read side of the lock and run concurrently with each other.
//!
//! Rebuilds are built off to the side with no lock held and swapped in
//! atomically; when rebuilds race, the newest request wins and stale
//! in-progress results are discarded.

use super::cluster::ClusterEngine;
use super::types::{
    get_current_timestamp, Cluster, ClusterId, Concept, DocId, DocumentRecord, IndexError,
    IndexStats, IngestStage, SearchHit, SkillLevel,
};
use super::vector::VectorIndex;
use crate::storage::DocumentSource;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, instrument, warn};

/// Everything a reader needs, owned as one unit so a rebuild can replace
/// it with a single swap.
#[derive(Debug, Clone, Default)]
struct IndexState {
    vectors: VectorIndex,
    clusters: ClusterEngine,
    /// Document records, also the last known-good set for corruption
    /// recovery
    documents: BTreeMap<DocId, DocumentRecord>,
}

impl IndexState {
    /// Builds a complete state from a document collection.
    ///
    /// Documents are applied in ascending `doc_id` order so the greedy
    /// cluster arrangement is deterministic for a given set. Later
    /// duplicates of the same `doc_id` replace earlier ones before any
    /// indexing happens.
    fn rebuild<I>(records: I) -> Result<Self, IndexError>
    where
        I: IntoIterator<Item = DocumentRecord>,
    {
        let mut pending: BTreeMap<DocId, DocumentRecord> = BTreeMap::new();
        for record in records {
            pending.insert(record.doc_id, record);
        }

        let mut state = Self::default();
        for (doc_id, mut record) in pending {
            if record.content.trim().is_empty() {
                return Err(IndexError::InvalidInput(format!(
                    "document {} has empty content",
                    doc_id.as_u64()
                )));
            }
            state.vectors.add_document(doc_id, &record.content)?;
            let names = concept_names(&record.concepts);
            let cluster_id = state.clusters.assign(doc_id, &names, record.skill_level)?;
            record.cluster_id = Some(cluster_id);
            state.documents.insert(doc_id, record);
        }
        Ok(state)
    }

    /// Cross-structure invariant check.
    fn check(&self) -> Result<(), IndexError> {
        self.vectors.verify()?;
        self.clusters.verify()?;
        if self.vectors.len() != self.documents.len() {
            return Err(IndexError::Corruption(format!(
                "vector index holds {} documents but {} records exist",
                self.vectors.len(),
                self.documents.len()
            )));
        }
        for (doc_id, record) in &self.documents {
            if !self.vectors.contains(*doc_id) {
                return Err(IndexError::Corruption(format!(
                    "document {} has a record but no term vector",
                    doc_id.as_u64()
                )));
            }
            if record.cluster_id != self.clusters.membership(*doc_id) {
                return Err(IndexError::Corruption(format!(
                    "document {} record and cluster membership disagree",
                    doc_id.as_u64()
                )));
            }
        }
        Ok(())
    }
}

/// The knowledge index: tf-idf search plus concept clustering behind a
/// single mutation gateway.
///
/// All methods take `&self`; interior locking provides the single-writer /
/// multi-reader discipline, so the index can be shared behind an `Arc`
/// across threads or async tasks.
#[derive(Debug, Default)]
pub struct KnowledgeIndex {
    state: RwLock<IndexState>,
    /// Monotonic ticket for last-writer-wins rebuild arbitration
    rebuild_ticket: AtomicU64,
}

impl KnowledgeIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingests a document: indexes its content and assigns it to a cluster,
    /// returning the cluster it landed in.
    ///
    /// Re-ingesting an existing `doc_id` is a full replace: the old term
    /// contributions and the old cluster membership are retracted before the
    /// new ones are applied, so repeated identical calls leave the index in
    /// the same state as one call.
    ///
    /// # Errors
    ///
    /// - [`IndexError::InvalidInput`] if `content` is empty or whitespace.
    /// - [`IndexError::PartialFailure`] if the vector update succeeded but
    ///   cluster assignment failed. The vector write is unwound first so
    ///   readers stay consistent, and retrying the ingest is safe.
    ///
    /// Internal corruption detected along the way triggers an automatic
    /// rebuild from the current document records instead of surfacing.
    #[instrument(skip_all, fields(doc_id = doc_id.as_u64(), concepts = concepts.len()))]
    pub fn ingest(
        &self,
        doc_id: DocId,
        content: &str,
        concepts: Vec<Concept>,
        skill_level: SkillLevel,
    ) -> Result<ClusterId, IndexError> {
        if content.trim().is_empty() {
            return Err(IndexError::InvalidInput(
                "cannot index a document with empty content".to_string(),
            ));
        }

        let mut state = self.state.write();
        let created_at = state
            .documents
            .get(&doc_id)
            .map(|record| record.created_at)
            .unwrap_or_else(get_current_timestamp);
        let record = DocumentRecord {
            doc_id,
            content: content.to_string(),
            concepts,
            skill_level,
            cluster_id: None,
            created_at,
        };

        match Self::apply_ingest(&mut state, &record) {
            Ok(cluster_id) => {
                info!(cluster_id = cluster_id.as_u64(), "document ingested");
                Ok(cluster_id)
            }
            Err(IndexError::Corruption(reason)) => {
                Self::repair_locked(&mut state, &reason)?;
                Self::apply_ingest(&mut state, &record)
            }
            Err(err) => Err(err),
        }
    }

    /// Deletes a document from both structures.
    ///
    /// Returns `Ok(false)` if the document was not indexed; deleting an
    /// unknown ID is a no-op, not an error. The owning cluster loses the
    /// member and is reaped if it becomes empty.
    #[instrument(skip_all, fields(doc_id = doc_id.as_u64()))]
    pub fn delete(&self, doc_id: DocId) -> Result<bool, IndexError> {
        let mut state = self.state.write();
        if !state.documents.contains_key(&doc_id) {
            return Ok(false);
        }

        match Self::apply_delete(&mut state, doc_id) {
            Ok(()) => {
                info!("document deleted");
                Ok(true)
            }
            Err(IndexError::Corruption(reason)) => {
                Self::repair_locked(&mut state, &reason)?;
                if state.documents.contains_key(&doc_id) {
                    Self::apply_delete(&mut state, doc_id)?;
                }
                Ok(true)
            }
            Err(err) => Err(err),
        }
    }

    /// Ranked similarity search over the whole corpus.
    ///
    /// An empty or fully-discarded query returns an empty list, never an
    /// error.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<SearchHit> {
        self.search_filtered(query, top_k, |_| true)
    }

    /// Ranked similarity search restricted to records passing `filter`.
    ///
    /// Filtering happens before ranking: `top_k` bounds the post-filter
    /// result set. A hit whose record references a missing cluster is healed
    /// by re-running assignment for that document rather than surfacing an
    /// error to the search path.
    #[instrument(skip_all, fields(top_k))]
    pub fn search_filtered<F>(&self, query: &str, top_k: usize, filter: F) -> Vec<SearchHit>
    where
        F: Fn(&DocumentRecord) -> bool,
    {
        let dangling = {
            let state = self.state.read();
            let (hits, dangling) = Self::collect_hits(&state, query, top_k, &filter);
            if dangling.is_empty() {
                return hits;
            }
            dangling
        };

        {
            let mut state = self.state.write();
            for doc_id in dangling {
                warn!(
                    doc_id = doc_id.as_u64(),
                    "healing document with missing cluster"
                );
                if let Err(err) = Self::heal_membership(&mut state, doc_id) {
                    if let Err(err) = Self::repair_locked(&mut state, &err.to_string()) {
                        warn!(error = %err, "repair failed during search healing");
                    }
                    break;
                }
            }
        }

        let state = self.state.read();
        Self::collect_hits(&state, query, top_k, &filter).0
    }

    /// Rebuilds the index from a fresh document collection, replacing all
    /// current state. Returns the number of documents indexed.
    ///
    /// The new state is built with no lock held, so in-flight searches keep
    /// running against the old index; the swap itself is a brief exclusive
    /// section. If another rebuild starts while this one is in progress the
    /// newer request wins and this result is discarded.
    #[instrument(skip_all)]
    pub fn rebuild(&self, records: Vec<DocumentRecord>) -> Result<usize, IndexError> {
        let ticket = self.rebuild_ticket.fetch_add(1, Ordering::SeqCst) + 1;
        let fresh = IndexState::rebuild(records)?;
        let count = fresh.documents.len();

        let mut state = self.state.write();
        if self.rebuild_ticket.load(Ordering::SeqCst) == ticket {
            *state = fresh;
            info!(documents = count, "index rebuilt");
        } else {
            debug!("rebuild superseded by a newer request, discarding result");
        }
        Ok(count)
    }

    /// Hydrates the index from an external document source, replacing all
    /// current state. Returns the number of documents indexed.
    pub async fn hydrate_from<S>(&self, source: &S) -> Result<usize, IndexError>
    where
        S: DocumentSource + ?Sized,
    {
        let records = source
            .load_all()
            .await
            .map_err(|err| IndexError::Storage(err.to_string()))?;
        self.rebuild(records)
    }

    /// Checks every cross-structure invariant, rebuilding from the current
    /// document records if any is violated. Returns `true` if a repair was
    /// performed.
    pub fn verify(&self) -> Result<bool, IndexError> {
        {
            let state = self.state.read();
            if state.check().is_ok() {
                return Ok(false);
            }
        }

        let mut state = self.state.write();
        match state.check() {
            Ok(()) => Ok(false),
            Err(err) => {
                Self::repair_locked(&mut state, &err.to_string())?;
                Ok(true)
            }
        }
    }

    /// Drops every document and cluster.
    pub fn clear(&self) {
        let mut state = self.state.write();
        *state = IndexState::default();
        info!("index cleared");
    }

    /// Current corpus counters.
    pub fn stats(&self) -> IndexStats {
        let state = self.state.read();
        IndexStats {
            document_count: state.documents.len(),
            term_count: state.vectors.term_count(),
            cluster_count: state.clusters.len(),
        }
    }

    /// Looks up a document record by ID.
    pub fn document(&self, doc_id: DocId) -> Option<DocumentRecord> {
        self.state.read().documents.get(&doc_id).cloned()
    }

    /// All document records in ascending ID order.
    pub fn documents(&self) -> Vec<DocumentRecord> {
        self.state.read().documents.values().cloned().collect()
    }

    /// Looks up a cluster by ID.
    pub fn cluster(&self, cluster_id: ClusterId) -> Option<Cluster> {
        self.state.read().clusters.cluster(cluster_id).cloned()
    }

    /// All live clusters in ascending ID order.
    pub fn clusters(&self) -> Vec<Cluster> {
        self.state.read().clusters.clusters().cloned().collect()
    }

    /// The single ingest sequence: retract any previous version, index the
    /// content, then assign a cluster. Runs entirely inside the caller's
    /// writer critical section.
    fn apply_ingest(
        state: &mut IndexState,
        record: &DocumentRecord,
    ) -> Result<ClusterId, IndexError> {
        let doc_id = record.doc_id;
        if state.documents.contains_key(&doc_id) {
            state.clusters.remove(doc_id)?;
        }

        state.vectors.add_document(doc_id, &record.content)?;

        let names = concept_names(&record.concepts);
        match state.clusters.assign(doc_id, &names, record.skill_level) {
            Ok(cluster_id) => {
                let mut stored = record.clone();
                stored.cluster_id = Some(cluster_id);
                state.documents.insert(doc_id, stored);
                Ok(cluster_id)
            }
            Err(err) => {
                // Unwind the vector write so readers never see a document
                // present in one structure but not the other.
                if let Err(unwind) = state.vectors.remove_document(doc_id) {
                    warn!(error = %unwind, "failed to unwind vector write");
                }
                state.documents.remove(&doc_id);
                Err(IndexError::PartialFailure {
                    succeeded: IngestStage::VectorIndex,
                    failed: IngestStage::ClusterEngine,
                    reason: err.to_string(),
                })
            }
        }
    }

    fn apply_delete(state: &mut IndexState, doc_id: DocId) -> Result<(), IndexError> {
        state.clusters.remove(doc_id)?;
        state.vectors.remove_document(doc_id)?;
        state.documents.remove(&doc_id);
        Ok(())
    }

    /// Scores the query and maps results to hits, reporting any document
    /// whose record references a missing cluster.
    fn collect_hits<F>(
        state: &IndexState,
        query: &str,
        top_k: usize,
        filter: &F,
    ) -> (Vec<SearchHit>, Vec<DocId>)
    where
        F: Fn(&DocumentRecord) -> bool,
    {
        let scored = state.vectors.search(query, top_k, |doc_id| {
            state.documents.get(&doc_id).map(filter).unwrap_or(false)
        });

        let mut hits = Vec::with_capacity(scored.len());
        let mut dangling = Vec::new();
        for (doc_id, score) in scored {
            let Some(record) = state.documents.get(&doc_id) else {
                continue;
            };
            if let Some(cluster_id) = record.cluster_id {
                if state.clusters.cluster(cluster_id).is_none() {
                    dangling.push(doc_id);
                }
            }
            hits.push(SearchHit {
                doc_id,
                score,
                cluster_id: record.cluster_id,
                skill_level: record.skill_level,
            });
        }
        (hits, dangling)
    }

    /// Re-runs cluster assignment for a document whose recorded cluster no
    /// longer exists.
    fn heal_membership(state: &mut IndexState, doc_id: DocId) -> Result<(), IndexError> {
        let (names, skill_level) = match state.documents.get(&doc_id) {
            Some(record) => (concept_names(&record.concepts), record.skill_level),
            None => return Ok(()),
        };

        match state.clusters.remove(doc_id) {
            // The membership entry itself may point at the missing cluster;
            // either way the document is detached now.
            Ok(_) | Err(IndexError::ClusterNotFound(_)) => {}
            Err(err) => return Err(err),
        }

        let cluster_id = state.clusters.assign(doc_id, &names, skill_level)?;
        if let Some(record) = state.documents.get_mut(&doc_id) {
            record.cluster_id = Some(cluster_id);
        }
        Ok(())
    }

    /// Rebuilds in place from the current document records. Called inside
    /// the writer critical section when corruption is detected, so readers
    /// only ever see the state before or after the repair.
    fn repair_locked(state: &mut IndexState, reason: &str) -> Result<(), IndexError> {
        warn!(reason, "index corruption detected, rebuilding from document records");
        let records: Vec<DocumentRecord> = state.documents.values().cloned().collect();
        *state = IndexState::rebuild(records)?;
        Ok(())
    }
}

fn concept_names(concepts: &[Concept]) -> Vec<String> {
    concepts.iter().map(|concept| concept.name.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::super::types::Concept;
    use super::*;

    fn doc(id: u64) -> DocId {
        DocId::from_u64(id)
    }

    fn concepts(names: &[&str]) -> Vec<Concept> {
        names.iter().map(|name| Concept::named(name)).collect()
    }

    fn seeded_index() -> KnowledgeIndex {
        let index = KnowledgeIndex::new();
        index
            .ingest(
                doc(1),
                "Shipping containers with layered images for reproducible builds",
                concepts(&["docker", "containers", "images"]),
                SkillLevel::Beginner,
            )
            .unwrap();
        index
            .ingest(
                doc(2),
                "Docker compose orchestrates multi service development stacks",
                concepts(&["docker", "containers", "compose"]),
                SkillLevel::Beginner,
            )
            .unwrap();
        index
            .ingest(
                doc(3),
                "Building a flask api in python with blueprints",
                concepts(&["flask", "python", "api"]),
                SkillLevel::Intermediate,
            )
            .unwrap();
        index
    }

    #[test]
    fn test_ingest_clusters_similar_documents() {
        let index = seeded_index();
        let first = index.document(doc(1)).unwrap().cluster_id;
        let second = index.document(doc(2)).unwrap().cluster_id;
        let third = index.document(doc(3)).unwrap().cluster_id;

        assert_eq!(first, second);
        assert_ne!(first, third);

        let clusters = index.clusters();
        assert_eq!(clusters.len(), 2);
        let mut sizes: Vec<usize> = clusters.iter().map(Cluster::doc_count).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![1, 2]);
    }

    #[test]
    fn test_empty_content_is_rejected() {
        let index = KnowledgeIndex::new();
        for content in ["", "   ", "\n\t"] {
            let err = index
                .ingest(doc(1), content, concepts(&["any"]), SkillLevel::Beginner)
                .unwrap_err();
            assert!(matches!(err, IndexError::InvalidInput(_)));
        }
        assert_eq!(index.stats().document_count, 0);
    }

    #[test]
    fn test_reingest_is_a_full_replace() {
        let index = seeded_index();
        let before = index.stats();

        // Same doc, completely different topic: old terms and membership
        // must be retracted, not accumulated.
        index
            .ingest(
                doc(1),
                "Sourdough starter feeding schedules and hydration",
                concepts(&["sourdough", "baking"]),
                SkillLevel::Advanced,
            )
            .unwrap();

        assert_eq!(index.stats().document_count, before.document_count);
        assert!(index.search("containers", 10).iter().all(|hit| hit.doc_id != doc(1)));
        assert!(index
            .search("sourdough", 10)
            .iter()
            .any(|hit| hit.doc_id == doc(1)));

        let record = index.document(doc(1)).unwrap();
        assert_ne!(record.cluster_id, index.document(doc(2)).unwrap().cluster_id);
    }

    #[test]
    fn test_reingest_preserves_created_at() {
        let index = seeded_index();
        let original = index.document(doc(1)).unwrap().created_at;
        index
            .ingest(
                doc(1),
                "Replacement content for the same document",
                concepts(&["docker"]),
                SkillLevel::Beginner,
            )
            .unwrap();
        assert_eq!(index.document(doc(1)).unwrap().created_at, original);
    }

    #[test]
    fn test_delete_removes_from_both_structures() {
        let index = seeded_index();
        let cluster_id = index.document(doc(3)).unwrap().cluster_id.unwrap();

        assert!(index.delete(doc(3)).unwrap());
        assert!(index.document(doc(3)).is_none());
        assert!(index.search("flask python", 10).is_empty());
        // Doc 3 was a singleton, so its cluster is reaped.
        assert!(index.cluster(cluster_id).is_none());
    }

    #[test]
    fn test_delete_unknown_id_is_a_noop() {
        let index = seeded_index();
        assert!(!index.delete(doc(99)).unwrap());
        assert_eq!(index.stats().document_count, 3);
    }

    #[test]
    fn test_delete_decrements_cluster_size() {
        let index = seeded_index();
        let cluster_id = index.document(doc(1)).unwrap().cluster_id.unwrap();
        assert_eq!(index.cluster(cluster_id).unwrap().doc_count(), 2);

        index.delete(doc(2)).unwrap();
        assert_eq!(index.cluster(cluster_id).unwrap().doc_count(), 1);
    }

    #[test]
    fn test_search_returns_enriched_hits() {
        let index = seeded_index();
        let hits = index.search("docker", 10);
        assert!(!hits.is_empty());
        for hit in &hits {
            let record = index.document(hit.doc_id).unwrap();
            assert_eq!(hit.cluster_id, record.cluster_id);
            assert_eq!(hit.skill_level, record.skill_level);
        }
    }

    #[test]
    fn test_search_filter_applies_before_ranking() {
        let index = seeded_index();
        let advanced_only =
            index.search_filtered("docker flask python", 10, |record| {
                record.skill_level == SkillLevel::Intermediate
            });
        assert_eq!(advanced_only.len(), 1);
        assert_eq!(advanced_only[0].doc_id, doc(3));
    }

    #[test]
    fn test_rebuild_replaces_state() {
        let index = seeded_index();
        let records = vec![DocumentRecord {
            doc_id: doc(10),
            content: "Completely fresh corpus about terraform".to_string(),
            concepts: concepts(&["terraform"]),
            skill_level: SkillLevel::Beginner,
            cluster_id: None,
            created_at: 0,
        }];

        assert_eq!(index.rebuild(records).unwrap(), 1);
        let stats = index.stats();
        assert_eq!(stats.document_count, 1);
        assert_eq!(stats.cluster_count, 1);
        assert!(index.document(doc(1)).is_none());
        assert!(index.document(doc(10)).unwrap().cluster_id.is_some());
    }

    #[test]
    fn test_rebuild_rejects_empty_content() {
        let index = KnowledgeIndex::new();
        let records = vec![DocumentRecord {
            doc_id: doc(1),
            content: "   ".to_string(),
            concepts: vec![],
            skill_level: SkillLevel::Beginner,
            cluster_id: None,
            created_at: 0,
        }];
        assert!(matches!(
            index.rebuild(records),
            Err(IndexError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_rebuild_matches_incremental_ingest() {
        let incremental = seeded_index();
        incremental.delete(doc(2)).unwrap();

        let rebuilt = KnowledgeIndex::new();
        rebuilt.rebuild(incremental.documents()).unwrap();

        assert_eq!(incremental.stats(), rebuilt.stats());
        for query in ["docker containers", "flask python", "images"] {
            let a: Vec<(DocId, f32)> = incremental
                .search(query, 10)
                .into_iter()
                .map(|hit| (hit.doc_id, hit.score))
                .collect();
            let b: Vec<(DocId, f32)> = rebuilt
                .search(query, 10)
                .into_iter()
                .map(|hit| (hit.doc_id, hit.score))
                .collect();
            assert_eq!(a, b, "rankings diverged for {:?}", query);
        }
    }

    #[test]
    fn test_clear_resets_everything() {
        let index = seeded_index();
        index.clear();
        let stats = index.stats();
        assert_eq!(stats.document_count, 0);
        assert_eq!(stats.term_count, 0);
        assert_eq!(stats.cluster_count, 0);
    }

    #[test]
    fn test_verify_passes_on_healthy_index() {
        let index = seeded_index();
        assert!(!index.verify().unwrap());
    }

    #[test]
    fn test_verify_repairs_severed_membership() {
        let index = seeded_index();
        {
            let mut state = index.state.write();
            if let Some(record) = state.documents.get_mut(&doc(1)) {
                record.cluster_id = Some(ClusterId::from_u64(9999));
            }
        }

        assert!(index.verify().unwrap(), "repair should have run");
        assert!(!index.verify().unwrap(), "index is consistent after repair");
        let record = index.document(doc(1)).unwrap();
        assert!(index.cluster(record.cluster_id.unwrap()).is_some());
    }

    #[test]
    fn test_search_heals_dangling_cluster_reference() {
        let index = seeded_index();
        {
            let mut state = index.state.write();
            if let Some(record) = state.documents.get_mut(&doc(3)) {
                record.cluster_id = Some(ClusterId::from_u64(9999));
            }
        }

        let hits = index.search("flask python", 10);
        assert_eq!(hits.len(), 1);
        let healed = hits[0].cluster_id.unwrap();
        assert!(index.cluster(healed).is_some());
        assert_eq!(index.document(doc(3)).unwrap().cluster_id, Some(healed));
    }

    #[test]
    fn test_partial_failure_reports_failed_stage() {
        let index = seeded_index();
        // Plant a stray cluster membership with no matching record, so the
        // next ingest of that ID skips retraction and assignment collides.
        {
            let mut state = index.state.write();
            state
                .clusters
                .assign(doc(50), &["stray".to_string()], SkillLevel::Beginner)
                .unwrap();
        }

        let err = index
            .ingest(
                doc(50),
                "content that indexes fine",
                concepts(&["stray"]),
                SkillLevel::Beginner,
            )
            .unwrap_err();
        match err {
            IndexError::PartialFailure {
                succeeded, failed, ..
            } => {
                assert_eq!(succeeded, IngestStage::VectorIndex);
                assert_eq!(failed, IngestStage::ClusterEngine);
            }
            other => panic!("expected PartialFailure, got {:?}", other),
        }
        // The vector write was unwound, so the failed document is invisible.
        assert!(index.document(doc(50)).is_none());
        assert!(index.search("indexes", 10).is_empty());
    }

    #[test]
    fn test_stats_track_corpus_counts() {
        let index = seeded_index();
        let stats = index.stats();
        assert_eq!(stats.document_count, 3);
        assert_eq!(stats.cluster_count, 2);
        assert!(stats.term_count > 0);
    }
}
