//! Jaccard concept-set clustering engine.
//!
//! Documents are grouped by the similarity of their concept-name sets.
//! Assignment is greedy and order-dependent: an incoming document joins the
//! best existing cluster at or above [`SIMILARITY_THRESHOLD`], otherwise it
//! founds a new one. Clusters are never merged or split retroactively, so
//! the same documents arriving in a different order may legitimately settle
//! into a different arrangement.
//!
//! # Thread Safety
//!
//! This type is **not** thread-safe. The coordinator wraps it in a
//! reader/writer lock.

use super::types::{Cluster, ClusterId, DocId, IndexError, SkillLevel};
use crate::config::{PRIMARY_CONCEPT_COUNT, SIMILARITY_THRESHOLD};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, instrument};

/// Greedy single-pass clustering over document concept sets.
#[derive(Debug, Clone, Default)]
pub struct ClusterEngine {
    /// Live clusters, ordered by ID so candidate scans are deterministic
    clusters: BTreeMap<ClusterId, Cluster>,
    /// Reverse map: which cluster each document belongs to
    membership: HashMap<DocId, ClusterId>,
    /// Concept names contributed by each member, retained for retraction
    doc_concepts: HashMap<DocId, Vec<String>>,
    /// Per-cluster concept occurrence counts, source of the top-N signature
    concept_freq: HashMap<ClusterId, HashMap<String, u32>>,
    /// Next cluster ID to allocate; never reused after a cluster is reaped
    next_cluster_id: u64,
}

impl ClusterEngine {
    /// Creates an engine with no clusters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Jaccard similarity between two concept-name sets.
    ///
    /// `|A ∩ B| / |A ∪ B|`, with the both-empty case defined as 0.0 so that
    /// concept-free documents never attract each other into a cluster.
    pub fn jaccard(a: &HashSet<&str>, b: &HashSet<&str>) -> f32 {
        if a.is_empty() && b.is_empty() {
            return 0.0;
        }
        let intersection = a.intersection(b).count();
        let union = a.len() + b.len() - intersection;
        intersection as f32 / union as f32
    }

    /// Assigns a document to the best-matching cluster, creating one if no
    /// existing cluster reaches the similarity threshold.
    ///
    /// Candidates are scanned in ascending cluster-ID order and a later
    /// cluster only wins with a strictly greater similarity, so exact ties
    /// resolve to the lowest cluster ID. Returns the cluster the document
    /// landed in.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Corruption`] if the document is already a
    /// member of some cluster; callers must retract it first.
    #[instrument(skip_all, fields(doc_id = doc_id.as_u64(), concepts = concepts.len()))]
    pub fn assign(
        &mut self,
        doc_id: DocId,
        concepts: &[String],
        skill_level: SkillLevel,
    ) -> Result<ClusterId, IndexError> {
        if let Some(existing) = self.membership.get(&doc_id) {
            return Err(IndexError::Corruption(format!(
                "document {} is already a member of cluster {}",
                doc_id.as_u64(),
                existing.as_u64()
            )));
        }

        let concept_set: HashSet<&str> = concepts.iter().map(String::as_str).collect();
        let cluster_id = match self.find_best_cluster(&concept_set) {
            Some((cluster_id, similarity)) => {
                debug!(
                    cluster_id = cluster_id.as_u64(),
                    similarity, "joining existing cluster"
                );
                cluster_id
            }
            None => self.create_cluster(concepts, skill_level),
        };

        self.membership.insert(doc_id, cluster_id);
        self.doc_concepts.insert(doc_id, concepts.to_vec());

        let freq = self.concept_freq.entry(cluster_id).or_default();
        for concept in concepts {
            *freq.entry(concept.clone()).or_insert(0) += 1;
        }

        let signature = Self::signature(self.concept_freq.get(&cluster_id));
        let cluster = self
            .clusters
            .get_mut(&cluster_id)
            .ok_or_else(|| IndexError::ClusterNotFound(cluster_id))?;
        cluster.members.insert(doc_id);
        cluster.primary_concepts = signature;

        Ok(cluster_id)
    }

    /// Retracts a document from its cluster.
    ///
    /// Decrements the cluster's concept counts, refreshes its signature, and
    /// reaps the cluster entirely if the document was its last member.
    /// Returns the cluster the document was removed from, or `None` if it
    /// was not a member of any.
    #[instrument(skip_all, fields(doc_id = doc_id.as_u64()))]
    pub fn remove(&mut self, doc_id: DocId) -> Result<Option<ClusterId>, IndexError> {
        let Some(cluster_id) = self.membership.remove(&doc_id) else {
            return Ok(None);
        };
        let concepts = self.doc_concepts.remove(&doc_id).unwrap_or_default();

        let cluster = self
            .clusters
            .get_mut(&cluster_id)
            .ok_or_else(|| IndexError::ClusterNotFound(cluster_id))?;
        cluster.members.remove(&doc_id);

        if cluster.members.is_empty() {
            debug!(cluster_id = cluster_id.as_u64(), "reaping empty cluster");
            self.clusters.remove(&cluster_id);
            self.concept_freq.remove(&cluster_id);
            return Ok(Some(cluster_id));
        }

        if let Some(freq) = self.concept_freq.get_mut(&cluster_id) {
            for concept in &concepts {
                match freq.get_mut(concept) {
                    Some(count) if *count > 1 => *count -= 1,
                    Some(_) => {
                        freq.remove(concept);
                    }
                    None => {
                        return Err(IndexError::Corruption(format!(
                            "cluster {} concept counts missing {:?} during retraction",
                            cluster_id.as_u64(),
                            concept
                        )));
                    }
                }
            }
        }

        let signature = Self::signature(self.concept_freq.get(&cluster_id));
        if let Some(cluster) = self.clusters.get_mut(&cluster_id) {
            cluster.primary_concepts = signature;
        }
        Ok(Some(cluster_id))
    }

    /// Looks up a cluster by ID.
    pub fn cluster(&self, cluster_id: ClusterId) -> Option<&Cluster> {
        self.clusters.get(&cluster_id)
    }

    /// All live clusters in ascending ID order.
    pub fn clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.values()
    }

    /// The cluster a document currently belongs to, if any.
    pub fn membership(&self, doc_id: DocId) -> Option<ClusterId> {
        self.membership.get(&doc_id).copied()
    }

    /// Number of live clusters.
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    /// Returns `true` if no clusters exist.
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Verifies internal invariants.
    ///
    /// Every membership entry must point at a live cluster that lists the
    /// document, every cluster member must have a membership entry, and no
    /// cluster may be empty.
    pub fn verify(&self) -> Result<(), IndexError> {
        for (doc_id, cluster_id) in &self.membership {
            let cluster = self
                .clusters
                .get(cluster_id)
                .ok_or(IndexError::ClusterNotFound(*cluster_id))?;
            if !cluster.members.contains(doc_id) {
                return Err(IndexError::Corruption(format!(
                    "document {} claims cluster {} but is not in its member set",
                    doc_id.as_u64(),
                    cluster_id.as_u64()
                )));
            }
        }
        for cluster in self.clusters.values() {
            if cluster.members.is_empty() {
                return Err(IndexError::Corruption(format!(
                    "cluster {} is empty but was not reaped",
                    cluster.cluster_id.as_u64()
                )));
            }
            for doc_id in &cluster.members {
                if self.membership.get(doc_id) != Some(&cluster.cluster_id) {
                    return Err(IndexError::Corruption(format!(
                        "cluster {} lists document {} without a matching membership entry",
                        cluster.cluster_id.as_u64(),
                        doc_id.as_u64()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Scans clusters in ascending ID order for the best match at or above
    /// the similarity threshold.
    ///
    /// Similarity is computed against each cluster's *signature* (its top-N
    /// primary concepts), not the union of member concepts, so a cluster's
    /// identity stays anchored to its dominant theme.
    fn find_best_cluster(&self, concept_set: &HashSet<&str>) -> Option<(ClusterId, f32)> {
        let mut best: Option<(ClusterId, f32)> = None;
        for (&cluster_id, cluster) in &self.clusters {
            let signature: HashSet<&str> =
                cluster.primary_concepts.iter().map(String::as_str).collect();
            let similarity = Self::jaccard(concept_set, &signature);
            if similarity < SIMILARITY_THRESHOLD {
                continue;
            }
            // Strict comparison keeps the lowest cluster ID on exact ties.
            match best {
                Some((_, best_similarity)) if similarity <= best_similarity => {}
                _ => best = Some((cluster_id, similarity)),
            }
        }
        best
    }

    /// Allocates a new cluster seeded with the document's concepts.
    fn create_cluster(&mut self, concepts: &[String], skill_level: SkillLevel) -> ClusterId {
        let cluster_id = ClusterId::from_u64(self.next_cluster_id);
        self.next_cluster_id += 1;

        let cluster = Cluster {
            cluster_id,
            name: Self::derive_name(concepts),
            primary_concepts: Vec::new(),
            skill_level,
            members: BTreeSet::new(),
        };
        debug!(
            cluster_id = cluster_id.as_u64(),
            name = %cluster.name,
            "creating cluster"
        );
        self.clusters.insert(cluster_id, cluster);
        cluster_id
    }

    /// Derives a display name from the founding document's concepts: the
    /// first one or two, title-cased and joined with an ampersand. The name
    /// is pinned at creation and never recomputed as membership shifts.
    fn derive_name(concepts: &[String]) -> String {
        if concepts.is_empty() {
            return "Untitled".to_string();
        }
        concepts
            .iter()
            .take(2)
            .map(|concept| title_case(concept))
            .collect::<Vec<_>>()
            .join(" & ")
    }

    /// Recomputes a cluster's top-N signature from its concept counts:
    /// highest occurrence count first, ties broken alphabetically.
    fn signature(freq: Option<&HashMap<String, u32>>) -> Vec<String> {
        let Some(freq) = freq else {
            return Vec::new();
        };
        let mut ranked: Vec<(&String, u32)> =
            freq.iter().map(|(name, &count)| (name, count)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
            .into_iter()
            .take(PRIMARY_CONCEPT_COUNT)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Uppercases the first letter of each whitespace-separated word.
fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
