//! Output formatting for search results and cluster listings.
//!
//! Supports both human-readable terminal output and JSON for scripting.

use lorekeeper_core::index::{Cluster, SearchHit};
use lorekeeper_core::KnowledgeIndex;
use serde::Serialize;

/// Maximum characters to show in a content snippet
const SNIPPET_MAX_LEN: usize = 120;

/// JSON output structure for search results
#[derive(Serialize)]
pub struct JsonOutput {
    pub query: String,
    pub results: Vec<JsonHit>,
}

/// One search hit in JSON format
#[derive(Serialize)]
pub struct JsonHit {
    pub doc_id: u64,
    pub score: f32,
    pub cluster_id: Option<u64>,
    pub cluster_name: Option<String>,
    pub skill_level: String,
    pub snippet: String,
}

fn json_hit(hit: &SearchHit, index: &KnowledgeIndex) -> JsonHit {
    let cluster_name = hit
        .cluster_id
        .and_then(|id| index.cluster(id))
        .map(|cluster| cluster.name);
    let snippet = index
        .document(hit.doc_id)
        .map(|record| truncate_text(&record.content, SNIPPET_MAX_LEN))
        .unwrap_or_default();
    JsonHit {
        doc_id: hit.doc_id.as_u64(),
        score: hit.score,
        cluster_id: hit.cluster_id.map(|id| id.as_u64()),
        cluster_name,
        skill_level: format!("{:?}", hit.skill_level).to_lowercase(),
        snippet,
    }
}

/// Formats search hits as JSON.
pub fn format_hits_json(query: &str, hits: &[SearchHit], index: &KnowledgeIndex) -> String {
    let output = JsonOutput {
        query: query.to_string(),
        results: hits.iter().map(|hit| json_hit(hit, index)).collect(),
    };
    serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string())
}

/// Formats search hits for human-readable terminal output.
pub fn format_hits_human(query: &str, hits: &[SearchHit], index: &KnowledgeIndex) -> String {
    if hits.is_empty() {
        return format!("No results found for \"{}\"", query);
    }

    let mut output = String::new();
    output.push_str(&format!(
        "Found {} result{} for \"{}\":\n\n",
        hits.len(),
        if hits.len() == 1 { "" } else { "s" },
        query
    ));

    for (i, hit) in hits.iter().enumerate() {
        let cluster_name = hit
            .cluster_id
            .and_then(|id| index.cluster(id))
            .map(|cluster| cluster.name)
            .unwrap_or_else(|| "-".to_string());
        output.push_str(&format!(
            "{}. doc {} (score: {:.3}, cluster: {})\n",
            i + 1,
            hit.doc_id.as_u64(),
            hit.score,
            cluster_name
        ));
        if let Some(record) = index.document(hit.doc_id) {
            output.push_str(&format!(
                "   {}\n",
                truncate_text(&record.content, SNIPPET_MAX_LEN)
            ));
        }
    }
    output
}

/// Cluster listing in JSON format
#[derive(Serialize)]
pub struct JsonCluster {
    pub cluster_id: u64,
    pub name: String,
    pub doc_count: usize,
    pub primary_concepts: Vec<String>,
}

/// Formats the cluster arrangement as JSON.
pub fn format_clusters_json(clusters: &[Cluster]) -> String {
    let listing: Vec<JsonCluster> = clusters
        .iter()
        .map(|cluster| JsonCluster {
            cluster_id: cluster.cluster_id.as_u64(),
            name: cluster.name.clone(),
            doc_count: cluster.doc_count(),
            primary_concepts: cluster.primary_concepts.clone(),
        })
        .collect();
    serde_json::to_string_pretty(&listing).unwrap_or_else(|_| "[]".to_string())
}

/// Formats the cluster arrangement for human-readable terminal output.
pub fn format_clusters_human(clusters: &[Cluster]) -> String {
    if clusters.is_empty() {
        return "No clusters (empty corpus)".to_string();
    }

    let mut output = String::new();
    output.push_str(&format!(
        "{} cluster{}:\n\n",
        clusters.len(),
        if clusters.len() == 1 { "" } else { "s" }
    ));
    for cluster in clusters {
        output.push_str(&format!(
            "[{}] {} ({} doc{})\n",
            cluster.cluster_id.as_u64(),
            cluster.name,
            cluster.doc_count(),
            if cluster.doc_count() == 1 { "" } else { "s" }
        ));
        if !cluster.primary_concepts.is_empty() {
            output.push_str(&format!("    concepts: {}\n", cluster.primary_concepts.join(", ")));
        }
    }
    output
}

/// Truncates text on a character boundary, appending an ellipsis.
fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_len).collect();
    format!("{}...", truncated.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lorekeeper_core::index::{Concept, DocId, SkillLevel};

    fn seeded() -> KnowledgeIndex {
        let index = KnowledgeIndex::new();
        index
            .ingest(
                DocId::from_u64(1),
                "Docker keeps container builds reproducible",
                vec![Concept::named("docker"), Concept::named("containers")],
                SkillLevel::Beginner,
            )
            .unwrap();
        index
    }

    #[test]
    fn test_human_output_includes_cluster_name() {
        let index = seeded();
        let hits = index.search("docker", 10);
        let text = format_hits_human("docker", &hits, &index);
        assert!(text.contains("doc 1"));
        assert!(text.contains("Docker & Containers"));
    }

    #[test]
    fn test_human_output_for_no_results() {
        let index = seeded();
        let text = format_hits_human("nothing", &[], &index);
        assert!(text.contains("No results"));
    }

    #[test]
    fn test_json_output_round_trips() {
        let index = seeded();
        let hits = index.search("docker", 10);
        let json = format_hits_json("docker", &hits, &index);
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["query"], "docker");
        assert_eq!(parsed["results"][0]["doc_id"], 1);
        assert_eq!(parsed["results"][0]["skill_level"], "beginner");
    }

    #[test]
    fn test_cluster_listing() {
        let index = seeded();
        let text = format_clusters_human(&index.clusters());
        assert!(text.contains("Docker & Containers"));
        assert!(text.contains("1 doc"));
        assert!(format_clusters_human(&[]).contains("No clusters"));
    }

    #[test]
    fn test_truncate_text_respects_char_boundaries() {
        assert_eq!(truncate_text("short", 10), "short");
        let long = "é".repeat(30);
        let truncated = truncate_text(&long, 10);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), 13);
    }
}
