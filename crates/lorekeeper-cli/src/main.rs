//! Lorekeeper CLI - search and cluster a document corpus from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Search a corpus file
//! lk "docker containers" --corpus notes.json
//! lk "rust lifetimes" --corpus notes.json -n 5
//! lk "query" --corpus notes.json --json
//!
//! # Inspect the cluster arrangement
//! lk --corpus notes.json --clusters
//!
//! # Show help
//! lk --help
//! ```

mod corpus;
mod output;

use anyhow::Result;
use clap::Parser;
use lorekeeper_core::KnowledgeIndex;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Lorekeeper corpus search CLI.
///
/// Loads a JSON corpus file, builds the in-memory knowledge index, and
/// either answers a ranked search query or prints the cluster arrangement.
#[derive(Parser)]
#[command(name = "lk", version, about)]
struct Cli {
    /// Search query
    query: Option<String>,

    /// Path to the JSON corpus file
    #[arg(long)]
    corpus: PathBuf,

    /// Maximum number of results to return
    #[arg(short = 'n', long, default_value_t = lorekeeper_core::config::DEFAULT_TOP_K)]
    limit: usize,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// List clusters instead of searching
    #[arg(long)]
    clusters: bool,

    /// Only return results from this cluster
    #[arg(long)]
    cluster: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let index = KnowledgeIndex::new();
    let loaded = corpus::load_into(&index, &cli.corpus).await?;
    tracing::info!(documents = loaded, "corpus loaded");

    if cli.clusters {
        let clusters = index.clusters();
        let output = if cli.json {
            output::format_clusters_json(&clusters)
        } else {
            output::format_clusters_human(&clusters)
        };
        println!("{}", output);
        return Ok(());
    }

    match &cli.query {
        Some(query) => {
            let wanted = cli.cluster.map(lorekeeper_core::index::ClusterId::from_u64);
            let hits = match wanted {
                Some(cluster_id) => index.search_filtered(query, cli.limit, |record| {
                    record.cluster_id == Some(cluster_id)
                }),
                None => index.search(query, cli.limit),
            };

            let output = if cli.json {
                output::format_hits_json(query, &hits, &index)
            } else {
                output::format_hits_human(query, &hits, &index)
            };
            println!("{}", output);
        }
        None => {
            eprintln!("No search query provided. Use --help for usage information.");
            std::process::exit(1);
        }
    }

    Ok(())
}
