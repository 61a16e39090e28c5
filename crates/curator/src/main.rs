//! CiteGraph Curator
//!
//! Applies the canonical name mapping to the citation graph.
//!
//! Usage: `curator [mapping.toml]` (defaults to `curation.mapping_path`)

use anyhow::Context;
use citegraph_common::{config::AppConfig, graph::connect_graph_store, metrics, telemetry, VERSION};
use citegraph_curator::{CanonicalMapping, Curator, EntryOutcome};
use std::path::PathBuf;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    telemetry::init_tracing(&config.observability);
    info!("Starting CiteGraph curator v{}", VERSION);

    if config.observability.metrics_port != 0 {
        metrics::install_exporter(config.observability.metrics_port)?;
    }
    metrics::register_metrics();

    let mapping_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&config.curation.mapping_path));
    let mapping = CanonicalMapping::from_file(&mapping_path).map_err(|e| {
        error!(error = %e, path = %mapping_path.display(), "Failed to load canonical mapping");
        e
    })?;
    info!(entries = mapping.len(), path = %mapping_path.display(), "Loaded canonical mapping");

    let store = connect_graph_store(&config).await.map_err(|e| {
        error!(error = %e, "Failed to connect to graph store");
        e
    })?;
    store.ping().await.map_err(|e| {
        error!(error = %e, "Graph store is not reachable");
        e
    })?;

    let report = Curator::new(store).curate(&mapping).await;

    for entry in &report.entries {
        if let EntryOutcome::Failed { reason } = &entry.outcome {
            error!(malformed = %entry.malformed, reason = %reason, "Entry was not curated");
        }
    }
    info!(
        edges_moved = report.edges_moved(),
        pruned = report.pruned(),
        failures = report.failures(),
        "Curation complete"
    );

    Ok(())
}
