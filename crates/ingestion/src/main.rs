//! CiteGraph Ingestion
//!
//! One pass over the document corpus:
//! 1. Loads `<institution>/<category>/<name>` documents from the data path
//! 2. Chunks each document at its article headings
//! 3. Embeds every chunk and extracts its citations
//! 4. Upserts institutions, documents, chunks and citation edges
//!
//! Usage: `ingestion [data_path]`

use anyhow::Context;
use citegraph_common::{
    config::AppConfig, embeddings::create_embedder, graph::connect_graph_store,
    llm::create_language_model, metrics, telemetry, VERSION,
};
use citegraph_ingestion::{load_documents, DocumentOutcome, GraphBuilder};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let mut config = AppConfig::load().context("Failed to load configuration")?;
    if let Some(data_path) = std::env::args().nth(1) {
        config.ingestion.data_path = data_path;
    }

    telemetry::init_tracing(&config.observability);
    info!("Starting CiteGraph ingestion v{}", VERSION);

    if config.observability.metrics_port != 0 {
        metrics::install_exporter(config.observability.metrics_port)?;
    }
    metrics::register_metrics();

    info!(backend = %config.graph.backend, "Connecting to graph store...");
    let store = connect_graph_store(&config).await.map_err(|e| {
        error!(error = %e, "Failed to connect to graph store");
        e
    })?;
    store.ping().await.map_err(|e| {
        error!(error = %e, "Graph store is not reachable");
        e
    })?;

    let embedder = create_embedder(&config.embedding)?;
    embedder.embed("connectivity check").await.map_err(|e| {
        error!(error = %e, model = embedder.model_name(), "Embedding service is not reachable");
        e
    })?;

    let llm = create_language_model(&config.llm)?;
    llm.ping().await.map_err(|e| {
        error!(error = %e, model = llm.model_name(), "Language model is not reachable");
        e
    })?;

    let documents = load_documents(&config.ingestion).map_err(|e| {
        error!(error = %e, path = %config.ingestion.data_path, "Failed to read data path");
        e
    })?;
    if documents.is_empty() {
        info!(path = %config.ingestion.data_path, "No documents to ingest");
        return Ok(());
    }

    let builder = GraphBuilder::new(store, embedder, llm, &config)?;
    let report = builder.ingest_all(&documents).await;

    for failure in report.failed() {
        if let DocumentOutcome::Failed { reason } = &failure.outcome {
            error!(document = %failure.document, reason = %reason, "Document was not ingested");
        }
    }

    let totals = report.totals();
    info!(
        documents = report.documents.len(),
        succeeded = report.succeeded(),
        chunks_written = totals.chunks_written,
        chunks_skipped = totals.chunks_skipped,
        citations_written = totals.citations_written,
        "Ingestion complete"
    );

    Ok(())
}
