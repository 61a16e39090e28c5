//! CiteGraph Chat
//!
//! Interactive question answering over the citation graph. Each answer is
//! streamed to stdout as it is generated and appended to the transcript.
//! Type `exit` or `quit` to leave.

mod session;
mod transcript;

use anyhow::Context;
use citegraph_common::{
    config::AppConfig, context::Retriever, embeddings::create_embedder,
    graph::connect_graph_store, llm::create_language_model, metrics, telemetry, VERSION,
};
use tokio::io::BufReader;
use tracing::{error, info};
use transcript::Transcript;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    telemetry::init_tracing(&config.observability);
    info!("Starting CiteGraph chat v{}", VERSION);

    if config.observability.metrics_port != 0 {
        metrics::install_exporter(config.observability.metrics_port)?;
    }
    metrics::register_metrics();

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

    let retriever = Retriever::new(store, embedder, llm, &config)?;
    let transcript = Transcript::new(&config.transcript);

    println!("CiteGraph chat v{}. Type 'exit' or 'quit' to leave.", VERSION);

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();

    tokio::select! {
        result = session::run(&retriever, &transcript, stdin, &mut stdout) => {
            let answered = result?;
            info!(answered, "Chat session ended");
        }
        _ = tokio::signal::ctrl_c() => {
            println!();
            info!("Chat interrupted");
        }
    }

    Ok(())
}
