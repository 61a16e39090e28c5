//! Metrics and observability utilities
//!
//! Provides Prometheus metrics for ingestion, curation and retrieval
//! with standardized naming conventions.

use crate::errors::{AppError, Result};
use metrics::{counter, describe_counter, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;

/// Metrics prefix for all CiteGraph metrics
pub const METRICS_PREFIX: &str = "citegraph";

/// Buckets for retrieval latency (in seconds); answer synthesis dominates
pub const QUERY_BUCKETS: &[f64] = &[
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s
    60.00, // 60s
];

/// Buckets for model calls (embedding and language model)
pub const MODEL_BUCKETS: &[f64] = &[
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.000, // 2s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s
    120.0, // 2min
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Ingestion metrics
    describe_counter!(
        format!("{}_documents_ingested_total", METRICS_PREFIX),
        Unit::Count,
        "Documents processed by the graph builder, by outcome"
    );

    describe_counter!(
        format!("{}_chunks_written_total", METRICS_PREFIX),
        Unit::Count,
        "Chunks persisted to the graph store"
    );

    describe_counter!(
        format!("{}_chunks_skipped_total", METRICS_PREFIX),
        Unit::Count,
        "Chunks skipped because they could not be embedded"
    );

    describe_counter!(
        format!("{}_citations_written_total", METRICS_PREFIX),
        Unit::Count,
        "Citation edges upserted"
    );

    describe_counter!(
        format!("{}_extractions_malformed_total", METRICS_PREFIX),
        Unit::Count,
        "Language model extraction outputs that failed validation"
    );

    describe_histogram!(
        format!("{}_ingestion_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Per-document ingestion latency in seconds"
    );

    // Curation metrics
    describe_counter!(
        format!("{}_edges_rewired_total", METRICS_PREFIX),
        Unit::Count,
        "Citation edges moved to a canonical document"
    );

    describe_counter!(
        format!("{}_documents_pruned_total", METRICS_PREFIX),
        Unit::Count,
        "Orphaned malformed documents deleted"
    );

    // Retrieval metrics
    describe_counter!(
        format!("{}_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total questions answered"
    );

    describe_histogram!(
        format!("{}_query_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end question latency in seconds"
    );

    describe_histogram!(
        format!("{}_query_seed_chunks", METRICS_PREFIX),
        Unit::Count,
        "Seed chunks returned by vector search"
    );

    describe_histogram!(
        format!("{}_query_relations", METRICS_PREFIX),
        Unit::Count,
        "Citation relations followed per question"
    );

    // Model metrics
    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    describe_counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total language model requests"
    );

    describe_histogram!(
        format!("{}_llm_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Language model latency in seconds"
    );

    tracing::info!("Metrics registered");
}

/// Install the Prometheus exporter on `0.0.0.0:port`
pub fn install_exporter(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let to_config_error = |e: metrics_exporter_prometheus::BuildError| AppError::Configuration {
        message: format!("Failed to install metrics exporter: {}", e),
    };

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_query_duration_seconds", METRICS_PREFIX)),
            QUERY_BUCKETS,
        )
        .map_err(to_config_error)?
        .set_buckets_for_metric(
            Matcher::Suffix("embedding_duration_seconds".to_string()),
            MODEL_BUCKETS,
        )
        .map_err(to_config_error)?
        .set_buckets_for_metric(
            Matcher::Suffix("llm_duration_seconds".to_string()),
            MODEL_BUCKETS,
        )
        .map_err(to_config_error)?
        .install()
        .map_err(to_config_error)?;

    tracing::info!(%addr, "Metrics exporter listening");
    Ok(())
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);

        gauge!(
            format!("{}_embedding_batch_size", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .set(batch_size as f64);
    }
}

/// Helper to record language model metrics
pub fn record_llm(duration_secs: f64, model: &str, mode: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "mode" => mode.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_llm_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string(),
            "mode" => mode.to_string()
        )
        .record(duration_secs);
    }
}

/// Helper to record one document's ingestion
pub fn record_document(
    duration_secs: f64,
    outcome: &str,
    chunks_written: usize,
    chunks_skipped: usize,
    citations_written: usize,
) {
    counter!(
        format!("{}_documents_ingested_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    counter!(format!("{}_chunks_written_total", METRICS_PREFIX)).increment(chunks_written as u64);
    counter!(format!("{}_chunks_skipped_total", METRICS_PREFIX)).increment(chunks_skipped as u64);
    counter!(format!("{}_citations_written_total", METRICS_PREFIX))
        .increment(citations_written as u64);

    histogram!(format!("{}_ingestion_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Helper to record a malformed extraction output
pub fn record_malformed_extraction() {
    counter!(format!("{}_extractions_malformed_total", METRICS_PREFIX)).increment(1);
}

/// Helper to record one curation entry
pub fn record_curation(edges_moved: u64, pruned: bool) {
    counter!(format!("{}_edges_rewired_total", METRICS_PREFIX)).increment(edges_moved);
    if pruned {
        counter!(format!("{}_documents_pruned_total", METRICS_PREFIX)).increment(1);
    }
}

/// Helper to record retrieval metrics
pub fn record_query(duration_secs: f64, seeds: usize, relations: usize, answered: bool) {
    let outcome = if answered { "answered" } else { "no_results" };

    counter!(
        format!("{}_queries_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);

    histogram!(format!("{}_query_duration_seconds", METRICS_PREFIX)).record(duration_secs);
    histogram!(format!("{}_query_seed_chunks", METRICS_PREFIX)).record(seeds as f64);
    histogram!(format!("{}_query_relations", METRICS_PREFIX)).record(relations as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_sorted() {
        for buckets in [QUERY_BUCKETS, MODEL_BUCKETS] {
            let mut prev = 0.0;
            for &bucket in buckets {
                assert!(bucket > prev);
                prev = bucket;
            }
        }
    }

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed: every helper is a no-op
        register_metrics();
        record_document(0.5, "ok", 3, 1, 2);
        record_curation(2, true);
        record_query(1.2, 5, 3, true);
        record_llm(0.8, "gemma3:4b", "json", false);
    }
}
