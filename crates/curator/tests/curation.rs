//! Curation over a graph produced by the ingestion pipeline

use citegraph_common::config::AppConfig;
use citegraph_common::context::Retriever;
use citegraph_common::embeddings::MockEmbedder;
use citegraph_common::graph::{MemoryGraphStore, PruneOutcome};
use citegraph_common::llm::ScriptedLanguageModel;
use citegraph_curator::{CanonicalMapping, Curator, EntryOutcome};
use citegraph_ingestion::{GraphBuilder, SourceDocument};
use std::sync::Arc;

const DIM: usize = 128;

fn document(name: &str, institution: &str, text: &str) -> SourceDocument {
    SourceDocument {
        name: name.into(),
        institution: institution.into(),
        category: "Regulation".into(),
        text: text.into(),
        source_path: None,
    }
}

/// The model names the same law two different ways
async fn ingested_graph() -> Arc<MemoryGraphStore> {
    let store = Arc::new(MemoryGraphStore::new());
    let llm = ScriptedLanguageModel::new(r#"{"citations": []}"#)
        .with_rule(
            "Law No. 6446",
            r#"{"citations": [{"target": "Law No. 6446", "articles": [5]}]}"#,
        )
        .with_rule(
            "the electricity law",
            r#"{"citations": [{"target": "electricity law", "articles": ["Article 5"]}]}"#,
        );

    let mut config = AppConfig::default();
    config.embedding.dimension = DIM;
    let builder = GraphBuilder::new(
        store.clone(),
        Arc::new(MockEmbedder::new(DIM)),
        Arc::new(llm),
        &config,
    )
    .unwrap();

    let report = builder
        .ingest_all(&[
            document(
                "Licensing Regulation",
                "Energy Regulator",
                "Article 1\nLicences are granted under Article 5 of Law No. 6446.",
            ),
            document(
                "Tariff Regulation",
                "Energy Regulator",
                "Article 1\nTariffs follow article 5 of the electricity law.",
            ),
            document(
                "Electricity Market Law",
                "Parliament",
                "Article 5\nLicences are required for every market activity.",
            ),
        ])
        .await;
    assert_eq!(report.succeeded(), 3);
    store
}

fn mapping() -> CanonicalMapping {
    CanonicalMapping::from_toml_str(
        r#"
        [[entries]]
        malformed = "Law No. 6446"
        canonical = "Electricity Market Law"

        [[entries]]
        malformed = "electricity law"
        canonical = "Electricity Market Law"
        "#,
    )
    .unwrap()
}

#[tokio::test]
async fn test_curation_merges_variant_names() {
    let store = ingested_graph().await;
    assert!(store.document("Law No. 6446").unwrap().is_some());

    let report = Curator::new(store.clone()).curate(&mapping()).await;

    assert_eq!(report.edges_moved(), 2);
    assert_eq!(report.pruned(), 2);
    assert!(store.document("Law No. 6446").unwrap().is_none());
    assert!(store.document("electricity law").unwrap().is_none());

    let citations = store.citations_to("Electricity Market Law").unwrap();
    assert_eq!(citations.len(), 2);
    assert!(citations.iter().all(|(_, articles)| articles.contains(&5)));
}

#[tokio::test]
async fn test_curated_graph_answers_through_canonical_document() {
    let store = ingested_graph().await;
    Curator::new(store.clone()).curate(&mapping()).await;

    let mut config = AppConfig::default();
    config.retrieval.seed_k = 1;
    let retriever = Retriever::new(
        store,
        Arc::new(MockEmbedder::new(DIM)),
        Arc::new(ScriptedLanguageModel::new("")),
        &config,
    )
    .unwrap();

    let context = retriever
        .retrieve("Tariffs follow article 5 of the electricity law.")
        .await
        .unwrap();

    assert_eq!(context.relations.len(), 1);
    assert_eq!(context.relations[0].target_document, "Electricity Market Law");
    assert_eq!(context.relations[0].found.len(), 1);
    assert!(context.relations[0].found[0].text.contains("every market activity"));
}

#[tokio::test]
async fn test_real_documents_are_never_pruned() {
    let store = ingested_graph().await;

    let report = Curator::new(store.clone())
        .curate(&CanonicalMapping::from_pairs([("Tariff Regulation", "Electricity Market Law")]))
        .await;

    assert_eq!(
        report.entries[0].outcome,
        EntryOutcome::Curated {
            edges_moved: 0,
            canonical_missing: false,
            prune: PruneOutcome::Retained,
        }
    );
    assert!(store.document("Tariff Regulation").unwrap().is_some());
}
