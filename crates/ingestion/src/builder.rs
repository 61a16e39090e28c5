//! Graph builder
//!
//! Turns source documents into graph writes: the publishing institution and
//! the document itself, one chunk per chunker output with its embedding, and
//! one citation edge per extracted citation. Every write is an upsert, so
//! running the builder twice over the same input leaves the same graph.

use crate::chunker::Chunker;
use crate::errors::IngestionError;
use crate::extractor::CitationExtractor;
use crate::source::SourceDocument;
use citegraph_common::config::AppConfig;
use citegraph_common::embeddings::{normalize_whitespace, Embedder};
use citegraph_common::graph::{DocumentAttributes, GraphStore, NewChunk};
use citegraph_common::llm::LanguageModel;
use citegraph_common::metrics;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use validator::Validate;

/// Counts for one ingested document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentStats {
    pub chunks_written: usize,
    /// Chunks dropped because they could not be embedded
    pub chunks_skipped: usize,
    pub citations_written: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    Ingested(DocumentStats),
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentReport {
    pub document: String,
    pub outcome: DocumentOutcome,
}

/// Per-document outcomes in input order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub documents: Vec<DocumentReport>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.documents
            .iter()
            .filter(|d| matches!(d.outcome, DocumentOutcome::Ingested(_)))
            .count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &DocumentReport> {
        self.documents
            .iter()
            .filter(|d| matches!(d.outcome, DocumentOutcome::Failed { .. }))
    }

    /// Sum of the stats of every ingested document
    pub fn totals(&self) -> DocumentStats {
        self.documents
            .iter()
            .filter_map(|d| match d.outcome {
                DocumentOutcome::Ingested(stats) => Some(stats),
                DocumentOutcome::Failed { .. } => None,
            })
            .fold(DocumentStats::default(), |acc, s| DocumentStats {
                chunks_written: acc.chunks_written + s.chunks_written,
                chunks_skipped: acc.chunks_skipped + s.chunks_skipped,
                citations_written: acc.citations_written + s.citations_written,
            })
    }
}

pub struct GraphBuilder {
    store: Arc<dyn GraphStore>,
    embedder: Arc<dyn Embedder>,
    extractor: CitationExtractor,
    chunker: Chunker,
    concurrency: usize,
}

impl GraphBuilder {
    pub fn new(
        store: Arc<dyn GraphStore>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
        config: &AppConfig,
    ) -> Result<Self, IngestionError> {
        Ok(Self {
            store,
            embedder,
            extractor: CitationExtractor::new(llm, config.llm.extraction_temperature),
            chunker: Chunker::new(&config.chunking)?,
            concurrency: config.ingestion.concurrency.max(1),
        })
    }

    /// Ingest one document
    #[instrument(skip(self, document), fields(document = %document.name))]
    pub async fn process(&self, document: &SourceDocument) -> Result<DocumentStats, IngestionError> {
        document.validate()?;
        info!("Processing document");

        let institution = self.store.get_or_create_institution(&document.institution).await?;
        let handle = self.store.get_or_create_document(&document.name).await?;
        self.store
            .set_document_attributes(
                &handle,
                &DocumentAttributes {
                    category: document.category.clone(),
                    publisher: institution,
                },
            )
            .await?;

        let chunks = self.chunker.chunk(&document.text)?;
        debug!(chunk_count = chunks.len(), "Document chunked");

        let mut stats = DocumentStats::default();

        for (ordinal, chunk) in chunks.into_iter().enumerate() {
            let embedding = match self.embedder.embed(&normalize_whitespace(&chunk.text)).await {
                Ok(embedding) => embedding,
                Err(e) if e.is_transient() => {
                    warn!(
                        ordinal,
                        heading = %chunk.heading_hint,
                        error = %e,
                        "Failed to embed chunk, skipping"
                    );
                    stats.chunks_skipped += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let citations = self.extractor.extract(&chunk.text).await;

            let chunk_handle = self
                .store
                .get_or_create_chunk(
                    &handle,
                    &NewChunk {
                        ordinal: ordinal as u32,
                        text: chunk.text,
                        embedding,
                    },
                )
                .await?;
            stats.chunks_written += 1;

            for citation in citations {
                debug!(cited = %citation.target, articles = ?citation.articles, "Writing citation");
                let target = self.store.get_or_create_document(&citation.target).await?;
                self.store
                    .set_citation(&chunk_handle, &target, &citation.articles)
                    .await?;
                stats.citations_written += 1;
            }
        }

        info!(
            chunks_written = stats.chunks_written,
            chunks_skipped = stats.chunks_skipped,
            citations_written = stats.citations_written,
            "Document processed"
        );

        Ok(stats)
    }

    async fn process_reported(&self, document: &SourceDocument) -> DocumentReport {
        let start = Instant::now();
        let outcome = match self.process(document).await {
            Ok(stats) => {
                metrics::record_document(
                    start.elapsed().as_secs_f64(),
                    "ingested",
                    stats.chunks_written,
                    stats.chunks_skipped,
                    stats.citations_written,
                );
                DocumentOutcome::Ingested(stats)
            }
            Err(e) => {
                error!(document = %document.name, error = %e, "Failed to process document");
                metrics::record_document(start.elapsed().as_secs_f64(), "failed", 0, 0, 0);
                DocumentOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        DocumentReport {
            document: document.name.clone(),
            outcome,
        }
    }

    /// Ingest a batch, continuing past failed documents.
    ///
    /// Documents run `ingestion.concurrency` at a time, except when two share
    /// a name, in which case the whole batch runs one at a time.
    pub async fn ingest_all(&self, documents: &[SourceDocument]) -> BatchReport {
        let mut names = HashSet::new();
        let has_duplicates = !documents.iter().all(|d| names.insert(d.name.as_str()));

        let concurrency = if has_duplicates {
            if self.concurrency > 1 {
                warn!("Duplicate document names in batch, ingesting sequentially");
            }
            1
        } else {
            self.concurrency
        };

        info!(documents = documents.len(), concurrency, "Starting batch ingestion");

        let reports: Vec<DocumentReport> = stream::iter(documents)
            .map(|document| self.process_reported(document))
            .buffered(concurrency)
            .collect()
            .await;

        let report = BatchReport { documents: reports };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed().count(),
            "Batch ingestion complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use citegraph_common::embeddings::MockEmbedder;
    use citegraph_common::graph::{ArticleSet, MemoryGraphStore};
    use citegraph_common::llm::ScriptedLanguageModel;

    const DIM: usize = 32;

    fn document(name: &str, text: &str) -> SourceDocument {
        SourceDocument {
            name: name.into(),
            institution: "Energy Regulator".into(),
            category: "Regulation".into(),
            text: text.into(),
            source_path: None,
        }
    }

    fn builder(
        store: Arc<MemoryGraphStore>,
        embedder: MockEmbedder,
        llm: ScriptedLanguageModel,
    ) -> GraphBuilder {
        GraphBuilder::new(store, Arc::new(embedder), Arc::new(llm), &AppConfig::default()).unwrap()
    }

    fn articles(items: &[u32]) -> ArticleSet {
        items.iter().copied().collect()
    }

    #[tokio::test]
    async fn test_process_writes_document_chunks_and_citations() {
        let store = Arc::new(MemoryGraphStore::new());
        let llm = ScriptedLanguageModel::new(r#"{"citations": []}"#).with_rule(
            "Energy Market Law",
            r#"{"citations": [{"target": "Energy Market Law", "articles": ["Article 3"]}]}"#,
        );
        let builder = builder(store.clone(), MockEmbedder::new(DIM), llm);

        let stats = builder
            .process(&document(
                "Licensing Regulation",
                "Scope note\nArticle 1\nFees follow Article 3 of the Energy Market Law.\nArticle 2\nNo citation here.",
            ))
            .await
            .unwrap();

        assert_eq!(
            stats,
            DocumentStats {
                chunks_written: 3,
                chunks_skipped: 0,
                citations_written: 1,
            }
        );

        let record = store.document("Licensing Regulation").unwrap().unwrap();
        assert_eq!(record.category.as_deref(), Some("Regulation"));
        assert_eq!(record.publisher.as_deref(), Some("Energy Regulator"));

        let placeholder = store.document("Energy Market Law").unwrap().unwrap();
        assert!(placeholder.publisher.is_none());

        let citations = store.citations_to("Energy Market Law").unwrap();
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].1, articles(&[3]));
    }

    #[tokio::test]
    async fn test_reprocessing_is_idempotent() {
        let store = Arc::new(MemoryGraphStore::new());
        let llm = ScriptedLanguageModel::new(
            r#"{"citations": [{"target": "Energy Market Law", "articles": [3, 4]}]}"#,
        );
        let builder = builder(store.clone(), MockEmbedder::new(DIM), llm);
        let doc = document("Licensing Regulation", "Article 1\nFees.\nArticle 2\nPenalties.");

        builder.process(&doc).await.unwrap();
        let first = store.snapshot().unwrap();
        builder.process(&doc).await.unwrap();
        let second = store.snapshot().unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_recitation_overwrites_article_set() {
        let store = Arc::new(MemoryGraphStore::new());
        let doc = document("Licensing Regulation", "Article 1\nFees under the Energy Market Law.");

        let first = ScriptedLanguageModel::new(
            r#"{"citations": [{"target": "Energy Market Law", "articles": [3, 4]}]}"#,
        );
        builder(store.clone(), MockEmbedder::new(DIM), first)
            .process(&doc)
            .await
            .unwrap();

        let second = ScriptedLanguageModel::new(
            r#"{"citations": [{"target": "Energy Market Law", "articles": [7]}]}"#,
        );
        builder(store.clone(), MockEmbedder::new(DIM), second)
            .process(&doc)
            .await
            .unwrap();

        let citations = store.citations_to("Energy Market Law").unwrap();
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].1, articles(&[7]));
    }

    #[tokio::test]
    async fn test_embedding_failure_skips_only_that_chunk() {
        let store = Arc::new(MemoryGraphStore::new());
        let builder = builder(
            store.clone(),
            MockEmbedder::failing_on(DIM, "unembeddable"),
            ScriptedLanguageModel::new(r#"{"citations": []}"#),
        );

        let stats = builder
            .process(&document(
                "Licensing Regulation",
                "Article 1\nFirst.\nArticle 2\nThis one is unembeddable.\nArticle 3\nThird.",
            ))
            .await
            .unwrap();

        assert_eq!(stats.chunks_written, 2);
        assert_eq!(stats.chunks_skipped, 1);
        let chunks = store.chunks_of("Licensing Regulation").await.unwrap();
        let ordinals: Vec<u32> = chunks.iter().map(|c| c.ordinal).collect();
        assert_eq!(ordinals, vec![0, 2]);
    }

    struct WrongDimensionEmbedder;

    #[async_trait::async_trait]
    impl Embedder for WrongDimensionEmbedder {
        async fn embed(&self, _text: &str) -> citegraph_common::Result<Vec<f32>> {
            Err(citegraph_common::AppError::DimensionMismatch {
                expected: DIM,
                actual: 8,
            })
        }

        fn model_name(&self) -> &str {
            "wrong-dimension"
        }

        fn dimension(&self) -> usize {
            DIM
        }
    }

    #[tokio::test]
    async fn test_permanent_embedding_failure_fails_the_document() {
        let store = Arc::new(MemoryGraphStore::new());
        let builder = GraphBuilder::new(
            store.clone(),
            Arc::new(WrongDimensionEmbedder),
            Arc::new(ScriptedLanguageModel::new(r#"{"citations": []}"#)),
            &AppConfig::default(),
        )
        .unwrap();

        let result = builder
            .process(&document("Licensing Regulation", "Article 1\nFirst."))
            .await;

        let err = tokio_test::assert_err!(result);
        assert!(matches!(
            err,
            IngestionError::Service(citegraph_common::AppError::DimensionMismatch { .. })
        ));
        assert!(store.chunks_of("Licensing Regulation").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_extraction_writes_no_citations() {
        let store = Arc::new(MemoryGraphStore::new());
        let builder = builder(
            store.clone(),
            MockEmbedder::new(DIM),
            ScriptedLanguageModel::new("Sure! Here are the citations: Energy Market Law"),
        );

        let stats = builder
            .process(&document("Licensing Regulation", "Article 1\nFees."))
            .await
            .unwrap();

        assert_eq!(stats.chunks_written, 1);
        assert_eq!(stats.citations_written, 0);
        assert!(store.document("Energy Market Law").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_batch_continues_past_invalid_document() {
        let store = Arc::new(MemoryGraphStore::new());
        let builder = builder(
            store.clone(),
            MockEmbedder::new(DIM),
            ScriptedLanguageModel::new(r#"{"citations": []}"#),
        );

        let mut invalid = document("Broken Record", "Article 1\nText.");
        invalid.institution = String::new();

        let report = builder
            .ingest_all(&[
                document("Licensing Regulation", "Article 1\nFees."),
                invalid,
                document("Tariff Regulation", "Article 1\nTariffs."),
            ])
            .await;

        assert_eq!(report.succeeded(), 2);
        let failed: Vec<&str> = report.failed().map(|r| r.document.as_str()).collect();
        assert_eq!(failed, vec!["Broken Record"]);
        assert_eq!(report.documents[2].document, "Tariff Regulation");
        assert_eq!(report.totals().chunks_written, 2);
        assert!(store.document("Broken Record").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_batch_reports_in_input_order() {
        let store = Arc::new(MemoryGraphStore::new());
        let mut config = AppConfig::default();
        config.ingestion.concurrency = 4;
        let builder = GraphBuilder::new(
            store.clone(),
            Arc::new(MockEmbedder::new(DIM)),
            Arc::new(ScriptedLanguageModel::new(r#"{"citations": []}"#)),
            &config,
        )
        .unwrap();

        let documents: Vec<SourceDocument> = (0..6)
            .map(|i| document(&format!("Regulation {}", i), "Article 1\nText."))
            .collect();
        let report = builder.ingest_all(&documents).await;

        let names: Vec<&str> = report.documents.iter().map(|r| r.document.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Regulation 0",
                "Regulation 1",
                "Regulation 2",
                "Regulation 3",
                "Regulation 4",
                "Regulation 5"
            ]
        );
        assert_eq!(report.succeeded(), 6);
    }
}
