//! Graph-augmented retrieval
//!
//! 1. Seed: nearest chunks to the question embedding
//! 2. One hop: citation edges leaving the seeds
//! 3. Two hops: the cited articles' text inside each cited document
//!
//! The assembled context is then handed to the synthesizer. Nothing is
//! written to the graph.

use super::article_lookup::ArticleMatcher;
use super::assembler::{Relation, RetrievalContext};
use super::synthesizer::{SynthesisOptions, Synthesizer};
use crate::config::AppConfig;
use crate::embeddings::{normalize_whitespace, Embedder};
use crate::errors::Result;
use crate::graph::{GraphStore, StoredChunk};
use crate::llm::LanguageModel;
use crate::metrics;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};
use uuid::Uuid;

pub struct Retriever {
    store: Arc<dyn GraphStore>,
    embedder: Arc<dyn Embedder>,
    synthesizer: Synthesizer,
    matcher: ArticleMatcher,
    seed_k: usize,
    no_results_answer: String,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn GraphStore>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
        config: &AppConfig,
    ) -> Result<Self> {
        let synthesizer = Synthesizer::new(
            llm,
            SynthesisOptions {
                fallback_answer: config.retrieval.fallback_answer.clone(),
                temperature: config.llm.answer_temperature,
            },
        );

        Ok(Self {
            store,
            embedder,
            synthesizer,
            matcher: ArticleMatcher::new(&config.chunking.headings)?,
            seed_k: config.retrieval.seed_k,
            no_results_answer: config.retrieval.no_results_answer.clone(),
        })
    }

    /// Gather seeds, relations and cited articles without calling the model
    #[instrument(skip(self), fields(query_id = %Uuid::new_v4()))]
    pub async fn retrieve(&self, query: &str) -> Result<RetrievalContext> {
        let embedding = self.embedder.embed(&normalize_whitespace(query)).await?;

        let seeds = self.store.nearest_chunks(&embedding, self.seed_k).await?;
        debug!(seeds = seeds.len(), "Vector seeding done");
        if seeds.is_empty() {
            return Ok(RetrievalContext {
                query: query.to_string(),
                ..Default::default()
            });
        }

        let seed_ids: Vec<String> = seeds.iter().map(|s| s.chunk_id.clone()).collect();
        let citations = self.store.citations_from(&seed_ids).await?;
        debug!(relations = citations.len(), "Citation hop done");

        // Cited documents are fetched once per question
        let mut documents: HashMap<String, Vec<StoredChunk>> = HashMap::new();
        let mut relations = Vec::with_capacity(citations.len());

        for citation in citations {
            if citation.articles.is_empty() {
                relations.push(Relation {
                    source_document: citation.source_document,
                    target_document: citation.target_document,
                    requested: citation.articles,
                    found: Vec::new(),
                    missing: Default::default(),
                });
                continue;
            }

            if !documents.contains_key(&citation.target_document) {
                let chunks = self.store.chunks_of(&citation.target_document).await?;
                if chunks.is_empty() {
                    debug!(document = %citation.target_document, "Cited document has no chunks");
                }
                documents.insert(citation.target_document.clone(), chunks);
            }
            let chunks = documents
                .get(&citation.target_document)
                .map(Vec::as_slice)
                .unwrap_or_default();

            let lookup = self.matcher.lookup(chunks, &citation.articles)?;
            relations.push(Relation {
                source_document: citation.source_document,
                target_document: citation.target_document,
                requested: citation.articles,
                found: lookup.found,
                missing: lookup.missing,
            });
        }

        Ok(RetrievalContext {
            query: query.to_string(),
            seeds,
            relations,
        })
    }

    /// Answer a question
    pub async fn answer(&self, query: &str) -> Result<String> {
        self.answer_streaming(query, |_| {}).await
    }

    /// Answer a question, forwarding each streamed fragment to `on_token`
    pub async fn answer_streaming<F>(&self, query: &str, mut on_token: F) -> Result<String>
    where
        F: FnMut(&str) + Send,
    {
        let start = Instant::now();
        let context = self.retrieve(query).await?;

        if context.is_empty() {
            info!("No seed chunks for question");
            on_token(&self.no_results_answer);
            metrics::record_query(start.elapsed().as_secs_f64(), 0, 0, false);
            return Ok(self.no_results_answer.clone());
        }

        info!(
            seeds = context.seeds.len(),
            relations = context.relations.len(),
            articles_found = context.article_hits().count(),
            "Context assembled"
        );

        let answer = self.synthesizer.synthesize(&context, on_token).await?;
        metrics::record_query(
            start.elapsed().as_secs_f64(),
            context.seeds.len(),
            context.relations.len(),
            true,
        );
        Ok(answer)
    }
}
