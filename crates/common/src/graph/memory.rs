//! In-process graph store with the same upsert semantics as Postgres

use super::*;
use crate::embeddings::cosine_similarity;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    pub category: Option<String>,
    pub publisher: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct ChunkRecord {
    document: String,
    ordinal: u32,
    text: String,
    embedding: Vec<f32>,
}

/// Full copy of the graph, for comparing states in tests
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphSnapshot {
    pub institutions: BTreeSet<String>,
    pub documents: BTreeMap<String, DocumentRecord>,
    /// chunk id -> (document, ordinal, text)
    pub chunks: BTreeMap<String, (String, u32, String)>,
    /// (chunk id, target document) -> articles
    pub citations: BTreeMap<(String, String), ArticleSet>,
}

#[derive(Default)]
struct Graph {
    institutions: BTreeSet<String>,
    documents: BTreeMap<String, DocumentRecord>,
    chunks: HashMap<String, ChunkRecord>,
    citations: BTreeMap<(String, String), ArticleSet>,
}

#[derive(Default)]
pub struct MemoryGraphStore {
    graph: RwLock<Graph>,
}

fn poisoned<T>(_: T) -> AppError {
    AppError::Internal {
        message: "graph lock poisoned".to_string(),
    }
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Result<GraphSnapshot> {
        let graph = self.graph.read().map_err(poisoned)?;
        Ok(GraphSnapshot {
            institutions: graph.institutions.clone(),
            documents: graph.documents.clone(),
            chunks: graph
                .chunks
                .iter()
                .map(|(id, c)| (id.clone(), (c.document.clone(), c.ordinal, c.text.clone())))
                .collect(),
            citations: graph.citations.clone(),
        })
    }

    pub fn document(&self, name: &str) -> Result<Option<DocumentRecord>> {
        let graph = self.graph.read().map_err(poisoned)?;
        Ok(graph.documents.get(name).cloned())
    }

    /// Citation edges pointing at `target`
    pub fn citations_to(&self, target: &str) -> Result<Vec<(String, ArticleSet)>> {
        let graph = self.graph.read().map_err(poisoned)?;
        Ok(graph
            .citations
            .iter()
            .filter(|((_, t), _)| t == target)
            .map(|((chunk, _), articles)| (chunk.clone(), articles.clone()))
            .collect())
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn ping(&self) -> Result<()> {
        self.graph.read().map(|_| ()).map_err(poisoned)
    }

    async fn get_or_create_institution(&self, name: &str) -> Result<InstitutionHandle> {
        let mut graph = self.graph.write().map_err(poisoned)?;
        graph.institutions.insert(name.to_string());
        Ok(InstitutionHandle {
            name: name.to_string(),
        })
    }

    async fn get_or_create_document(&self, name: &str) -> Result<DocumentHandle> {
        let mut graph = self.graph.write().map_err(poisoned)?;
        graph
            .documents
            .entry(name.to_string())
            .or_insert(DocumentRecord {
                category: None,
                publisher: None,
            });
        Ok(DocumentHandle {
            name: name.to_string(),
        })
    }

    async fn set_document_attributes(
        &self,
        document: &DocumentHandle,
        attributes: &DocumentAttributes,
    ) -> Result<()> {
        let mut graph = self.graph.write().map_err(poisoned)?;
        if !graph.institutions.contains(&attributes.publisher.name) {
            return Err(AppError::NotFound {
                resource_type: "institution".to_string(),
                id: attributes.publisher.name.clone(),
            });
        }
        let record = graph
            .documents
            .get_mut(&document.name)
            .ok_or_else(|| AppError::DocumentNotFound {
                name: document.name.clone(),
            })?;
        record.category = Some(attributes.category.clone());
        record.publisher = Some(attributes.publisher.name.clone());
        Ok(())
    }

    async fn get_or_create_chunk(
        &self,
        document: &DocumentHandle,
        chunk: &NewChunk,
    ) -> Result<ChunkHandle> {
        let mut graph = self.graph.write().map_err(poisoned)?;
        if !graph.documents.contains_key(&document.name) {
            return Err(AppError::DocumentNotFound {
                name: document.name.clone(),
            });
        }
        let id = chunk_id(&document.name, chunk.ordinal, &chunk.text);
        graph.chunks.entry(id.clone()).or_insert_with(|| ChunkRecord {
            document: document.name.clone(),
            ordinal: chunk.ordinal,
            text: chunk.text.clone(),
            embedding: chunk.embedding.clone(),
        });
        Ok(ChunkHandle { id })
    }

    async fn set_citation(
        &self,
        chunk: &ChunkHandle,
        target: &DocumentHandle,
        articles: &ArticleSet,
    ) -> Result<()> {
        let mut graph = self.graph.write().map_err(poisoned)?;
        if !graph.chunks.contains_key(&chunk.id) {
            return Err(AppError::NotFound {
                resource_type: "chunk".to_string(),
                id: chunk.id.clone(),
            });
        }
        if !graph.documents.contains_key(&target.name) {
            return Err(AppError::DocumentNotFound {
                name: target.name.clone(),
            });
        }
        graph
            .citations
            .insert((chunk.id.clone(), target.name.clone()), articles.clone());
        Ok(())
    }

    async fn rewire_citations(&self, malformed: &str, canonical: &str) -> Result<RewireOutcome> {
        let mut graph = self.graph.write().map_err(poisoned)?;
        if !graph.documents.contains_key(canonical) {
            return Ok(RewireOutcome::CanonicalMissing);
        }
        if malformed == canonical {
            return Ok(RewireOutcome::Moved(0));
        }

        let keys: Vec<(String, String)> = graph
            .citations
            .keys()
            .filter(|(_, target)| target == malformed)
            .cloned()
            .collect();

        for key in &keys {
            if let Some(articles) = graph.citations.remove(key) {
                graph
                    .citations
                    .insert((key.0.clone(), canonical.to_string()), articles);
            }
        }
        Ok(RewireOutcome::Moved(keys.len() as u64))
    }

    async fn prune_placeholder(&self, name: &str) -> Result<PruneOutcome> {
        let mut graph = self.graph.write().map_err(poisoned)?;
        let Some(record) = graph.documents.get(name) else {
            return Ok(PruneOutcome::Absent);
        };

        let cited = graph.citations.keys().any(|(_, target)| target == name);
        let owns_chunks = graph.chunks.values().any(|c| c.document == name);
        if cited || owns_chunks || record.publisher.is_some() {
            return Ok(PruneOutcome::Retained);
        }

        graph.documents.remove(name);
        Ok(PruneOutcome::Deleted)
    }

    async fn nearest_chunks(&self, embedding: &[f32], k: usize) -> Result<Vec<SeedChunk>> {
        let graph = self.graph.read().map_err(poisoned)?;
        let mut scored: Vec<SeedChunk> = graph
            .chunks
            .iter()
            .map(|(id, chunk)| SeedChunk {
                chunk_id: id.clone(),
                text: chunk.text.clone(),
                document: chunk.document.clone(),
                institution: graph
                    .documents
                    .get(&chunk.document)
                    .and_then(|d| d.publisher.clone()),
                score: cosine_similarity(embedding, &chunk.embedding),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn citations_from(&self, chunk_ids: &[String]) -> Result<Vec<CitationRecord>> {
        let graph = self.graph.read().map_err(poisoned)?;
        let mut records = Vec::new();
        for id in chunk_ids {
            let Some(chunk) = graph.chunks.get(id) else {
                continue;
            };
            for ((source, target), articles) in &graph.citations {
                if source == id {
                    records.push(CitationRecord {
                        chunk_id: id.clone(),
                        source_document: chunk.document.clone(),
                        target_document: target.clone(),
                        articles: articles.clone(),
                    });
                }
            }
        }
        Ok(records)
    }

    async fn chunks_of(&self, document: &str) -> Result<Vec<StoredChunk>> {
        let graph = self.graph.read().map_err(poisoned)?;
        let mut chunks: Vec<StoredChunk> = graph
            .chunks
            .iter()
            .filter(|(_, c)| c.document == document)
            .map(|(id, c)| StoredChunk {
                id: id.clone(),
                ordinal: c.ordinal,
                text: c.text.clone(),
            })
            .collect();
        chunks.sort_by(|a, b| a.ordinal.cmp(&b.ordinal).then_with(|| a.id.cmp(&b.id)));
        Ok(chunks)
    }
}
