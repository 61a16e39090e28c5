//! Citation graph store
//!
//! Node kinds: institutions, documents, chunks. Edge kinds: a document's
//! publisher, a document containing its chunks, and a chunk citing a document
//! with a set of article numbers.
//!
//! Every write is an idempotent upsert expressed as `get_or_create(key)` plus
//! `set_*` on the returned handle. Document name is the only identity key.

mod memory;
mod postgres;

pub use memory::{GraphSnapshot, MemoryGraphStore};
pub use postgres::PostgresGraphStore;

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Set of cited article numbers; empty means unspecified
pub type ArticleSet = BTreeSet<u32>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstitutionHandle {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentHandle {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkHandle {
    pub id: String,
}

/// Attributes written when the real document is ingested
#[derive(Debug, Clone)]
pub struct DocumentAttributes {
    pub category: String,
    pub publisher: InstitutionHandle,
}

/// A chunk ready to be persisted
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub ordinal: u32,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// A vector search hit joined to its document and publisher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedChunk {
    pub chunk_id: String,
    pub text: String,
    pub document: String,
    /// `None` when the document has no publisher
    pub institution: Option<String>,
    pub score: f32,
}

/// A citation edge seen from its source chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationRecord {
    pub chunk_id: String,
    pub source_document: String,
    pub target_document: String,
    pub articles: ArticleSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredChunk {
    pub id: String,
    pub ordinal: u32,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewireOutcome {
    /// Number of edges moved to the canonical document
    Moved(u64),
    /// The canonical document does not exist; nothing was touched
    CanonicalMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneOutcome {
    Deleted,
    /// Still cited, still owns chunks, or has a publisher
    Retained,
    Absent,
}

/// Deterministic chunk key: hex SHA-256 of (document, ordinal, text)
pub fn chunk_id(document: &str, ordinal: u32, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document.as_bytes());
    hasher.update([0u8]);
    hasher.update(ordinal.to_be_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Check the store is reachable
    async fn ping(&self) -> Result<()>;

    async fn get_or_create_institution(&self, name: &str) -> Result<InstitutionHandle>;

    /// Creates a placeholder (no category, no publisher) when absent
    async fn get_or_create_document(&self, name: &str) -> Result<DocumentHandle>;

    /// Set or overwrite category and publisher
    async fn set_document_attributes(
        &self,
        document: &DocumentHandle,
        attributes: &DocumentAttributes,
    ) -> Result<()>;

    /// Insert the chunk and its containing edge; a no-op when it already exists
    async fn get_or_create_chunk(&self, document: &DocumentHandle, chunk: &NewChunk)
        -> Result<ChunkHandle>;

    /// Upsert the citation edge, replacing any previous article set
    async fn set_citation(
        &self,
        chunk: &ChunkHandle,
        target: &DocumentHandle,
        articles: &ArticleSet,
    ) -> Result<()>;

    /// Move every citation of `malformed` onto `canonical`
    async fn rewire_citations(&self, malformed: &str, canonical: &str) -> Result<RewireOutcome>;

    /// Delete `name` if nothing cites it, it owns no chunks and has no publisher
    async fn prune_placeholder(&self, name: &str) -> Result<PruneOutcome>;

    /// Top-`k` chunks by cosine similarity, best first
    async fn nearest_chunks(&self, embedding: &[f32], k: usize) -> Result<Vec<SeedChunk>>;

    /// Citation edges leaving the given chunks
    async fn citations_from(&self, chunk_ids: &[String]) -> Result<Vec<CitationRecord>>;

    /// Chunks of a document in ordinal order
    async fn chunks_of(&self, document: &str) -> Result<Vec<StoredChunk>>;
}

/// Open the configured graph store backend
pub async fn connect_graph_store(config: &AppConfig) -> Result<Arc<dyn GraphStore>> {
    match config.graph.backend.as_str() {
        "postgres" => {
            let store = PostgresGraphStore::connect(&config.database).await?;
            if config.graph.run_migrations {
                store.migrate().await?;
            }
            store
                .verify_embedding_dimension(config.embedding.dimension)
                .await?;
            Ok(Arc::new(store))
        }
        "memory" => Ok(Arc::new(MemoryGraphStore::new())),
        other => Err(AppError::Configuration {
            message: format!("Unknown graph backend: {}", other),
        }),
    }
}
