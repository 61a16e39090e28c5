//! CiteGraph Common Library
//!
//! Shared code for the CiteGraph binaries including:
//! - Citation graph store (Postgres + pgvector, in-memory)
//! - Embedding and language model client abstractions
//! - Graph-augmented retrieval engine
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod context;
pub mod embeddings;
pub mod errors;
pub mod graph;
pub mod llm;
pub mod metrics;
pub mod resilience;
pub mod telemetry;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use graph::GraphStore;
pub use llm::LanguageModel;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
