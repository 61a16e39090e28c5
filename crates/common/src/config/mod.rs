//! Configuration management for CiteGraph services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml, config/local.toml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Postgres connection used by the `postgres` graph backend
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Graph store backend selection
    #[serde(default)]
    pub graph: GraphConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Language model configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Article-aware chunking
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Query-time retrieval
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Batch ingestion
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// Canonical name curation
    #[serde(default)]
    pub curation: CurationConfig,

    /// Chat transcript
    #[serde(default)]
    pub transcript: TranscriptConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphConfig {
    /// Graph store backend: postgres, memory
    #[serde(default = "default_graph_backend")]
    pub backend: String,

    /// Apply embedded schema migrations at startup
    #[serde(default = "default_enabled")]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: ollama, openai, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL
    #[serde(default = "default_ollama_base")]
    pub api_base: String,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension, must match the chunk vector column
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Total time spent retrying a failing request, in seconds
    #[serde(default = "default_retry_budget")]
    pub retry_budget_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Language model provider: ollama, mock
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// API base URL
    #[serde(default = "default_ollama_base")]
    pub api_base: String,

    /// Model to use
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Sampling temperature for citation extraction
    #[serde(default = "default_extraction_temperature")]
    pub extraction_temperature: f32,

    /// Sampling temperature for answer synthesis (provider default when unset)
    pub answer_temperature: Option<f32>,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Total time spent retrying a failing request, in seconds
    #[serde(default = "default_retry_budget")]
    pub retry_budget_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between consecutive sub-chunks in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Article heading keywords
    #[serde(default)]
    pub headings: HeadingVocabulary,
}

/// Keywords that introduce an article heading, each followed by a number.
///
/// Shared by the chunker (where a heading at the start of a line opens a new
/// segment) and the retriever (where a heading anywhere in a chunk marks the
/// article it contains).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HeadingVocabulary {
    #[serde(default = "default_article_keyword")]
    pub article: String,

    #[serde(default = "default_additional_keyword")]
    pub additional: String,

    #[serde(default = "default_temporary_keyword")]
    pub temporary: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Number of seed chunks fetched by vector similarity
    #[serde(default = "default_seed_k")]
    pub seed_k: usize,

    /// Sentence the model must emit when the context is insufficient
    #[serde(default = "default_fallback_answer")]
    pub fallback_answer: String,

    /// Answer returned without calling the model when nothing is retrieved
    #[serde(default = "default_no_results_answer")]
    pub no_results_answer: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestionConfig {
    /// Root of the `<institution>/<category>/<document>` tree
    #[serde(default = "default_data_path")]
    pub data_path: String,

    /// Documents processed concurrently
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Display names for institution folder names
    #[serde(default)]
    pub institution_names: HashMap<String, String>,

    /// Display names for category folder names
    #[serde(default)]
    pub category_names: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CurationConfig {
    /// Operator-maintained malformed -> canonical name table
    #[serde(default = "default_mapping_path")]
    pub mapping_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscriptConfig {
    /// Append-only chat transcript file
    #[serde(default = "default_transcript_path")]
    pub path: String,

    /// Record query/answer pairs
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name attached to log lines
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_database_url() -> String { "postgres://localhost/citegraph".to_string() }
fn default_max_connections() -> u32 { 10 }
fn default_min_connections() -> u32 { 1 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_graph_backend() -> String { "postgres".to_string() }
fn default_embedding_provider() -> String { "ollama".to_string() }
fn default_ollama_base() -> String { "http://localhost:11434".to_string() }
fn default_embedding_model() -> String { "bge-m3".to_string() }
fn default_embedding_dimension() -> usize { 1024 }
fn default_embedding_timeout() -> u64 { 30 }
fn default_retry_budget() -> u64 { 10 }
fn default_llm_provider() -> String { "ollama".to_string() }
fn default_llm_model() -> String { "gemma3:4b".to_string() }
fn default_extraction_temperature() -> f32 { 0.3 }
fn default_llm_timeout() -> u64 { 120 }
fn default_chunk_size() -> usize { 1000 }
fn default_chunk_overlap() -> usize { 100 }
fn default_article_keyword() -> String { "Article".to_string() }
fn default_additional_keyword() -> String { "Additional Article".to_string() }
fn default_temporary_keyword() -> String { "Temporary Article".to_string() }
fn default_seed_k() -> usize { 5 }
fn default_fallback_answer() -> String {
    "I could not find this information in the provided documents.".to_string()
}
fn default_no_results_answer() -> String { "No relevant information was found.".to_string() }
fn default_data_path() -> String { "./data".to_string() }
fn default_concurrency() -> usize { 1 }
fn default_mapping_path() -> String { "config/canonical_names.toml".to_string() }
fn default_transcript_path() -> String { "chat_history.txt".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 0 }
fn default_service_name() -> String { "citegraph".to_string() }
fn default_enabled() -> bool { true }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            backend: default_graph_backend(),
            run_migrations: default_enabled(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: default_ollama_base(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            retry_budget_secs: default_retry_budget(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            api_base: default_ollama_base(),
            model: default_llm_model(),
            extraction_temperature: default_extraction_temperature(),
            answer_temperature: None,
            timeout_secs: default_llm_timeout(),
            retry_budget_secs: default_retry_budget(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            headings: HeadingVocabulary::default(),
        }
    }
}

impl Default for HeadingVocabulary {
    fn default() -> Self {
        Self {
            article: default_article_keyword(),
            additional: default_additional_keyword(),
            temporary: default_temporary_keyword(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            seed_k: default_seed_k(),
            fallback_answer: default_fallback_answer(),
            no_results_answer: default_no_results_answer(),
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            concurrency: default_concurrency(),
            institution_names: HashMap::new(),
            category_names: HashMap::new(),
        }
    }
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            mapping_path: default_mapping_path(),
        }
    }
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            path: default_transcript_path(),
            enabled: default_enabled(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__LLM__MODEL=llama3.1
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Embedding request timeout as Duration
    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding.timeout_secs)
    }

    /// Language model request timeout as Duration
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs)
    }
}
