//! Error types for CiteGraph services
//!
//! Provides:
//! - Distinct error types for each external boundary (graph store, embedding, language model)
//! - Machine-readable error codes
//! - Transient vs. permanent classification used by the retry and skip policies

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,

    // Resource errors (4xxx)
    NotFound,
    DocumentNotFound,

    // Graph store errors (7xxx)
    DatabaseError,
    ConnectionError,
    MigrationError,

    // External service errors (8xxx)
    UpstreamError,
    EmbeddingError,
    DimensionMismatch,
    LanguageModelError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,

            ErrorCode::NotFound => 4001,
            ErrorCode::DocumentNotFound => 4002,

            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,
            ErrorCode::MigrationError => 7004,

            ErrorCode::UpstreamError => 8001,
            ErrorCode::EmbeddingError => 8002,
            ErrorCode::DimensionMismatch => 8003,
            ErrorCode::LanguageModelError => 8007,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    // Resource errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    #[error("Document not found: {name}")]
    DocumentNotFound { name: String },

    // Graph store errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database query error: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    #[error("Schema migration failed: {message}")]
    Migration { message: String },

    // External service errors
    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Language model error: {message}")]
    LanguageModel { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::DocumentNotFound { .. } => ErrorCode::DocumentNotFound,
            AppError::Database(_) | AppError::Query(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::Migration { .. } => ErrorCode::MigrationError,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            AppError::DimensionMismatch { .. } => ErrorCode::DimensionMismatch,
            AppError::LanguageModel { .. } => ErrorCode::LanguageModelError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Whether retrying the same call could succeed.
    ///
    /// Only failures of an external service are transient. Validation,
    /// configuration and dimension errors will fail the same way every time.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::EmbeddingError { .. }
            | AppError::LanguageModel { .. }
            | AppError::DatabaseConnection { .. } => true,
            AppError::HttpClient(e) => {
                e.is_timeout() || e.is_connect() || e.status().map_or(false, |s| s.is_server_error())
            }
            _ => false,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Migration {
            message: err.to_string(),
        }
    }
}
