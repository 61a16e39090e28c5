//! Ingestion error types

use citegraph_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("PDF parse error for {path}: {message}")]
    PdfParse { path: String, message: String },

    #[error("Unreadable source {path}: {message}")]
    Source { path: String, message: String },

    #[error("Invalid document record: {0}")]
    Validation(String),

    #[error("Chunking error: {0}")]
    Chunking(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Graph store failures and permanent model-service failures
    #[error("{0}")]
    Service(#[from] AppError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<validator::ValidationErrors> for IngestionError {
    fn from(e: validator::ValidationErrors) -> Self {
        IngestionError::Validation(e.to_string())
    }
}
