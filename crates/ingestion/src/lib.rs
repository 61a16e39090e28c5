//! CiteGraph ingestion
//!
//! Loads regulatory documents, chunks them at article headings, extracts
//! citations with a language model and writes everything to the citation
//! graph.

pub mod builder;
pub mod chunker;
pub mod errors;
pub mod extractor;
pub mod pdf;
pub mod source;

pub use builder::{BatchReport, DocumentOutcome, DocumentReport, DocumentStats, GraphBuilder};
pub use chunker::{Chunk, Chunker};
pub use errors::IngestionError;
pub use extractor::{clean_article_numbers, CitationExtractor, Extraction, RawCitation};
pub use source::{load_documents, SourceDocument};
