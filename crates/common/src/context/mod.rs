//! Retrieval context engine
//!
//! - Article heading patterns and targeted article lookup
//! - Structured context assembly
//! - Grounded answer synthesis
//! - The multi-stage retriever tying them together

mod article_lookup;
mod assembler;
mod retriever;
mod synthesizer;

pub use article_lookup::{heading_alternation, ArticleHit, ArticleLookup, ArticleMatcher};
pub use assembler::{Relation, RetrievalContext, UNKNOWN_INSTITUTION};
pub use retriever::Retriever;
pub use synthesizer::{SynthesisOptions, Synthesizer};
