//! CiteGraph curator
//!
//! Repairs citation edges that point at misspelled or duplicate document
//! names produced during extraction, using a mapping supplied by an operator.

pub mod curator;
pub mod mapping;

pub use curator::{CurationReport, Curator, EntryOutcome, EntryReport};
pub use mapping::{CanonicalMapping, MappingEntry};
