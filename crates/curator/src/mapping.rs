//! Operator-supplied canonical name mapping
//!
//! ```toml
//! [[entries]]
//! malformed = "Law No. 6446"
//! canonical = "Electricity Market Law No. 6446"
//! ```
//!
//! Entries are applied in file order.

use citegraph_common::errors::{AppError, Result};
use config::{Config, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MappingEntry {
    pub malformed: String,
    pub canonical: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CanonicalMapping {
    #[serde(default)]
    pub entries: Vec<MappingEntry>,
}

impl CanonicalMapping {
    /// Load a TOML mapping file
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(AppError::Configuration {
                message: format!("Mapping file not found: {}", path.display()),
            });
        }
        let mapping = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        Ok(mapping)
    }

    /// Parse a TOML mapping
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let mapping = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        Ok(mapping)
    }

    pub fn from_pairs<I, M, C>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (M, C)>,
        M: Into<String>,
        C: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(malformed, canonical)| MappingEntry {
                    malformed: malformed.into(),
                    canonical: canonical.into(),
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
