//! Document source
//!
//! Documents live under `data_path` as `<institution>/<category>/<name>.pdf`
//! (or `.txt`). The file stem is the document name; folder names are mapped
//! to display names through the configured tables.

use crate::errors::IngestionError;
use crate::pdf::extract_text_from_pdf;
use citegraph_common::config::IngestionConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use validator::Validate;

/// One document to ingest
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SourceDocument {
    #[validate(length(min = 1, message = "document name must not be empty"))]
    pub name: String,

    #[validate(length(min = 1, message = "institution must not be empty"))]
    pub institution: String,

    #[validate(length(min = 1, message = "category must not be empty"))]
    pub category: String,

    pub text: String,

    #[serde(default)]
    pub source_path: Option<PathBuf>,
}

/// "tedas" -> "Tedas"
fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn display_name(folder: &str, names: &HashMap<String, String>) -> String {
    names.get(folder).cloned().unwrap_or_else(|| capitalize(folder))
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), IngestionError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else if matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("pdf") | Some("txt")
        ) {
            files.push(path);
        }
    }
    Ok(())
}

fn read_text(path: &Path) -> Result<String, IngestionError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("pdf") => extract_text_from_pdf(path),
        _ => std::fs::read_to_string(path).map_err(|e| IngestionError::Source {
            path: path.display().to_string(),
            message: e.to_string(),
        }),
    }
}

fn load_document(
    root: &Path,
    path: &Path,
    config: &IngestionConfig,
) -> Result<Option<SourceDocument>, IngestionError> {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let folders: Vec<&str> = relative
        .parent()
        .map(|p| p.iter().filter_map(|c| c.to_str()).collect())
        .unwrap_or_default();

    let [.., institution, category] = folders.as_slice() else {
        return Err(IngestionError::Source {
            path: path.display().to_string(),
            message: "expected <institution>/<category>/<name> layout".to_string(),
        });
    };

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| IngestionError::Source {
            path: path.display().to_string(),
            message: "file name is not valid UTF-8".to_string(),
        })?;

    let text = read_text(path)?;
    if text.trim().is_empty() {
        return Ok(None);
    }

    Ok(Some(SourceDocument {
        name: name.to_string(),
        institution: display_name(institution, &config.institution_names),
        category: display_name(category, &config.category_names),
        text,
        source_path: Some(path.to_path_buf()),
    }))
}

/// Load every readable document under `config.data_path`, sorted by path.
/// Unreadable files are skipped with a warning.
pub fn load_documents(config: &IngestionConfig) -> Result<Vec<SourceDocument>, IngestionError> {
    let root = Path::new(&config.data_path);
    let mut files = Vec::new();
    collect_files(root, &mut files)?;
    files.sort();

    let mut documents = Vec::with_capacity(files.len());
    for path in files {
        match load_document(root, &path, config) {
            Ok(Some(document)) => {
                info!(
                    document = %document.name,
                    institution = %document.institution,
                    category = %document.category,
                    "Loaded document"
                );
                documents.push(document);
            }
            Ok(None) => warn!(path = %path.display(), "Document has no text, skipping"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to load document, skipping"),
        }
    }

    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, contents: &[u8]) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_loads_layout_with_display_names() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "tedas/regulations/Licensing Regulation.txt", b"Article 1\nScope");
        write(dir.path(), "teias/laws/Energy Law.txt", b"Article 3\nFees");
        write(dir.path(), "teias/laws/notes.md", b"ignored");

        let config = IngestionConfig {
            data_path: dir.path().display().to_string(),
            institution_names: [("tedas".to_string(), "TEDAS".to_string())].into_iter().collect(),
            category_names: [("laws".to_string(), "Law".to_string())].into_iter().collect(),
            ..IngestionConfig::default()
        };

        let documents = load_documents(&config).unwrap();
        assert_eq!(documents.len(), 2);

        assert_eq!(documents[0].name, "Licensing Regulation");
        assert_eq!(documents[0].institution, "TEDAS");
        assert_eq!(documents[0].category, "Regulations");
        assert_eq!(documents[0].text, "Article 1\nScope");

        assert_eq!(documents[1].name, "Energy Law");
        assert_eq!(documents[1].institution, "Teias");
        assert_eq!(documents[1].category, "Law");
    }

    #[test]
    fn test_skips_unreadable_and_empty_files() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "epdk/laws/Broken.pdf", b"not a pdf");
        write(dir.path(), "epdk/laws/Empty.txt", b"   \n");
        write(dir.path(), "Loose.txt", b"Article 1");
        write(dir.path(), "epdk/laws/Market Law.txt", b"Article 1\nMarket");

        let config = IngestionConfig {
            data_path: dir.path().display().to_string(),
            ..IngestionConfig::default()
        };

        let documents = load_documents(&config).unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].name, "Market Law");
        assert_eq!(documents[0].institution, "Epdk");
    }

    #[test]
    fn test_missing_data_path_is_an_error() {
        let config = IngestionConfig {
            data_path: "/nonexistent/citegraph-data".into(),
            ..IngestionConfig::default()
        };
        assert!(matches!(load_documents(&config), Err(IngestionError::Io(_))));
    }

    #[test]
    fn test_record_validation() {
        let document = SourceDocument {
            name: String::new(),
            institution: "Regulator".into(),
            category: "Law".into(),
            text: "Article 1".into(),
            source_path: None,
        };
        assert!(document.validate().is_err());
    }
}
