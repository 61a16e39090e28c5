//! PDF text extraction
//!
//! Extracts text page by page with lopdf. Line breaks survive cleaning
//! because the chunker finds article headings at line starts.

use crate::errors::IngestionError;
use std::path::Path;
use tracing::{debug, warn};

/// Extract text content from a PDF file
pub fn extract_text_from_pdf(path: &Path) -> Result<String, IngestionError> {
    let doc = lopdf::Document::load(path).map_err(|e| IngestionError::PdfParse {
        path: path.display().to_string(),
        message: format!("Failed to load PDF: {}", e),
    })?;

    let pages = doc.get_pages();
    debug!(page_count = pages.len(), "Extracting text from PDF");

    let mut text = String::new();
    for page_num in pages.keys() {
        match doc.extract_text(&[*page_num]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(e) => {
                warn!(page = page_num, error = %e, "Failed to extract text from page, skipping");
            }
        }
    }

    let cleaned = clean_text(&text);
    if cleaned.is_empty() {
        return Err(IngestionError::PdfParse {
            path: path.display().to_string(),
            message: "No text content extracted from PDF".to_string(),
        });
    }

    debug!(
        original_len = text.len(),
        cleaned_len = cleaned.len(),
        "Text extraction complete"
    );

    Ok(cleaned)
}

/// Collapse spaces inside each line, drop runs of blank lines, strip BOMs
/// and normalize typographic quotes
pub(crate) fn clean_text(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut previous_blank = true;

    for line in text.lines() {
        let line = line
            .replace('\u{FEFF}', "")
            .replace(['\u{201C}', '\u{201D}'], "\"")
            .replace(['\u{2018}', '\u{2019}'], "'");
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");

        if line.is_empty() {
            if !previous_blank {
                lines.push(String::new());
            }
            previous_blank = true;
        } else {
            lines.push(line);
            previous_blank = false;
        }
    }

    lines.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_keeps_line_breaks() {
        let input = "Article  1\n   Scope   of\tthe law\n\n\n\nArticle 2\n";
        assert_eq!(clean_text(input), "Article 1\nScope of the law\n\nArticle 2");
    }

    #[test]
    fn test_clean_text_normalizes_quotes_and_bom() {
        let input = "\u{FEFF}the \u{201C}Authority\u{201D} and the licensee\u{2019}s duty";
        assert_eq!(clean_text(input), "the \"Authority\" and the licensee's duty");
    }

    #[test]
    fn test_missing_file_is_parse_error() {
        let result = extract_text_from_pdf(Path::new("/nonexistent/regulation.pdf"));
        assert!(matches!(result, Err(IngestionError::PdfParse { .. })));
    }
}
