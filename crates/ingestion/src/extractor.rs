//! LLM-driven citation extraction
//!
//! The model's reply is an untrusted payload. It is parsed into an
//! [`Extraction`] and only well-formed entries become citations; anything
//! else leaves the chunk without citations and ingestion carries on.

use citegraph_common::graph::ArticleSet;
use citegraph_common::llm::{CompletionRequest, LanguageModel};
use citegraph_common::metrics;
use regex_lite::Regex;
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = r#"You are an analyst of legal and regulatory texts. Analyse the text passage you are given and extract structured data in the following JSON format.

JSON SCHEMA:
{
  "citations": [
    {
      "target": "string (the cited document's name exactly as it appears in the text, e.g. 'Law No. 6446' or 'this Regulation')",
      "articles": [int]
    }
  ]
}

INSTRUCTIONS:
1. Output JSON only. Do not add any explanation.
2. Find every document the text cites, including the current document.
3. Write 'target' exactly as the cited document is named in the text.
4. Put the cited integer article numbers in 'articles'. Do NOT include paragraph numbers such as (1) or (2).
5. If there are no citations, return "citations" as an empty list []."#;

/// A citation candidate as named by the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCitation {
    /// Target document name, unnormalized
    pub target: String,
    pub articles: ArticleSet,
}

/// Validated model output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Valid(Vec<RawCitation>),
    Malformed { reason: String },
}

impl Extraction {
    /// Validate a raw model reply
    pub fn parse(payload: &str) -> Self {
        let value: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(e) => {
                return Extraction::Malformed {
                    reason: format!("not JSON: {}", e),
                }
            }
        };

        let Some(object) = value.as_object() else {
            return Extraction::Malformed {
                reason: "top level is not an object".to_string(),
            };
        };

        let entries = match object.get("citations") {
            None | Some(Value::Null) => return Extraction::Valid(Vec::new()),
            Some(Value::Array(entries)) => entries,
            Some(_) => {
                return Extraction::Malformed {
                    reason: "'citations' is not an array".to_string(),
                }
            }
        };

        let citations = entries
            .iter()
            .filter_map(|entry| {
                let target = entry.get("target")?.as_str()?.trim();
                if target.is_empty() {
                    return None;
                }
                Some(RawCitation {
                    target: target.to_string(),
                    articles: entry
                        .get("articles")
                        .map(clean_article_numbers)
                        .unwrap_or_default(),
                })
            })
            .collect();

        Extraction::Valid(citations)
    }

    pub fn into_citations(self) -> Vec<RawCitation> {
        match self {
            Extraction::Valid(citations) => citations,
            Extraction::Malformed { .. } => Vec::new(),
        }
    }
}

fn digit_run() -> Option<&'static Regex> {
    static DIGITS: OnceLock<Option<Regex>> = OnceLock::new();
    DIGITS.get_or_init(|| Regex::new(r"\d+").ok()).as_ref()
}

/// First run of ASCII digits in `text`, if it fits in a u32
fn scan_digits(text: &str) -> Option<u32> {
    digit_run()?.find(text)?.as_str().parse().ok()
}

fn article_number(item: &Value) -> Option<u32> {
    match item {
        Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                return u32::try_from(v).ok();
            }
            match n.as_f64() {
                Some(f) if f.is_finite() && f >= 0.0 && f <= u32::MAX as f64 => Some(f.trunc() as u32),
                _ => scan_digits(&n.to_string()),
            }
        }
        Value::String(s) => s.trim().parse().ok().or_else(|| scan_digits(s)),
        _ => None,
    }
}

/// Coerce the model's article references into a set of article numbers.
///
/// `5`, `"5"` and `"Article 5"` all become 5; values without digits are
/// dropped. Anything that is not an array yields an empty set.
pub fn clean_article_numbers(raw: &Value) -> ArticleSet {
    match raw {
        Value::Array(items) => items.iter().filter_map(article_number).collect(),
        _ => ArticleSet::new(),
    }
}

/// Asks the language model for the citations in a chunk
pub struct CitationExtractor {
    llm: Arc<dyn LanguageModel>,
    temperature: f32,
}

impl CitationExtractor {
    pub fn new(llm: Arc<dyn LanguageModel>, temperature: f32) -> Self {
        Self { llm, temperature }
    }

    fn request(&self, chunk_text: &str) -> CompletionRequest {
        let user = format!("Analyse the following text:\n\nTEXT:\n\"\"\"\n{}\n\"\"\"", chunk_text);
        CompletionRequest::json(SYSTEM_PROMPT, user).with_temperature(Some(self.temperature))
    }

    /// Run the model and validate its reply; a failed call is reported as malformed
    pub async fn extract_raw(&self, chunk_text: &str) -> Extraction {
        match self.llm.complete(&self.request(chunk_text)).await {
            Ok(reply) => Extraction::parse(&reply),
            Err(e) => Extraction::Malformed {
                reason: format!("model call failed: {}", e),
            },
        }
    }

    /// Citations in `chunk_text`; empty when the model output is unusable
    pub async fn extract(&self, chunk_text: &str) -> Vec<RawCitation> {
        let extraction = self.extract_raw(chunk_text).await;
        if let Extraction::Malformed { reason } = &extraction {
            warn!(reason = %reason, "Discarding malformed citation extraction");
            metrics::record_malformed_extraction();
        }

        let citations = extraction.into_citations();
        debug!(citations = citations.len(), "Citations extracted");
        citations
    }
}
