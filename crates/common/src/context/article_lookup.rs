//! Article heading patterns and targeted article lookup

use crate::config::HeadingVocabulary;
use crate::errors::{AppError, Result};
use crate::graph::{ArticleSet, StoredChunk};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

/// Regex alternation over the heading keywords, longest first.
///
/// Keywords are escaped and inner spaces accept runs of spaces or tabs. A
/// heading never spans a line break.
pub fn heading_alternation(vocabulary: &HeadingVocabulary) -> String {
    let mut keywords: Vec<&str> = vec![
        vocabulary.temporary.as_str(),
        vocabulary.additional.as_str(),
        vocabulary.article.as_str(),
    ];
    keywords.retain(|k| !k.trim().is_empty());
    keywords.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    keywords.dedup();

    let escaped: Vec<String> = keywords
        .iter()
        .map(|k| {
            k.split_whitespace()
                .map(regex_lite::escape)
                .collect::<Vec<_>>()
                .join(r"[ \t]+")
        })
        .collect();
    format!("(?:{})", escaped.join("|"))
}

/// A chunk that holds a requested article
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleHit {
    pub article: u32,
    pub chunk_id: String,
    pub text: String,
}

/// Result of looking up a set of articles in one document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleLookup {
    /// In ascending article order
    pub found: Vec<ArticleHit>,
    pub missing: ArticleSet,
}

/// Finds the chunk holding "Article N" (any heading form) in a document
pub struct ArticleMatcher {
    alternation: String,
}

impl ArticleMatcher {
    pub fn new(vocabulary: &HeadingVocabulary) -> Result<Self> {
        let alternation = heading_alternation(vocabulary);
        if alternation == "(?:)" {
            return Err(AppError::Configuration {
                message: "chunking.headings must name at least one keyword".to_string(),
            });
        }
        Ok(Self { alternation })
    }

    fn pattern_for(&self, article: u32) -> Result<Regex> {
        Regex::new(&format!(r"(?i){}[ \t]+{}\b", self.alternation, article)).map_err(|e| {
            AppError::Internal {
                message: format!("invalid article pattern: {}", e),
            }
        })
    }

    /// For each requested article keep the first chunk, in the given order,
    /// whose text mentions its heading. The number must match whole, so a
    /// request for 1 does not match "Article 12".
    pub fn lookup(&self, chunks: &[StoredChunk], articles: &ArticleSet) -> Result<ArticleLookup> {
        let mut result = ArticleLookup::default();

        for &article in articles {
            let pattern = self.pattern_for(article)?;
            match chunks.iter().find(|c| pattern.is_match(&c.text)) {
                Some(chunk) => result.found.push(ArticleHit {
                    article,
                    chunk_id: chunk.id.clone(),
                    text: chunk.text.clone(),
                }),
                None => {
                    result.missing.insert(article);
                }
            }
        }

        Ok(result)
    }
}
