//! Article-aware text chunking
//!
//! Documents are first cut at article headings ("Article N", "Additional
//! Article N", "Temporary Article N" or the configured equivalents). Text
//! before the first heading becomes the introduction. A segment that fits in
//! `chunk_size` characters is one chunk; a longer one is split again by
//! `text-splitter` and every part is prefixed with its heading and a
//! "(Part k)" marker so it stays self-describing.

use crate::errors::IngestionError;
use citegraph_common::config::ChunkingConfig;
use citegraph_common::context::heading_alternation;
use regex_lite::Regex;
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::debug;

const INTRODUCTION: &str = "Introduction";

/// Length of a "\n(Part k)\n" marker without the digits of k
const PART_MARKER_OVERHEAD: usize = "\n(Part )\n".len();

/// A chunk of document text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    /// Heading line, "Introduction", or either with a "(Part k)" suffix
    pub heading_hint: String,
}

pub struct Chunker {
    marker: Regex,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    pub fn new(config: &ChunkingConfig) -> Result<Self, IngestionError> {
        if config.chunk_size == 0 {
            return Err(IngestionError::Config(
                "chunking.chunk_size must be positive".to_string(),
            ));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(IngestionError::Config(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }

        let alternation = heading_alternation(&config.headings);
        if alternation == "(?:)" {
            return Err(IngestionError::Config(
                "chunking.headings must name at least one keyword".to_string(),
            ));
        }
        let marker = Regex::new(&format!(r"(?im)^[ \t]*({}[ \t]+\d+)\b", alternation))
            .map_err(|e| IngestionError::Config(format!("invalid heading pattern: {}", e)))?;

        Ok(Self {
            marker,
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        })
    }

    /// Split a document into ordered chunks
    pub fn chunk(&self, text: &str) -> Result<Vec<Chunk>, IngestionError> {
        let headings: Vec<(usize, usize)> = self
            .marker
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .map(|m| (m.start(), m.end()))
            .collect();

        let mut chunks = Vec::new();

        let intro_end = headings.first().map_or(text.len(), |(start, _)| *start);
        self.push_introduction(text[..intro_end].trim(), &mut chunks)?;

        for (i, (start, end)) in headings.iter().enumerate() {
            let body_end = headings.get(i + 1).map_or(text.len(), |(next, _)| *next);
            let heading = normalize_heading(&text[*start..*end]);
            self.push_article(&heading, text[*end..body_end].trim(), &mut chunks)?;
        }

        debug!(
            input_len = text.len(),
            headings = headings.len(),
            chunk_count = chunks.len(),
            "Text chunked"
        );

        Ok(chunks)
    }

    fn push_introduction(&self, intro: &str, chunks: &mut Vec<Chunk>) -> Result<(), IngestionError> {
        if intro.is_empty() {
            return Ok(());
        }
        if char_len(intro) <= self.chunk_size {
            chunks.push(Chunk {
                text: intro.to_string(),
                heading_hint: INTRODUCTION.to_string(),
            });
            return Ok(());
        }

        for (k, part) in self.split(intro, self.chunk_size)?.into_iter().enumerate() {
            chunks.push(Chunk {
                text: part,
                heading_hint: format!("{} (Part {})", INTRODUCTION, k + 1),
            });
        }
        Ok(())
    }

    fn push_article(
        &self,
        heading: &str,
        body: &str,
        chunks: &mut Vec<Chunk>,
    ) -> Result<(), IngestionError> {
        let whole = if body.is_empty() {
            heading.to_string()
        } else {
            format!("{}\n{}", heading, body)
        };

        if char_len(&whole) <= self.chunk_size {
            chunks.push(Chunk {
                text: whole,
                heading_hint: heading.to_string(),
            });
            return Ok(());
        }

        // Size for three-digit part numbers, then widen until the count fits
        let mut digits = 3;
        let parts = loop {
            let reserve = char_len(heading) + PART_MARKER_OVERHEAD + digits;
            let capacity = self
                .chunk_size
                .saturating_sub(reserve)
                .max(self.chunk_size / 2)
                .max(1);
            let parts = self.split(body, capacity)?;
            let needed = parts.len().to_string().len();
            if needed <= digits {
                break parts;
            }
            digits = needed;
        };

        for (k, part) in parts.into_iter().enumerate() {
            chunks.push(Chunk {
                text: format!("{}\n(Part {})\n{}", heading, k + 1, part),
                heading_hint: format!("{} (Part {})", heading, k + 1),
            });
        }
        Ok(())
    }

    fn split(&self, text: &str, capacity: usize) -> Result<Vec<String>, IngestionError> {
        let overlap = self.chunk_overlap.min(capacity.saturating_sub(1));
        let config = ChunkConfig::new(capacity)
            .with_overlap(overlap)
            .map_err(|e| IngestionError::Chunking(e.to_string()))?;
        let splitter = TextSplitter::new(config);

        Ok(splitter
            .chunks(text)
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// "Article \t 5" becomes "Article 5"
fn normalize_heading(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use citegraph_common::config::HeadingVocabulary;

    fn chunker(size: usize, overlap: usize) -> Chunker {
        Chunker::new(&ChunkingConfig {
            chunk_size: size,
            chunk_overlap: overlap,
            headings: HeadingVocabulary::default(),
        })
        .unwrap()
    }

    #[test]
    fn test_splits_on_article_headings() {
        let text = "Energy Market Regulation\nPublished 2013\n\
                    Article 1\nThis regulation sets licensing rules.\n\
                    Article 2\nDefinitions follow.\n\
                    Temporary Article 1\nExisting licences remain valid.\n\
                    Additional Article 3\nFees are revised yearly.";
        let chunks = chunker(1000, 100).chunk(text).unwrap();

        let hints: Vec<&str> = chunks.iter().map(|c| c.heading_hint.as_str()).collect();
        assert_eq!(
            hints,
            vec![
                "Introduction",
                "Article 1",
                "Article 2",
                "Temporary Article 1",
                "Additional Article 3"
            ]
        );
        assert_eq!(chunks[0].text, "Energy Market Regulation\nPublished 2013");
        assert_eq!(chunks[1].text, "Article 1\nThis regulation sets licensing rules.");
        assert_eq!(chunks[3].text, "Temporary Article 1\nExisting licences remain valid.");
    }

    #[test]
    fn test_headings_are_case_insensitive_and_line_anchored() {
        let text = "ARTICLE 4\nAs stated in Article 9 of the law, fees apply.\n  article 5\nNext.";
        let chunks = chunker(1000, 100).chunk(text).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].heading_hint, "ARTICLE 4");
        assert!(chunks[0].text.contains("Article 9 of the law"));
        assert_eq!(chunks[1].heading_hint, "article 5");
    }

    #[test]
    fn test_wrapped_keyword_is_not_a_heading() {
        let text = "Intro text\nArticle 1\nThe fee is set in this\nArticle\n2000 units are the cap.";
        let chunks = chunker(1000, 100).chunk(text).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].heading_hint, "Article 1");
        assert_eq!(
            chunks[1].text,
            "Article 1\nThe fee is set in this\nArticle\n2000 units are the cap."
        );
    }

    #[test]
    fn test_long_article_is_split_into_prefixed_parts() {
        let body = "The licence holder shall keep records of every transaction. ".repeat(10);
        let text = format!("Article 7\n{}", body);
        let chunks = chunker(200, 20).chunk(&text).unwrap();

        assert!(chunks.len() > 1);
        for (k, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.heading_hint, format!("Article 7 (Part {})", k + 1));
            assert!(chunk
                .text
                .starts_with(&format!("Article 7\n(Part {})\n", k + 1)));
            assert!(chunk.text.chars().count() <= 200);
        }
    }

    #[test]
    fn test_four_digit_part_numbers_stay_within_size() {
        let text = format!("Article 7\n{}", "abcd ".repeat(9000));
        let chunks = chunker(60, 0).chunk(&text).unwrap();

        assert!(chunks.len() >= 1000);
        assert!(chunks[999].text.starts_with("Article 7\n(Part 1000)\n"));
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 60));
    }

    #[test]
    fn test_long_introduction_parts_have_no_prefix() {
        let text = "Preamble sentence about the regulation. ".repeat(10);
        let chunks = chunker(150, 10).chunk(&text).unwrap();

        assert!(chunks.len() > 1);
        assert_eq!(chunks[0].heading_hint, "Introduction (Part 1)");
        assert!(chunks[0].text.starts_with("Preamble"));
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 150));
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let text = format!(
            "Intro\nArticle 1\n{}\nArticle 2\nShort.",
            "Words in a long article body. ".repeat(30)
        );
        let chunker = chunker(120, 15);
        assert_eq!(chunker.chunk(&text).unwrap(), chunker.chunk(&text).unwrap());
    }

    #[test]
    fn test_empty_text() {
        assert!(chunker(1000, 100).chunk("").unwrap().is_empty());
        assert!(chunker(1000, 100).chunk("  \n\t ").unwrap().is_empty());
    }

    #[test]
    fn test_heading_without_body() {
        let chunks = chunker(1000, 100).chunk("Article 1\nArticle 2\nBody").unwrap();
        assert_eq!(chunks[0].text, "Article 1");
        assert_eq!(chunks[1].text, "Article 2\nBody");
    }

    #[test]
    fn test_custom_vocabulary() {
        let chunker = Chunker::new(&ChunkingConfig {
            chunk_size: 1000,
            chunk_overlap: 0,
            headings: HeadingVocabulary {
                article: "Madde".into(),
                additional: "Ek Madde".into(),
                temporary: "Geçici Madde".into(),
            },
        })
        .unwrap();

        let chunks = chunker.chunk("Giriş\nMadde 1\nAmaç\nEk Madde 2\nEk hüküm").unwrap();
        let hints: Vec<&str> = chunks.iter().map(|c| c.heading_hint.as_str()).collect();
        assert_eq!(hints, vec!["Introduction", "Madde 1", "Ek Madde 2"]);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let result = Chunker::new(&ChunkingConfig {
            chunk_size: 100,
            chunk_overlap: 100,
            headings: HeadingVocabulary::default(),
        });
        assert!(matches!(result, Err(IngestionError::Config(_))));
    }
}
