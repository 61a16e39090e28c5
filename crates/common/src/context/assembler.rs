//! Structured retrieval context and its prompt rendering

use super::article_lookup::ArticleHit;
use crate::graph::{ArticleSet, SeedChunk};
use serde::{Deserialize, Serialize};

/// Institution label for seeds whose document has no publisher
pub const UNKNOWN_INSTITUTION: &str = "unknown";

/// A citation followed from a seed chunk, with the articles resolved in
/// the cited document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub source_document: String,
    pub target_document: String,
    pub requested: ArticleSet,
    pub found: Vec<ArticleHit>,
    pub missing: ArticleSet,
}

impl Relation {
    /// The citation named no article, so no lookup was made
    pub fn is_unspecified(&self) -> bool {
        self.requested.is_empty()
    }
}

/// Everything gathered for one question
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalContext {
    pub query: String,
    /// Best first
    pub seeds: Vec<SeedChunk>,
    pub relations: Vec<Relation>,
}

fn join_articles(articles: impl IntoIterator<Item = u32>) -> String {
    articles
        .into_iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("  {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

impl RetrievalContext {
    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }

    /// Article hits across all relations
    pub fn article_hits(&self) -> impl Iterator<Item = (&Relation, &ArticleHit)> {
        self.relations
            .iter()
            .flat_map(|r| r.found.iter().map(move |hit| (r, hit)))
    }

    /// Render the context block handed to the language model
    pub fn render(&self) -> String {
        let mut out = String::new();

        for (i, seed) in self.seeds.iter().enumerate() {
            let institution = seed.institution.as_deref().unwrap_or(UNKNOWN_INSTITUTION);
            out.push_str(&format!(
                "--- CONTEXT {} (seed chunk)\nInstitution: {}\nSource document: {}\nText:\n{}\n---\n\n",
                i + 1,
                institution,
                seed.document,
                seed.text
            ));
        }

        if self.relations.is_empty() {
            return out;
        }

        out.push_str("--- RELATED CITATIONS (from the graph) ---\n");
        for (i, relation) in self.relations.iter().enumerate() {
            out.push_str(&format!(
                "Relation {}: '{}' cites '{}'.",
                i + 1,
                relation.source_document,
                relation.target_document
            ));

            if relation.is_unspecified() {
                out.push_str(" (article unspecified)\n\n");
                continue;
            }

            out.push_str(&format!(
                " (articles: {})\n",
                join_articles(relation.requested.iter().copied())
            ));

            // Several articles can resolve to the same chunk; show it once
            let mut shown: Vec<&str> = Vec::new();
            for hit in &relation.found {
                if shown.contains(&hit.chunk_id.as_str()) {
                    continue;
                }
                shown.push(&hit.chunk_id);
                let articles = join_articles(
                    relation
                        .found
                        .iter()
                        .filter(|h| h.chunk_id == hit.chunk_id)
                        .map(|h| h.article),
                );
                out.push_str(&format!(
                    "  --- ADDITIONAL CONTEXT (cited article {} - source: {}) ---\n{}\n  ---\n",
                    articles,
                    relation.target_document,
                    indent(&hit.text)
                ));
            }

            if !relation.missing.is_empty() {
                out.push_str(&format!(
                    "  (Note: the text of article(s) {} in '{}' was not found in the graph.)\n",
                    join_articles(relation.missing.iter().copied()),
                    relation.target_document
                ));
            }
            out.push('\n');
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(document: &str, institution: Option<&str>, text: &str) -> SeedChunk {
        SeedChunk {
            chunk_id: format!("{}-0", document),
            text: text.to_string(),
            document: document.to_string(),
            institution: institution.map(str::to_string),
            score: 0.9,
        }
    }

    fn hit(article: u32, chunk_id: &str, text: &str) -> ArticleHit {
        ArticleHit {
            article,
            chunk_id: chunk_id.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_seed_labels() {
        let context = RetrievalContext {
            query: "q".into(),
            seeds: vec![
                seed("Licensing Regulation", Some("Energy Regulator"), "Article 1\nLicences"),
                seed("Energy Law", None, "Article 3\nMarket"),
            ],
            relations: vec![],
        };

        let rendered = context.render();
        assert!(rendered.contains("--- CONTEXT 1 (seed chunk)\nInstitution: Energy Regulator"));
        assert!(rendered.contains("Institution: unknown\nSource document: Energy Law"));
        assert!(!rendered.contains("RELATED CITATIONS"));
    }

    #[test]
    fn test_relation_rendering() {
        let set = |items: &[u32]| items.iter().copied().collect::<ArticleSet>();
        let context = RetrievalContext {
            query: "q".into(),
            seeds: vec![seed("Licensing Regulation", Some("Energy Regulator"), "text")],
            relations: vec![
                Relation {
                    source_document: "Licensing Regulation".into(),
                    target_document: "Energy Law".into(),
                    requested: ArticleSet::new(),
                    found: vec![],
                    missing: ArticleSet::new(),
                },
                Relation {
                    source_document: "Licensing Regulation".into(),
                    target_document: "Energy Law".into(),
                    requested: set(&[3, 4, 99]),
                    found: vec![
                        hit(3, "k1", "Article 3\nMarket\nArticle 4\nFees"),
                        hit(4, "k1", "Article 3\nMarket\nArticle 4\nFees"),
                    ],
                    missing: set(&[99]),
                },
            ],
        };

        let rendered = context.render();
        assert!(rendered.contains("Relation 1: 'Licensing Regulation' cites 'Energy Law'. (article unspecified)"));
        assert!(rendered.contains("Relation 2: 'Licensing Regulation' cites 'Energy Law'. (articles: 3, 4, 99)"));
        assert_eq!(rendered.matches("ADDITIONAL CONTEXT").count(), 1);
        assert!(rendered.contains("(cited article 3, 4 - source: Energy Law)"));
        assert!(rendered.contains("  Article 4\n  Fees"));
        assert!(rendered.contains("article(s) 99 in 'Energy Law' was not found"));
        assert_eq!(context.article_hits().count(), 2);
    }
}
