//! Canonical curation pass
//!
//! For each mapping entry, citations of the malformed document are moved to
//! the canonical one, then the malformed document is deleted if nothing
//! references it any more. Both steps are idempotent, so the pass can be run
//! again safely.

use crate::mapping::{CanonicalMapping, MappingEntry};
use citegraph_common::errors::Result;
use citegraph_common::graph::{GraphStore, PruneOutcome, RewireOutcome};
use citegraph_common::metrics;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    Curated {
        edges_moved: u64,
        /// The canonical document does not exist, so nothing was rewired
        canonical_missing: bool,
        prune: PruneOutcome,
    },
    /// Malformed and canonical names are identical
    SkippedSelfMapping,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryReport {
    pub malformed: String,
    pub canonical: String,
    pub outcome: EntryOutcome,
}

impl EntryReport {
    pub fn pruned(&self) -> bool {
        matches!(
            self.outcome,
            EntryOutcome::Curated {
                prune: PruneOutcome::Deleted,
                ..
            }
        )
    }
}

/// Per-entry results in mapping order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurationReport {
    pub entries: Vec<EntryReport>,
}

impl CurationReport {
    pub fn edges_moved(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| match e.outcome {
                EntryOutcome::Curated { edges_moved, .. } => edges_moved,
                _ => 0,
            })
            .sum()
    }

    pub fn pruned(&self) -> usize {
        self.entries.iter().filter(|e| e.pruned()).count()
    }

    pub fn failures(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, EntryOutcome::Failed { .. }))
            .count()
    }

    /// Whether the pass modified the graph
    pub fn changed_graph(&self) -> bool {
        self.edges_moved() > 0 || self.pruned() > 0
    }
}

pub struct Curator {
    store: Arc<dyn GraphStore>,
}

impl Curator {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    async fn apply(&self, entry: &MappingEntry) -> Result<EntryOutcome> {
        let (edges_moved, canonical_missing) = match self
            .store
            .rewire_citations(&entry.malformed, &entry.canonical)
            .await?
        {
            RewireOutcome::Moved(count) => (count, false),
            RewireOutcome::CanonicalMissing => {
                warn!("Canonical document does not exist, citations left in place");
                (0, true)
            }
        };

        let prune = self.store.prune_placeholder(&entry.malformed).await?;

        Ok(EntryOutcome::Curated {
            edges_moved,
            canonical_missing,
            prune,
        })
    }

    #[instrument(skip(self, entry), fields(malformed = %entry.malformed, canonical = %entry.canonical))]
    async fn curate_entry(&self, entry: &MappingEntry) -> EntryOutcome {
        if entry.malformed == entry.canonical {
            warn!("Mapping entry maps a name to itself, skipping");
            return EntryOutcome::SkippedSelfMapping;
        }

        match self.apply(entry).await {
            Ok(outcome) => {
                if let EntryOutcome::Curated {
                    edges_moved, prune, ..
                } = &outcome
                {
                    info!(edges_moved, prune = ?prune, "Entry curated");
                    metrics::record_curation(*edges_moved, *prune == PruneOutcome::Deleted);
                }
                outcome
            }
            Err(e) => {
                error!(error = %e, "Failed to curate entry");
                EntryOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Apply every entry in order; a failed entry does not stop the pass
    pub async fn curate(&self, mapping: &CanonicalMapping) -> CurationReport {
        if mapping.is_empty() {
            info!("Canonical mapping is empty, nothing to curate");
            return CurationReport::default();
        }

        info!(entries = mapping.len(), "Starting canonical curation");

        let mut report = CurationReport::default();
        for entry in &mapping.entries {
            let outcome = self.curate_entry(entry).await;
            report.entries.push(EntryReport {
                malformed: entry.malformed.clone(),
                canonical: entry.canonical.clone(),
                outcome,
            });
        }

        info!(
            edges_moved = report.edges_moved(),
            pruned = report.pruned(),
            failures = report.failures(),
            "Canonical curation complete"
        );
        report
    }
}
