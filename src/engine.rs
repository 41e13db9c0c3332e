//! Predicate evaluation against a materialized document

use crate::document::MaterializedDocument;
use crate::registry::RegistrySnapshot;
use std::collections::HashSet;
use tantivy::collector::Count;

/// Evaluates every predicate in a registry snapshot against one transient
/// document
///
/// Each predicate runs under the same semantics as a stored search over a
/// one-document index containing exactly this document. Evaluation is
/// side-effect-free and per-predicate: a predicate that fails to evaluate is
/// a non-match, never a call-level failure.
pub struct MatchEngine;

impl MatchEngine {
    pub fn new() -> Self {
        Self
    }

    /// Produce the set of query names whose predicate matches `document`
    pub fn evaluate(
        &self,
        document: &MaterializedDocument,
        snapshot: &RegistrySnapshot,
    ) -> HashSet<String> {
        let searcher = document.searcher();
        let mut matches = HashSet::new();

        for entry in snapshot.iter() {
            match searcher.search(entry.predicate(), &Count) {
                Ok(count) if count > 0 => {
                    matches.insert(entry.name().to_string());
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!(
                        query = entry.name(),
                        error = %err,
                        "Predicate evaluation failed, treating as non-match"
                    );
                }
            }
        }

        tracing::debug!(
            doc_type = document.doc_type(),
            evaluated = snapshot.len(),
            matched = matches.len(),
            "Evaluated registry snapshot"
        );

        matches
    }
}

impl Default for MatchEngine {
    fn default() -> Self {
        Self::new()
    }
}
