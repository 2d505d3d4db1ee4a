// Refinement Table - generic silhouettes expanded into specific exercises

use gymvision_common::normalize_label;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A specific exercise offered when a generic key wins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementCandidate {
    pub key: String,
    pub display: String,
}

/// Refinement entry as written in a tables file
#[derive(Debug, Clone, Deserialize)]
pub struct RefinementEntry {
    pub key: String,
    #[serde(default)]
    pub candidates: Vec<RefinementCandidate>,
}

/// Generic canonical key → ordered disambiguation candidates
#[derive(Debug, Clone, Default)]
pub struct RefinementTable {
    by_key: HashMap<String, Vec<RefinementCandidate>>,
}

impl RefinementTable {
    /// Generic and candidate keys are normalized to canonical form
    pub fn new(entries: impl IntoIterator<Item = RefinementEntry>) -> Self {
        Self {
            by_key: entries
                .into_iter()
                .map(|entry| {
                    let candidates = entry
                        .candidates
                        .into_iter()
                        .map(|c| RefinementCandidate {
                            key: normalize_label(&c.key),
                            display: c.display,
                        })
                        .collect();
                    (normalize_label(&entry.key), candidates)
                })
                .collect(),
        }
    }

    pub fn candidates_for(&self, key: &str) -> Option<&[RefinementCandidate]> {
        self.by_key.get(key).map(Vec::as_slice)
    }

    pub fn is_generic(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.by_key.keys().map(String::as_str)
    }
}
