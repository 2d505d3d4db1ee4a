// Exclusion Set - classes that must never be surfaced

use super::aliases::AliasTable;
use std::collections::HashSet;

/// Canonical keys known to be false positives
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    keys: HashSet<String>,
}

impl ExclusionSet {
    /// Build from raw labels; each is normalized and resolved so it matches
    /// the canonical key a model prediction would carry
    pub fn from_labels<'a>(labels: impl IntoIterator<Item = &'a str>, aliases: &AliasTable) -> Self {
        Self {
            keys: labels
                .into_iter()
                .map(|label| aliases.resolve_raw(label))
                .filter(|key| !key.is_empty())
                .collect(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_labels_are_canonicalized() {
        let aliases = AliasTable::default();
        let exclusions = ExclusionSet::from_labels(["Kettlebells", "Assisted Chin Up-Dip", "  "], &aliases);

        assert_eq!(exclusions.len(), 2);
        assert!(exclusions.contains("kettlebells"));
        assert!(exclusions.contains("assisted_chin_up_dip"));
        assert!(!exclusions.contains("Kettlebells"));
    }
}
