// Alias Table - raw model vocabulary → canonical exercise key
//
// Lookup never fails: a token with no alias is its own canonical key.

use gymvision_common::normalize_label;
use std::collections::HashMap;
use tracing::warn;

/// Mapping from normalized model label to canonical exercise key
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    aliases: HashMap<String, String>,
}

impl AliasTable {
    /// Build the table from explicit aliases plus the catalog's own keys
    ///
    /// Alias keys and targets are normalized. Every catalog key is forced to
    /// be a self-alias so canonical keys stay fixed points of [`resolve`].
    ///
    /// [`resolve`]: AliasTable::resolve
    pub fn new<'a>(
        aliases: impl IntoIterator<Item = (String, String)>,
        catalog_keys: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let mut table: HashMap<String, String> = aliases
            .into_iter()
            .map(|(from, to)| (normalize_label(&from), normalize_label(&to)))
            .filter(|(from, to)| !from.is_empty() && !to.is_empty())
            .collect();

        for key in catalog_keys {
            let key = normalize_label(key);
            if key.is_empty() {
                continue;
            }
            if let Some(previous) = table.insert(key.clone(), key.clone()) {
                if previous != key {
                    warn!(
                        "Alias '{}' -> '{}' shadows a catalog key; keeping it canonical",
                        key, previous
                    );
                }
            }
        }

        Self { aliases: table }
    }

    /// Resolve a normalized label to its canonical key
    pub fn resolve(&self, normalized: &str) -> String {
        self.aliases
            .get(normalized)
            .cloned()
            .unwrap_or_else(|| normalized.to_string())
    }

    /// Normalize raw model text, then resolve it
    pub fn resolve_raw(&self, raw: &str) -> String {
        self.resolve(&normalize_label(raw))
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}
