//! Exercise catalog
//!
//! Static metadata per canonical exercise key: display name, trained muscle
//! groups, demonstration video and illustration. Muscle names are cleaned
//! against a fixed vocabulary when the catalog is built.

use gymvision_common::labels::{capitalize, display_from_key, normalize_label};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Muscle groups the catalog may report
pub const ALLOWED_MUSCLES: &[&str] = &[
    "back",
    "chest",
    "shoulders",
    "biceps",
    "triceps",
    "quads",
    "hamstrings",
    "calves",
    "abs",
    "glutes",
];

/// Synonyms mapped onto an allowed muscle group
const MUSCLE_SYNONYMS: &[(&str, &str)] = &[
    ("lats", "back"),
    ("lat", "back"),
    ("rear delts", "shoulders"),
    ("delts", "shoulders"),
    ("core", "abs"),
    ("bovenste borst", "chest"),
    ("onderste borst", "chest"),
];

/// Clean a list of muscle names
///
/// Trims and lowercases each entry, maps synonyms, drops anything outside
/// [`ALLOWED_MUSCLES`] and duplicates, and returns capitalized names in
/// first-seen order.
pub fn normalize_muscles<S: AsRef<str>>(muscles: &[S]) -> Vec<String> {
    let mut seen = Vec::new();
    let mut result = Vec::new();

    for muscle in muscles {
        let key = muscle.as_ref().trim().to_lowercase();
        let key = MUSCLE_SYNONYMS
            .iter()
            .find(|(synonym, _)| *synonym == key)
            .map(|(_, target)| (*target).to_string())
            .unwrap_or(key);

        if ALLOWED_MUSCLES.contains(&key.as_str()) && !seen.contains(&key) {
            result.push(capitalize(&key));
            seen.push(key);
        }
    }

    result
}

/// Catalog entry as written in a tables file
#[derive(Debug, Clone, Deserialize)]
pub struct ExerciseEntry {
    pub key: String,
    pub display: String,
    #[serde(default)]
    pub muscles: Vec<String>,
    #[serde(default)]
    pub video: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

/// Exercise metadata returned to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExerciseInfo {
    pub key: String,
    pub display: String,
    pub muscles: Vec<String>,
    pub video: String,
    pub image: Option<String>,
}

/// Ordered exercise catalog keyed by canonical exercise key
#[derive(Debug, Clone, Default)]
pub struct ExerciseCatalog {
    entries: Vec<ExerciseInfo>,
    index: HashMap<String, usize>,
}

impl ExerciseCatalog {
    /// Build the catalog
    ///
    /// Keys are normalized so they match resolved labels. Entries whose key
    /// normalizes to nothing, and later duplicates of a key, are ignored with
    /// a warning.
    pub fn new(entries: impl IntoIterator<Item = ExerciseEntry>) -> Self {
        let mut catalog = Self::default();

        for entry in entries {
            let key = normalize_label(&entry.key);
            if key.is_empty() {
                warn!("Exercise '{}' has an empty key, ignoring", entry.display);
                continue;
            }
            if catalog.index.contains_key(&key) {
                warn!("Duplicate exercise key '{}' in catalog, ignoring", key);
                continue;
            }

            let info = ExerciseInfo {
                muscles: normalize_muscles(&entry.muscles),
                video: entry.video.unwrap_or_default(),
                image: entry.image.filter(|image| !image.is_empty()),
                key,
                display: entry.display,
            };
            catalog.index.insert(info.key.clone(), catalog.entries.len());
            catalog.entries.push(info);
        }

        catalog
    }

    pub fn get(&self, key: &str) -> Option<&ExerciseInfo> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Catalog entry for `key`, or a bare entry titled from `label`
    pub fn info_or_fallback(&self, key: &str, label: &str) -> ExerciseInfo {
        match self.get(key) {
            Some(info) => info.clone(),
            None => ExerciseInfo {
                key: key.to_string(),
                display: display_from_key(if label.is_empty() { key } else { label }),
                muscles: Vec::new(),
                video: String::new(),
                image: None,
            },
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExerciseInfo> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, display: &str, muscles: &[&str]) -> ExerciseEntry {
        ExerciseEntry {
            key: key.to_string(),
            display: display.to_string(),
            muscles: muscles.iter().map(|m| m.to_string()).collect(),
            video: None,
            image: None,
        }
    }

    #[test]
    fn test_normalize_muscles_synonyms_and_filtering() {
        let muscles = normalize_muscles(&["Lats", " Biceps ", "-", "core", "back", "Forearms"]);
        assert_eq!(muscles, vec!["Back", "Biceps", "Abs"]);
    }

    #[test]
    fn test_normalize_muscles_dutch_synonyms() {
        assert_eq!(normalize_muscles(&["Bovenste borst", "onderste borst"]), vec!["Chest"]);
    }

    #[test]
    fn test_catalog_lookup_and_order() {
        let catalog = ExerciseCatalog::new(vec![
            entry("leg_press", "Leg Press", &["Quads", "Glutes", "Hamstrings"]),
            entry("dips", "Dips", &["Triceps", "Chest", "Shoulders"]),
        ]);

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.keys().collect::<Vec<_>>(), vec!["leg_press", "dips"]);
        let dips = catalog.get("dips").unwrap();
        assert_eq!(dips.display, "Dips");
        assert_eq!(dips.muscles, vec!["Triceps", "Chest", "Shoulders"]);
        assert!(catalog.get("squat").is_none());
    }

    #[test]
    fn test_duplicate_key_keeps_first() {
        let catalog = ExerciseCatalog::new(vec![
            entry("dips", "Dips", &[]),
            entry("dips", "Parallel Bar Dips", &[]),
        ]);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("dips").unwrap().display, "Dips");
    }

    #[test]
    fn test_keys_are_normalized() {
        let catalog = ExerciseCatalog::new(vec![
            entry("Leg Press", "Leg Press", &["Quads"]),
            entry("leg-press", "Leg Press Again", &[]),
            entry("  ", "Nameless", &[]),
        ]);

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.keys().collect::<Vec<_>>(), vec!["leg_press"]);
        assert_eq!(catalog.get("leg_press").unwrap().display, "Leg Press");
    }

    #[test]
    fn test_fallback_info() {
        let catalog = ExerciseCatalog::default();
        let info = catalog.info_or_fallback("cable_fly", "cable fly station");
        assert_eq!(info.key, "cable_fly");
        assert_eq!(info.display, "Cable Fly Station");
        assert!(info.muscles.is_empty());
        assert!(info.image.is_none());

        let info = catalog.info_or_fallback("cable_fly", "");
        assert_eq!(info.display, "Cable Fly");
    }
}
