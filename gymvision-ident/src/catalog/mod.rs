//! Static identification tables
//!
//! Everything the fusion pipeline looks up but never mutates: the exercise
//! catalog, aliases, per-model vocabularies (which drive model trust), the
//! refinement menu and the exclusion list. All of it is loaded from one TOML
//! document; a copy of the production tables is compiled into the binary.

pub mod aliases;
pub mod exclusions;
pub mod exercises;
pub mod illustrations;
pub mod priority;
pub mod refinements;

pub use aliases::AliasTable;
pub use exclusions::ExclusionSet;
pub use exercises::{normalize_muscles, ExerciseCatalog, ExerciseEntry, ExerciseInfo};
pub use illustrations::IllustrationIndex;
pub use priority::{ModelVocabulary, PriorityTable};
pub use refinements::{RefinementCandidate, RefinementEntry, RefinementTable};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{info, warn};

/// Production tables shipped with the binary
const BUILTIN_TABLES: &str = include_str!("../../data/default_tables.toml");

/// On-disk layout of a tables file
#[derive(Debug, Clone, Default, Deserialize)]
struct TablesFile {
    #[serde(default)]
    default_priority: Vec<String>,
    #[serde(default)]
    exclusions: Vec<String>,
    #[serde(default)]
    models: Vec<ModelVocabulary>,
    #[serde(default)]
    refinements: Vec<RefinementEntry>,
    #[serde(default)]
    exercises: Vec<ExerciseEntry>,
    #[serde(default)]
    aliases: HashMap<String, String>,
}

/// All static tables, resolved and cross-linked
#[derive(Debug, Clone)]
pub struct Tables {
    pub catalog: ExerciseCatalog,
    pub aliases: AliasTable,
    pub priority: PriorityTable,
    pub refinements: RefinementTable,
    pub exclusions: ExclusionSet,
    pub vocabularies: Vec<ModelVocabulary>,
}

/// Model vocabulary coverage against the catalog
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VocabularyReport {
    /// Every class label any model declares, sorted
    pub model_labels: Vec<String>,
    /// Every catalog key, sorted
    pub catalog_keys: Vec<String>,
    /// Canonical keys of model labels that have no catalog entry, sorted
    pub missing_in_catalog: Vec<String>,
}

impl Tables {
    /// Tables compiled into the binary
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_TABLES)
    }

    /// Load tables from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Tables(format!("Read {} failed: {}", path.display(), e)))?;
        let tables = Self::from_toml_str(&content)?;
        info!(
            "Loaded identification tables from {} ({} exercises, {} models)",
            path.display(),
            tables.catalog.len(),
            tables.vocabularies.len()
        );
        Ok(tables)
    }

    /// Parse tables from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: TablesFile =
            toml::from_str(content).map_err(|e| Error::Tables(format!("Parse failed: {}", e)))?;
        Ok(Self::from_file(file))
    }

    fn from_file(file: TablesFile) -> Self {
        let catalog = ExerciseCatalog::new(file.exercises);
        let aliases = AliasTable::new(file.aliases, catalog.keys());
        let priority = PriorityTable::from_vocabularies(&file.models, file.default_priority);
        let exclusions =
            ExclusionSet::from_labels(file.exclusions.iter().map(String::as_str), &aliases);
        let refinements = RefinementTable::new(file.refinements);

        for key in refinements.keys() {
            if !catalog.contains(key) {
                warn!("Refinement key '{}' has no catalog entry", key);
            }
        }

        Self {
            catalog,
            aliases,
            priority,
            refinements,
            exclusions,
            vocabularies: file.models,
        }
    }

    /// Exercise metadata for free text (a raw label or a key)
    ///
    /// Unknown exercises get a fallback entry titled from the input text.
    pub fn lookup(&self, text: &str) -> ExerciseInfo {
        let key = self.aliases.resolve_raw(text);
        self.catalog.info_or_fallback(&key, text)
    }

    /// Compare declared model vocabularies with the catalog
    pub fn vocabulary_report(&self) -> VocabularyReport {
        let model_labels: BTreeSet<String> = self
            .vocabularies
            .iter()
            .flat_map(|v| v.labels.iter().cloned())
            .collect();

        let missing_in_catalog: BTreeSet<String> = model_labels
            .iter()
            .map(|label| self.aliases.resolve_raw(label))
            .filter(|key| !key.is_empty() && !self.catalog.contains(key))
            .collect();

        let catalog_keys: BTreeSet<String> = self.catalog.keys().map(str::to_string).collect();

        VocabularyReport {
            model_labels: model_labels.into_iter().collect(),
            catalog_keys: catalog_keys.into_iter().collect(),
            missing_in_catalog: missing_in_catalog.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_TABLES: &str = r#"
default_priority = ["a", "b"]
exclusions = ["Kettlebells"]

[[models]]
name = "a"
labels = ["Leg Press", "Kettlebells"]

[[models]]
name = "b"
labels = ["Leg Press Machine", "Rowing Erg"]

[[refinements]]
key = "smith_machine"
candidates = [{ key = "smith_machine_squat", display = "Smith Machine Squat" }]

[[exercises]]
key = "leg_press"
display = "Leg Press"
muscles = ["Quads", "Glutes"]

[[exercises]]
key = "smith_machine"
display = "Smith Machine"

[aliases]
leg_press_machine = "leg_press"
"#;

    #[test]
    fn test_small_tables_parse_and_link() {
        let tables = Tables::from_toml_str(SMALL_TABLES).unwrap();

        assert_eq!(tables.catalog.len(), 2);
        assert_eq!(tables.aliases.resolve("leg_press_machine"), "leg_press");
        assert_eq!(tables.aliases.resolve("smith_machine"), "smith_machine");
        assert_eq!(tables.priority.order_for("leg_press"), ["a".to_string()]);
        assert_eq!(tables.priority.order_for("leg_press_machine"), ["b".to_string()]);
        assert_eq!(tables.priority.order_for("unknown"), ["a".to_string(), "b".to_string()]);
        assert!(tables.exclusions.contains("kettlebells"));
        assert!(tables.refinements.is_generic("smith_machine"));
    }

    #[test]
    fn test_lookup_uses_aliases_and_fallback() {
        let tables = Tables::from_toml_str(SMALL_TABLES).unwrap();

        let info = tables.lookup("Leg Press Machine");
        assert_eq!(info.key, "leg_press");
        assert_eq!(info.display, "Leg Press");
        assert_eq!(info.muscles, vec!["Quads", "Glutes"]);

        let info = tables.lookup("rowing erg");
        assert_eq!(info.key, "rowing_erg");
        assert_eq!(info.display, "Rowing Erg");
        assert!(info.muscles.is_empty());
    }

    #[test]
    fn test_vocabulary_report() {
        let tables = Tables::from_toml_str(SMALL_TABLES).unwrap();
        let report = tables.vocabulary_report();

        assert_eq!(
            report.model_labels,
            vec!["Kettlebells", "Leg Press", "Leg Press Machine", "Rowing Erg"]
        );
        assert_eq!(report.catalog_keys, vec!["leg_press", "smith_machine"]);
        assert_eq!(report.missing_in_catalog, vec!["kettlebells", "rowing_erg"]);
    }

    #[test]
    fn test_malformed_tables_rejected() {
        let result = Tables::from_toml_str("exercises = 7");
        assert!(matches!(result, Err(Error::Tables(_))));
    }

    #[test]
    fn test_builtin_tables_parse() {
        let tables = Tables::builtin().unwrap();

        assert!(tables.catalog.len() > 80);
        assert_eq!(tables.vocabularies.len(), 5);
        assert_eq!(
            tables.priority.default_order(),
            ["best", "best3", "best4", "best1", "best2"].map(String::from)
        );
        assert!(tables.exclusions.contains("kettlebells"));
        assert!(tables.exclusions.contains("assisted_chin_up_dip"));
        for key in ["smith_machine", "leg_raise_tower", "chinning_dipping", "dumbbell"] {
            assert!(tables.refinements.is_generic(key), "{} should be generic", key);
        }
        assert_eq!(tables.refinements.candidates_for("smith_machine").unwrap().len(), 5);
        assert_eq!(tables.refinements.candidates_for("dumbbell").unwrap().len(), 16);
    }

    #[test]
    fn test_builtin_catalog_keys_are_alias_fixed_points() {
        let tables = Tables::builtin().unwrap();
        for key in tables.catalog.keys() {
            assert_eq!(tables.aliases.resolve(key), key);
        }
    }

    #[test]
    fn test_builtin_trust_follows_exact_class_names() {
        use crate::fusion::{arbitrate, RawPrediction};

        let tables = Tables::builtin().unwrap();
        assert_eq!(tables.priority.order_for("lat_pulldown"), ["best4".to_string()]);
        assert_eq!(
            tables.priority.order_for("leg_press"),
            ["best", "best1", "best4"].map(String::from)
        );

        let raw = |label: &str, confidence: f64, source: &str| RawPrediction {
            label: label.to_string(),
            confidence,
            source: source.to_string(),
            key: tables.aliases.resolve_raw(label),
        };
        let winners = arbitrate(
            vec![
                raw("Lat Pull Down", 0.90, "best1"),
                raw("Lat Pulldown", 0.88, "best4"),
                raw("Leg Press Machine", 0.90, "best3"),
                raw("Leg Press", 0.88, "best4"),
            ],
            &tables.exclusions,
            &tables.priority,
            0.05,
        )
        .unwrap();

        assert_eq!(winners.len(), 2);
        assert_eq!(winners[0].key, "lat_pulldown");
        assert_eq!(winners[0].source, "best4");
        assert_eq!(winners[1].key, "leg_press");
        assert_eq!(winners[1].source, "best4");
    }

    #[test]
    fn test_builtin_lat_pull_down_alias() {
        let tables = Tables::builtin().unwrap();
        let normalized = gymvision_common::normalize_label("Lat Pull Down");
        assert_eq!(normalized, "lat_pull_down");
        assert_eq!(tables.aliases.resolve(&normalized), "lat_pulldown");
    }
}
