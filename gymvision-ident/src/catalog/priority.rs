// Label Priority Table - which models to trust for which exercise
//
// Built from each model's training vocabulary: a model that was trained on a
// class is trusted for it, in the order the models are declared. Keys are the
// normalized class names, not alias targets: a model trained on "Leg Press
// Machine" is not trusted for `leg_press`.

use gymvision_common::normalize_label;
use serde::Deserialize;
use std::collections::HashMap;

/// One model's class vocabulary as written in a tables file
#[derive(Debug, Clone, Deserialize)]
pub struct ModelVocabulary {
    pub name: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Canonical key → trusted model identities, most trusted first
#[derive(Debug, Clone, Default)]
pub struct PriorityTable {
    by_key: HashMap<String, Vec<String>>,
    default_order: Vec<String>,
}

impl PriorityTable {
    pub fn new(by_key: HashMap<String, Vec<String>>, default_order: Vec<String>) -> Self {
        Self {
            by_key,
            default_order,
        }
    }

    /// Derive the table from model vocabularies
    ///
    /// Each label is normalized and the model is appended to that key's list
    /// (once), following declaration order.
    pub fn from_vocabularies(vocabularies: &[ModelVocabulary], default_order: Vec<String>) -> Self {
        let mut by_key: HashMap<String, Vec<String>> = HashMap::new();

        for vocabulary in vocabularies {
            for label in &vocabulary.labels {
                let key = normalize_label(label);
                if key.is_empty() {
                    continue;
                }
                let models = by_key.entry(key).or_default();
                if !models.contains(&vocabulary.name) {
                    models.push(vocabulary.name.clone());
                }
            }
        }

        Self::new(by_key, default_order)
    }

    /// Trust order for a canonical key, falling back to the default order
    pub fn order_for(&self, key: &str) -> &[String] {
        self.by_key
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or(&self.default_order)
    }

    pub fn default_order(&self) -> &[String] {
        &self.default_order
    }
}
