// Per-Model Extractor - one model, one image → bounded raw candidates
//
// Dispatches on the model's output shape. Classification keeps the top
// probabilities; detection keeps the strongest region per canonical key.
// Candidates are always ordered by descending confidence.

use crate::catalog::AliasTable;
use crate::fusion::{Confidence, RawPrediction};
use crate::models::{ClassificationOutput, DetectionOutput, ModelLease, ModelOutput};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Run one model on an image and return at most `max_candidates` predictions
///
/// Never fails: inference errors are logged and contribute nothing, so one
/// broken model cannot sink the request.
pub async fn extract(
    lease: &ModelLease,
    image: &[u8],
    max_candidates: usize,
    aliases: &AliasTable,
) -> Vec<RawPrediction> {
    match lease.infer(image).await {
        Ok(output) => {
            let candidates = candidates_from_output(&output, lease.name(), max_candidates, aliases);
            debug!(
                model = %lease.name(),
                "Extracted {} candidates: {:?}",
                candidates.len(),
                candidates
                    .iter()
                    .map(|c| format!("{}={:.3}", c.key, c.confidence))
                    .collect::<Vec<_>>()
            );
            candidates
        }
        Err(e) => {
            warn!(model = %lease.name(), error = %e, "Inference failed, skipping model");
            Vec::new()
        }
    }
}

/// Turn raw model output into canonical candidates
pub fn candidates_from_output(
    output: &ModelOutput,
    source: &str,
    max_candidates: usize,
    aliases: &AliasTable,
) -> Vec<RawPrediction> {
    if max_candidates == 0 {
        return Vec::new();
    }

    match output {
        ModelOutput::Classification(c) => from_classification(c, source, max_candidates, aliases),
        ModelOutput::Detection(d) => from_detection(d, source, max_candidates, aliases),
    }
}

/// Finite confidences clamped into [0, 1]; NaN and infinities are dropped
fn sanitize(confidence: Confidence) -> Option<Confidence> {
    confidence.is_finite().then(|| confidence.clamp(0.0, 1.0))
}

fn from_classification(
    output: &ClassificationOutput,
    source: &str,
    max_candidates: usize,
    aliases: &AliasTable,
) -> Vec<RawPrediction> {
    if output.names.len() != output.probabilities.len() {
        warn!(
            model = source,
            "Classifier reported {} names but {} probabilities",
            output.names.len(),
            output.probabilities.len()
        );
    }

    let mut scored: Vec<(&String, Confidence)> = output
        .names
        .iter()
        .zip(output.probabilities.iter())
        .filter_map(|(name, p)| sanitize(*p).map(|p| (name, p)))
        .collect();

    // Stable: equal probabilities keep class order
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));

    scored
        .into_iter()
        .take(max_candidates)
        .map(|(label, confidence)| RawPrediction {
            label: label.clone(),
            confidence,
            source: source.to_string(),
            key: aliases.resolve_raw(label),
        })
        .collect()
}

fn from_detection(
    output: &DetectionOutput,
    source: &str,
    max_candidates: usize,
    aliases: &AliasTable,
) -> Vec<RawPrediction> {
    let mut scored: Vec<(&String, Confidence)> = Vec::with_capacity(output.detections.len());
    for detection in &output.detections {
        let Some(label) = output.names.get(detection.class_id) else {
            warn!(
                model = source,
                "Detection class {} outside {} known classes, skipped",
                detection.class_id,
                output.names.len()
            );
            continue;
        };
        if let Some(confidence) = sanitize(detection.confidence) {
            scored.push((label, confidence));
        }
    }

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut seen: HashSet<String> = HashSet::new();
    let mut candidates = Vec::new();
    for (label, confidence) in scored {
        let key = aliases.resolve_raw(label);
        if !seen.insert(key.clone()) {
            continue;
        }
        candidates.push(RawPrediction {
            label: label.clone(),
            confidence,
            source: source.to_string(),
            key,
        });
        if candidates.len() == max_candidates {
            break;
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Detection;

    fn aliases() -> AliasTable {
        AliasTable::new(
            vec![("leg_press_machine".to_string(), "leg_press".to_string())],
            ["leg_press", "hack_squat", "bench_press", "treadmill"],
        )
    }

    fn classification(pairs: &[(&str, f64)]) -> ModelOutput {
        ModelOutput::Classification(ClassificationOutput {
            names: pairs.iter().map(|(n, _)| n.to_string()).collect(),
            probabilities: pairs.iter().map(|(_, p)| *p).collect(),
        })
    }

    fn detection(names: &[&str], hits: &[(usize, f64)]) -> ModelOutput {
        ModelOutput::Detection(DetectionOutput {
            names: names.iter().map(|n| n.to_string()).collect(),
            detections: hits
                .iter()
                .map(|(class_id, confidence)| Detection {
                    class_id: *class_id,
                    confidence: *confidence,
                    bbox: None,
                })
                .collect(),
        })
    }

    #[test]
    fn test_classification_top_k_descending() {
        let output = classification(&[
            ("Treadmill", 0.05),
            ("Leg Press Machine", 0.6),
            ("Hack Squat", 0.25),
            ("Bench Press", 0.1),
        ]);

        let candidates = candidates_from_output(&output, "best", 3, &aliases());

        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0].key, "leg_press");
        assert_eq!(candidates[0].label, "Leg Press Machine");
        assert_eq!(candidates[0].source, "best");
        assert_eq!(candidates[1].key, "hack_squat");
        assert_eq!(candidates[2].key, "bench_press");
    }

    #[test]
    fn test_classification_ties_keep_class_order() {
        let output = classification(&[("Hack Squat", 0.4), ("Leg Press", 0.4), ("Treadmill", 0.2)]);
        let candidates = candidates_from_output(&output, "best", 2, &aliases());
        assert_eq!(candidates[0].key, "hack_squat");
        assert_eq!(candidates[1].key, "leg_press");
    }

    #[test]
    fn test_non_finite_dropped_and_clamped() {
        let output = classification(&[("Hack Squat", f64::NAN), ("Leg Press", 1.2), ("Treadmill", -0.1)]);
        let candidates = candidates_from_output(&output, "best", 3, &aliases());

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].confidence, 1.0);
        assert_eq!(candidates[1].confidence, 0.0);
    }

    #[test]
    fn test_detection_dedups_by_canonical_key() {
        let output = detection(
            &["Leg Press", "Leg Press Machine", "Treadmill", "Bench Press"],
            &[(0, 0.5), (1, 0.8), (2, 0.3), (0, 0.7), (3, 0.2)],
        );

        let candidates = candidates_from_output(&output, "best2", 3, &aliases());

        let keys: Vec<&str> = candidates.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["leg_press", "treadmill", "bench_press"]);
        assert_eq!(candidates[0].label, "Leg Press Machine");
        assert_eq!(candidates[0].confidence, 0.8);
    }

    #[test]
    fn test_detection_invalid_class_skipped() {
        let output = detection(&["Treadmill"], &[(4, 0.99), (0, 0.4)]);
        let candidates = candidates_from_output(&output, "best2", 3, &aliases());
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].key, "treadmill");
    }

    #[test]
    fn test_empty_detection_yields_nothing() {
        let output = detection(&["Treadmill"], &[]);
        assert!(candidates_from_output(&output, "best2", 3, &aliases()).is_empty());
        let output = classification(&[("Treadmill", 0.9)]);
        assert!(candidates_from_output(&output, "best", 0, &aliases()).is_empty());
    }
}
