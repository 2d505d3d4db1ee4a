// Fusion Arbitrator - one winner per canonical key
//
// Models disagree about confidence but not equally about competence: a model
// trained on a class is trusted for it. For each key the most trusted model
// that reported it wins as long as its confidence is within the margin of the
// best confidence any model gave that key.

use crate::catalog::{ExclusionSet, PriorityTable};
use crate::error::IdentifyError;
use crate::fusion::{CanonicalPrediction, Confidence, RawPrediction};
use std::collections::HashMap;
use tracing::debug;

/// Absorbs floating-point noise in `best - margin` (0.91 - 0.05 is not 0.86)
const MARGIN_EPSILON: Confidence = 1e-9;

/// Merge candidates from all models into one prediction per canonical key
///
/// Groups are returned in the order their key was first seen.
///
/// # Errors
/// * `IdentifyError::NoPrediction` - nothing left after the exclusion filter
pub fn arbitrate(
    predictions: Vec<RawPrediction>,
    exclusions: &ExclusionSet,
    priority: &PriorityTable,
    margin: Confidence,
) -> Result<Vec<CanonicalPrediction>, IdentifyError> {
    let total = predictions.len();
    let kept: Vec<RawPrediction> = predictions
        .into_iter()
        .filter(|p| !exclusions.contains(&p.key))
        .collect();

    if kept.is_empty() {
        debug!("No predictions left after exclusions ({} excluded)", total);
        return Err(IdentifyError::NoPrediction);
    }

    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<RawPrediction>> = HashMap::new();
    for prediction in kept {
        if !groups.contains_key(&prediction.key) {
            order.push(prediction.key.clone());
        }
        groups.entry(prediction.key.clone()).or_default().push(prediction);
    }

    let mut winners = Vec::with_capacity(order.len());
    for key in order {
        let Some(group) = groups.remove(&key) else {
            continue;
        };
        let Some(winner) = pick_winner(&group, priority.order_for(&key), margin).cloned() else {
            continue;
        };
        debug!(
            key = %winner.key,
            source = %winner.source,
            "Arbitrated {:.3} from '{}'",
            winner.confidence,
            winner.label
        );
        winners.push(CanonicalPrediction::from(winner));
    }

    Ok(winners)
}

/// Earliest prediction with the highest confidence in `group`
fn strongest<'a>(group: impl Iterator<Item = &'a RawPrediction>) -> Option<&'a RawPrediction> {
    group.fold(None, |best: Option<&RawPrediction>, p| match best {
        Some(b) if b.confidence >= p.confidence => Some(b),
        _ => Some(p),
    })
}

fn pick_winner<'a>(
    group: &'a [RawPrediction],
    trust_order: &[String],
    margin: Confidence,
) -> Option<&'a RawPrediction> {
    let overall = strongest(group.iter())?;
    let threshold = overall.confidence - margin - MARGIN_EPSILON;

    let trusted = trust_order.iter().find_map(|model| {
        strongest(group.iter().filter(|p| &p.source == model)).filter(|p| p.confidence >= threshold)
    });

    Some(trusted.unwrap_or(overall))
}
