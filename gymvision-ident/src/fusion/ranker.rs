// Ranker & Refinement Expander
//
// Orders arbitrated predictions into a shortlist. When the best guess is a
// generic piece of equipment (a smith machine, a rack of dumbbells) the
// caller also gets the specific exercises it could be.

use crate::catalog::{RefinementCandidate, RefinementTable};
use crate::fusion::CanonicalPrediction;

/// Shortlist plus optional disambiguation menu
#[derive(Debug, Clone, PartialEq)]
pub struct Ranking {
    /// At most `top_n` predictions, strongest first
    pub top: Vec<CanonicalPrediction>,

    /// Specific candidates when the top prediction is a generic key
    pub refinements: Option<Vec<RefinementCandidate>>,
}

impl Ranking {
    pub fn primary(&self) -> Option<&CanonicalPrediction> {
        self.top.first()
    }
}

/// Sort by descending confidence (stable), keep `top_n`, expand the winner
pub fn rank(
    mut predictions: Vec<CanonicalPrediction>,
    top_n: usize,
    refinements: &RefinementTable,
) -> Ranking {
    predictions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    predictions.truncate(top_n);

    let refinements = predictions
        .first()
        .and_then(|top| refinements.candidates_for(&top.key))
        .map(<[RefinementCandidate]>::to_vec);

    Ranking {
        top: predictions,
        refinements,
    }
}
