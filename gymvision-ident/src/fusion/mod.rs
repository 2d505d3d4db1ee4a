// Fusion Module - multi-model prediction fusion
//
// Extractor (one model → raw candidates) → Arbitrator (one winner per
// canonical key) → Ranker (top-N plus refinement menu)

pub mod arbitrator;
pub mod extractor;
pub mod ranker;

pub use arbitrator::arbitrate;
pub use extractor::{candidates_from_output, extract};
pub use ranker::{rank, Ranking};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Model confidence score (0.0-1.0)
pub type Confidence = f64;

/// Default trust margin: a priority model's prediction may trail the best
/// confidence by this much and still win
pub const DEFAULT_PRIORITY_MARGIN: Confidence = 0.05;

/// Default shortlist length
pub const DEFAULT_TOP_N: usize = 3;

/// Default candidates kept per model
pub const DEFAULT_CANDIDATES_PER_MODEL: usize = 3;

/// Default per-request deadline covering each model's load and inference
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One candidate emitted by one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPrediction {
    /// Label exactly as the model reported it
    pub label: String,

    /// Confidence (0.0-1.0)
    pub confidence: Confidence,

    /// Identity of the model that produced it
    pub source: String,

    /// Canonical exercise key the label resolves to
    pub key: String,
}

/// The winning prediction for one canonical key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalPrediction {
    pub key: String,
    /// Raw label of the winning prediction
    pub label: String,
    pub confidence: Confidence,
    pub source: String,
}

impl From<RawPrediction> for CanonicalPrediction {
    fn from(raw: RawPrediction) -> Self {
        Self {
            key: raw.key,
            label: raw.label,
            confidence: raw.confidence,
            source: raw.source,
        }
    }
}

/// Tunables for a single identification
#[derive(Debug, Clone, PartialEq)]
pub struct FusionSettings {
    pub priority_margin: Confidence,
    pub candidates_per_model: usize,
    pub top_n: usize,
    pub request_timeout: Duration,
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self {
            priority_margin: DEFAULT_PRIORITY_MARGIN,
            candidates_per_model: DEFAULT_CANDIDATES_PER_MODEL,
            top_n: DEFAULT_TOP_N,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}
