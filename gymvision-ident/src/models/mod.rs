//! Model runtime seam and bounded model cache
//!
//! A [`ModelRuntime`] turns an artifact on disk into a resident
//! [`InferenceModel`]. The [`ModelCache`] decides which models stay resident.
//! Models report one of two output shapes, carried as the [`ModelOutput`]
//! variant so extraction can dispatch on it.

pub mod cache;
pub mod command_runtime;

pub use cache::{EvictionPolicy, ModelCache, ModelLease, ModelSpec};
pub use command_runtime::CommandRuntime;

use crate::error::ModelError;
use crate::fusion::Confidence;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Output of a single-label classifier: one probability per class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationOutput {
    /// Class names, indexed like `probabilities`
    pub names: Vec<String>,
    pub probabilities: Vec<Confidence>,
}

/// One detected region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Index into the output's class names
    #[serde(rename = "class")]
    pub class_id: usize,
    pub confidence: Confidence,
    /// Bounding box `[x1, y1, x2, y2]` in image pixels, when reported
    #[serde(default)]
    pub bbox: Option<[f64; 4]>,
}

/// Output of a detector: any number of labelled regions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionOutput {
    pub names: Vec<String>,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

/// The two output shapes a model can produce
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelOutput {
    Classification(ClassificationOutput),
    Detection(DetectionOutput),
}

/// A model resident in memory, ready for inference
#[async_trait]
pub trait InferenceModel: Send + Sync {
    /// Run the model on encoded image bytes
    async fn infer(&self, image: &[u8]) -> Result<ModelOutput, ModelError>;

    /// `false` once the model can no longer serve requests (its backend
    /// died or was left mid-request); the cache then loads a fresh copy
    fn is_healthy(&self) -> bool {
        true
    }
}

/// Loads model artifacts into memory
#[async_trait]
pub trait ModelRuntime: Send + Sync {
    /// Runtime identifier for logs
    fn name(&self) -> &'static str;

    /// `Err(ModelError::RuntimeUnavailable)` when the runtime is not installed
    fn check_available(&self) -> Result<(), ModelError>;

    /// Load the artifact at `path` for the model called `model`
    ///
    /// May be slow (reads hundreds of megabytes); callers must not hold
    /// locks across it.
    async fn load(&self, model: &str, path: &Path) -> Result<Arc<dyn InferenceModel>, ModelError>;
}
