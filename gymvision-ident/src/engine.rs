//! Identification engine
//!
//! Wires the pipeline for one image: every configured model is leased from
//! the cache and run concurrently, their candidates are arbitrated per
//! canonical key, and the winners are ranked and decorated with catalog
//! metadata.
//!
//! Failures of individual models never fail the request. The request fails
//! only when no model could be loaded at all, or when nothing survives
//! arbitration.

use crate::catalog::{ExerciseInfo, IllustrationIndex, RefinementCandidate, Tables, VocabularyReport};
use crate::config::IdentConfig;
use crate::error::{IdentifyError, ModelError, Result};
use crate::fusion::{arbitrate, extract, rank, CanonicalPrediction, Confidence, FusionSettings, RawPrediction};
use crate::models::{ModelCache, ModelRuntime};
use futures::future::join_all;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// One entry of an identification result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentificationChoice {
    /// Canonical exercise key
    pub key: String,
    /// Raw label as the winning model reported it
    pub label: String,
    /// Human-readable name
    pub display: String,
    /// 0.0 for refinement candidates
    pub confidence: Confidence,
    /// Winning model; absent for refinement candidates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub muscles: Vec<String>,
    pub video: String,
    pub image: Option<String>,
}

/// Outcome of a successful identification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentificationResult {
    pub primary: IdentificationChoice,
    /// Strongest first, at most `top_n` entries
    pub top_predictions: Vec<IdentificationChoice>,
    /// Specific exercises when the primary result is generic equipment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refinements: Option<Vec<IdentificationChoice>>,
}

/// Readiness of one configured model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelStatus {
    pub name: String,
    pub path: PathBuf,
    pub artifact_present: bool,
    pub resident: bool,
}

/// Readiness of the whole engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub runtime: String,
    pub runtime_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_error: Option<String>,
    pub capacity: usize,
    pub models: Vec<ModelStatus>,
}

impl HealthReport {
    /// Runtime present and at least one artifact on disk
    pub fn is_ready(&self) -> bool {
        self.runtime_available && self.models.iter().any(|m| m.artifact_present)
    }
}

enum ModelOutcome {
    /// Model was loaded; predictions may be empty if inference failed
    Contributed(Vec<RawPrediction>),
    LoadFailed(ModelError),
}

/// Photo identification over a set of cached models
pub struct IdentificationEngine {
    cache: Arc<ModelCache>,
    tables: Arc<Tables>,
    illustrations: Option<IllustrationIndex>,
    settings: FusionSettings,
}

impl IdentificationEngine {
    pub fn new(cache: Arc<ModelCache>, tables: Arc<Tables>, settings: FusionSettings) -> Self {
        Self {
            cache,
            tables,
            illustrations: None,
            settings,
        }
    }

    /// Serve illustrations from a local index; they override catalog images
    pub fn with_illustrations(mut self, index: IllustrationIndex) -> Self {
        self.illustrations = Some(index);
        self
    }

    /// Build an engine from configuration, resolving paths under `root`
    pub fn from_config(config: &IdentConfig, root: &Path) -> Result<Self> {
        let tables = match config.tables_path(root) {
            Some(path) => Tables::load(&path)?,
            None => {
                debug!("No tables file configured, using built-in tables");
                Tables::builtin()?
            }
        };

        let runtime: Arc<dyn ModelRuntime> = Arc::new(config.command_runtime());
        let cache = ModelCache::new(
            runtime,
            config.model_specs(root),
            config.models.capacity,
            config.models.eviction,
        );

        let mut engine = Self::new(Arc::new(cache), Arc::new(tables), config.fusion_settings());
        if let Some(dir) = config.images_path(root) {
            engine = engine.with_illustrations(IllustrationIndex::scan(&dir));
        }

        info!(
            "Identification engine ready: {} models configured, capacity {}, {} exercises",
            engine.cache.configured_models().len(),
            engine.cache.capacity(),
            engine.tables.catalog.len()
        );
        Ok(engine)
    }

    /// Identify the equipment in an encoded image
    ///
    /// # Errors
    /// * `NoModelsAvailable` - no configured model could be loaded
    /// * `RuntimeUnavailable` - every model failed because the runtime is missing
    /// * `NoPrediction` - models ran but nothing survived arbitration
    pub async fn identify(&self, image: &[u8]) -> std::result::Result<IdentificationResult, IdentifyError> {
        let request_id = Uuid::new_v4();
        let span = info_span!("identify", request_id = %request_id);
        self.identify_in_span(image).instrument(span).await
    }

    async fn identify_in_span(&self, image: &[u8]) -> std::result::Result<IdentificationResult, IdentifyError> {
        let models = self.cache.configured_models();
        if models.is_empty() {
            warn!("No models configured");
            return Err(IdentifyError::NoModelsAvailable);
        }

        debug!("Identifying {} byte image with {} models", image.len(), models.len());
        let deadline = Instant::now() + self.settings.request_timeout;

        let outcomes = join_all(
            models
                .iter()
                .map(|name| self.run_model(name, image, deadline)),
        )
        .await;

        let mut loaded = 0usize;
        let mut runtime_failures = 0usize;
        let mut runtime_reason: Option<String> = None;
        let mut predictions = Vec::new();
        for outcome in outcomes {
            match outcome {
                ModelOutcome::Contributed(candidates) => {
                    loaded += 1;
                    predictions.extend(candidates);
                }
                ModelOutcome::LoadFailed(ModelError::RuntimeUnavailable(reason)) => {
                    runtime_failures += 1;
                    runtime_reason.get_or_insert(reason);
                }
                ModelOutcome::LoadFailed(_) => {}
            }
        }

        if loaded == 0 {
            if runtime_failures == models.len() {
                let reason = runtime_reason.unwrap_or_default();
                warn!("Inference runtime unavailable for every model: {}", reason);
                return Err(IdentifyError::RuntimeUnavailable(reason));
            }
            warn!("None of {} configured models could be loaded", models.len());
            return Err(IdentifyError::NoModelsAvailable);
        }

        if predictions.is_empty() {
            info!("{} models ran but produced no predictions", loaded);
            return Err(IdentifyError::NoPrediction);
        }

        let winners = arbitrate(
            predictions,
            &self.tables.exclusions,
            &self.tables.priority,
            self.settings.priority_margin,
        )?;
        let ranking = rank(winners, self.settings.top_n, &self.tables.refinements);

        let top_predictions: Vec<IdentificationChoice> =
            ranking.top.iter().map(|p| self.choice(p)).collect();
        let Some(primary) = top_predictions.first().cloned() else {
            return Err(IdentifyError::NoPrediction);
        };
        let refinements = ranking
            .refinements
            .map(|candidates| candidates.iter().map(|c| self.refinement_choice(c)).collect());

        info!(
            key = %primary.key,
            source = primary.source.as_deref().unwrap_or(""),
            "Identified '{}' ({:.3}) from {} models",
            primary.display,
            primary.confidence,
            loaded
        );

        Ok(IdentificationResult {
            primary,
            top_predictions,
            refinements,
        })
    }

    /// Lease, then extract, both bounded by the request deadline
    async fn run_model(&self, name: &str, image: &[u8], deadline: Instant) -> ModelOutcome {
        let lease = match timeout_at(deadline, self.cache.ensure_loaded(name)).await {
            Ok(Ok(lease)) => lease,
            Ok(Err(e)) => {
                warn!(model = name, error = %e, "Model unavailable, skipping");
                return ModelOutcome::LoadFailed(e);
            }
            Err(_) => {
                let e = ModelError::Timeout {
                    model: name.to_string(),
                    timeout_ms: self.timeout_ms(),
                };
                warn!(model = name, error = %e, "Model load timed out, skipping");
                return ModelOutcome::LoadFailed(e);
            }
        };

        let extraction = extract(
            &lease,
            image,
            self.settings.candidates_per_model,
            &self.tables.aliases,
        );
        match timeout_at(deadline, extraction).await {
            Ok(candidates) => ModelOutcome::Contributed(candidates),
            Err(_) => {
                warn!(model = name, "Inference exceeded the request deadline, skipping");
                ModelOutcome::Contributed(Vec::new())
            }
        }
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.settings.request_timeout.as_millis()).unwrap_or(u64::MAX)
    }

    fn exercise(&self, key: &str, label: &str) -> ExerciseInfo {
        let mut info = self.tables.catalog.info_or_fallback(key, label);
        if let Some(image) = self
            .illustrations
            .as_ref()
            .and_then(|index| index.resolve(&info.key, Some(&info.display)))
        {
            info.image = Some(image);
        }
        info
    }

    fn choice(&self, prediction: &CanonicalPrediction) -> IdentificationChoice {
        let info = self.exercise(&prediction.key, &prediction.label);
        IdentificationChoice {
            key: info.key,
            label: prediction.label.clone(),
            display: info.display,
            confidence: prediction.confidence,
            source: Some(prediction.source.clone()),
            muscles: info.muscles,
            video: info.video,
            image: info.image,
        }
    }

    fn refinement_choice(&self, candidate: &RefinementCandidate) -> IdentificationChoice {
        let mut info = self.exercise(&candidate.key, &candidate.display);
        if !self.tables.catalog.contains(&candidate.key) {
            info.display = candidate.display.clone();
        }
        IdentificationChoice {
            key: info.key,
            label: candidate.display.clone(),
            display: info.display,
            confidence: 0.0,
            source: None,
            muscles: info.muscles,
            video: info.video,
            image: info.image,
        }
    }

    /// Exercise metadata for a raw label or key
    pub fn lookup(&self, text: &str) -> ExerciseInfo {
        let key = self.tables.aliases.resolve_raw(text);
        self.exercise(&key, text)
    }

    /// Every catalog exercise, catalog order
    pub fn exercises(&self) -> Vec<ExerciseInfo> {
        self.tables
            .catalog
            .keys()
            .map(|key| self.exercise(key, key))
            .collect()
    }

    pub fn vocabulary_report(&self) -> VocabularyReport {
        self.tables.vocabulary_report()
    }

    /// Runtime and artifact readiness, without loading anything
    pub fn health(&self) -> HealthReport {
        let runtime = self.cache.runtime();
        let runtime_error = runtime.check_available().err().map(|e| e.to_string());

        let models = self
            .cache
            .configured_models()
            .into_iter()
            .filter_map(|name| {
                let spec = self.cache.spec(&name)?;
                Some(ModelStatus {
                    artifact_present: spec.path.is_file(),
                    resident: self.cache.is_resident(&name),
                    path: spec.path.clone(),
                    name,
                })
            })
            .collect();

        HealthReport {
            runtime: runtime.name().to_string(),
            runtime_available: runtime_error.is_none(),
            runtime_error,
            capacity: self.cache.capacity(),
            models,
        }
    }

    pub fn cache(&self) -> &Arc<ModelCache> {
        &self.cache
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    pub fn settings(&self) -> &FusionSettings {
        &self.settings
    }
}
