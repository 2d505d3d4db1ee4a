//! Test Helper Utilities
//!
//! Scripted model runtime plus small identification tables shared by the
//! gymvision-ident integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use gymvision_ident::catalog::Tables;
use gymvision_ident::models::{
    ClassificationOutput, Detection, DetectionOutput, InferenceModel, ModelOutput, ModelRuntime,
};
use gymvision_ident::{
    EvictionPolicy, FusionSettings, IdentificationEngine, ModelCache, ModelError, ModelSpec,
};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Tables with two trusted models for leg press and one generic key
pub const TEST_TABLES: &str = r#"
default_priority = ["best", "best3", "best4", "best1", "best2"]
exclusions = ["Kettlebells"]

[[models]]
name = "best3"
labels = ["Leg Press", "Smith Machine"]

[[models]]
name = "best"
labels = ["Leg Press", "Hack Squat", "Kettlebells", "Treadmill"]

[[refinements]]
key = "smith_machine"
candidates = [
    { key = "smith_machine_squat", display = "Smith Machine Squat" },
    { key = "smith_machine_bench_press", display = "Smith Machine Bench Press" },
    { key = "smith_machine_shoulder_press", display = "Smith Machine Shoulder Press" },
    { key = "smith_machine_row", display = "Smith Machine Row" },
    { key = "smith_machine_calf_raise", display = "Smith Machine Calf Raise" },
]

[[exercises]]
key = "leg_press"
display = "Leg Press"
muscles = ["Quads", "Glutes", "Hamstrings"]
video = "https://example.com/leg-press"

[[exercises]]
key = "hack_squat"
display = "Hack Squat"
muscles = ["Quads"]

[[exercises]]
key = "smith_machine"
display = "Smith Machine"

[[exercises]]
key = "smith_machine_squat"
display = "Smith Machine Squat"
muscles = ["Quads", "Glutes"]

[[exercises]]
key = "treadmill"
display = "Treadmill"

[[exercises]]
key = "kettlebells"
display = "Kettlebells"

[aliases]
leg_press_machine = "leg_press"
"#;

pub fn test_tables() -> Tables {
    Tables::from_toml_str(TEST_TABLES).expect("test tables parse")
}

pub fn classification(pairs: &[(&str, f64)]) -> ModelOutput {
    ModelOutput::Classification(ClassificationOutput {
        names: pairs.iter().map(|(n, _)| n.to_string()).collect(),
        probabilities: pairs.iter().map(|(_, p)| *p).collect(),
    })
}

pub fn detection(names: &[&str], hits: &[(usize, f64)]) -> ModelOutput {
    ModelOutput::Detection(DetectionOutput {
        names: names.iter().map(|n| n.to_string()).collect(),
        detections: hits
            .iter()
            .map(|(class_id, confidence)| Detection {
                class_id: *class_id,
                confidence: *confidence,
                bbox: Some([0.0, 0.0, 10.0, 10.0]),
            })
            .collect(),
    })
}

/// Create an (empty) artifact file per model name
pub fn artifacts(names: &[&str]) -> (TempDir, Vec<ModelSpec>) {
    let dir = TempDir::new().expect("temp dir");
    let specs = names
        .iter()
        .map(|name| {
            let path = dir.path().join(format!("{}.pt", name));
            std::fs::write(&path, b"weights").expect("write artifact");
            ModelSpec::new(*name, path)
        })
        .collect();
    (dir, specs)
}

/// Model runtime with scripted per-model behavior
#[derive(Default)]
pub struct MockRuntime {
    outputs: HashMap<String, ModelOutput>,
    failing_loads: HashSet<String>,
    failing_inference: HashSet<String>,
    dying: HashSet<String>,
    infer_delays: HashMap<String, Duration>,
    load_delay: Duration,
    unavailable: bool,
    loads: Mutex<Vec<String>>,
    loading_now: Arc<AtomicUsize>,
    peak_loading: Arc<AtomicUsize>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, model: &str, output: ModelOutput) -> Self {
        self.outputs.insert(model.to_string(), output);
        self
    }

    pub fn failing_load(mut self, model: &str) -> Self {
        self.failing_loads.insert(model.to_string());
        self
    }

    pub fn failing_inference(mut self, model: &str) -> Self {
        self.failing_inference.insert(model.to_string());
        self
    }

    /// The model's backend dies on its first inference
    pub fn dying(mut self, model: &str) -> Self {
        self.dying.insert(model.to_string());
        self
    }

    pub fn infer_delay(mut self, model: &str, delay: Duration) -> Self {
        self.infer_delays.insert(model.to_string(), delay);
        self
    }

    pub fn load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// Every load and availability check reports a missing runtime
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Model names in the order loads started
    pub fn loads(&self) -> Vec<String> {
        self.loads.lock().unwrap().clone()
    }

    pub fn load_count(&self, model: &str) -> usize {
        self.loads().iter().filter(|m| m.as_str() == model).count()
    }

    /// Highest number of loads ever in flight at once
    pub fn peak_concurrent_loads(&self) -> usize {
        self.peak_loading.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelRuntime for MockRuntime {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn check_available(&self) -> Result<(), ModelError> {
        if self.unavailable {
            Err(ModelError::RuntimeUnavailable("mock runtime disabled".to_string()))
        } else {
            Ok(())
        }
    }

    async fn load(&self, model: &str, _path: &Path) -> Result<Arc<dyn InferenceModel>, ModelError> {
        self.check_available()?;
        self.loads.lock().unwrap().push(model.to_string());

        let now = self.loading_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_loading.fetch_max(now, Ordering::SeqCst);
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        self.loading_now.fetch_sub(1, Ordering::SeqCst);

        if self.failing_loads.contains(model) {
            return Err(ModelError::inference(model, "corrupt artifact"));
        }

        Ok(Arc::new(MockModel {
            name: model.to_string(),
            output: self.outputs.get(model).cloned(),
            fail: self.failing_inference.contains(model),
            dies: self.dying.contains(model),
            alive: AtomicBool::new(true),
            delay: self.infer_delays.get(model).copied().unwrap_or_default(),
        }))
    }
}

struct MockModel {
    name: String,
    output: Option<ModelOutput>,
    fail: bool,
    dies: bool,
    alive: AtomicBool,
    delay: Duration,
}

#[async_trait]
impl InferenceModel for MockModel {
    async fn infer(&self, _image: &[u8]) -> Result<ModelOutput, ModelError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if !self.alive.load(Ordering::SeqCst) {
            return Err(ModelError::unavailable(&self.name, "worker exited"));
        }
        if self.dies {
            self.alive.store(false, Ordering::SeqCst);
            return Err(ModelError::unavailable(&self.name, "worker exited"));
        }
        if self.fail {
            return Err(ModelError::inference(&self.name, "scripted failure"));
        }
        Ok(self
            .output
            .clone()
            .unwrap_or_else(|| classification(&[])))
    }

    fn is_healthy(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// Cache over fresh artifacts for `names`
pub fn cache(
    runtime: &Arc<MockRuntime>,
    names: &[&str],
    capacity: usize,
    policy: EvictionPolicy,
) -> (TempDir, Arc<ModelCache>) {
    let (dir, specs) = artifacts(names);
    let runtime: Arc<dyn ModelRuntime> = runtime.clone();
    (dir, Arc::new(ModelCache::new(runtime, specs, capacity, policy)))
}

/// Engine over the test tables
pub fn engine(
    runtime: &Arc<MockRuntime>,
    names: &[&str],
    capacity: usize,
    settings: FusionSettings,
) -> (TempDir, IdentificationEngine) {
    let (dir, cache) = cache(runtime, names, capacity, EvictionPolicy::Fifo);
    let engine = IdentificationEngine::new(cache, Arc::new(test_tables()), settings);
    (dir, engine)
}
