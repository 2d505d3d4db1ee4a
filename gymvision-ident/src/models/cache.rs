//! Bounded model cache
//!
//! Keeps at most `capacity` models resident. Models load lazily on first
//! demand and the oldest idle model is evicted to make room.
//!
//! Every caller holds a [`ModelLease`] while it runs inference. A model with
//! outstanding leases is never evicted: if the cache is full and every
//! resident model is leased, `ensure_loaded` waits for a lease to be dropped.
//! Loads reserve their slot up front, so concurrent loads can never push the
//! cache over capacity, and a second request for a model that is already
//! loading waits for that load instead of starting another one.
//!
//! A resident model that reports itself unhealthy is dropped and reloaded on
//! its next demand once no lease holds it.

use super::{InferenceModel, ModelOutput, ModelRuntime};
use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Which idle model to evict when the cache is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Least recently inserted
    #[default]
    Fifo,
    /// Least recently leased
    Lru,
}

/// A configured model: stable name plus artifact location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub path: PathBuf,
}

impl ModelSpec {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

struct ResidentModel {
    name: String,
    path: PathBuf,
    model: Arc<dyn InferenceModel>,
    /// Outstanding leases; only idle (0) models may be evicted
    in_use: AtomicUsize,
}

enum Slot {
    /// Reserved while the runtime loads the artifact
    Loading,
    Resident(Arc<ResidentModel>),
}

#[derive(Default)]
struct CacheState {
    /// Eviction order, front is the next candidate
    order: VecDeque<String>,
    slots: HashMap<String, Slot>,
}

impl CacheState {
    fn remove(&mut self, name: &str) -> Option<Slot> {
        self.order.retain(|n| n != name);
        self.slots.remove(name)
    }

    fn touch(&mut self, name: &str) {
        if let Some(pos) = self.order.iter().position(|n| n == name) {
            if let Some(n) = self.order.remove(pos) {
                self.order.push_back(n);
            }
        }
    }

    fn is_idle(&self, name: &str) -> bool {
        matches!(
            self.slots.get(name),
            Some(Slot::Resident(entry)) if entry.in_use.load(Ordering::Acquire) == 0
        )
    }

    /// Remove the first idle resident model in eviction order
    fn take_idle_victim(&mut self) -> Option<Arc<ResidentModel>> {
        let victim = self.order.iter().find(|name| self.is_idle(name))?.clone();
        match self.remove(&victim) {
            Some(Slot::Resident(entry)) => Some(entry),
            _ => None,
        }
    }

    fn resident_names(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|name| matches!(self.slots.get(*name), Some(Slot::Resident(_))))
            .cloned()
            .collect()
    }
}

/// Borrow of a resident model; the model cannot be evicted while it exists
pub struct ModelLease {
    entry: Arc<ResidentModel>,
    released: Arc<Notify>,
}

impl ModelLease {
    pub fn name(&self) -> &str {
        &self.entry.name
    }

    pub fn path(&self) -> &Path {
        &self.entry.path
    }

    pub async fn infer(&self, image: &[u8]) -> Result<ModelOutput, ModelError> {
        self.entry.model.infer(image).await
    }
}

impl Drop for ModelLease {
    fn drop(&mut self) {
        self.entry.in_use.fetch_sub(1, Ordering::AcqRel);
        self.released.notify_waiters();
    }
}

impl fmt::Debug for ModelLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelLease")
            .field("model", &self.entry.name)
            .field("in_use", &self.entry.in_use.load(Ordering::Relaxed))
            .finish()
    }
}

/// Outcome of inspecting the registry for one `ensure_loaded` attempt
enum Step {
    /// Not resident; runtime and artifact still to be checked (unlocked)
    Check,
    /// Slot reserved; carries the model evicted to make room, if any
    Load(Option<Arc<ResidentModel>>),
    Wait,
}

/// Frees a `Loading` slot if the load fails or the caller is cancelled
struct Reservation<'a> {
    cache: &'a ModelCache,
    name: &'a str,
    armed: bool,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        {
            let mut state = self.cache.lock_state();
            if matches!(state.slots.get(self.name), Some(Slot::Loading)) {
                state.remove(self.name);
            }
        }
        self.cache.released.notify_waiters();
    }
}

/// Capacity-bounded registry of resident models
pub struct ModelCache {
    capacity: usize,
    policy: EvictionPolicy,
    specs: Vec<ModelSpec>,
    runtime: Arc<dyn ModelRuntime>,
    state: Mutex<CacheState>,
    /// Signalled whenever a lease is dropped or a slot changes state
    released: Arc<Notify>,
}

impl ModelCache {
    /// Create an empty cache; nothing is loaded until first demand
    pub fn new(
        runtime: Arc<dyn ModelRuntime>,
        specs: Vec<ModelSpec>,
        capacity: usize,
        policy: EvictionPolicy,
    ) -> Self {
        if capacity == 0 {
            warn!("Model cache capacity 0 is not usable, using 1");
        }
        Self {
            capacity: capacity.max(1),
            policy,
            specs,
            runtime,
            state: Mutex::new(CacheState::default()),
            released: Arc::new(Notify::new()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lease(&self, entry: &Arc<ResidentModel>) -> ModelLease {
        entry.in_use.fetch_add(1, Ordering::AcqRel);
        ModelLease {
            entry: Arc::clone(entry),
            released: Arc::clone(&self.released),
        }
    }

    /// Return a lease on `name`, loading it first if needed
    ///
    /// # Errors
    /// * `ModelError::Unavailable` - not configured, artifact missing, or the
    ///   runtime failed to load it (skip this model)
    /// * `ModelError::RuntimeUnavailable` - the inference runtime is missing
    pub async fn ensure_loaded(&self, name: &str) -> Result<ModelLease, ModelError> {
        let spec = self
            .spec(name)
            .ok_or_else(|| ModelError::unavailable(name, "not a configured model"))?;
        let mut checked = false;

        loop {
            // Registered before inspecting state so a release between the
            // check and the await is not missed
            let released = self.released.notified();

            // The registry guard lives only inside this block; nothing below
            // awaits while holding it
            let step = {
                let mut state = self.lock_state();

                let dead = matches!(
                    state.slots.get(name),
                    Some(Slot::Resident(entry)) if !entry.model.is_healthy()
                ) && state.is_idle(name);
                if dead {
                    warn!(model = name, "Resident model is no longer healthy, reloading");
                    state.remove(name);
                }

                match state.slots.get(name) {
                    Some(Slot::Resident(entry)) if entry.model.is_healthy() => {
                        let lease = self.lease(entry);
                        if self.policy == EvictionPolicy::Lru {
                            state.touch(name);
                        }
                        return Ok(lease);
                    }
                    Some(Slot::Resident(_)) => {
                        debug!(model = name, "Waiting for leases on an unhealthy model to drop");
                        Step::Wait
                    }
                    Some(Slot::Loading) => {
                        debug!(model = name, "Waiting for in-flight load");
                        Step::Wait
                    }
                    None if !checked => Step::Check,
                    None => {
                        let victim = if state.slots.len() >= self.capacity {
                            state.take_idle_victim()
                        } else {
                            None
                        };

                        if state.slots.len() < self.capacity {
                            state.slots.insert(name.to_string(), Slot::Loading);
                            state.order.push_back(name.to_string());
                            Step::Load(victim)
                        } else {
                            debug!(model = name, "Every resident model is in use, waiting for a release");
                            Step::Wait
                        }
                    }
                }
            };

            match step {
                Step::Check => {
                    // Runtime first: without it no model can ever load
                    self.runtime.check_available()?;
                    if !spec.path.exists() {
                        return Err(ModelError::unavailable(
                            name,
                            format!("artifact not found at {}", spec.path.display()),
                        ));
                    }
                    checked = true;
                }
                Step::Load(victim) => {
                    if let Some(evicted) = victim {
                        info!(model = %evicted.name, "Evicted model to make room for {}", name);
                    }
                    return self.load_reserved(spec).await;
                }
                Step::Wait => released.await,
            }
        }
    }

    async fn load_reserved(&self, spec: &ModelSpec) -> Result<ModelLease, ModelError> {
        let mut reservation = Reservation {
            cache: self,
            name: &spec.name,
            armed: true,
        };

        info!(
            model = %spec.name,
            path = %spec.path.display(),
            runtime = self.runtime.name(),
            "Loading model"
        );

        let model = match self.runtime.load(&spec.name, &spec.path).await {
            Ok(model) => model,
            Err(e) => {
                warn!(model = %spec.name, error = %e, "Model load failed");
                return Err(match e {
                    ModelError::RuntimeUnavailable(_) | ModelError::Unavailable { .. } => e,
                    other => ModelError::unavailable(&spec.name, other.to_string()),
                });
            }
        };

        let entry = Arc::new(ResidentModel {
            name: spec.name.clone(),
            path: spec.path.clone(),
            model,
            in_use: AtomicUsize::new(1),
        });

        let resident_count = {
            let mut state = self.lock_state();
            state
                .slots
                .insert(spec.name.clone(), Slot::Resident(Arc::clone(&entry)));
            state.resident_names().len()
        };
        reservation.armed = false;
        self.released.notify_waiters();

        info!(
            model = %spec.name,
            "Model loaded ({}/{} resident)",
            resident_count,
            self.capacity
        );

        Ok(ModelLease {
            entry,
            released: Arc::clone(&self.released),
        })
    }

    /// Evict the first idle model in eviction order
    ///
    /// Returns the evicted model's name, or `None` when nothing is idle.
    pub fn evict_one(&self) -> Option<String> {
        let victim = self.lock_state().take_idle_victim()?;
        info!(model = %victim.name, "Evicted model");
        Some(victim.name.clone())
    }

    /// Release every idle resident model
    ///
    /// Models with outstanding leases stay resident. Returns the number of
    /// models released.
    pub fn unload_all(&self) -> usize {
        let (released, busy) = {
            let mut state = self.lock_state();
            let mut released = Vec::new();
            while let Some(entry) = state.take_idle_victim() {
                released.push(entry);
            }
            (released, state.resident_names())
        };

        if !busy.is_empty() {
            warn!("Models still in use were left resident: {}", busy.join(", "));
        }
        info!("Unloaded {} models", released.len());
        released.len()
    }

    /// Resident model names in eviction order (next victim first)
    pub fn resident(&self) -> Vec<String> {
        self.lock_state().resident_names()
    }

    pub fn resident_count(&self) -> usize {
        self.resident().len()
    }

    pub fn is_resident(&self, name: &str) -> bool {
        matches!(self.lock_state().slots.get(name), Some(Slot::Resident(_)))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    pub fn runtime(&self) -> &Arc<dyn ModelRuntime> {
        &self.runtime
    }

    /// Configured model names in declaration order
    pub fn configured_models(&self) -> Vec<String> {
        self.specs.iter().map(|s| s.name.clone()).collect()
    }

    pub fn spec(&self, name: &str) -> Option<&ModelSpec> {
        self.specs.iter().find(|s| s.name == name)
    }
}

impl fmt::Debug for ModelCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelCache")
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .field("resident", &self.resident())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eviction_policy_parsing() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: EvictionPolicy,
        }

        let fifo: Wrapper = toml::from_str("policy = \"fifo\"").unwrap();
        let lru: Wrapper = toml::from_str("policy = \"lru\"").unwrap();
        assert_eq!(fifo.policy, EvictionPolicy::Fifo);
        assert_eq!(lru.policy, EvictionPolicy::Lru);
        assert_eq!(EvictionPolicy::default(), EvictionPolicy::Fifo);
        assert!(toml::from_str::<Wrapper>("policy = \"lfu\"").is_err());
    }

    #[test]
    fn test_state_victim_skips_leased_and_loading() {
        struct Idle;

        #[async_trait::async_trait]
        impl InferenceModel for Idle {
            async fn infer(&self, _image: &[u8]) -> Result<ModelOutput, ModelError> {
                Err(ModelError::inference("idle", "not used"))
            }
        }

        let resident = |name: &str, in_use: usize| {
            Arc::new(ResidentModel {
                name: name.to_string(),
                path: PathBuf::from(name),
                model: Arc::new(Idle),
                in_use: AtomicUsize::new(in_use),
            })
        };

        let mut state = CacheState::default();
        for name in ["loading", "busy", "idle"] {
            state.order.push_back(name.to_string());
        }
        state.slots.insert("loading".into(), Slot::Loading);
        state.slots.insert("busy".into(), Slot::Resident(resident("busy", 1)));
        state.slots.insert("idle".into(), Slot::Resident(resident("idle", 0)));

        let victim = state.take_idle_victim().unwrap();
        assert_eq!(victim.name, "idle");
        assert!(state.take_idle_victim().is_none());
        assert_eq!(state.resident_names(), vec!["busy"]);
    }
}
