//! gymvision-ident library interface
//!
//! Identifies gym equipment in a photo by fusing several inference models,
//! keeping only a bounded number of them resident.
//!
//! Exposes public APIs for the binary and for integration testing.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod fusion;
pub mod models;

pub use crate::catalog::{ExerciseInfo, Tables, VocabularyReport};
pub use crate::config::IdentConfig;
pub use crate::engine::{HealthReport, IdentificationChoice, IdentificationEngine, IdentificationResult};
pub use crate::error::{Error, IdentifyError, ModelError, Result};
pub use crate::fusion::FusionSettings;
pub use crate::models::{EvictionPolicy, ModelCache, ModelLease, ModelRuntime, ModelSpec};
