//! Error types for gymvision-ident
//!
//! Per-model failures ([`ModelError`]) are absorbed inside a request. Only
//! whole-request failures ([`IdentifyError`]) reach the caller.

use thiserror::Error;

/// Failure affecting a single model
#[derive(Debug, Error)]
pub enum ModelError {
    /// Artifact missing, not configured, or failed to load (skip this model)
    #[error("Model '{model}' unavailable: {reason}")]
    Unavailable { model: String, reason: String },

    /// The inference runtime itself is not installed
    #[error("Inference runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// The model was loaded but inference failed
    #[error("Inference failed for model '{model}': {reason}")]
    Inference { model: String, reason: String },

    /// The model did not finish within the request deadline
    #[error("Model '{model}' exceeded the {timeout_ms}ms request deadline")]
    Timeout { model: String, timeout_ms: u64 },
}

impl ModelError {
    pub fn unavailable(model: impl Into<String>, reason: impl Into<String>) -> Self {
        ModelError::Unavailable {
            model: model.into(),
            reason: reason.into(),
        }
    }

    pub fn inference(model: impl Into<String>, reason: impl Into<String>) -> Self {
        ModelError::Inference {
            model: model.into(),
            reason: reason.into(),
        }
    }
}

/// Whole-request outcome returned to the caller of `identify`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifyError {
    /// Not a single configured model could be loaded
    #[error("No models available")]
    NoModelsAvailable,

    /// Every candidate was filtered out or no model produced output
    #[error("Could not identify the equipment in this image")]
    NoPrediction,

    /// The inference runtime is missing for every configured model
    #[error("Inference runtime unavailable: {0}")]
    RuntimeUnavailable(String),
}

impl IdentifyError {
    /// Stable machine-readable code for the enclosing service
    pub fn code(&self) -> &'static str {
        match self {
            IdentifyError::NoModelsAvailable => "NO_MODELS_AVAILABLE",
            IdentifyError::NoPrediction => "NO_PREDICTION",
            IdentifyError::RuntimeUnavailable(_) => "RUNTIME_UNAVAILABLE",
        }
    }

    /// "Could not identify" is a normal outcome, not a system fault
    pub fn is_recoverable(&self) -> bool {
        matches!(self, IdentifyError::NoPrediction)
    }
}

/// Crate-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// gymvision-common error (configuration, I/O)
    #[error("Common error: {0}")]
    Common(#[from] gymvision_common::Error),

    /// Identification tables could not be parsed or are inconsistent
    #[error("Tables error: {0}")]
    Tables(String),

    /// Identification failed
    #[error(transparent)]
    Identify(#[from] IdentifyError),

    /// Model failure surfaced outside a request
    #[error(transparent)]
    Model(#[from] ModelError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using gymvision-ident Error
pub type Result<T> = std::result::Result<T, Error>;
