//! # GymVision Common Library
//!
//! Shared code for the GymVision services:
//! - Error type used across crates
//! - Configuration loading and root folder resolution
//! - Label normalization helpers
//! - Logging initialization

pub mod config;
pub mod error;
pub mod labels;
pub mod logging;

pub use error::{Error, Result};
pub use labels::normalize_label;
