//! Configuration for gymvision-ident
//!
//! Loaded from `gymvision.toml` (see [`IdentConfig::load`]). Every field has a
//! built-in default, so an empty or missing file reproduces the stock
//! deployment: five artifacts `best.pt` … `best4.pt` under the root folder,
//! two resident at a time.

use crate::error::{Error, Result};
use crate::fusion::{
    FusionSettings, DEFAULT_CANDIDATES_PER_MODEL, DEFAULT_PRIORITY_MARGIN, DEFAULT_TOP_N,
};
use crate::models::command_runtime::DEFAULT_PROGRAM;
use crate::models::{CommandRuntime, EvictionPolicy, ModelSpec};
use gymvision_common::config::{
    load_toml_or_default, resolve_config_path, resolve_root_folder, resolve_under,
    LoggingConfig, ROOT_FOLDER_ENV,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Config file name looked up in the per-user config directory
pub const CONFIG_FILE_NAME: &str = "gymvision.toml";

/// Top-level configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IdentConfig {
    /// Root folder for artifacts, tables and images (optional)
    pub root_folder: Option<PathBuf>,

    /// Tables file; the built-in tables are used when absent
    pub tables: Option<PathBuf>,

    /// Local illustration directory (optional)
    pub images_dir: Option<PathBuf>,

    pub logging: LoggingConfig,
    pub models: ModelsConfig,
    pub runtime: RuntimeConfig,
    pub fusion: FusionConfig,
}

/// `[models]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Maximum resident models
    pub capacity: usize,
    pub eviction: EvictionPolicy,
    pub artifacts: Vec<ArtifactConfig>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        let artifacts = ["best", "best1", "best2", "best3", "best4"]
            .into_iter()
            .map(|name| ArtifactConfig {
                name: name.to_string(),
                path: PathBuf::from(format!("{}.pt", name)),
            })
            .collect();

        Self {
            capacity: 2,
            eviction: EvictionPolicy::default(),
            artifacts,
        }
    }
}

/// One `[[models.artifacts]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ArtifactConfig {
    pub name: String,
    /// Relative paths resolve under the root folder
    pub path: PathBuf,
}

/// `[runtime]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Inference worker executable (path or bare name on PATH)
    pub program: PathBuf,
    /// Arguments placed before the artifact path
    pub args: Vec<String>,
    pub load_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_PROGRAM),
            args: Vec::new(),
            load_timeout_ms: 60_000,
        }
    }
}

/// `[fusion]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub priority_margin: f64,
    pub candidates_per_model: usize,
    pub top_n: usize,
    pub request_timeout_ms: u64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            priority_margin: DEFAULT_PRIORITY_MARGIN,
            candidates_per_model: DEFAULT_CANDIDATES_PER_MODEL,
            top_n: DEFAULT_TOP_N,
            request_timeout_ms: 30_000,
        }
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::Common(gymvision_common::Error::Config(message.into()))
}

impl IdentConfig {
    /// Load and validate the configuration
    ///
    /// Location: `cli_config`, then `GYMVISION_CONFIG`, then
    /// `<config dir>/gymvision/gymvision.toml`. A missing file yields the
    /// defaults.
    pub fn load(cli_config: Option<&Path>) -> Result<Self> {
        let config = match resolve_config_path(cli_config, CONFIG_FILE_NAME) {
            Some(path) => load_toml_or_default::<Self>(&path)?,
            None => {
                debug!("No config directory on this platform, using built-in defaults");
                Self::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| invalid(format!("Parse config failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.models.capacity == 0 {
            return Err(invalid("models.capacity must be at least 1"));
        }

        let margin = self.fusion.priority_margin;
        if !margin.is_finite() || !(0.0..=1.0).contains(&margin) {
            return Err(invalid(format!(
                "fusion.priority_margin must be within [0, 1], got {}",
                margin
            )));
        }
        if self.fusion.top_n == 0 {
            return Err(invalid("fusion.top_n must be at least 1"));
        }
        if self.fusion.candidates_per_model == 0 {
            return Err(invalid("fusion.candidates_per_model must be at least 1"));
        }
        if self.fusion.request_timeout_ms == 0 {
            return Err(invalid("fusion.request_timeout_ms must be positive"));
        }
        if self.runtime.load_timeout_ms == 0 {
            return Err(invalid("runtime.load_timeout_ms must be positive"));
        }

        let mut seen = HashSet::new();
        for artifact in &self.models.artifacts {
            if artifact.name.trim().is_empty() {
                return Err(invalid("models.artifacts entries need a name"));
            }
            if !seen.insert(artifact.name.as_str()) {
                return Err(invalid(format!(
                    "Duplicate model name '{}' in models.artifacts",
                    artifact.name
                )));
            }
        }

        Ok(())
    }

    /// Root folder: CLI, then `GYMVISION_ROOT_FOLDER`, then config, then OS default
    pub fn root_folder(&self, cli_root: Option<&Path>) -> PathBuf {
        resolve_root_folder(cli_root, ROOT_FOLDER_ENV, self.root_folder.as_deref())
    }

    /// Configured models with artifact paths resolved under `root`
    pub fn model_specs(&self, root: &Path) -> Vec<ModelSpec> {
        self.models
            .artifacts
            .iter()
            .map(|a| ModelSpec::new(a.name.clone(), resolve_under(root, &a.path)))
            .collect()
    }

    pub fn tables_path(&self, root: &Path) -> Option<PathBuf> {
        self.tables.as_deref().map(|p| resolve_under(root, p))
    }

    pub fn images_path(&self, root: &Path) -> Option<PathBuf> {
        self.images_dir.as_deref().map(|p| resolve_under(root, p))
    }

    pub fn command_runtime(&self) -> CommandRuntime {
        CommandRuntime::new(
            self.runtime.program.clone(),
            self.runtime.args.clone(),
            Duration::from_millis(self.runtime.load_timeout_ms),
        )
    }

    pub fn fusion_settings(&self) -> FusionSettings {
        FusionSettings {
            priority_margin: self.fusion.priority_margin,
            candidates_per_model: self.fusion.candidates_per_model,
            top_n: self.fusion.top_n,
            request_timeout: Duration::from_millis(self.fusion.request_timeout_ms),
        }
    }
}
