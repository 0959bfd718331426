//! Configuration System
//!
//! Layered configuration for the generator and logging. Values merge from built-in
//! defaults, the global config file, workspace config files and `STATGEN__*`
//! environment variables, in that order of precedence. Tests included.

use crate::error::GenerationError;
use crate::logging::LoggingConfig;
use crate::statistics::MAX_HISTOGRAM_BINS;
use config::{Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

mod merge;
mod sources;

pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatgenConfig {
    #[serde(default)]
    pub generator: GeneratorConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Generator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Histogram bin count of generated statistics
    #[serde(default = "default_histogram_bins")]
    pub histogram_bins: u32,

    /// Exclude zero-valued voxels from statistics
    #[serde(default)]
    pub ignore_zero_voxel: bool,

    /// Regenerate automatically when the selection, parameters or inputs change
    #[serde(default)]
    pub auto_update: bool,

    /// Maximum number of jobs computing at once
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Default timeout when waiting for generation to finish
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
}

fn default_histogram_bins() -> u32 {
    100
}

fn default_worker_threads() -> usize {
    2
}

fn default_wait_timeout_ms() -> u64 {
    30_000
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            histogram_bins: default_histogram_bins(),
            ignore_zero_voxel: false,
            auto_update: false,
            worker_threads: default_worker_threads(),
            wait_timeout_ms: default_wait_timeout_ms(),
        }
    }
}

impl GeneratorConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.histogram_bins == 0 || self.histogram_bins > MAX_HISTOGRAM_BINS {
            return Err(format!(
                "histogram_bins must be between 1 and {}",
                MAX_HISTOGRAM_BINS
            ));
        }
        if self.worker_threads == 0 {
            return Err("worker_threads must be at least 1".to_string());
        }
        if self.wait_timeout_ms == 0 {
            return Err("wait_timeout_ms must be positive".to_string());
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Generator(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Generator(msg) => write!(f, "Generator: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl StatgenConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.generator.validate() {
            errors.push(ValidationError::Generator(e));
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            errors.push(ValidationError::Logging(format!(
                "unknown format '{}'",
                self.logging.format
            )));
        }
        if !matches!(self.logging.output.as_str(), "stdout" | "stderr" | "file") {
            errors.push(ValidationError::Logging(format!(
                "unknown output '{}'",
                self.logging.output
            )));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Loads [`StatgenConfig`] from its layered sources
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace.
    ///
    /// Precedence (highest last): defaults, global config file, `config/config.toml`,
    /// `config/{STATGEN_ENV}.toml`, `STATGEN__SECTION__KEY` environment variables.
    pub fn load(workspace_root: &Path) -> Result<StatgenConfig, GenerationError> {
        let builder = merge::merge_policy::builder_with_defaults()?;
        let builder = sources::global_file::add_to_builder(builder)?;
        let builder = sources::workspace_file::add_to_builder(builder, workspace_root)?;
        let config = builder
            .add_source(environment())
            .build()?
            .try_deserialize::<StatgenConfig>()?;
        Self::validated(config)
    }

    /// Load configuration from a single file, still honouring environment overrides
    pub fn load_from_file(path: &Path) -> Result<StatgenConfig, GenerationError> {
        let config = merge::merge_policy::builder_with_defaults()?
            .add_source(File::from(path).required(true))
            .add_source(environment())
            .build()?
            .try_deserialize::<StatgenConfig>()?;
        Self::validated(config)
    }

    /// Built-in defaults only
    pub fn defaults() -> Result<StatgenConfig, GenerationError> {
        let config: StatgenConfig = merge::merge_policy::builder_with_defaults()?
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    fn validated(config: StatgenConfig) -> Result<StatgenConfig, GenerationError> {
        config.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            GenerationError::Config(format!(
                "Configuration validation failed:\n{}",
                messages.join("\n")
            ))
        })?;
        Ok(config)
    }
}

fn environment() -> Environment {
    Environment::with_prefix("STATGEN")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}
