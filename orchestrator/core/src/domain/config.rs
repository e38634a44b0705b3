// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Orchestrator Configuration
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) covering:
// - Scheduler worker pool, default task timeout and whole-run execution timeout
// - Mesh refinement rounds
// - Loop convergence limits
// - Risk scoring weights and thresholds

use crate::domain::convergence::ConvergenceConfig;
use crate::domain::risk::RiskConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "taskweave.dev/v1";
pub const KIND: &str = "OrchestratorConfig";

pub const ENV_CONFIG_PATH: &str = "TASKWEAVE_CONFIG_PATH";
pub const ENV_WORKER_POOL_SIZE: &str = "TASKWEAVE_WORKER_POOL_SIZE";
pub const ENV_TASK_TIMEOUT: &str = "TASKWEAVE_TASK_TIMEOUT";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level orchestrator configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfigManifest {
    /// API version (must be "taskweave.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "OrchestratorConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: OrchestratorConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfigSpec {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub mesh: MeshConfig,

    #[serde(default, rename = "loop")]
    pub loop_config: ConvergenceConfig,

    #[serde(default)]
    pub risk: RiskConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of tasks running at once
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    /// Applied to tasks that do not declare their own timeout
    #[serde(default = "default_task_timeout", with = "humantime_serde")]
    pub task_timeout: Duration,

    /// Shared-context category that receives every succeeded task result
    #[serde(default = "default_results_category")]
    pub results_category: String,

    /// Bound on a whole run (graph, loop or mesh); unset means unbounded
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub execution_timeout: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            task_timeout: default_task_timeout(),
            results_category: default_results_category(),
            execution_timeout: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshConfig {
    /// Barrier-gated refinement rounds after the independent round
    #[serde(default = "default_refinement_rounds")]
    pub refinement_rounds: u32,

    /// Prefix of the per-round shared-context categories
    #[serde(default = "default_category_prefix")]
    pub category_prefix: String,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            refinement_rounds: default_refinement_rounds(),
            category_prefix: default_category_prefix(),
        }
    }
}

fn default_worker_pool_size() -> usize {
    4
}

fn default_task_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_results_category() -> String {
    "task_results".to_string()
}

fn default_refinement_rounds() -> u32 {
    1
}

fn default_category_prefix() -> String {
    "mesh".to_string()
}

impl Default for OrchestratorConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "taskweave".to_string(),
                labels: None,
            },
            spec: OrchestratorConfigSpec::default(),
        }
    }
}

impl OrchestratorConfigManifest {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Discover configuration file using precedence order
    /// 1. TASKWEAVE_CONFIG_PATH environment variable
    /// 2. ./taskweave.yaml (working directory)
    /// 3. ~/.taskweave/config.yaml (user home)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./taskweave.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".taskweave").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        // Explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = match Self::discover_config() {
            Some(path) => {
                tracing::info!("Loading configuration from discovered path: {:?}", path);
                Self::from_yaml_file(path)?
            }
            None => {
                tracing::debug!("No configuration file found, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(ENV_WORKER_POOL_SIZE) {
            match val.trim().parse::<usize>() {
                Ok(size) => {
                    tracing::info!("Environment override: {}={}", ENV_WORKER_POOL_SIZE, size);
                    self.spec.scheduler.worker_pool_size = size;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for {}: '{}'. Expected a positive integer. Ignoring.",
                    ENV_WORKER_POOL_SIZE,
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var(ENV_TASK_TIMEOUT) {
            match humantime_serde::re::humantime::parse_duration(val.trim()) {
                Ok(timeout) => {
                    tracing::info!("Environment override: {}={:?}", ENV_TASK_TIMEOUT, timeout);
                    self.spec.scheduler.task_timeout = timeout;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for {}: '{}'. Expected a duration like '30s'. Ignoring.",
                    ENV_TASK_TIMEOUT,
                    val
                ),
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.api_version != API_VERSION {
            return invalid(format!(
                "apiVersion '{}' must be '{}'",
                self.api_version, API_VERSION
            ));
        }
        if self.kind != KIND {
            return invalid(format!("kind '{}' must be '{}'", self.kind, KIND));
        }
        if self.metadata.name.is_empty() {
            return invalid("metadata.name cannot be empty".to_string());
        }

        let scheduler = &self.spec.scheduler;
        if scheduler.worker_pool_size == 0 {
            return invalid("spec.scheduler.worker_pool_size must be at least 1".to_string());
        }
        if scheduler.task_timeout.is_zero() {
            return invalid("spec.scheduler.task_timeout must be greater than zero".to_string());
        }
        if scheduler.execution_timeout.is_some_and(|t| t.is_zero()) {
            return invalid("spec.scheduler.execution_timeout must be greater than zero".to_string());
        }
        if scheduler.results_category.is_empty() {
            return invalid("spec.scheduler.results_category cannot be empty".to_string());
        }

        if self.spec.mesh.category_prefix.is_empty() {
            return invalid("spec.mesh.category_prefix cannot be empty".to_string());
        }

        let looping = &self.spec.loop_config;
        if looping.max_iterations == 0 {
            return invalid("spec.loop.max_iterations must be at least 1".to_string());
        }
        for (name, value) in [
            ("improvement_threshold", looping.improvement_threshold),
            ("quality_target", looping.quality_target),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("spec.loop.{name} must be within [0, 1]"));
            }
        }

        let risk = &self.spec.risk;
        for (indicator, weight) in risk.weights.iter() {
            if weight.is_nan() || weight < 0.0 {
                return invalid(format!(
                    "spec.risk.weights.{indicator} must be non-negative (got {weight})"
                ));
            }
        }
        if !(0.0..=1.0).contains(&risk.low_threshold)
            || !(0.0..=1.0).contains(&risk.high_threshold)
            || risk.low_threshold > risk.high_threshold
        {
            return invalid(
                "spec.risk thresholds must satisfy 0 <= low_threshold <= high_threshold <= 1"
                    .to_string(),
            );
        }
        if risk.income_tolerance < 0.0 || risk.max_reporting_lag_days < 0 {
            return invalid("spec.risk tolerances must be non-negative".to_string());
        }

        Ok(())
    }
}
