//! Hierarchical configuration loading (spec ambient stack).
//!
//! Grounded on `abathur::infrastructure::config::loader::ConfigLoader`:
//! figment-merged defaults -> project YAML -> environment overrides, with
//! an explicit post-merge validation pass.

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::logging::LogConfig;
use crate::services::checkpoint_manager::CheckpointConfig;
use crate::services::dag_engine::ExecutionConfig;
use crate::services::mutation_controller::MutationLimits;

/// Top-level host configuration: the scheduler, mutation, checkpoint, and
/// logging knobs a deployment tunes (spec §5 / §4.1 / §4.10, ambient
/// logging stack).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_max_execution_time_ms")]
    pub max_execution_time_ms: u64,
    #[serde(default = "default_true")]
    pub enforce_security_gate: bool,
    #[serde(default = "default_true")]
    pub enforce_drift_gate: bool,
    #[serde(default = "default_true")]
    pub enforce_quality_gate: bool,
    #[serde(default = "default_true")]
    pub enable_self_healing: bool,
    #[serde(default = "default_true")]
    pub allow_reactive_mutation: bool,

    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default = "default_max_graph_size")]
    pub max_graph_size: usize,
    #[serde(default = "default_true")]
    pub enforce_rbac: bool,

    #[serde(default = "default_max_checkpoints")]
    pub max_checkpoints: usize,
    #[serde(default = "default_true")]
    pub verify_checkpoints_on_load: bool,
    #[serde(default = "default_auto_checkpoint_interval")]
    pub auto_checkpoint_interval: u32,

    #[serde(default)]
    pub logging: LogConfig,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            tick_interval_ms: default_tick_interval_ms(),
            max_execution_time_ms: default_max_execution_time_ms(),
            enforce_security_gate: true,
            enforce_drift_gate: true,
            enforce_quality_gate: true,
            enable_self_healing: true,
            allow_reactive_mutation: true,
            max_depth: default_max_depth(),
            max_graph_size: default_max_graph_size(),
            enforce_rbac: true,
            max_checkpoints: default_max_checkpoints(),
            verify_checkpoints_on_load: true,
            auto_checkpoint_interval: default_auto_checkpoint_interval(),
            logging: LogConfig::default(),
        }
    }
}

fn default_max_concurrency() -> usize {
    8
}
fn default_tick_interval_ms() -> u64 {
    200
}
fn default_max_execution_time_ms() -> u64 {
    30 * 60 * 1_000
}
fn default_max_depth() -> u32 {
    8
}
fn default_max_graph_size() -> usize {
    5_000
}
fn default_max_checkpoints() -> usize {
    20
}
fn default_auto_checkpoint_interval() -> u32 {
    10
}
fn default_true() -> bool {
    true
}

impl EngineSettings {
    pub fn execution_config(&self) -> ExecutionConfig {
        ExecutionConfig {
            max_concurrency: self.max_concurrency,
            tick_interval_ms: self.tick_interval_ms,
            max_execution_time_ms: self.max_execution_time_ms,
            enforce_security_gate: self.enforce_security_gate,
            allow_reactive_mutation: self.allow_reactive_mutation,
        }
    }

    pub fn mutation_limits(&self) -> MutationLimits {
        MutationLimits { max_depth: self.max_depth, max_graph_size: self.max_graph_size, enforce_rbac: self.enforce_rbac }
    }

    pub fn checkpoint_config(&self) -> CheckpointConfig {
        CheckpointConfig {
            max_checkpoints: self.max_checkpoints,
            verify_on_load: self.verify_checkpoints_on_load,
            auto_checkpoint_interval: self.auto_checkpoint_interval,
        }
    }
}

/// Errors raised validating a loaded [`EngineSettings`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("max_concurrency must be at least 1")]
    InvalidMaxConcurrency,
    #[error("tick_interval_ms must be at least 1")]
    InvalidTickInterval,
    #[error("max_depth must be at least 1")]
    InvalidMaxDepth,
    #[error("max_graph_size must be at least 1")]
    InvalidMaxGraphSize,
    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),
}

/// Loads [`EngineSettings`] with figment's hierarchical precedence:
/// defaults < `castellan.yaml` < `CASTELLAN_*` environment overrides.
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load() -> Result<EngineSettings, figment::Error> {
        let settings: EngineSettings = Figment::new()
            .merge(Serialized::defaults(EngineSettings::default()))
            .merge(Yaml::file("castellan.yaml"))
            .merge(Env::prefixed("CASTELLAN_").split("__"))
            .extract()?;
        Ok(settings)
    }

    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<EngineSettings, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(EngineSettings::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
    }

    pub fn validate(settings: &EngineSettings) -> Result<(), ConfigError> {
        if settings.max_concurrency == 0 {
            return Err(ConfigError::InvalidMaxConcurrency);
        }
        if settings.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidTickInterval);
        }
        if settings.max_depth == 0 {
            return Err(ConfigError::InvalidMaxDepth);
        }
        if settings.max_graph_size == 0 {
            return Err(ConfigError::InvalidMaxGraphSize);
        }
        const VALID_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
        if !VALID_LEVELS.contains(&settings.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(settings.logging.level.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_validate() {
        let settings = EngineSettings::default();
        ConfigLoader::validate(&settings).unwrap();
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut settings = EngineSettings::default();
        settings.max_concurrency = 0;
        assert!(matches!(ConfigLoader::validate(&settings), Err(ConfigError::InvalidMaxConcurrency)));
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        let mut settings = EngineSettings::default();
        settings.logging.level = "verbose".to_string();
        assert!(matches!(ConfigLoader::validate(&settings), Err(ConfigError::InvalidLogLevel(_))));
    }

    #[test]
    fn yaml_overrides_merge_over_defaults() {
        let yaml = "max_concurrency: 16\nlogging:\n  level: debug\n";
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("castellan.yaml");
        std::fs::write(&path, yaml).unwrap();

        let settings = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(settings.max_concurrency, 16);
        assert_eq!(settings.logging.level, "debug");
        assert_eq!(settings.tick_interval_ms, default_tick_interval_ms());
    }
}
