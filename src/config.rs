use crate::util::error::ConfigError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::Path, time::Duration};

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct ChainConfig {
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub source: SourceConfig,
    pub stages: Vec<StageConfig>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorConfig {
    pub thread_name: String,
    pub release_timeout_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { thread_name: "frame-processing".to_string(), release_timeout_ms: 500 }
    }
}

impl ExecutorConfig {
    pub fn release_timeout(&self) -> Duration { Duration::from_millis(self.release_timeout_ms) }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    pub pool_size: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for SourceConfig {
    fn default() -> Self { Self { pool_size: 3, width: 1920, height: 1080 } }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum StageConfig {
    Passthrough,
    FrameCounter {
        #[serde(default)]
        name: Option<String>,
    },
    SimulatedLoad { micros: u64 },
}

impl ChainConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: ChainConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = fs::read_to_string(path)
            .with_context(|| format!("could not read chain config {}", path.display()))?;
        Self::from_yaml_str(&yaml)
            .with_context(|| format!("invalid chain config {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stages.is_empty() {
            return Err(ConfigError::NoStages);
        }
        if self.executor.thread_name.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "executor.thread_name",
                reason: "must not be empty".to_string(),
            });
        }
        if self.executor.release_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "executor.release_timeout_ms",
                reason: "must be positive".to_string(),
            });
        }
        if self.source.pool_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "source.pool_size",
                reason: "the source needs at least one texture".to_string(),
            });
        }
        Ok(())
    }
}
