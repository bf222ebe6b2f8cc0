use crate::training::{HttpTrainer, Trainer, TrainingPolicy};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub timeout_secs: u64,
    pub failure_policy: TrainingPolicy,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "http://localhost:8080/v1/train".to_string(),
            timeout_secs: 30,
            failure_policy: TrainingPolicy::BestEffort,
        }
    }
}

impl TrainingConfig {
    /// `None` when training is switched off.
    pub fn build_trainer(&self) -> Result<Option<Arc<dyn Trainer>>> {
        if !self.enabled {
            return Ok(None);
        }
        let trainer = HttpTrainer::new(self.endpoint.clone(), Duration::from_secs(self.timeout_secs))?;
        Ok(Some(Arc::new(trainer)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub redis_url: String,
    /// Dialog nodes compiled at the same time
    pub max_concurrency: usize,
    /// Commands buffered ahead of the sink writer
    pub sink_buffer: usize,
    /// Finish non-demo publishes as UnderReview instead of Published
    pub require_review: bool,
    pub training: TrainingConfig,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379/0".to_string(),
            max_concurrency: 64,
            sink_buffer: 64,
            require_review: false,
            training: TrainingConfig::default(),
        }
    }
}

impl CompilerConfig {
    /// Loads a YAML or JSON config file, picked by extension.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file from {}", path.display()))?;

        let config = match path.extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("Failed to deserialize JSON config from {}", path.display()))?,
            _ => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to deserialize YAML config from {}", path.display()))?,
        };
        Ok(config)
    }
}
