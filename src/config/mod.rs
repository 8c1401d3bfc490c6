//! Configuration for the innovation workflow
//!
//! Settings live in a YAML file (default `~/.innovation-flow/config.yaml`).
//! A missing file yields defaults; CLI flags are merged on top with
//! [`merge_overrides`]. API keys are resolved separately, see [`secrets`].

pub mod secrets;

use crate::ranking::ScoringWeights;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use secrets::{
    resolve_secret, store_api_keys, SecretsConfig, GEMINI_API_KEY, TAVILY_API_KEY,
};

/// Text-generation collaborator settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    /// Model name passed to the generation API
    pub model: String,
    /// Base URL of the generation API
    pub base_url: String,
    /// Per-call timeout in seconds
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-pro".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_secs: 120,
        }
    }
}

impl GenerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Search collaborator settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    pub endpoint: String,
    pub max_results: usize,
    /// Extra attempts after the first one, for 5xx/429 failures
    pub retries: u32,
    /// Linear backoff unit in milliseconds (attempt n waits n * backoff)
    pub backoff_ms: u64,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.tavily.com/search".to_string(),
            max_results: 5,
            retries: 2,
            backoff_ms: 1000,
            timeout_secs: 15,
        }
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Workflow behaviour settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Directory where evaluation sheets and action plans are written
    pub artifacts_dir: PathBuf,
    /// Upper bound on generated ideas
    pub max_ideas: usize,
    /// Number of ideas kept by the ranking stage
    pub top_k: usize,
    /// Ask for real-world analogs when an idea comes back without any
    pub enrich_analogs: bool,
    /// Number of related competencies attached to each idea
    pub related_competencies: usize,
    /// Directory of `<name>.tera` files overriding the built-in prompts
    pub prompts_dir: Option<PathBuf>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from("artifacts"),
            max_ideas: 10,
            top_k: 3,
            enrich_analogs: true,
            related_competencies: 3,
            prompts_dir: None,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub generation: GenerationConfig,
    pub search: SearchConfig,
    pub workflow: WorkflowConfig,
    pub ranking: ScoringWeights,
}

/// Default config location: ~/.innovation-flow/config.yaml
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".innovation-flow").join("config.yaml"))
}

/// Configuration file manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a manager for an explicit config file
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Manager for the default location, or `./innovation-flow.yaml` when no home dir exists
    pub fn default_location() -> Self {
        Self::new(default_config_path().unwrap_or_else(|| PathBuf::from("innovation-flow.yaml")))
    }

    /// Check if config file exists
    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }

    /// Read config from file, returning defaults if not found
    pub fn read(&self) -> Result<AppConfig, String> {
        if !self.config_path.exists() {
            log::debug!(
                "No config file at {:?}, using defaults",
                self.config_path
            );
            return Ok(apply_env_overrides(AppConfig::default()));
        }

        let content = std::fs::read_to_string(&self.config_path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let config: AppConfig = serde_yaml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file: {}", e))?;

        Ok(apply_env_overrides(config))
    }

    /// Write config to file
    pub fn write(&self, config: &AppConfig) -> Result<(), String> {
        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| format!("Failed to create config directory: {}", e))?;
            }
        }

        let content = serde_yaml::to_string(config)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        std::fs::write(&self.config_path, content)
            .map_err(|e| format!("Failed to write config file: {}", e))
    }

    /// Initialize config with defaults if it doesn't exist
    pub fn initialize(&self) -> Result<AppConfig, String> {
        if self.exists() {
            return self.read();
        }

        let config = AppConfig::default();
        self.write(&config)?;
        Ok(config)
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

/// Environment variable that overrides the generation model
pub const GEMINI_MODEL_ENV: &str = "GEMINI_MODEL";

fn apply_env_overrides(config: AppConfig) -> AppConfig {
    apply_model_override(config, std::env::var(GEMINI_MODEL_ENV).ok().as_deref())
}

/// Blank values leave the configured model alone
fn apply_model_override(mut config: AppConfig, model: Option<&str>) -> AppConfig {
    if let Some(model) = model.map(str::trim).filter(|m| !m.is_empty()) {
        config.generation.model = model.to_string();
    }
    config
}

/// Merge file config with command-line overrides
pub fn merge_overrides(
    file_config: &AppConfig,
    artifacts_dir: Option<&Path>,
    max_ideas: Option<usize>,
    top_k: Option<usize>,
    model: Option<&str>,
) -> AppConfig {
    let mut merged = file_config.clone();
    if let Some(dir) = artifacts_dir {
        merged.workflow.artifacts_dir = dir.to_path_buf();
    }
    if let Some(n) = max_ideas {
        merged.workflow.max_ideas = n;
    }
    if let Some(k) = top_k {
        merged.workflow.top_k = k;
    }
    if let Some(m) = model {
        merged.generation.model = m.to_string();
    }
    merged
}
