//! Orchestrator configuration types and loading.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

/// Top-level orchestrator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub worker: WorkerConfig,
    pub classifier: ClassifierConfig,
    pub strategy: StrategyConfig,
    pub outbox: OutboxConfig,
    pub reaper: ReaperConfig,
    pub context: ContextConfig,
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration with fallback chain: explicit path, then
    /// project-local, then user config dir, then defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(".orchestrator.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => tracing::warn!("failed to load config from {}: {e}", local_config.display()),
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("orchestrator").join("orchestrator.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => tracing::warn!("failed to load config from {}: {e}", user_config.display()),
                }
            }
        }

        tracing::info!("no config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("failed to parse config file")?;
        tracing::info!("loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Deadline, in seconds, for a complexity band (§4.9).
    pub fn deadline_sec(&self, complexity: taskstore::Complexity) -> u64 {
        use taskstore::Complexity::*;
        match complexity {
            Simple => self.worker.task_deadline_simple_sec,
            Medium => self.worker.task_deadline_medium_sec,
            Complex | Epic => self.worker.task_deadline_complex_sec,
        }
    }

    /// Model id to use for a complexity band, falling back to the LLM
    /// config's default model if the map has no entry.
    pub fn model_for(&self, complexity: taskstore::Complexity) -> String {
        self.llm
            .model_map
            .get(complexity.as_str())
            .cloned()
            .unwrap_or_else(|| self.llm.model.clone())
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,
    #[serde(rename = "base-url")]
    pub base_url: String,
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,
    #[serde(rename = "request-timeout-sec")]
    pub request_timeout_sec: u64,
    /// Complexity band -> model id, overriding `model` per band.
    #[serde(rename = "model-map")]
    pub model_map: HashMap<String, String>,
    /// Max calls to a single model id within `rate-limit-window-sec`,
    /// shared across every execution on this instance (§5 "LLM provider
    /// quota").
    #[serde(rename = "rate-limit-per-window")]
    pub rate_limit_per_window: usize,
    #[serde(rename = "rate-limit-window-sec")]
    pub rate_limit_window_sec: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 4096,
            request_timeout_sec: 30,
            model_map: HashMap::new(),
            rate_limit_per_window: 60,
            rate_limit_window_sec: 60,
        }
    }
}

/// Worker pool and per-complexity deadline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    #[serde(rename = "worker-pool-size")]
    pub worker_pool_size: usize,
    #[serde(rename = "task-deadline-simple-sec")]
    pub task_deadline_simple_sec: u64,
    #[serde(rename = "task-deadline-medium-sec")]
    pub task_deadline_medium_sec: u64,
    #[serde(rename = "task-deadline-complex-sec")]
    pub task_deadline_complex_sec: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 16,
            task_deadline_simple_sec: 90,
            task_deadline_medium_sec: 180,
            task_deadline_complex_sec: 600,
        }
    }
}

/// Classifier adapter retry/circuit-breaker policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
    pub retries: u32,
    #[serde(rename = "cb-threshold")]
    pub cb_threshold: u32,
    #[serde(rename = "cb-reset-sec")]
    pub cb_reset_sec: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 100,
            retries: 2,
            cb_threshold: 3,
            cb_reset_sec: 30,
        }
    }
}

/// Per-strategy iteration/wall-clock caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    #[serde(rename = "iterative-max-iterations")]
    pub iterative_max_iterations: u32,
    #[serde(rename = "iterative-wall-clock-sec")]
    pub iterative_wall_clock_sec: u64,
    #[serde(rename = "multiagent-wall-clock-sec")]
    pub multiagent_wall_clock_sec: u64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            iterative_max_iterations: 3,
            iterative_wall_clock_sec: 60,
            multiagent_wall_clock_sec: 180,
        }
    }
}

/// Event publisher (outbox pump) polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxConfig {
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,
    #[serde(rename = "batch-size")]
    pub batch_size: u32,
    /// Undelivered row count past which Intake starts rejecting new
    /// submissions with `Overloaded` (§5 "Backpressure").
    #[serde(rename = "backlog-watermark")]
    pub backlog_watermark: i64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            batch_size: 32,
            backlog_watermark: 1000,
        }
    }
}

/// Reaper staleness window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    #[serde(rename = "stale-window-sec")]
    pub stale_window_sec: i64,
    #[serde(rename = "scan-interval-sec")]
    pub scan_interval_sec: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            stale_window_sec: 300,
            scan_interval_sec: 60,
        }
    }
}

/// Context Gatherer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    #[serde(rename = "max-files")]
    pub max_files: usize,
    #[serde(rename = "source-globs")]
    pub source_globs: Vec<String>,
    #[serde(rename = "project-root")]
    pub project_root: Option<PathBuf>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_files: 12,
            source_globs: vec![
                "**/*.rs".to_string(),
                "**/*.py".to_string(),
                "**/*.ts".to_string(),
                "**/*.js".to_string(),
            ],
            project_root: None,
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    #[serde(rename = "storage-path")]
    pub storage_path: Option<PathBuf>,
    #[serde(rename = "max-file-change-bytes")]
    pub max_file_change_bytes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_path: None,
            max_file_change_bytes: crate::parser::MAX_FILE_CHANGE_BYTES,
        }
    }
}

impl StorageConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.storage_path.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("orchestrator")
                .join("orchestrator.db")
        })
    }
}
