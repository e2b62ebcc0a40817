//! Configuration Management
//!
//! Loads and manages engine configuration from TOML files.
//! Configuration includes:
//! - Executor behaviour (retries, backoff, command timeout)
//! - Confidence policy for the strategy dispatcher
//! - Extra classifier rules
//! - Queue history, health sampling and learning persistence

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::RemedyError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub strategy: StrategyConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub learning: LearningConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How the delay between retry iterations grows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// `base_delay * iteration`
    #[default]
    Linear,
    /// `base_delay * 2^(iteration - 1)`, capped at `max_delay_ms`
    Exponential,
}

/// How a learned success rate is folded into a strategy's static prior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    /// `prior * success_rate`
    #[default]
    Multiply,
    /// `(prior + success_rate) / 2`
    Average,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Maximum iterations per fix attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default)]
    pub backoff: BackoffKind,
    /// Per-command timeout for the shell runner
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    /// Working directory commands and relative edits resolve against
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff: BackoffKind::default(),
            command_timeout_secs: default_command_timeout(),
            working_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Learned success rate must exceed this before it affects confidence
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default)]
    pub blend: BlendMode,
    /// Suggestions below this confidence are dropped (no fix available)
    #[serde(default)]
    pub min_confidence: f32,
    /// Strategy names that must never be suggested
    #[serde(default)]
    pub disabled: Vec<String>,
    /// Package manager used by dependency and deployment repairs
    #[serde(default = "default_package_manager")]
    pub package_manager: String,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            blend: BlendMode::default(),
            min_confidence: 0.0,
            disabled: Vec::new(),
            package_manager: default_package_manager(),
        }
    }
}

/// A user-supplied classification rule, checked before the built-in ones
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub pattern: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub extra_rules: Vec<RuleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Processed reports kept for `get_report`
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_health_interval")]
    pub interval_secs: u64,
    /// Mount point whose usage is reported as disk utilization
    #[serde(default = "default_disk_mount")]
    pub disk_mount: PathBuf,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_health_interval(),
            disk_mount: default_disk_mount(),
        }
    }
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearningConfig {
    /// JSON file the learning aggregate is persisted to; in-memory only when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_max_retries() -> u32 {
    5
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_command_timeout() -> u64 {
    120
}
fn default_confidence_threshold() -> f32 {
    0.7
}
fn default_package_manager() -> String {
    "npm".to_string()
}
fn default_history_limit() -> usize {
    1000
}
fn default_health_interval() -> u64 {
    30
}
fn default_disk_mount() -> PathBuf {
    PathBuf::from("/")
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config: Config = match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config from {}", p))?;
                toml::from_str(&content).context("Failed to parse config")?
            }
            None => {
                let mut candidates = vec![PathBuf::from("remedy.toml")];
                if let Some(home) = dirs::home_dir() {
                    candidates.push(home.join(".config/remedy/config.toml"));
                }

                let mut loaded = None;
                for p in &candidates {
                    if let Ok(content) = std::fs::read_to_string(p) {
                        loaded = Some(toml::from_str(&content).with_context(|| {
                            format!("Failed to parse config {}", p.display())
                        })?);
                        break;
                    }
                }
                loaded.unwrap_or_else(|| {
                    tracing::debug!("No config file found, using defaults");
                    Self::default()
                })
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Override file values with `REMEDY_*` environment variables
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("REMEDY_MAX_RETRIES") {
            if let Ok(n) = v.parse::<u32>() {
                self.executor.max_retries = n;
            }
        }
        if let Ok(v) = std::env::var("REMEDY_BASE_DELAY_MS") {
            if let Ok(n) = v.parse::<u64>() {
                self.executor.base_delay_ms = n;
            }
        }
        if let Ok(v) = std::env::var("REMEDY_COMMAND_TIMEOUT") {
            if let Ok(n) = v.parse::<u64>() {
                self.executor.command_timeout_secs = n;
            }
        }
        if let Ok(v) = std::env::var("REMEDY_CONFIDENCE_THRESHOLD") {
            if let Ok(t) = v.parse::<f32>() {
                self.strategy.confidence_threshold = t;
            }
        }
        if let Ok(v) = std::env::var("REMEDY_PACKAGE_MANAGER") {
            self.strategy.package_manager = v;
        }
        if let Ok(v) = std::env::var("REMEDY_HEALTH_INTERVAL") {
            if let Ok(n) = v.parse::<u64>() {
                self.health.interval_secs = n;
            }
        }
        if let Ok(v) = std::env::var("REMEDY_LEARNING_PATH") {
            self.learning.path = Some(PathBuf::from(v));
        }
    }

    /// Reject configurations the engine cannot honour
    pub fn validate(&self) -> std::result::Result<(), RemedyError> {
        if self.executor.max_retries == 0 {
            return Err(RemedyError::Config(
                "executor.max_retries must be at least 1".into(),
            ));
        }
        if self.executor.base_delay_ms == 0 {
            return Err(RemedyError::Config(
                "executor.base_delay_ms must be greater than 0".into(),
            ));
        }
        if self.executor.max_delay_ms < self.executor.base_delay_ms {
            return Err(RemedyError::Config(
                "executor.max_delay_ms must not be below executor.base_delay_ms".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.strategy.confidence_threshold) {
            return Err(RemedyError::Config(format!(
                "strategy.confidence_threshold must be within [0, 1], got {}",
                self.strategy.confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.strategy.min_confidence) {
            return Err(RemedyError::Config(format!(
                "strategy.min_confidence must be within [0, 1], got {}",
                self.strategy.min_confidence
            )));
        }
        if self.health.interval_secs == 0 {
            return Err(RemedyError::Config(
                "health.interval_secs must be at least 1".into(),
            ));
        }
        for rule in &self.classifier.extra_rules {
            regex::Regex::new(&rule.pattern).map_err(|e| {
                RemedyError::Config(format!(
                    "classifier rule '{}' has an invalid pattern: {}",
                    rule.label, e
                ))
            })?;
        }
        Ok(())
    }
}
