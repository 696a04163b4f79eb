use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisSettings;
use crate::scoring::{BreedStandard, BreedStandards};
use crate::sync::SyncSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// Overrides the generated device id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Where the database and images live. Defaults to `~/.herdscore/data`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_directory: Option<String>,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Scoring table, one entry per breed.
    #[serde(default)]
    pub standards: Vec<BreedStandard>,
    /// Used for categories without a dedicated standard.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_standard: Option<BreedStandard>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            device_id: None,
            data_directory: None,
            analysis: AnalysisConfig::default(),
            sync: SyncConfig::default(),
            logging: LoggingConfig::default(),
            standards: Vec::new(),
            fallback_standard: None,
        }
    }
}

impl Config {
    /// The configured data directory, or the default one.
    pub fn data_dir(&self) -> Option<PathBuf> {
        match &self.data_directory {
            Some(dir) => Some(PathBuf::from(dir)),
            None => crate::db::default_data_dir(),
        }
    }

    /// The configured scoring table. Without standards or a fallback every
    /// category scores 0.
    pub fn breed_standards(&self) -> BreedStandards {
        BreedStandards::new(self.standards.clone(), self.fallback_standard.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_analysis_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_analysis_timeout() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_analysis_timeout(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl From<&AnalysisConfig> for AnalysisSettings {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_base_backoff")]
    pub base_backoff_secs: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_true")]
    pub auto_sync: bool,
    #[serde(default = "default_attention_threshold")]
    pub attention_threshold: u32,
}

fn default_concurrency() -> usize {
    3
}

fn default_base_backoff() -> u64 {
    30
}

fn default_max_backoff() -> u64 {
    3600
}

fn default_attempt_timeout() -> u64 {
    30
}

fn default_interval() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_attention_threshold() -> u32 {
    5
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            base_backoff_secs: default_base_backoff(),
            max_backoff_secs: default_max_backoff(),
            attempt_timeout_secs: default_attempt_timeout(),
            interval_secs: default_interval(),
            auto_sync: true,
            attention_threshold: default_attention_threshold(),
        }
    }
}

impl From<&SyncConfig> for SyncSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            base_backoff: Duration::from_secs(config.base_backoff_secs),
            max_backoff: Duration::from_secs(config.max_backoff_secs),
            attempt_timeout: Duration::from_secs(config.attempt_timeout_secs),
            interval: Duration::from_secs(config.interval_secs.max(1)),
            auto_sync: config.auto_sync,
            attention_threshold: config.attention_threshold,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}
