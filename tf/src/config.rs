//! Tripflow configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main Tripflow configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Intent classifier configuration
    pub classifier: ClassifierConfig,

    /// Stage machine thresholds and timeouts
    pub stages: StageConfig,

    /// Reminder sweep configuration
    pub nudges: NudgeConfig,

    /// Event bus configuration
    pub events: EventsConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        if std::env::var(&self.classifier.api_key_env).is_err() {
            return Err(eyre::eyre!(
                "Classifier API key not found. Set the {} environment variable.",
                self.classifier.api_key_env
            ));
        }
        if self.stages.min_members < 2 {
            return Err(eyre::eyre!("stages.min-members must be at least 2"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .tripflow.yml
        let local_config = PathBuf::from(".tripflow.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/tripflow/tripflow.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("tripflow").join("tripflow.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Intent classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Provider name (currently only "http" supported)
    pub provider: String,

    /// Model identifier passed through to the service
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Classifications below this confidence fall back to the rules
    #[serde(rename = "confidence-threshold")]
    pub confidence_threshold: f64,
}

impl ClassifierConfig {
    /// Read the API key from the configured environment variable
    pub fn get_api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env).context(format!("environment variable {} not set", self.api_key_env))
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            provider: "http".to_string(),
            model: "claude-haiku-4".to_string(),
            api_key_env: "TRIPFLOW_CLASSIFIER_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            timeout_ms: 30_000,
            confidence_threshold: 0.5,
        }
    }
}

/// Stage machine thresholds and timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Members required before gathering rolls over to planning
    #[serde(rename = "min-members")]
    pub min_members: usize,

    /// Hours in planning before a partially-covered topic may advance
    #[serde(rename = "planning-timeout-hours")]
    pub planning_timeout_hours: i64,

    /// Hours a poll stays open before closing on whatever votes exist
    #[serde(rename = "vote-timeout-hours")]
    pub vote_timeout_hours: i64,

    /// Maximum chained transitions from a single trigger
    #[serde(rename = "max-cascade")]
    pub max_cascade: u32,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            min_members: 2,
            planning_timeout_hours: 12,
            vote_timeout_hours: 48,
            max_cascade: 8,
        }
    }
}

/// Reminder sweep configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NudgeConfig {
    /// Seconds between scheduler sweeps
    #[serde(rename = "sweep-interval-secs")]
    pub sweep_interval_secs: u64,

    /// Hours of stage inactivity before the first reminder
    #[serde(rename = "stale-after-hours")]
    pub stale_after_hours: i64,

    /// Hours between repeat reminders in the same stage
    #[serde(rename = "repeat-after-hours")]
    pub repeat_after_hours: i64,

    /// Reminders per stage before the trip is abandoned
    #[serde(rename = "give-up-after")]
    pub give_up_after: u32,
}

impl Default for NudgeConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 300,
            stale_after_hours: 24,
            repeat_after_hours: 24,
            give_up_after: 3,
        }
    }
}

/// Event bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Broadcast channel capacity
    pub capacity: usize,

    /// Seconds a (trip, from, to) transition stays in the dedup cache
    #[serde(rename = "dedup-window-secs")]
    pub dedup_window_secs: u64,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            dedup_window_secs: 10,
        }
    }
}
