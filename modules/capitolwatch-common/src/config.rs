use std::env;
use std::str::FromStr;

use tracing::info;

use crate::error::ConfigError;

/// Application configuration loaded from environment variables.
///
/// Credentials are optional here: a missing key is a configuration error for
/// the layer that needs it, not for the whole process.
#[derive(Debug, Clone)]
pub struct Config {
    // Foundation (legislative data API)
    pub openstates_api_key: Option<String>,
    pub openstates_base_url: String,
    pub jurisdiction: String,
    pub session: Option<String>,
    pub foundation_interval_secs: u64,
    pub foundation_max_pages: u32,

    // Connector policy
    pub connector_timeout_secs: u64,
    pub connector_max_retries: u32,
    pub source_error_threshold: u32,

    // Speed (signals)
    pub speed_interval_secs: u64,
    pub news_feeds: Vec<String>,
    pub press_feeds: Vec<String>,
    pub social_endpoint: Option<String>,
    pub social_api_key: Option<String>,
    pub video_endpoint: Option<String>,
    pub video_api_key: Option<String>,
    pub checkpoint_path: String,

    // Intelligence (analysis provider)
    pub anthropic_api_key: Option<String>,
    pub analysis_model: String,
    pub analysis_batch_size: usize,
    pub analysis_interval_secs: u64,
    pub analysis_max_calls_per_minute: u32,
    pub analysis_queue_capacity: usize,
    pub analysis_timeout_secs: u64,

    // Bookkeeping
    pub job_log_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openstates_api_key: None,
            openstates_base_url: "https://v3.openstates.org".to_string(),
            jurisdiction: "co".to_string(),
            session: None,
            foundation_interval_secs: 1800,
            foundation_max_pages: 10,
            connector_timeout_secs: 30,
            connector_max_retries: 2,
            source_error_threshold: 3,
            speed_interval_secs: 300,
            news_feeds: Vec::new(),
            press_feeds: Vec::new(),
            social_endpoint: None,
            social_api_key: None,
            video_endpoint: None,
            video_api_key: None,
            checkpoint_path: "data/checkpoints.json".to_string(),
            anthropic_api_key: None,
            analysis_model: "claude-3-5-haiku-latest".to_string(),
            analysis_batch_size: 5,
            analysis_interval_secs: 60,
            analysis_max_calls_per_minute: 20,
            analysis_queue_capacity: 500,
            analysis_timeout_secs: 60,
            job_log_capacity: 1000,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults.
    /// Fails only on values that are present but unparseable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        Ok(Self {
            openstates_api_key: optional_env("OPENSTATES_API_KEY"),
            openstates_base_url: env::var("OPENSTATES_BASE_URL")
                .unwrap_or(d.openstates_base_url),
            jurisdiction: env::var("JURISDICTION").unwrap_or(d.jurisdiction),
            session: optional_env("SESSION"),
            foundation_interval_secs: parsed_env(
                "FOUNDATION_INTERVAL_SECS",
                d.foundation_interval_secs,
            )?,
            foundation_max_pages: parsed_env("FOUNDATION_MAX_PAGES", d.foundation_max_pages)?,
            connector_timeout_secs: parsed_env("CONNECTOR_TIMEOUT_SECS", d.connector_timeout_secs)?,
            connector_max_retries: parsed_env("CONNECTOR_MAX_RETRIES", d.connector_max_retries)?,
            source_error_threshold: parsed_env(
                "SOURCE_ERROR_THRESHOLD",
                d.source_error_threshold,
            )?,
            speed_interval_secs: parsed_env("SPEED_INTERVAL_SECS", d.speed_interval_secs)?,
            news_feeds: list_env("NEWS_FEEDS"),
            press_feeds: list_env("PRESS_FEEDS"),
            social_endpoint: optional_env("SOCIAL_ENDPOINT"),
            social_api_key: optional_env("SOCIAL_API_KEY"),
            video_endpoint: optional_env("VIDEO_ENDPOINT"),
            video_api_key: optional_env("VIDEO_API_KEY"),
            checkpoint_path: env::var("CHECKPOINT_PATH").unwrap_or(d.checkpoint_path),
            anthropic_api_key: optional_env("ANTHROPIC_API_KEY"),
            analysis_model: env::var("ANALYSIS_MODEL").unwrap_or(d.analysis_model),
            analysis_batch_size: parsed_env("ANALYSIS_BATCH_SIZE", d.analysis_batch_size)?,
            analysis_interval_secs: parsed_env("ANALYSIS_INTERVAL_SECS", d.analysis_interval_secs)?,
            analysis_max_calls_per_minute: parsed_env(
                "ANALYSIS_MAX_CALLS_PER_MINUTE",
                d.analysis_max_calls_per_minute,
            )?,
            analysis_queue_capacity: parsed_env(
                "ANALYSIS_QUEUE_CAPACITY",
                d.analysis_queue_capacity,
            )?,
            analysis_timeout_secs: parsed_env("ANALYSIS_TIMEOUT_SECS", d.analysis_timeout_secs)?,
            job_log_capacity: parsed_env("JOB_LOG_CAPACITY", d.job_log_capacity)?,
        })
    }

    /// Credentials the foundation layer cannot start without.
    pub fn require_openstates_key(&self) -> Result<&str, ConfigError> {
        self.openstates_api_key
            .as_deref()
            .ok_or(ConfigError::Missing("OPENSTATES_API_KEY"))
    }

    /// Credentials the intelligence layer cannot start without.
    pub fn require_anthropic_key(&self) -> Result<&str, ConfigError> {
        self.anthropic_api_key
            .as_deref()
            .ok_or(ConfigError::Missing("ANTHROPIC_API_KEY"))
    }

    /// Log the loaded configuration with secrets masked.
    pub fn log_redacted(&self) {
        info!(
            openstates_api_key = redact(&self.openstates_api_key),
            openstates_base_url = self.openstates_base_url.as_str(),
            jurisdiction = self.jurisdiction.as_str(),
            session = self.session.as_deref().unwrap_or("(latest)"),
            foundation_interval_secs = self.foundation_interval_secs,
            speed_interval_secs = self.speed_interval_secs,
            news_feeds = self.news_feeds.len(),
            press_feeds = self.press_feeds.len(),
            social_api_key = redact(&self.social_api_key),
            video_api_key = redact(&self.video_api_key),
            checkpoint_path = self.checkpoint_path.as_str(),
            anthropic_api_key = redact(&self.anthropic_api_key),
            analysis_model = self.analysis_model.as_str(),
            analysis_max_calls_per_minute = self.analysis_max_calls_per_minute,
            "Configuration loaded"
        );
    }
}

fn redact(value: &Option<String>) -> &'static str {
    match value {
        Some(v) if !v.is_empty() => "[set]",
        _ => "[missing]",
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn list_env(key: &str) -> Vec<String> {
    env::var(key)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn parsed_env<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key,
                value: raw.clone(),
            })
        }
        _ => Ok(default),
    }
}
