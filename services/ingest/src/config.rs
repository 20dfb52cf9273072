//! services/ingest/src/config.rs
//!
//! Defines the service configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub log_level: Level,
    pub openai_api_key: Option<String>,
    pub question_model: String,
    pub youtube_api_key: Option<String>,
    /// Command line of the external extractor, split on whitespace.
    pub transcript_script: Option<String>,
    pub ytdlp_path: PathBuf,
    pub strategy_timeout: Duration,
    pub generation_timeout: Duration,
    pub target_questions: usize,
    pub batch_concurrency: usize,
    pub max_interval_days: u32,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test builds so tests stay hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // --- Database and Logging ---
        let database_url =
            lookup("DATABASE_URL").ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- API Keys (optional until a command needs them) ---
        let openai_api_key = lookup("OPENAI_API_KEY");
        let youtube_api_key = lookup("YOUTUBE_API_KEY");

        // --- Adapter Settings ---
        let question_model = lookup("QUESTION_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());
        let transcript_script = lookup("TRANSCRIPT_SCRIPT").filter(|s| !s.trim().is_empty());
        let ytdlp_path = lookup("YTDLP_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("yt-dlp"));

        // --- Pipeline Tunables ---
        let strategy_timeout = Duration::from_secs(parse_or(&lookup, "STRATEGY_TIMEOUT_SECS", 30)?);
        let generation_timeout =
            Duration::from_secs(parse_or(&lookup, "GENERATION_TIMEOUT_SECS", 120)?);
        let target_questions = positive(parse_or(&lookup, "TARGET_QUESTIONS", 10)?, "TARGET_QUESTIONS")?;
        let batch_concurrency =
            positive(parse_or(&lookup, "BATCH_CONCURRENCY", 4)?, "BATCH_CONCURRENCY")?;
        let max_interval_days =
            positive(parse_or(&lookup, "MAX_INTERVAL_DAYS", 365)?, "MAX_INTERVAL_DAYS")?;

        Ok(Self {
            database_url,
            log_level,
            openai_api_key,
            question_model,
            youtube_api_key,
            transcript_script,
            ytdlp_path,
            strategy_timeout,
            generation_timeout,
            target_questions,
            batch_concurrency,
            max_interval_days,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}

fn positive<T: PartialEq + Default>(value: T, key: &str) -> Result<T, ConfigError> {
    if value == T::default() {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(value)
}
