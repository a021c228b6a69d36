//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use flashcard_core::normalizer::NormalizationPolicy;
use flashcard_core::quota::QuotaPolicy;
use flashcard_core::translator::TranslatorSettings;
use flashcard_core::GenerationSettings;
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
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub database_max_connections: u32,
    pub log_level: Level,
    pub cors_allowed_origin: String,
    pub openai_api_key: Option<String>,
    pub translation_model: String,
    pub rate_limit_max_requests: usize,
    pub rate_limit_window: Duration,
    pub generation: GenerationSettings,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Load Server and Database Settings ---
        let bind_address = parse_or(&lookup, "BIND_ADDRESS", "0.0.0.0:3000".parse::<SocketAddr>())?;

        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;
        let database_max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", Ok(5))?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_allowed_origin = lookup("CORS_ALLOWED_ORIGIN")
            .unwrap_or_else(|| "http://localhost:3000".to_string());

        // --- Load Translation Service Settings ---
        let openai_api_key = lookup("OPENAI_API_KEY");
        let translation_model =
            lookup("TRANSLATION_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());

        // --- Load Rate Limiting Settings ---
        let rate_limit_max_requests = parse_or(&lookup, "RATE_LIMIT_MAX_REQUESTS", Ok(5))?;
        let rate_limit_window = Duration::from_secs(parse_or(&lookup, "RATE_LIMIT_WINDOW_SECS", Ok(60))?);

        // --- Load Generation Pipeline Settings ---
        let normalization = NormalizationPolicy {
            min_sentences: parse_or(&lookup, "GENERATION_MIN_SENTENCES", Ok(5))?,
            max_sentences: parse_or(&lookup, "GENERATION_MAX_SENTENCES", Ok(30))?,
            max_sentence_chars: parse_or(&lookup, "GENERATION_MAX_SENTENCE_CHARS", Ok(200))?,
            deduplicate: parse_or(&lookup, "GENERATION_DEDUPLICATE", Ok(false))?,
        };
        if normalization.min_sentences > normalization.max_sentences {
            return Err(ConfigError::InvalidValue(
                "GENERATION_MIN_SENTENCES".to_string(),
                "must not exceed GENERATION_MAX_SENTENCES".to_string(),
            ));
        }

        let utc_offset_minutes: i32 = parse_or(&lookup, "QUOTA_UTC_OFFSET_MINUTES", Ok(0))?;
        if !(-14 * 60..=14 * 60).contains(&utc_offset_minutes) {
            return Err(ConfigError::InvalidValue(
                "QUOTA_UTC_OFFSET_MINUTES".to_string(),
                format!("{utc_offset_minutes} is outside -840..=840"),
            ));
        }
        let quota = QuotaPolicy {
            daily_limit: parse_or(&lookup, "GENERATION_DAILY_LIMIT", Ok(100))?,
            utc_offset_minutes,
        };

        let max_concurrency: usize = parse_or(&lookup, "GENERATION_MAX_CONCURRENCY", Ok(5))?;
        if max_concurrency == 0 {
            return Err(ConfigError::InvalidValue(
                "GENERATION_MAX_CONCURRENCY".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let translator = TranslatorSettings {
            max_concurrency,
            max_retries: parse_or(&lookup, "GENERATION_MAX_RETRIES", Ok(1))?,
            retry_backoff: Duration::from_millis(parse_or(&lookup, "GENERATION_RETRY_BACKOFF_MS", Ok(250))?),
            call_timeout: Duration::from_secs(parse_or(&lookup, "GENERATION_CALL_TIMEOUT_SECS", Ok(8))?),
            batch_deadline: Duration::from_secs(parse_or(&lookup, "GENERATION_BATCH_DEADLINE_SECS", Ok(20))?),
        };
        let supervisor_grace =
            Duration::from_secs(parse_or(&lookup, "GENERATION_SUPERVISOR_GRACE_SECS", Ok(10))?);

        Ok(Self {
            bind_address,
            database_url,
            database_max_connections,
            log_level,
            cors_allowed_origin,
            openai_api_key,
            translation_model,
            rate_limit_max_requests,
            rate_limit_window,
            generation: GenerationSettings {
                normalization,
                quota,
                translator,
                supervisor_grace,
            },
        })
    }
}

/// Parses `key` when present, otherwise falls back to `default`.
fn parse_or<F, T>(lookup: &F, key: &str, default: Result<T, T::Err>) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => default.map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
    }
}
