// ABOUTME: Runtime configuration loaded from environment variables
// ABOUTME: Storage location, conversation TTL, cleanup cadence and generation parameters

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::constants::*;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: '{value}' ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
    pub conversation_ttl: Duration,
    pub cleanup_interval: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
    pub repair_temperature: f32,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: Option<String>,
    pub anthropic_base_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            conversation_ttl: Duration::from_secs(DEFAULT_CONVERSATION_TTL_HOURS * 3600),
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_MINUTES * 60),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            repair_temperature: DEFAULT_REPAIR_TEMPERATURE,
            anthropic_api_key: None,
            anthropic_model: None,
            anthropic_base_url: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let db_path = lookup(SPECFORGE_DB_PATH)
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let ttl_hours: u64 = parse_var(
            &lookup,
            SPECFORGE_CONVERSATION_TTL_HOURS,
            DEFAULT_CONVERSATION_TTL_HOURS,
        )?;
        if ttl_hours == 0 {
            return Err(ConfigError::Zero {
                name: SPECFORGE_CONVERSATION_TTL_HOURS,
            });
        }
        let ttl_secs = ttl_hours
            .checked_mul(3600)
            .ok_or_else(|| ConfigError::InvalidValue {
                name: SPECFORGE_CONVERSATION_TTL_HOURS,
                value: ttl_hours.to_string(),
                reason: "too large to express in seconds".to_string(),
            })?;

        // Min 1 minute, max 1 day
        let cleanup_minutes: u64 = parse_var(
            &lookup,
            SPECFORGE_CLEANUP_INTERVAL_MINUTES,
            DEFAULT_CLEANUP_INTERVAL_MINUTES,
        )?
        .clamp(1, 1440);

        let max_tokens: u32 = parse_var(&lookup, SPECFORGE_MAX_TOKENS, DEFAULT_MAX_TOKENS)?;
        if max_tokens == 0 {
            return Err(ConfigError::Zero {
                name: SPECFORGE_MAX_TOKENS,
            });
        }

        let temperature = parse_temperature(&lookup, SPECFORGE_TEMPERATURE, DEFAULT_TEMPERATURE)?;
        let repair_temperature = parse_temperature(
            &lookup,
            SPECFORGE_REPAIR_TEMPERATURE,
            DEFAULT_REPAIR_TEMPERATURE,
        )?;

        Ok(Config {
            db_path,
            conversation_ttl: Duration::from_secs(ttl_secs),
            cleanup_interval: Duration::from_secs(cleanup_minutes * 60),
            max_tokens,
            temperature,
            repair_temperature,
            anthropic_api_key: lookup(ANTHROPIC_API_KEY).filter(|s| !s.trim().is_empty()),
            anthropic_model: lookup(ANTHROPIC_MODEL).filter(|s| !s.trim().is_empty()),
            anthropic_base_url: lookup(ANTHROPIC_BASE_URL).filter(|s| !s.trim().is_empty()),
        })
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue {
                name,
                value: raw.clone(),
                reason: e.to_string(),
            }),
        None => Ok(default),
    }
}

fn parse_temperature<F>(lookup: &F, name: &'static str, default: f32) -> Result<f32, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value: f32 = parse_var(lookup, name, default)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::InvalidValue {
            name,
            value: value.to_string(),
            reason: "expected a value between 0.0 and 1.0".to_string(),
        });
    }
    Ok(value)
}
