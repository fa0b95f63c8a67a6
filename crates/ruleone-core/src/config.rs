//! Environment driven settings.
//!
//! Every variable carries the `RULEONE_` prefix. The Alpha Vantage key also
//! falls back to the unprefixed `ALPHAVANTAGE_API_KEY`.

use std::env;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::http_client::DEFAULT_USER_AGENTS;
use crate::ProviderId;

pub const ENV_PREFIX: &str = "RULEONE_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl Display for LogFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Json => "json",
        })
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("expected 'text' or 'json', got '{other}'")),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {variable}: {reason}")]
    InvalidValue { variable: String, reason: String },
}

impl ConfigError {
    fn invalid(variable: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            variable: variable.to_owned(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub alphavantage_api_key: Option<String>,
    pub max_concurrent_requests: usize,
    pub request_deadline: Duration,
    pub http_timeout: Duration,
    pub http_max_retries: u32,
    /// Zero disables the record cache.
    pub cache_ttl: Duration,
    pub growth_sources: Vec<ProviderId>,
    pub alphavantage_quota_per_minute: u32,
    pub user_agents: Vec<String>,
    pub log_level: String,
    pub log_format: LogFormat,
    pub default_ticker: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            alphavantage_api_key: None,
            max_concurrent_requests: 10,
            request_deadline: Duration::from_millis(20_000),
            http_timeout: Duration::from_millis(10_000),
            http_max_retries: 2,
            cache_ttl: Duration::from_secs(300),
            growth_sources: vec![ProviderId::Yahoo, ProviderId::Zacks],
            alphavantage_quota_per_minute: 5,
            user_agents: DEFAULT_USER_AGENTS
                .iter()
                .map(|agent| (*agent).to_owned())
                .collect(),
            log_level: String::from("warn"),
            log_format: LogFormat::Text,
            default_ticker: String::from("NVDA"),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds settings from an arbitrary variable source. Unset and blank
    /// variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        let mut settings = Self::default();

        settings.alphavantage_api_key = value("ALPHAVANTAGE_API_KEY").or_else(|| {
            lookup("ALPHAVANTAGE_API_KEY")
                .map(|key| key.trim().to_owned())
                .filter(|key| !key.is_empty())
        });

        if let Some(raw) = value("MAX_CONCURRENT_REQUESTS") {
            settings.max_concurrent_requests = parse_positive("MAX_CONCURRENT_REQUESTS", &raw)?;
        }
        if let Some(raw) = value("REQUEST_DEADLINE_MS") {
            settings.request_deadline =
                Duration::from_millis(parse_positive("REQUEST_DEADLINE_MS", &raw)?);
        }
        if let Some(raw) = value("HTTP_TIMEOUT_MS") {
            settings.http_timeout = Duration::from_millis(parse_positive("HTTP_TIMEOUT_MS", &raw)?);
        }
        if let Some(raw) = value("HTTP_MAX_RETRIES") {
            settings.http_max_retries = parse("HTTP_MAX_RETRIES", &raw)?;
        }
        if let Some(raw) = value("CACHE_TTL_SECS") {
            settings.cache_ttl = Duration::from_secs(parse("CACHE_TTL_SECS", &raw)?);
        }
        if let Some(raw) = value("GROWTH_SOURCES") {
            settings.growth_sources = ProviderId::parse_list(&raw).map_err(|error| {
                ConfigError::invalid(&prefixed("GROWTH_SOURCES"), error.to_string())
            })?;
        }
        if let Some(raw) = value("ALPHAVANTAGE_QUOTA_PER_MINUTE") {
            settings.alphavantage_quota_per_minute =
                parse_positive("ALPHAVANTAGE_QUOTA_PER_MINUTE", &raw)?;
        }
        if let Some(raw) = value("USER_AGENTS") {
            let agents: Vec<String> = serde_json::from_str(&raw).map_err(|error| {
                ConfigError::invalid(
                    &prefixed("USER_AGENTS"),
                    format!("expected a JSON list of strings: {error}"),
                )
            })?;
            let agents = agents
                .into_iter()
                .map(|agent| agent.trim().to_owned())
                .filter(|agent| !agent.is_empty())
                .collect::<Vec<_>>();
            if agents.is_empty() {
                return Err(ConfigError::invalid(&prefixed("USER_AGENTS"), "list is empty"));
            }
            settings.user_agents = agents;
        }
        if let Some(raw) = value("LOG_LEVEL") {
            settings.log_level = raw;
        }
        if let Some(raw) = value("LOG_FORMAT") {
            settings.log_format = raw
                .parse()
                .map_err(|reason: String| ConfigError::invalid(&prefixed("LOG_FORMAT"), reason))?;
        }
        if let Some(raw) = value("DEFAULT_TICKER") {
            settings.default_ticker = raw;
        }

        Ok(settings)
    }
}

fn prefixed(name: &str) -> String {
    format!("{ENV_PREFIX}{name}")
}

fn parse<T>(name: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse()
        .map_err(|error: T::Err| ConfigError::invalid(&prefixed(name), format!("'{raw}': {error}")))
}

fn parse_positive<T>(name: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr + Default + PartialOrd,
    T::Err: Display,
{
    let value = parse::<T>(name, raw)?;
    if value <= T::default() {
        return Err(ConfigError::invalid(&prefixed(name), "must be greater than zero"));
    }
    Ok(value)
}
