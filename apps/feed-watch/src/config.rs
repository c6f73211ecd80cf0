//! Environment-backed runtime configuration for `feed-watch`.

use std::{env, error::Error, fmt, time::Duration};

use feed_core::{ConnectorConfig, DEFAULT_MAX_ITEMS, RetryPolicy};
use feed_http::{DEFAULT_FEED_PATH, HttpFeedConfig};
use url::Url;

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_RETRY_BASE_MS: u64 = 500;
const DEFAULT_RETRY_MAX_MS: u64 = 30_000;
const DEFAULT_STABLE_AFTER_MS: u64 = 10_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;

/// Runtime configuration for one watched feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    /// Backend base URL without trailing slashes.
    pub api_url: Url,
    pub feed_path: String,
    /// Optional bearer token sent with every request.
    pub token: Option<String>,
    /// Retention cap for visible events.
    pub max_items: usize,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    /// How long a connection must stay open to reset the reconnect backoff.
    pub stable_after_ms: u64,
    pub request_timeout_ms: u64,
}

impl WatchConfig {
    /// Parse configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let raw_api_url = optional_trimmed_env("ACTIVITY_FEED_API_URL", &mut lookup)
            .unwrap_or_else(|| DEFAULT_API_URL.to_owned());
        let api_url = parse_api_url(&raw_api_url)?;

        let feed_path = optional_trimmed_env("ACTIVITY_FEED_PATH", &mut lookup)
            .unwrap_or_else(|| DEFAULT_FEED_PATH.to_owned());
        let token = optional_trimmed_env("ACTIVITY_FEED_TOKEN", &mut lookup);

        let max_items =
            parse_optional_usize("ACTIVITY_FEED_MAX_ITEMS", DEFAULT_MAX_ITEMS, &mut lookup)?;
        let retry_base_ms =
            parse_optional_u64("ACTIVITY_FEED_RETRY_BASE_MS", DEFAULT_RETRY_BASE_MS, &mut lookup)?;
        let retry_max_ms =
            parse_optional_u64("ACTIVITY_FEED_RETRY_MAX_MS", DEFAULT_RETRY_MAX_MS, &mut lookup)?;
        let stable_after_ms = parse_optional_u64(
            "ACTIVITY_FEED_STABLE_AFTER_MS",
            DEFAULT_STABLE_AFTER_MS,
            &mut lookup,
        )?;
        let request_timeout_ms = parse_optional_u64(
            "ACTIVITY_FEED_REQUEST_TIMEOUT_MS",
            DEFAULT_REQUEST_TIMEOUT_MS,
            &mut lookup,
        )?;

        if max_items == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ACTIVITY_FEED_MAX_ITEMS",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }
        if retry_base_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ACTIVITY_FEED_RETRY_BASE_MS",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }
        if retry_max_ms < retry_base_ms {
            return Err(ConfigError::InvalidValue {
                key: "ACTIVITY_FEED_RETRY_MAX_MS",
                value: retry_max_ms.to_string(),
                reason: format!("must not be below the base delay ({retry_base_ms} ms)"),
            });
        }
        if request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ACTIVITY_FEED_REQUEST_TIMEOUT_MS",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }

        Ok(Self {
            api_url,
            feed_path,
            token,
            max_items,
            retry_base_ms,
            retry_max_ms,
            stable_after_ms,
            request_timeout_ms,
        })
    }

    pub fn http_config(&self) -> HttpFeedConfig {
        HttpFeedConfig {
            base_url: self.api_url.clone(),
            feed_path: self.feed_path.clone(),
            bearer_token: self.token.clone(),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }

    pub fn connector_config(&self) -> ConnectorConfig {
        ConnectorConfig {
            retry: RetryPolicy::new(self.retry_base_ms, self.retry_max_ms),
            stable_after: Duration::from_millis(self.stable_after_ms),
            rng_seed: None,
        }
    }
}

/// Errors produced while parsing runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue { key, value, reason } => {
                write!(f, "invalid {key}='{value}': {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

fn parse_api_url(raw: &str) -> Result<Url, ConfigError> {
    let trimmed = raw.trim_end_matches('/');
    let url = Url::parse(trimmed).map_err(|err| ConfigError::InvalidValue {
        key: "ACTIVITY_FEED_API_URL",
        value: raw.to_owned(),
        reason: err.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidValue {
            key: "ACTIVITY_FEED_API_URL",
            value: raw.to_owned(),
            reason: "scheme must be http or https".to_owned(),
        });
    }
    Ok(url)
}

fn optional_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_optional_u64<F>(key: &'static str, default: u64, lookup: &mut F) -> Result<u64, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(default);
    };
    value.parse::<u64>().map_err(|err| ConfigError::InvalidValue {
        key,
        value,
        reason: err.to_string(),
    })
}

fn parse_optional_usize<F>(
    key: &'static str,
    default: usize,
    lookup: &mut F,
) -> Result<usize, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(default);
    };
    value
        .parse::<usize>()
        .map_err(|err| ConfigError::InvalidValue {
            key,
            value,
            reason: err.to_string(),
        })
}
