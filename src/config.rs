use crate::error::{PoolError, Result};
use std::env;
use std::time::Duration;
use url::Url;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Proxy source configuration
    pub source: SourceConfig,
    /// Proxy validation configuration
    pub validation: ValidationConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Plain-HTTP endpoint serving the proxy list
    pub url: String,
    /// Request timeout for one fetch
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Timeout for each probe
    pub timeout: Duration,
    /// URL requested through each proxy
    pub test_url: String,
    /// Maximum number of probes in flight
    pub concurrency: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let source_url = get_env_or("PROXY_SOURCE_URL", "http://127.0.0.1:8000/api/v1/proxies");
        Url::parse(&source_url).map_err(|e| {
            PoolError::Configuration(format!("PROXY_SOURCE_URL must be a valid URL: {}", e))
        })?;

        let test_url = get_env_or("PROXY_TEST_URL", "http://httpbin.org/ip");
        Url::parse(&test_url).map_err(|e| {
            PoolError::Configuration(format!("PROXY_TEST_URL must be a valid URL: {}", e))
        })?;

        let concurrency: usize = get_env_or("PROXY_VALIDATION_CONCURRENCY", "10")
            .parse()
            .map_err(|_| {
                PoolError::Configuration(
                    "PROXY_VALIDATION_CONCURRENCY must be a valid number".into(),
                )
            })?;
        if concurrency == 0 {
            return Err(PoolError::Configuration(
                "PROXY_VALIDATION_CONCURRENCY must be at least 1".into(),
            ));
        }

        Ok(Config {
            source: SourceConfig {
                url: source_url,
                request_timeout: parse_secs("PROXY_SOURCE_TIMEOUT", "30")?,
            },
            validation: ValidationConfig {
                timeout: parse_secs("PROXY_VALIDATION_TIMEOUT", "5")?,
                test_url,
                concurrency,
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: parse_log_format(&get_env_or("LOG_FORMAT", "pretty"))?,
            },
        })
    }
}

/// Parse a positive number of seconds
fn parse_secs(key: &str, default: &str) -> Result<Duration> {
    let secs: u64 = get_env_or(key, default).parse().map_err(|_| {
        PoolError::Configuration(format!("{} must be a whole number of seconds", key))
    })?;
    if secs == 0 {
        return Err(PoolError::Configuration(format!(
            "{} must be greater than zero",
            key
        )));
    }
    Ok(Duration::from_secs(secs))
}

fn parse_log_format(raw: &str) -> Result<LogFormat> {
    match raw.trim().to_lowercase().as_str() {
        "pretty" | "text" => Ok(LogFormat::Pretty),
        "json" => Ok(LogFormat::Json),
        other => Err(PoolError::Configuration(format!(
            "LOG_FORMAT has unsupported value: {}",
            other
        ))),
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
