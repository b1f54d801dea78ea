use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub mod fundamentals;

pub use fundamentals::{FetchOutcome, FetchRecord, Fundamentals};

/// Ticker symbol as read from the input list
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(String);

impl Symbol {
    /// Build a symbol from a raw input line. Blank lines yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Symbol(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("RETRY_MAX_DELAY_MS ({max}) is below RETRY_BASE_DELAY_MS ({base})")]
    DelayBounds { base: u64, max: u64 },
}

/// Configuration for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub provider_base_url: String,
    /// Page that hands out the session cookie; empty skips priming
    pub provider_session_url: String,
    pub tickers_path: PathBuf,
    pub output_dir: PathBuf,
    pub output_prefix: String,
    pub rate_limit_per_second: u32,
    pub rate_limit_jitter_ms: u64,
    pub max_workers: usize,
    pub batch_size: usize,
    pub batch_pause_ms: u64,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub retry_jitter_ms: u64,
    pub request_timeout_secs: u64,
    pub top_n: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            provider_base_url: "https://query2.finance.yahoo.com".to_string(),
            provider_session_url: "https://fc.yahoo.com".to_string(),
            tickers_path: PathBuf::from("Input/tickers.txt"),
            output_dir: PathBuf::from("Data"),
            output_prefix: "daily_stock_data".to_string(),
            rate_limit_per_second: 5,
            rate_limit_jitter_ms: 50,
            max_workers: 10,
            batch_size: 50,
            batch_pause_ms: 2000,
            retry_max_attempts: 4,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 8000,
            retry_jitter_ms: 250,
            request_timeout_secs: 30,
            top_n: 10,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key lookup. Values that fail to parse
    /// fall back to the default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        fn parsed<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
            value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
        }

        let config = Config {
            provider_base_url: lookup("PROVIDER_BASE_URL")
                .unwrap_or(defaults.provider_base_url),
            provider_session_url: lookup("PROVIDER_SESSION_URL")
                .unwrap_or(defaults.provider_session_url),
            tickers_path: lookup("TICKERS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.tickers_path),
            output_dir: lookup("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            output_prefix: lookup("OUTPUT_PREFIX").unwrap_or(defaults.output_prefix),
            rate_limit_per_second: parsed(lookup("RATE_LIMIT_PER_SECOND"), defaults.rate_limit_per_second),
            rate_limit_jitter_ms: parsed(lookup("RATE_LIMIT_JITTER_MS"), defaults.rate_limit_jitter_ms),
            max_workers: parsed(lookup("MAX_WORKERS"), defaults.max_workers),
            batch_size: parsed(lookup("BATCH_SIZE"), defaults.batch_size),
            batch_pause_ms: parsed(lookup("BATCH_PAUSE_MS"), defaults.batch_pause_ms),
            retry_max_attempts: parsed(lookup("RETRY_MAX_ATTEMPTS"), defaults.retry_max_attempts),
            retry_base_delay_ms: parsed(lookup("RETRY_BASE_DELAY_MS"), defaults.retry_base_delay_ms),
            retry_max_delay_ms: parsed(lookup("RETRY_MAX_DELAY_MS"), defaults.retry_max_delay_ms),
            retry_jitter_ms: parsed(lookup("RETRY_JITTER_MS"), defaults.retry_jitter_ms),
            request_timeout_secs: parsed(lookup("REQUEST_TIMEOUT_SECS"), defaults.request_timeout_secs),
            top_n: parsed(lookup("TOP_N"), defaults.top_n),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit_per_second == 0 {
            return Err(ConfigError::Zero("RATE_LIMIT_PER_SECOND"));
        }
        if self.max_workers == 0 {
            return Err(ConfigError::Zero("MAX_WORKERS"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Zero("BATCH_SIZE"));
        }
        if self.retry_max_attempts == 0 {
            return Err(ConfigError::Zero("RETRY_MAX_ATTEMPTS"));
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(ConfigError::DelayBounds {
                base: self.retry_base_delay_ms,
                max: self.retry_max_delay_ms,
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
