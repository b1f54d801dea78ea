use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

pub mod yahoo_client;
pub use yahoo_client::YahooClient;

/// A single value as reported by a data provider
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

/// Provider response flattened to key -> value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderRecord {
    values: HashMap<String, RawValue>,
}

impl ProviderRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: RawValue) {
        self.values.insert(key.into(), value);
    }

    pub fn with_number(mut self, key: &str, value: f64) -> Self {
        self.insert(key, RawValue::Number(value));
        self
    }

    pub fn with_text(mut self, key: &str, value: &str) -> Self {
        self.insert(key, RawValue::Text(value.to_string()));
        self
    }

    /// Finite numeric value for `key`; anything else counts as missing.
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.values.get(key) {
            Some(RawValue::Number(n)) if n.is_finite() => Some(*n),
            _ => None,
        }
    }

    /// Non-empty text value for `key`.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.values.get(key) {
            Some(RawValue::Text(s)) if !s.trim().is_empty() => Some(s.clone()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Failure modes a provider can report
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("rate limited by provider: {0}")]
    RateLimited(String),
    #[error("symbol not found: {0}")]
    NotFound(String),
    #[error("transient provider failure: {0}")]
    Transient(String),
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl ProviderError {
    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::RateLimited(_) | ProviderError::Transient(_))
    }
}

/// Anything that can produce a fundamentals snapshot for one symbol
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FundamentalsProvider: Send + Sync {
    async fn fetch_snapshot(&self, symbol: &str) -> Result<ProviderRecord, ProviderError>;
}
