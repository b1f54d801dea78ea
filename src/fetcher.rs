use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::api::{FundamentalsProvider, ProviderError};
use crate::models::{Config, FetchRecord, Fundamentals, Symbol};
use crate::rate_limiter::{jitter_up_to, Clock, RateLimiter, RateMonitor};

/// Exponential backoff settings for retryable provider failures
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per symbol, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.retry_max_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
            jitter: Duration::from_millis(config.retry_jitter_ms),
        }
    }

    /// Delay before the `retry`-th retry (1-based) for a given jitter sample.
    ///
    /// Jitter is clamped to the base delay and the cap applies after jitter,
    /// which keeps successive delays non-decreasing.
    pub fn delay_with_jitter(&self, retry: u32, jitter: Duration) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        let exponential = self.base_delay.saturating_mul(factor);
        let jitter = jitter.min(self.jitter).min(self.base_delay);
        exponential.saturating_add(jitter).min(self.max_delay)
    }

    pub fn delay_for(&self, retry: u32) -> Duration {
        self.delay_with_jitter(retry, jitter_up_to(self.jitter.min(self.base_delay)))
    }
}

/// Fetches one symbol at a time, honouring the shared rate budget
pub struct Fetcher {
    provider: Arc<dyn FundamentalsProvider>,
    limiter: Arc<RateLimiter>,
    monitor: Arc<RateMonitor>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl Fetcher {
    pub fn new(
        provider: Arc<dyn FundamentalsProvider>,
        limiter: Arc<RateLimiter>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            limiter,
            monitor: Arc::new(RateMonitor::new()),
            clock,
            retry,
        }
    }

    /// Share an existing monitor instead of the fetcher's own
    pub fn with_monitor(mut self, monitor: Arc<RateMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn monitor(&self) -> Arc<RateMonitor> {
        Arc::clone(&self.monitor)
    }

    /// Fetch one symbol. Never fails: errors come back as an error-tagged record.
    pub async fn fetch(&self, symbol: &Symbol) -> FetchRecord {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.limiter.acquire().await;
            self.monitor.record_attempt();

            match self.provider.fetch_snapshot(symbol.as_str()).await {
                Ok(record) => {
                    let fundamentals = Fundamentals::from_record(&record);
                    info!(
                        symbol = %symbol,
                        attempt,
                        outcome = "ok",
                        fields = fundamentals.populated_numbers(),
                        "fetched fundamentals"
                    );
                    self.monitor.record_success();
                    return FetchRecord::fetched(symbol.clone(), fundamentals);
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        symbol = %symbol,
                        attempt,
                        outcome = "retry",
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "fetch failed, backing off"
                    );
                    self.monitor
                        .record_retry(matches!(e, ProviderError::RateLimited(_)));
                    self.clock.sleep(delay).await;
                }
                Err(e) => {
                    let exhausted = e.is_retryable();
                    error!(
                        symbol = %symbol,
                        attempt,
                        outcome = if exhausted { "exhausted" } else { "terminal" },
                        error = %e,
                        "fetch failed"
                    );
                    self.monitor.record_failure();

                    let message = if exhausted {
                        format!("{} (gave up after {} attempts)", e, attempt)
                    } else {
                        e.to_string()
                    };
                    return FetchRecord::failed(symbol.clone(), message);
                }
            }
        }
    }
}
