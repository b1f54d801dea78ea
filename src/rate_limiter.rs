//! Shared call budget for outbound provider requests.
//!
//! A single `RateLimiter` is built per run and handed to every worker, so all
//! fetches draw from the same sliding window. Time is read through a `Clock`
//! so tests can run against tokio's paused clock or record sleeps.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::time::Instant;
use tracing::trace;

/// Source of time for everything that waits
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Uniform random duration in `0..=max`, at millisecond granularity
pub fn jitter_up_to(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=max_ms))
}

/// Sliding-window limiter: at most `max_calls` acquisitions per `window`
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    jitter: Duration,
    calls: Mutex<VecDeque<Instant>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// `max_calls` of zero is treated as one
    pub fn new(max_calls: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        let max_calls = max_calls.max(1) as usize;
        Self {
            max_calls,
            window,
            jitter: Duration::ZERO,
            calls: Mutex::new(VecDeque::with_capacity(max_calls)),
            clock,
        }
    }

    pub fn per_second(max_calls: u32, clock: Arc<dyn Clock>) -> Self {
        Self::new(max_calls, Duration::from_secs(1), clock)
    }

    /// Extra random delay added whenever a caller has to wait
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Wait until a call fits in the window, then claim the slot
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
                let now = self.clock.now();

                while let Some(&oldest) = calls.front() {
                    if now.duration_since(oldest) >= self.window {
                        calls.pop_front();
                    } else {
                        break;
                    }
                }

                if calls.len() < self.max_calls {
                    calls.push_back(now);
                    return;
                }

                let oldest = calls.front().copied().unwrap_or(now);
                self.window.saturating_sub(now.duration_since(oldest))
            };

            let delay = wait + jitter_up_to(self.jitter);
            trace!(delay_ms = delay.as_millis() as u64, "rate window full, waiting");
            self.clock.sleep(delay).await;
        }
    }
}

/// Snapshot of the run's request counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorSnapshot {
    pub attempts: u64,
    pub successes: u64,
    pub retries: u64,
    pub rate_limited: u64,
    pub failures: u64,
}

/// Request counters shared by all workers
#[derive(Debug, Default)]
pub struct RateMonitor {
    counts: Mutex<MonitorSnapshot>,
}

impl RateMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, f: impl FnOnce(&mut MonitorSnapshot)) {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut counts);
    }

    pub fn record_attempt(&self) {
        self.update(|c| c.attempts += 1);
    }

    pub fn record_success(&self) {
        self.update(|c| c.successes += 1);
    }

    pub fn record_retry(&self, rate_limited: bool) {
        self.update(|c| {
            c.retries += 1;
            if rate_limited {
                c.rate_limited += 1;
            }
        });
    }

    pub fn record_failure(&self) {
        self.update(|c| c.failures += 1);
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        *self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
