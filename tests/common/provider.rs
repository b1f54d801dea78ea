//! Deterministic provider for pipeline tests

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use stock_screener::api::{FundamentalsProvider, ProviderError, ProviderRecord};
use stock_screener::models::Fundamentals;

/// A record carrying every key the schema reads
pub fn full_record(symbol: &str) -> ProviderRecord {
    let mut record = ProviderRecord::new();
    for key in Fundamentals::TEXT_KEYS {
        record = record.with_text(key, &format!("{} {}", symbol, key));
    }
    for (i, key) in Fundamentals::NUMBER_KEYS.iter().enumerate() {
        record = record.with_number(key, 1.0 + i as f64);
    }
    record
}

type Response = Result<ProviderRecord, ProviderError>;

/// Answers from per-symbol scripts, then falls back to a fixed rule:
/// symbols starting with `BAD` are unknown, everything else succeeds.
#[derive(Default)]
pub struct ScriptedProvider {
    scripts: Mutex<HashMap<String, VecDeque<Response>>>,
    calls: Mutex<Vec<(String, Instant)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    latency: Duration,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue responses for one symbol, served in order
    pub fn script(self, symbol: &str, responses: Vec<Response>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(symbol.to_string(), responses.into_iter().collect());
        self
    }

    pub fn calls_for(&self, symbol: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(s, _)| s == symbol).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FundamentalsProvider for ScriptedProvider {
    async fn fetch_snapshot(&self, symbol: &str) -> Result<ProviderRecord, ProviderError> {
        self.calls.lock().unwrap().push((symbol.to_string(), Instant::now()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(symbol)
            .and_then(VecDeque::pop_front);

        let response = match scripted {
            Some(response) => response,
            None if symbol.starts_with("BAD") => Err(ProviderError::NotFound(symbol.to_string())),
            None => Ok(full_record(symbol)),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }
}
