//! Concurrent fundamentals fetching module
//!
//! Splits the symbol list into fixed-size batches, runs each batch on a
//! bounded pool of spawned tasks and pauses between batches. The pause is a
//! second, coarser throttle on top of the per-call rate limiter.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::fetcher::Fetcher;
use crate::models::{Config, FetchRecord, Symbol};
use crate::rate_limiter::Clock;
use crate::result_table::ResultTable;

/// Configuration for concurrent fetching
#[derive(Debug, Clone, PartialEq)]
pub struct ConcurrentFetchConfig {
    pub num_workers: usize,
    pub batch_size: usize,
    pub batch_pause: Duration,
}

impl ConcurrentFetchConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            num_workers: config.max_workers.max(1),
            batch_size: config.batch_size.max(1),
            batch_pause: Duration::from_millis(config.batch_pause_ms),
        }
    }
}

/// Drives the fetcher over a whole symbol list
pub struct BatchCoordinator {
    fetcher: Arc<Fetcher>,
    config: ConcurrentFetchConfig,
    clock: Arc<dyn Clock>,
}

impl BatchCoordinator {
    pub fn new(fetcher: Arc<Fetcher>, config: ConcurrentFetchConfig, clock: Arc<dyn Clock>) -> Self {
        Self { fetcher, config, clock }
    }

    /// Fetch every symbol. The table holds exactly one row per input symbol,
    /// in completion order.
    pub async fn run(&self, symbols: &[Symbol]) -> ResultTable {
        let total = symbols.len();
        let batch_size = self.config.batch_size.max(1);
        let batch_count = total.div_ceil(batch_size);
        info!(
            "🚀 Fetching {} symbols in {} batches with {} workers",
            total, batch_count, self.config.num_workers
        );

        let semaphore = Arc::new(Semaphore::new(self.config.num_workers.max(1)));
        let mut table = ResultTable::with_capacity(total);

        for (batch_index, batch) in symbols.chunks(batch_size).enumerate() {
            info!("📦 Batch {}/{}: {} symbols", batch_index + 1, batch_count, batch.len());

            for record in self.run_batch(batch, &semaphore).await {
                table.push(record);
            }

            info!(
                "📊 Progress: {}/{} symbols processed, {} failed",
                table.len(),
                total,
                table.failure_count()
            );

            if batch_index + 1 < batch_count && !self.config.batch_pause.is_zero() {
                info!("⏸️ Pausing {:?} before next batch", self.config.batch_pause);
                self.clock.sleep(self.config.batch_pause).await;
            }
        }

        ensure_parity(symbols, &mut table);
        table
    }

    async fn run_batch(&self, batch: &[Symbol], semaphore: &Arc<Semaphore>) -> Vec<FetchRecord> {
        let mut in_flight = FuturesUnordered::new();

        for symbol in batch {
            let fetcher = Arc::clone(&self.fetcher);
            let semaphore = Arc::clone(semaphore);
            let task_symbol = symbol.clone();

            let handle = tokio::spawn(async move {
                // The semaphore is never closed, so acquire cannot fail
                let _permit = semaphore.acquire_owned().await.ok();
                fetcher.fetch(&task_symbol).await
            });

            let symbol = symbol.clone();
            in_flight.push(async move { (symbol, handle.await) });
        }

        let mut records = Vec::with_capacity(batch.len());
        while let Some((symbol, joined)) = in_flight.next().await {
            match joined {
                Ok(record) => records.push(record),
                Err(e) => {
                    error!("❌ Worker for {} did not finish: {}", symbol, e);
                    records.push(FetchRecord::failed(symbol, format!("worker failed: {}", e)));
                }
            }
        }
        records
    }
}

/// Guarantee one row per requested symbol
fn ensure_parity(symbols: &[Symbol], table: &mut ResultTable) {
    let mut seen: HashSet<Symbol> = HashSet::with_capacity(table.len());
    table.retain(|record| seen.insert(record.symbol.clone()));

    for symbol in symbols {
        if !seen.contains(symbol) {
            warn!("Missing result for {}, recording a failure row", symbol);
            table.push(FetchRecord::failed(symbol.clone(), "no result produced"));
            seen.insert(symbol.clone());
        }
    }
}
