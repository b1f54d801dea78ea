//! End-to-end runs: fetch a ticker list into a dated table, screen a table

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use tracing::{info, warn};

use crate::analysis::{catalog, report, screen, StrategyResult};
use crate::api::{FundamentalsProvider, YahooClient};
use crate::concurrent_fetcher::{BatchCoordinator, ConcurrentFetchConfig};
use crate::fetcher::{Fetcher, RetryPolicy};
use crate::models::Config;
use crate::rate_limiter::{Clock, MonitorSnapshot, RateLimiter, RateMonitor, TokioClock};
use crate::result_table::{dated_output_path, ResultTable};
use crate::tickers::load_symbols;

/// What a fetch run produced
#[derive(Debug, Clone)]
pub struct FetchSummary {
    pub output_path: PathBuf,
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub counters: MonitorSnapshot,
    pub elapsed: Duration,
}

/// Wire limiter, fetcher and coordinator from configuration. The returned
/// monitor sees every request the coordinator makes.
pub fn build_coordinator(
    config: &Config,
    provider: Arc<dyn FundamentalsProvider>,
    clock: Arc<dyn Clock>,
) -> (BatchCoordinator, Arc<RateMonitor>) {
    let limiter = Arc::new(
        RateLimiter::per_second(config.rate_limit_per_second, Arc::clone(&clock))
            .with_jitter(Duration::from_millis(config.rate_limit_jitter_ms)),
    );
    let fetcher = Fetcher::new(provider, limiter, Arc::clone(&clock), RetryPolicy::from_config(config));
    let monitor = fetcher.monitor();
    let coordinator = BatchCoordinator::new(Arc::new(fetcher), ConcurrentFetchConfig::from_config(config), clock);
    (coordinator, monitor)
}

/// Fetch every symbol in `config.tickers_path` through `provider` and write
/// `<output_dir>/<prefix>_<date>.csv`.
///
/// A missing or unreadable ticker list aborts before any request is made;
/// per-symbol failures only show up as error rows.
pub async fn run_fetch_with(
    config: &Config,
    provider: Arc<dyn FundamentalsProvider>,
    clock: Arc<dyn Clock>,
    date: NaiveDate,
) -> Result<FetchSummary> {
    let started = Instant::now();
    let symbols = load_symbols(&config.tickers_path)?;
    if symbols.is_empty() {
        warn!("Ticker list {} has no symbols", config.tickers_path.display());
    }

    let (coordinator, monitor) = build_coordinator(config, provider, clock);
    let table = coordinator.run(&symbols).await;

    let output_path = dated_output_path(&config.output_dir, &config.output_prefix, date);
    table
        .write_csv(&output_path)
        .with_context(|| format!("Failed to save results to {}", output_path.display()))?;

    let counters = monitor.snapshot();
    let summary = FetchSummary {
        output_path,
        requested: symbols.len(),
        succeeded: table.success_count(),
        failed: table.failure_count(),
        counters,
        elapsed: started.elapsed(),
    };

    info!(
        "✅ Fetch complete: {} symbols, {} ok, {} failed in {:.1}s",
        summary.requested,
        summary.succeeded,
        summary.failed,
        summary.elapsed.as_secs_f64()
    );
    info!(
        "📊 Requests: {} attempts, {} retries ({} rate limited)",
        counters.attempts, counters.retries, counters.rate_limited
    );
    Ok(summary)
}

/// Fetch against the configured Yahoo endpoint, dated today
pub async fn run_fetch(config: &Config) -> Result<FetchSummary> {
    // Check the input before building the HTTP client
    if !config.tickers_path.exists() {
        anyhow::bail!("Ticker list {} does not exist", config.tickers_path.display());
    }
    let provider = Arc::new(YahooClient::new(config)?);
    run_fetch_with(config, provider, Arc::new(TokioClock), Local::now().date_naive()).await
}

/// Inputs for a screening run
#[derive(Debug, Clone)]
pub struct ScreenOptions {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    /// Empty selects every available strategy
    pub strategies: Vec<String>,
    pub strategies_file: Option<PathBuf>,
    pub top_n: usize,
    pub date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct ScreenSummary {
    pub results: Vec<StrategyResult>,
    pub strategy_files: Vec<PathBuf>,
    pub combined_path: PathBuf,
    pub top_picks_path: PathBuf,
}

/// Run the selected strategies over a saved table and write the reports
pub fn run_screen(options: &ScreenOptions) -> Result<ScreenSummary> {
    let table = ResultTable::read_csv(&options.input)?;
    info!(
        "📈 Screening {} rows ({} usable) from {}",
        table.len(),
        table.success_count(),
        options.input.display()
    );

    let custom = match &options.strategies_file {
        Some(path) => catalog::load_file(path)?,
        None => Vec::new(),
    };
    let strategies = catalog::select(&options.strategies, custom)?;

    let mut results = Vec::with_capacity(strategies.len());
    let mut strategy_files = Vec::new();
    for strategy in &strategies {
        let result = screen(strategy, &table)?;
        info!("🔍 {}: {} matches", result.strategy, result.rows.len());
        if let Some(path) = report::write_strategy_csv(&result, &options.output_dir)? {
            strategy_files.push(path);
        }
        results.push(result);
    }

    let combined_path = report::write_combined_csv(&results, &options.output_dir)?;
    let top_picks_path = report::write_top_picks(&results, &options.output_dir, options.date, options.top_n)?;

    Ok(ScreenSummary { results, strategy_files, combined_path, top_picks_path })
}
