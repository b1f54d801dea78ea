//! Integration tests for the fetch pipeline against a scripted provider

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use pretty_assertions::assert_eq;

use crate::common::logging::{init_test_logging, log_test_data, log_test_step};
use crate::common::{fast_config, write_tickers, RecordingClock, ScriptedProvider};
use stock_screener::api::{ProviderError, ProviderRecord};
use stock_screener::models::{Fundamentals, Symbol};
use stock_screener::pipeline::{build_coordinator, run_fetch_with};
use stock_screener::rate_limiter::TokioClock;
use stock_screener::result_table::ResultTable;

fn run_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()
}

fn symbols(list: &[&str]) -> Vec<Symbol> {
    list.iter().filter_map(|s| Symbol::parse(s)).collect()
}

#[tokio::test]
async fn test_found_and_not_found_symbols() {
    init_test_logging();
    log_test_step("AAA resolves, BBB is unknown");

    let dir = tempfile::tempdir().unwrap();
    let config = fast_config(dir.path());
    write_tickers(&config.tickers_path, &["AAA", "BBB"]);

    let provider = Arc::new(
        ScriptedProvider::new().script("BBB", vec![Err(ProviderError::NotFound("BBB".to_string()))]),
    );
    let summary = run_fetch_with(&config, provider.clone(), Arc::new(TokioClock), run_date())
        .await
        .unwrap();
    log_test_data("Summary", &summary);

    assert_eq!(summary.requested, 2);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(provider.calls_for("BBB"), 1);

    let table = ResultTable::read_csv(&summary.output_path).unwrap();
    assert_eq!(table.len(), 2);

    let aaa = table.get(&Symbol::parse("AAA").unwrap()).unwrap();
    let fundamentals = aaa.fundamentals().unwrap();
    assert_eq!(fundamentals.populated_numbers(), Fundamentals::NUMBER_COLUMNS.len());
    assert!(Fundamentals::TEXT_COLUMNS.iter().all(|c| fundamentals.text(c).is_some()));

    let bbb = table.get(&Symbol::parse("BBB").unwrap()).unwrap();
    assert_eq!(bbb.error(), Some("symbol not found: BBB"));
    assert!(bbb.fundamentals().is_none());

    // On disk the failure row is blank apart from Symbol and Error
    let mut reader = csv::Reader::from_path(&summary.output_path).unwrap();
    let row = reader
        .records()
        .map(|r| r.unwrap())
        .find(|r| &r[0] == "BBB")
        .unwrap();
    let last = row.len() - 1;
    assert!((1..last).all(|i| row[i].is_empty()));
    assert_eq!(&row[last], "symbol not found: BBB");
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_twice_then_success() {
    init_test_logging();
    log_test_step("CCC is throttled twice before succeeding");

    let dir = tempfile::tempdir().unwrap();
    let config = fast_config(dir.path());
    write_tickers(&config.tickers_path, &["CCC"]);

    let provider = Arc::new(ScriptedProvider::new().script(
        "CCC",
        vec![
            Err(ProviderError::RateLimited("HTTP 429".to_string())),
            Err(ProviderError::RateLimited("HTTP 429".to_string())),
        ],
    ));
    let clock = Arc::new(RecordingClock::default());
    let summary = run_fetch_with(&config, provider.clone(), clock.clone(), run_date())
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(provider.calls_for("CCC"), 3);
    assert_eq!(summary.counters.retries, 2);
    assert_eq!(summary.counters.rate_limited, 2);

    let sleeps = clock.sleeps();
    assert_eq!(sleeps.len(), 2, "expected exactly two backoff delays, got {:?}", sleeps);
    assert!(sleeps[1] >= sleeps[0]);

    let table = ResultTable::read_csv(&summary.output_path).unwrap();
    assert!(table.get(&Symbol::parse("CCC").unwrap()).unwrap().is_success());
}

#[tokio::test(start_paused = true)]
async fn test_row_count_matches_input_under_mixed_failures() {
    init_test_logging();

    let dir = tempfile::tempdir().unwrap();
    let config = fast_config(dir.path());

    let mut names: Vec<String> = (0..17).map(|i| format!("OK{:02}", i)).collect();
    names.extend((0..4).map(|i| format!("BAD{}", i)));
    names.push("FLAKY".to_string());
    names.push("DOWN".to_string());
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    write_tickers(&config.tickers_path, &refs);

    let down: Vec<Result<ProviderRecord, ProviderError>> = (0..config.retry_max_attempts)
        .map(|_| Err(ProviderError::Transient("HTTP 503".to_string())))
        .collect();
    let provider = Arc::new(
        ScriptedProvider::new()
            .with_latency(std::time::Duration::from_millis(20))
            .script("FLAKY", vec![Err(ProviderError::Transient("connection reset".to_string()))])
            .script("DOWN", down),
    );

    let summary = run_fetch_with(&config, provider.clone(), Arc::new(TokioClock), run_date())
        .await
        .unwrap();
    let table = ResultTable::read_csv(&summary.output_path).unwrap();

    assert_eq!(table.len(), names.len());
    let written: HashSet<&str> = table.rows().iter().map(|r| r.symbol.as_str()).collect();
    let requested: HashSet<&str> = refs.iter().copied().collect();
    assert_eq!(written, requested);

    assert_eq!(table.failure_count(), 5);
    let down = table.get(&Symbol::parse("DOWN").unwrap()).unwrap();
    assert!(down.error().unwrap().contains("gave up after 4 attempts"));
    assert!(table.get(&Symbol::parse("FLAKY").unwrap()).unwrap().is_success());
    assert!(provider.max_in_flight() <= config.max_workers);
}

#[tokio::test]
async fn test_duplicate_symbols_collapse_to_one_row() {
    let dir = tempfile::tempdir().unwrap();
    let config = fast_config(dir.path());
    write_tickers(&config.tickers_path, &["AAA", "AAA", "", "BBB"]);

    let provider = Arc::new(ScriptedProvider::new());
    let summary = run_fetch_with(&config, provider.clone(), Arc::new(TokioClock), run_date())
        .await
        .unwrap();

    assert_eq!(summary.requested, 2);
    assert_eq!(provider.total_calls(), 2);
    assert_eq!(ResultTable::read_csv(&summary.output_path).unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_repeat_runs_give_same_outcomes() {
    let dir = tempfile::tempdir().unwrap();
    let config = fast_config(dir.path());
    let list = symbols(&["AAA", "BAD1", "CCC", "DDD", "BAD2", "FFF", "GGG"]);

    let mut maps = Vec::new();
    for _ in 0..2 {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_latency(std::time::Duration::from_millis(5))
                .script("CCC", vec![Err(ProviderError::RateLimited("HTTP 429".to_string()))]),
        );
        let (coordinator, _monitor) = build_coordinator(&config, provider, Arc::new(TokioClock));
        maps.push(coordinator.run(&list).await.outcome_map());
    }

    assert_eq!(maps[0], maps[1]);
    assert_eq!(maps[0].len(), list.len());
}

#[tokio::test(start_paused = true)]
async fn test_pause_between_batches_only() {
    let dir = tempfile::tempdir().unwrap();
    let config = stock_screener::models::Config {
        batch_size: 3,
        batch_pause_ms: 750,
        ..fast_config(dir.path())
    };
    let list = symbols(&["A1", "A2", "A3", "B1", "B2", "B3", "C1"]);

    let clock = Arc::new(RecordingClock::default());
    let (coordinator, monitor) = build_coordinator(&config, Arc::new(ScriptedProvider::new()), clock.clone());
    let table = coordinator.run(&list).await;

    assert_eq!(table.len(), 7);
    assert_eq!(monitor.snapshot().attempts, 7);
    let pauses: Vec<_> = clock
        .sleeps()
        .into_iter()
        .filter(|d| *d == std::time::Duration::from_millis(750))
        .collect();
    assert_eq!(pauses.len(), 2);
}

#[tokio::test]
async fn test_missing_ticker_list_is_fatal_before_fetching() {
    let dir = tempfile::tempdir().unwrap();
    let config = fast_config(dir.path());

    let provider = Arc::new(ScriptedProvider::new());
    let err = run_fetch_with(&config, provider.clone(), Arc::new(TokioClock), run_date())
        .await
        .unwrap_err();

    assert!(format!("{:#}", err).contains("tickers.txt"));
    assert_eq!(provider.total_calls(), 0);
}

#[tokio::test]
async fn test_unwritable_output_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = fast_config(dir.path());
    write_tickers(&config.tickers_path, &["AAA"]);

    // A plain file where the output directory should be
    let blocker = dir.path().join("blocked");
    std::fs::write(&blocker, "not a directory").unwrap();
    config.output_dir = blocker;

    let result = run_fetch_with(&config, Arc::new(ScriptedProvider::new()), Arc::new(TokioClock), run_date()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_same_day_rerun_overwrites() {
    let dir = tempfile::tempdir().unwrap();
    let config = fast_config(dir.path());

    write_tickers(&config.tickers_path, &["AAA", "BBB", "CCC"]);
    let first = run_fetch_with(&config, Arc::new(ScriptedProvider::new()), Arc::new(TokioClock), run_date())
        .await
        .unwrap();

    write_tickers(&config.tickers_path, &["AAA"]);
    let second = run_fetch_with(&config, Arc::new(ScriptedProvider::new()), Arc::new(TokioClock), run_date())
        .await
        .unwrap();

    assert_eq!(first.output_path, second.output_path);
    assert!(first.output_path.ends_with("daily_stock_data_2024-03-07.csv"));
    assert_eq!(ResultTable::read_csv(&second.output_path).unwrap().len(), 1);
}
