//! Screening a saved table end to end

use chrono::NaiveDate;
use pretty_assertions::assert_eq;

use crate::common::logging::{init_test_logging, log_test_step};
use stock_screener::models::{FetchRecord, Fundamentals, Symbol};
use stock_screener::pipeline::{run_screen, ScreenOptions};
use stock_screener::result_table::ResultTable;

fn company(name: &str, sector: &str) -> Fundamentals {
    Fundamentals {
        name: Some(name.to_string()),
        sector: Some(sector.to_string()),
        ..Fundamentals::default()
    }
}

fn sample_table() -> ResultTable {
    let value_pick = Fundamentals {
        pe_ratio: Some(9.0),
        price_to_book: Some(1.2),
        peg_ratio: Some(0.8),
        dividend_yield: Some(0.035),
        debt_to_equity: Some(0.4),
        free_cash_flow: Some(2.0e9),
        ..company("Steady Value Co", "Industrials")
    };
    let pricier_value = Fundamentals {
        pe_ratio: Some(13.0),
        price_to_book: Some(2.5),
        peg_ratio: Some(0.95),
        dividend_yield: Some(0.025),
        debt_to_equity: Some(0.9),
        free_cash_flow: Some(5.0e8),
        ..company("Fair Price Inc", "Industrials")
    };
    let growth_pick = Fundamentals {
        revenue_growth: Some(0.35),
        earnings_growth: Some(0.40),
        pe_ratio: Some(45.0),
        price_to_sales: Some(12.0),
        ..company("Rocket Software", "Technology")
    };
    // Passes every Value threshold but lacks a PEG ratio
    let no_peg = Fundamentals { peg_ratio: None, ..value_pick.clone() };

    let mut table = ResultTable::default();
    table.push(FetchRecord::fetched(Symbol::parse("VAL").unwrap(), value_pick));
    table.push(FetchRecord::fetched(Symbol::parse("FAIR").unwrap(), pricier_value));
    table.push(FetchRecord::fetched(Symbol::parse("GRW").unwrap(), growth_pick));
    table.push(FetchRecord::fetched(Symbol::parse("NOPEG").unwrap(), no_peg));
    table.push(FetchRecord::failed(Symbol::parse("GONE").unwrap(), "symbol not found: GONE"));
    table
}

fn options(dir: &std::path::Path, input: std::path::PathBuf, strategies: &[&str]) -> ScreenOptions {
    ScreenOptions {
        input,
        output_dir: dir.join("reports"),
        strategies: strategies.iter().map(|s| s.to_string()).collect(),
        strategies_file: None,
        top_n: 10,
        date: NaiveDate::from_ymd_opt(2024, 3, 7).unwrap(),
    }
}

#[test]
fn test_screen_saved_table() {
    init_test_logging();
    log_test_step("Value and Growth over a written table");

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("daily_stock_data_2024-03-07.csv");
    sample_table().write_csv(&input).unwrap();

    let summary = run_screen(&options(dir.path(), input, &["Value", "growth"])).unwrap();

    let value = &summary.results[0];
    let order: Vec<&str> = value.rows.iter().map(|r| r.symbol.as_str()).collect();
    assert_eq!(order, vec!["VAL", "FAIR"]);
    assert!(value.rows[0].score.unwrap() > value.rows[1].score.unwrap());

    let growth = &summary.results[1];
    assert_eq!(growth.rows.len(), 1);
    assert_eq!(growth.rows[0].symbol.as_str(), "GRW");
    assert_eq!(growth.rows[0].name.as_deref(), Some("Rocket Software"));

    assert_eq!(summary.strategy_files.len(), 2);
    let value_csv = std::fs::read_to_string(dir.path().join("reports/value_results.csv")).unwrap();
    assert!(value_csv.starts_with("Rank,Symbol,Name,Sector,Strategy,Value Score,PE Ratio"));

    let combined = std::fs::read_to_string(&summary.combined_path).unwrap();
    assert_eq!(combined.lines().count(), 1 + 3);

    let picks = std::fs::read_to_string(&summary.top_picks_path).unwrap();
    assert!(summary.top_picks_path.ends_with("top_picks_2024-03-07.txt"));
    assert!(picks.contains("== Value (2 matches) =="));
    assert!(!picks.contains("GONE"));
}

#[test]
fn test_custom_strategies_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("table.csv");
    sample_table().write_csv(&input).unwrap();

    let strategies_file = dir.path().join("custom.json");
    std::fs::write(
        &strategies_file,
        r#"[{
            "name": "Cheap Earnings",
            "score_column": "Earnings Yield",
            "predicates": [
                { "kind": "compare", "left": { "column": "PE Ratio" }, "op": "<=", "right": { "const": 13.0 } }
            ],
            "terms": [
                { "weight": 1.0, "expr": { "div": [{ "const": 1.0 }, { "column": "PE Ratio" }] } }
            ]
        }]"#,
    )
    .unwrap();

    let mut opts = options(dir.path(), input, &["cheap earnings"]);
    opts.strategies_file = Some(strategies_file);
    let summary = run_screen(&opts).unwrap();

    assert_eq!(summary.results.len(), 1);
    let order: Vec<&str> = summary.results[0].rows.iter().map(|r| r.symbol.as_str()).collect();
    // NOPEG and VAL tie on score and are ordered by symbol
    assert_eq!(order, vec!["NOPEG", "VAL", "FAIR"]);
}

#[test]
fn test_unknown_strategy_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("table.csv");
    sample_table().write_csv(&input).unwrap();

    let err = run_screen(&options(dir.path(), input, &["Astrology"])).unwrap_err();
    assert!(err.to_string().contains("Astrology"));
}

#[test]
fn test_missing_input_table_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = run_screen(&options(dir.path(), dir.path().join("absent.csv"), &[]));
    assert!(result.is_err());
}
