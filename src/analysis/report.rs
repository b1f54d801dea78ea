//! Writers for screening results

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::info;

use crate::analysis::screener::{ScreenedRow, StrategyResult};
use crate::models::fundamentals::MISSING;

const DEFAULT_SCORE_COLUMN: &str = "Score";

fn number_cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| MISSING.to_string())
}

fn text_cell(value: Option<&str>) -> String {
    value.unwrap_or(MISSING).to_string()
}

fn leading_cells(result: &StrategyResult, row: &ScreenedRow) -> Vec<String> {
    vec![
        row.rank.to_string(),
        row.symbol.to_string(),
        text_cell(row.name.as_deref()),
        text_cell(row.sector.as_deref()),
        result.strategy.clone(),
        number_cell(row.score),
    ]
}

fn create_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create output directory {}", dir.display()))
}

/// `<dir>/<slug>_results.csv`. Nothing is written for an empty result.
pub fn write_strategy_csv(result: &StrategyResult, dir: &Path) -> Result<Option<PathBuf>> {
    if result.is_empty() {
        return Ok(None);
    }
    create_dir(dir)?;

    let path = dir.join(format!("{}_results.csv", result.slug));
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("Failed to open {} for writing", path.display()))?;

    let score_column = result.score_column.as_deref().unwrap_or(DEFAULT_SCORE_COLUMN);
    let mut header = vec!["Rank", "Symbol", "Name", "Sector", "Strategy", score_column];
    header.extend(result.columns.iter().map(String::as_str));
    writer.write_record(&header)?;

    for row in &result.rows {
        let mut cells = leading_cells(result, row);
        cells.extend(row.values.iter().map(|v| number_cell(*v)));
        writer.write_record(&cells)?;
    }
    writer.flush()?;

    info!("💾 {}: wrote {} rows to {}", result.strategy, result.rows.len(), path.display());
    Ok(Some(path))
}

/// `<dir>/combined_results.csv` with every matched row of every strategy
pub fn write_combined_csv(results: &[StrategyResult], dir: &Path) -> Result<PathBuf> {
    create_dir(dir)?;

    let path = dir.join("combined_results.csv");
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("Failed to open {} for writing", path.display()))?;
    writer.write_record(["Rank", "Symbol", "Name", "Sector", "Strategy", DEFAULT_SCORE_COLUMN])?;

    let mut count = 0;
    for result in results {
        for row in &result.rows {
            writer.write_record(leading_cells(result, row))?;
            count += 1;
        }
    }
    writer.flush()?;

    info!("💾 Wrote {} combined rows to {}", count, path.display());
    Ok(path)
}

/// Plain-text top-N listing per strategy
pub fn render_top_picks(results: &[StrategyResult], date: NaiveDate, top_n: usize) -> String {
    let mut out = format!("Top picks for {}\n", date.format("%Y-%m-%d"));

    for result in results {
        out.push_str(&format!("\n== {} ({} matches) ==\n", result.strategy, result.rows.len()));
        if result.is_empty() {
            out.push_str("no matches\n");
            continue;
        }
        for row in result.top(top_n) {
            let score = row.score.map(|s| format!("{:.4}", s)).unwrap_or_default();
            out.push_str(&format!(
                "{:>3}. {:<8} {:<40} {:<24} {}\n",
                row.rank,
                row.symbol,
                text_cell(row.name.as_deref()),
                text_cell(row.sector.as_deref()),
                score
            ));
        }
    }
    out
}

/// `<dir>/top_picks_<YYYY-MM-DD>.txt`
pub fn write_top_picks(results: &[StrategyResult], dir: &Path, date: NaiveDate, top_n: usize) -> Result<PathBuf> {
    create_dir(dir)?;
    let path = dir.join(format!("top_picks_{}.txt", date.format("%Y-%m-%d")));
    fs::write(&path, render_top_picks(results, date, top_n))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("🏆 Top picks written to {}", path.display());
    Ok(path)
}
