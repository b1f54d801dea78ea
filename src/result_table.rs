//! Aggregated fetch results and their CSV persistence

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use tracing::info;

use crate::models::fundamentals::{ERROR_COLUMN, SYMBOL_COLUMN};
use crate::models::{FetchRecord, Fundamentals, Symbol};

/// One row per requested symbol, successes and failures alike
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    rows: Vec<FetchRecord>,
}

impl ResultTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { rows: Vec::with_capacity(capacity) }
    }

    pub fn push(&mut self, record: FetchRecord) {
        self.rows.push(record);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[FetchRecord] {
        &self.rows
    }

    pub fn get(&self, symbol: &Symbol) -> Option<&FetchRecord> {
        self.rows.iter().find(|r| &r.symbol == symbol)
    }

    pub fn retain(&mut self, keep: impl FnMut(&FetchRecord) -> bool) {
        self.rows.retain(keep);
    }

    pub fn success_count(&self) -> usize {
        self.rows.iter().filter(|r| r.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.rows.len() - self.success_count()
    }

    /// Successful rows with their fundamentals
    pub fn successes(&self) -> impl Iterator<Item = (&Symbol, &Fundamentals)> {
        self.rows
            .iter()
            .filter_map(|r| r.fundamentals().map(|f| (&r.symbol, f)))
    }

    /// Symbol -> error text (None for successes), independent of row order
    pub fn outcome_map(&self) -> HashMap<Symbol, Option<String>> {
        self.rows
            .iter()
            .map(|r| (r.symbol.clone(), r.error().map(str::to_string)))
            .collect()
    }

    /// Write the table as CSV, creating the parent directory if needed
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create output directory {}", parent.display()))?;
        }

        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to open {} for writing", path.display()))?;
        writer.write_record(Fundamentals::header())?;
        for row in &self.rows {
            writer.write_record(row.cells())?;
        }
        writer
            .flush()
            .with_context(|| format!("Failed to flush {}", path.display()))?;

        info!("💾 Wrote {} rows to {}", self.rows.len(), path.display());
        Ok(())
    }

    /// Read a table previously written by `write_csv`. Columns are matched by
    /// name, so files with extra or missing columns still load.
    pub fn read_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        let headers = reader.headers()?.clone();
        let index: HashMap<&str, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim(), i))
            .collect();
        let symbol_index = *index
            .get(SYMBOL_COLUMN)
            .ok_or_else(|| anyhow!("{} has no {} column", path.display(), SYMBOL_COLUMN))?;
        let error_index = index.get(ERROR_COLUMN).copied();

        let mut table = ResultTable::default();
        for (line, row) in reader.records().enumerate() {
            let row = row.with_context(|| format!("Bad CSV row {} in {}", line + 2, path.display()))?;

            let Some(symbol) = row.get(symbol_index).and_then(Symbol::parse) else {
                continue;
            };

            let error = error_index
                .and_then(|i| row.get(i))
                .map(str::trim)
                .filter(|e| !e.is_empty());

            let record = match error {
                Some(error) => FetchRecord::failed(symbol, error),
                None => {
                    let fundamentals = Fundamentals::from_cells(|column| {
                        index.get(column).and_then(|&i| row.get(i))
                    });
                    FetchRecord::fetched(symbol, fundamentals)
                }
            };
            table.push(record);
        }

        Ok(table)
    }
}

/// `<dir>/<prefix>_<YYYY-MM-DD>.csv`; a same-day re-run overwrites
pub fn dated_output_path(dir: &Path, prefix: &str, date: NaiveDate) -> PathBuf {
    dir.join(format!("{}_{}.csv", prefix, date.format("%Y-%m-%d")))
}
