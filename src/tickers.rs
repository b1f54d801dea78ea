use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};

use crate::models::Symbol;

/// Load the symbol list: one symbol per line, or the `Symbol` column of a
/// `.csv` file. Blank entries are skipped and repeats dropped.
pub fn load_symbols(path: &Path) -> Result<Vec<Symbol>> {
    let is_csv = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);

    let raw = if is_csv {
        read_symbol_column(path)?
    } else {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read ticker list {}", path.display()))?;
        content.lines().map(str::to_string).collect()
    };

    let mut seen = HashSet::new();
    let mut symbols = Vec::with_capacity(raw.len());
    for symbol in raw.iter().filter_map(|line| Symbol::parse(line)) {
        if seen.insert(symbol.clone()) {
            symbols.push(symbol);
        } else {
            warn!("Duplicate symbol {} in {}, keeping the first", symbol, path.display());
        }
    }

    info!("📋 Loaded {} symbols from {}", symbols.len(), path.display());
    Ok(symbols)
}

fn read_symbol_column(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to read ticker list {}", path.display()))?;
    let column = reader
        .headers()?
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case("symbol"))
        .ok_or_else(|| anyhow!("{} has no Symbol column", path.display()))?;

    let mut values = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(value) = record.get(column) {
            values.push(value.to_string());
        }
    }
    Ok(values)
}
