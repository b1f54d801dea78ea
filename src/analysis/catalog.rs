//! Built-in screening strategies
//!
//! Thresholds and weights follow the long-standing hand-written screens this
//! tool grew out of. Custom strategies can be loaded from a JSON file with
//! the same shape as `Strategy`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::analysis::strategy::Comparison::{self, Ge, Gt, Le, Lt};
use crate::analysis::strategy::{
    col, inverse_share_of_max, lit, parse_strategies, recip, share_of_max, Expr, Predicate, Strategy,
    StrategyError,
};

fn cmp(column: &str, op: Comparison, value: f64) -> Predicate {
    Predicate::compare(column, op, value)
}

fn contrarian() -> Strategy {
    Strategy::new("Contrarian")
        .scored_as("Contrarian Score")
        .require(&["1-Year Return", "Price to Book", "Trailing EPS", "Recommendation Mean"])
        .filter(cmp("1-Year Return", Lt, -0.1))
        .filter(cmp("Price to Book", Lt, 1.0))
        .filter(cmp("Trailing EPS", Gt, 0.0))
        .filter(cmp("Recommendation Mean", Le, 3.0))
        // The return filter is negative, so its magnitude is the negation
        .weight(-0.4, col("1-Year Return"))
        .weight(0.3, recip("Price to Book"))
        .weight(0.2, col("Trailing EPS"))
        .weight(0.1, lit(3.0).sub(col("Recommendation Mean")))
}

fn deep_value() -> Strategy {
    Strategy::new("Deep Value")
        .scored_as("Deep Value Score")
        .derive("FCF Yield", col("Free Cash Flow").div(col("Market Cap")))
        .filter(cmp("Price to Book", Lt, 1.0))
        .filter(cmp("PE Ratio", Lt, 10.0))
        .filter(cmp("FCF Yield", Gt, 0.05))
        .filter(cmp("Debt to Equity", Lt, 1.0))
        .weight(0.3, recip("Price to Book"))
        .weight(0.3, recip("PE Ratio"))
        .weight(0.2, col("FCF Yield"))
        .weight(0.2, lit(1.0).div(col("Debt to Equity").add(lit(1.0))))
}

fn defensive() -> Strategy {
    Strategy::new("Defensive")
        .scored_as("Defensive Score")
        .require(&[
            "Beta",
            "PE Ratio",
            "Current Ratio",
            "Profit Margins",
            "Gross Margins",
            "Operating Margins",
            "EBITDA Margins",
            "Debt to Equity",
            "Quick Ratio",
        ])
        .filter(cmp("Beta", Lt, 1.0))
        .filter(cmp("PE Ratio", Gt, 0.0))
        .filter(cmp("PE Ratio", Lt, 25.0))
        .filter(cmp("Current Ratio", Gt, 1.5))
        .filter(cmp("Quick Ratio", Gt, 1.0))
        .filter(cmp("Profit Margins", Gt, 0.05))
        .filter(cmp("Operating Margins", Gt, 0.10))
        .filter(cmp("Debt to Equity", Lt, 0.5))
        .weight(0.20, inverse_share_of_max("Beta"))
        .weight(0.10, inverse_share_of_max("PE Ratio"))
        .weight(0.15, share_of_max("Current Ratio"))
        .weight(0.10, share_of_max("Quick Ratio"))
        .weight(0.15, share_of_max("Profit Margins"))
        .weight(0.10, share_of_max("Operating Margins"))
        .weight(0.10, share_of_max("Gross Margins"))
        .weight(0.10, inverse_share_of_max("Debt to Equity"))
}

fn dividend() -> Strategy {
    Strategy::new("Dividend")
        .scored_as("Dividend Score")
        .filter(cmp("Dividend Yield", Gt, 0.03))
        .filter(cmp("Payout Ratio", Lt, 0.7))
        .filter(cmp("Free Cash Flow", Gt, 0.0))
        .filter(cmp("Five-Year Avg. Dividend Yield", Gt, 0.02))
        .weight(1.0, col("Dividend Yield").div(col("Payout Ratio")))
}

fn esg() -> Strategy {
    Strategy::new("ESG")
        .scored_as("ESG Score")
        .require(&["Revenue Growth (YoY)", "Profit Margins", "Current Ratio", "Debt to Equity"])
        .filter(cmp("Revenue Growth (YoY)", Gt, 0.05))
        .filter(cmp("Profit Margins", Gt, 0.1))
        .filter(cmp("Current Ratio", Ge, 1.5))
        .filter(cmp("Debt to Equity", Lt, 1.0))
        .weight(0.3, col("Revenue Growth (YoY)"))
        .weight(0.3, col("Profit Margins"))
        .weight(0.2, col("Current Ratio"))
        .weight(0.2, lit(1.0).sub(col("Debt to Equity")))
}

fn growth() -> Strategy {
    Strategy::new("Growth")
        .scored_as("Growth Score")
        .require(&["Revenue Growth (YoY)", "Earnings Growth (YoY)", "PE Ratio", "Price to Sales"])
        .filter(cmp("Revenue Growth (YoY)", Gt, 0.15))
        .filter(cmp("Earnings Growth (YoY)", Gt, 0.15))
        .filter(cmp("PE Ratio", Gt, 20.0))
        .filter(cmp("Price to Sales", Gt, 2.0))
        .weight(0.4, col("Revenue Growth (YoY)"))
        .weight(0.3, col("Earnings Growth (YoY)"))
        .weight(0.2, recip("PE Ratio"))
        .weight(0.1, recip("Price to Sales"))
}

fn income() -> Strategy {
    // Shares outstanding is market cap over price, so this is FCF over total dividends paid
    let coverage = col("Free Cash Flow")
        .div(col("Dividend Rate").mul(col("Market Cap")).div(col("Current Price")));

    Strategy::new("Income")
        .scored_as("Income Score")
        .require(&[
            "Dividend Rate",
            "Dividend Yield",
            "Payout Ratio",
            "Five-Year Avg. Dividend Yield",
            "Free Cash Flow",
            "Operating Cash Flow",
            "Current Price",
            "Market Cap",
        ])
        .derive("Dividend Coverage", coverage)
        .filter(cmp("Dividend Yield", Gt, 0.03))
        .filter(cmp("Payout Ratio", Lt, 0.75))
        .filter(cmp("Free Cash Flow", Gt, 0.0))
        .filter(cmp("Operating Cash Flow", Gt, 0.0))
        .filter(cmp("Five-Year Avg. Dividend Yield", Gt, 0.0))
        .weight(0.30, share_of_max("Dividend Yield"))
        .weight(0.20, inverse_share_of_max("Payout Ratio"))
        .weight(0.20, share_of_max("Dividend Coverage"))
        .weight(0.15, share_of_max("Five-Year Avg. Dividend Yield"))
        .weight(0.15, share_of_max("Free Cash Flow"))
}

fn momentum() -> Strategy {
    Strategy::new("Momentum")
        .scored_as("Momentum Score")
        .require(&["1-Year Return", "Average Volume", "Beta"])
        .filter(cmp("1-Year Return", Gt, 0.2))
        .filter(cmp("Average Volume", Gt, 100_000.0))
        .filter(cmp("Beta", Ge, 1.0))
        .weight(1.0, col("1-Year Return"))
}

fn quality() -> Strategy {
    Strategy::new("Quality")
        .scored_as("Quality Score")
        .require(&["PE Ratio", "Price to Book", "Return on Assets", "Return on Equity", "Current Price"])
        .filter(cmp("PE Ratio", Gt, 0.0))
        .filter(cmp("Price to Book", Lt, 3.0))
        .filter(cmp("Return on Assets", Gt, 0.1))
        .filter(cmp("Return on Equity", Gt, 0.15))
        .weight(0.3, recip("PE Ratio"))
        .weight(0.3, recip("Price to Book"))
        .weight(0.2, col("Return on Assets"))
        .weight(0.2, col("Return on Equity"))
}

fn sector_rotation() -> Strategy {
    Strategy::new("Sector Rotation")
        .scored_as("Sector Rotation Score")
        .require(&["Revenue Growth (YoY)", "Profit Margins", "Sector", "Market Cap", "PE Ratio"])
        .filter(Predicate::Compare {
            left: Expr::GroupMean {
                group_by: "Sector".to_string(),
                column: "Revenue Growth (YoY)".to_string(),
            },
            op: Gt,
            right: lit(0.05),
        })
        .filter(Predicate::between("Revenue Growth (YoY)", 0.05, 1.0))
        .filter(Predicate::between("Profit Margins", 0.05, 0.5))
        .filter(Predicate::between("PE Ratio", 5.0, 25.0))
        .filter(cmp("Market Cap", Gt, 1e9))
        .weight(0.4, col("Revenue Growth (YoY)"))
        .weight(0.3, col("Profit Margins"))
        .weight(0.3, lit(25.0).sub(col("PE Ratio")))
}

fn small_cap() -> Strategy {
    Strategy::new("Small-Cap")
        .scored_as("Small-Cap Score")
        .require(&["Market Cap", "Current Price", "PE Ratio", "Revenue Growth (YoY)", "Return on Assets"])
        .filter(cmp("Market Cap", Lt, 2e9))
        .filter(cmp("PE Ratio", Gt, 0.0))
        .filter(cmp("Revenue Growth (YoY)", Gt, 0.0))
        .filter(cmp("Return on Assets", Gt, 0.05))
        .weight(0.4, recip("Market Cap"))
        .weight(0.3, col("Revenue Growth (YoY)"))
        .weight(0.2, col("Return on Assets"))
        .weight(0.1, recip("PE Ratio"))
}

fn turnaround() -> Strategy {
    Strategy::new("Turnaround")
        .scored_as("Turnaround Score")
        .require(&["Earnings Growth (YoY)", "Operating Margins", "Total Debt", "Current Price"])
        .filter(cmp("Earnings Growth (YoY)", Gt, 0.1))
        .filter(cmp("Operating Margins", Gt, 0.0))
        .filter(Predicate::Compare { left: col("Total Debt"), op: Lt, right: col("Market Cap") })
        .weight(0.5, col("Earnings Growth (YoY)"))
        .weight(0.3, col("Operating Margins"))
        .weight(-0.2, col("Total Debt").div(col("Market Cap")))
}

fn value() -> Strategy {
    Strategy::new("Value")
        .scored_as("Value Score")
        .filter(cmp("PE Ratio", Lt, 15.0))
        .filter(cmp("Price to Book", Lt, 3.0))
        .filter(cmp("PEG Ratio", Lt, 1.0))
        .filter(cmp("Dividend Yield", Gt, 0.02))
        .filter(cmp("Debt to Equity", Lt, 1.0))
        .filter(cmp("Free Cash Flow", Gt, 0.0))
        .weight(0.20, inverse_share_of_max("PE Ratio"))
        .weight(0.15, inverse_share_of_max("Price to Book"))
        .weight(0.15, inverse_share_of_max("PEG Ratio"))
        .weight(0.20, share_of_max("Dividend Yield"))
        .weight(0.15, inverse_share_of_max("Debt to Equity"))
        .weight(0.15, share_of_max("Free Cash Flow"))
}

fn graham() -> Strategy {
    Strategy::new("Graham")
        .scored_as("Score")
        .filter(cmp("Earnings Growth (YoY)", Gt, 0.0))
        .filter(cmp("Debt to Equity", Lt, 1.0))
        .filter(cmp("Current Ratio", Gt, 1.5))
        .filter(cmp("PE Ratio", Lt, 15.0))
        .filter(cmp("Price to Book", Lt, 1.5))
        .weight(1.0, col("Earnings Growth (YoY)").div(col("PE Ratio")))
}

fn lynch() -> Strategy {
    Strategy::new("Lynch")
        .scored_as("Score")
        .filter(cmp("Earnings Growth (YoY)", Gt, 0.0))
        .filter(cmp("PEG Ratio", Lt, 2.0))
        .filter(cmp("PE Ratio", Lt, 40.0))
        .filter(cmp("Debt to Equity", Lt, 3.0))
        .weight(1.0, col("Earnings Growth (YoY)").div(col("PEG Ratio")))
}

fn buffett() -> Strategy {
    Strategy::new("Buffett")
        .scored_as("Score")
        .filter(cmp("Earnings Growth (YoY)", Gt, 0.0))
        .filter(cmp("Debt to Equity", Lt, 2.0))
        .filter(cmp("Price to Book", Lt, 10.0))
        .filter(cmp("PE Ratio", Lt, 50.0))
        .weight(1.0, col("Earnings Growth (YoY)").div(col("PE Ratio")))
}

/// Every built-in strategy, in report order
pub fn builtin() -> Vec<Strategy> {
    vec![
        contrarian(),
        deep_value(),
        defensive(),
        dividend(),
        esg(),
        growth(),
        income(),
        momentum(),
        quality(),
        sector_rotation(),
        small_cap(),
        turnaround(),
        value(),
        graham(),
        lynch(),
        buffett(),
    ]
}

/// Case-insensitive lookup by name or slug
pub fn find<'a>(strategies: &'a [Strategy], name: &str) -> Option<&'a Strategy> {
    let wanted = name.trim();
    strategies
        .iter()
        .find(|s| s.name.eq_ignore_ascii_case(wanted) || s.slug() == wanted.to_ascii_lowercase())
}

/// Read custom strategies from a JSON array file
pub fn load_file(path: &Path) -> Result<Vec<Strategy>> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read strategies file {}", path.display()))?;
    let strategies = parse_strategies(&json)
        .with_context(|| format!("Invalid strategies file {}", path.display()))?;
    info!("📄 Loaded {} custom strategies from {}", strategies.len(), path.display());
    Ok(strategies)
}

/// Pick strategies by name from the catalog plus any custom ones.
/// An empty selection means everything available. Custom strategies shadow
/// built-ins of the same name.
pub fn select(names: &[String], custom: Vec<Strategy>) -> Result<Vec<Strategy>, StrategyError> {
    let mut available = custom;
    for strategy in builtin() {
        if find(&available, &strategy.name).is_none() {
            available.push(strategy);
        }
    }

    if names.is_empty() {
        return Ok(available);
    }

    names
        .iter()
        .map(|name| {
            find(&available, name)
                .cloned()
                .ok_or_else(|| StrategyError::NotFound(name.clone()))
        })
        .collect()
}
