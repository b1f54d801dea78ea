//! Strategy interpreter over a result table

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::debug;

use crate::analysis::strategy::{Expr, Predicate, Strategy, StrategyError};
use crate::models::{Fundamentals, Symbol};
use crate::result_table::ResultTable;

/// One symbol that passed a strategy
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenedRow {
    /// 1-based position in the result
    pub rank: usize,
    pub symbol: Symbol,
    pub name: Option<String>,
    pub sector: Option<String>,
    pub score: Option<f64>,
    /// Aligned with `StrategyResult::columns`
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyResult {
    pub strategy: String,
    pub slug: String,
    pub score_column: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<ScreenedRow>,
}

impl StrategyResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn top(&self, n: usize) -> &[ScreenedRow] {
        &self.rows[..n.min(self.rows.len())]
    }
}

struct Row<'a> {
    symbol: &'a Symbol,
    fundamentals: &'a Fundamentals,
    /// Aligned with `Strategy::derived`
    derived: Vec<Option<f64>>,
}

type GroupKey = (String, String);

struct Evaluator<'s> {
    strategy: &'s Strategy,
    group_means: HashMap<GroupKey, HashMap<String, f64>>,
    maxima: HashMap<String, Option<f64>>,
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

impl<'s> Evaluator<'s> {
    fn lookup(&self, row: &Row<'_>, column: &str) -> Option<f64> {
        match self.strategy.derived.iter().position(|d| d.name == column) {
            Some(i) => row.derived.get(i).copied().flatten(),
            None => row.fundamentals.number(column),
        }
    }

    fn eval(&self, expr: &Expr, row: &Row<'_>) -> Option<f64> {
        match expr {
            Expr::Column(c) => self.lookup(row, c),
            Expr::Const(v) => finite(*v),
            Expr::Add(a, b) => finite(self.eval(a, row)? + self.eval(b, row)?),
            Expr::Sub(a, b) => finite(self.eval(a, row)? - self.eval(b, row)?),
            Expr::Mul(a, b) => finite(self.eval(a, row)? * self.eval(b, row)?),
            Expr::Div(a, b) => {
                let denominator = self.eval(b, row)?;
                if denominator == 0.0 {
                    return None;
                }
                finite(self.eval(a, row)? / denominator)
            }
            Expr::ShareOfMax(c) => {
                let max = self.maxima.get(c).copied().flatten()?;
                if max == 0.0 {
                    return None;
                }
                finite(self.lookup(row, c)? / max)
            }
            Expr::GroupMean { group_by, column } => {
                let group = row.fundamentals.text(group_by)?;
                self.group_means
                    .get(&(group_by.clone(), column.clone()))?
                    .get(group)
                    .copied()
            }
        }
    }

    fn passes(&self, predicate: &Predicate, row: &Row<'_>) -> bool {
        match predicate {
            Predicate::Compare { left, op, right } => match (self.eval(left, row), self.eval(right, row)) {
                (Some(l), Some(r)) => op.holds(l, r),
                _ => false,
            },
            Predicate::Between { expr, low, high } => self
                .eval(expr, row)
                .map(|v| *low <= v && v <= *high)
                .unwrap_or(false),
        }
    }

    fn score(&self, row: &Row<'_>) -> Option<f64> {
        let mut total = 0.0;
        for term in &self.strategy.terms {
            total += term.weight * self.eval(&term.expr, row)?;
        }
        finite(total)
    }
}

fn has_required(strategy: &Strategy, fundamentals: &Fundamentals) -> bool {
    strategy.required.iter().all(|column| {
        if Fundamentals::is_text_column(column) {
            fundamentals.text(column).is_some()
        } else {
            fundamentals.number(column).is_some()
        }
    })
}

fn group_mean_keys(strategy: &Strategy) -> Vec<GroupKey> {
    let mut keys = Vec::new();
    for expr in strategy.all_exprs() {
        expr.visit(&mut |e| {
            if let Expr::GroupMean { group_by, column } = e {
                let key = (group_by.clone(), column.clone());
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        });
    }
    keys
}

/// Mean of `column` per distinct `group_by` text over the cohort
fn group_means(rows: &[Row<'_>], group_by: &str, column: &str) -> HashMap<String, f64> {
    let mut sums: HashMap<&str, (f64, usize)> = HashMap::new();
    for row in rows {
        if let (Some(group), Some(value)) = (row.fundamentals.text(group_by), row.fundamentals.number(column)) {
            let entry = sums.entry(group).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }
    }
    sums.into_iter()
        .filter_map(|(group, (sum, count))| finite(sum / count as f64).map(|mean| (group.to_string(), mean)))
        .collect()
}

/// Run one strategy over the successful rows of a table.
///
/// Anything that evaluates to a missing value fails its predicate, and a row
/// whose score is missing is left out. Scored results are ordered by score
/// descending with ties broken by symbol; unscored ones keep table order.
pub fn screen(strategy: &Strategy, table: &ResultTable) -> Result<StrategyResult, StrategyError> {
    strategy.validate()?;

    let mut cohort: Vec<Row<'_>> = table
        .successes()
        .filter(|(_, fundamentals)| has_required(strategy, fundamentals))
        .map(|(symbol, fundamentals)| Row { symbol, fundamentals, derived: Vec::new() })
        .collect();

    let mut evaluator = Evaluator {
        strategy,
        group_means: HashMap::new(),
        maxima: HashMap::new(),
    };
    for (group_by, column) in group_mean_keys(strategy) {
        let means = group_means(&cohort, &group_by, &column);
        evaluator.group_means.insert((group_by, column), means);
    }

    for row in &mut cohort {
        for derived in &strategy.derived {
            let value = evaluator.eval(&derived.expr, row);
            row.derived.push(value);
        }
    }

    let passing: Vec<Row<'_>> = cohort
        .into_iter()
        .filter(|row| strategy.predicates.iter().all(|p| evaluator.passes(p, row)))
        .collect();

    let mut share_columns: Vec<String> = Vec::new();
    for term in &strategy.terms {
        term.expr.visit(&mut |e| {
            if let Expr::ShareOfMax(column) = e {
                if !share_columns.contains(column) {
                    share_columns.push(column.clone());
                }
            }
        });
    }
    for column in share_columns {
        let max = passing
            .iter()
            .filter_map(|row| evaluator.lookup(row, &column))
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.max(v))));
        evaluator.maxima.insert(column, max);
    }

    let columns = strategy.referenced_columns();
    let scored = !strategy.terms.is_empty();
    let mut rows: Vec<ScreenedRow> = Vec::with_capacity(passing.len());
    for row in &passing {
        let score = if scored {
            match evaluator.score(row) {
                Some(score) => Some(score),
                None => {
                    debug!(strategy = %strategy.name, symbol = %row.symbol, "score missing, row dropped");
                    continue;
                }
            }
        } else {
            None
        };

        rows.push(ScreenedRow {
            rank: 0,
            symbol: row.symbol.clone(),
            name: row.fundamentals.name.clone(),
            sector: row.fundamentals.sector.clone(),
            score,
            values: columns.iter().map(|c| evaluator.lookup(row, c)).collect(),
        });
    }

    if scored {
        rows.sort_by(|a, b| {
            let (a_score, b_score) = (a.score.unwrap_or(f64::MIN), b.score.unwrap_or(f64::MIN));
            b_score
                .partial_cmp(&a_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
    }
    for (i, row) in rows.iter_mut().enumerate() {
        row.rank = i + 1;
    }

    debug!(strategy = %strategy.name, matches = rows.len(), "screen finished");

    Ok(StrategyResult {
        strategy: strategy.name.clone(),
        slug: strategy.slug(),
        score_column: strategy.score_column.clone(),
        columns,
        rows,
    })
}
