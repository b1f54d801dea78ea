//! Declarative screening strategies.
//!
//! A strategy is data: the columns a row must have, optional derived columns,
//! threshold predicates and weighted score terms. `screener::screen` is the
//! only interpreter.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Fundamentals;

/// Numeric expression over one row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Column(String),
    Const(f64),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    /// Value divided by the largest value among rows that passed the predicates
    ShareOfMax(String),
    /// Mean of `column` over the cohort rows sharing this row's `group_by` text
    GroupMean { group_by: String, column: String },
}

pub fn col(name: &str) -> Expr {
    Expr::Column(name.to_string())
}

pub fn lit(value: f64) -> Expr {
    Expr::Const(value)
}

/// `1 / column`
pub fn recip(name: &str) -> Expr {
    Expr::Div(Box::new(lit(1.0)), Box::new(col(name)))
}

pub fn share_of_max(name: &str) -> Expr {
    Expr::ShareOfMax(name.to_string())
}

/// `1 - column / max(column)`
pub fn inverse_share_of_max(name: &str) -> Expr {
    Expr::Sub(Box::new(lit(1.0)), Box::new(share_of_max(name)))
}

impl Expr {
    pub fn add(self, other: Expr) -> Expr {
        Expr::Add(Box::new(self), Box::new(other))
    }

    pub fn sub(self, other: Expr) -> Expr {
        Expr::Sub(Box::new(self), Box::new(other))
    }

    pub fn mul(self, other: Expr) -> Expr {
        Expr::Mul(Box::new(self), Box::new(other))
    }

    pub fn div(self, other: Expr) -> Expr {
        Expr::Div(Box::new(self), Box::new(other))
    }

    /// Depth-first walk over this node and its children
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        f(self);
        match self {
            Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Mul(a, b) | Expr::Div(a, b) => {
                a.visit(f);
                b.visit(f);
            }
            Expr::Column(_) | Expr::Const(_) | Expr::ShareOfMax(_) | Expr::GroupMean { .. } => {}
        }
    }

    fn contains_share_of_max(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| found |= matches!(e, Expr::ShareOfMax(_)));
        found
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl Comparison {
    pub fn holds(self, left: f64, right: f64) -> bool {
        match self {
            Comparison::Lt => left < right,
            Comparison::Le => left <= right,
            Comparison::Gt => left > right,
            Comparison::Ge => left >= right,
        }
    }
}

/// Row filter. Anything evaluating to a missing value fails the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    Compare { left: Expr, op: Comparison, right: Expr },
    /// Inclusive on both ends
    Between { expr: Expr, low: f64, high: f64 },
}

impl Predicate {
    pub fn compare(column: &str, op: Comparison, value: f64) -> Self {
        Predicate::Compare { left: col(column), op, right: lit(value) }
    }

    pub fn between(column: &str, low: f64, high: f64) -> Self {
        Predicate::Between { expr: col(column), low, high }
    }

    fn exprs(&self) -> Vec<&Expr> {
        match self {
            Predicate::Compare { left, right, .. } => vec![left, right],
            Predicate::Between { expr, .. } => vec![expr],
        }
    }
}

/// Per-row value computed before filtering, addressable by name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Derived {
    pub name: String,
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub expr: Expr,
    pub weight: f64,
}

impl Term {
    pub fn new(weight: f64, expr: Expr) -> Self {
        Self { expr, weight }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub name: String,
    /// Header used for the score in reports
    #[serde(default)]
    pub score_column: Option<String>,
    /// Rows missing any of these never enter the cohort
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub derived: Vec<Derived>,
    #[serde(default)]
    pub predicates: Vec<Predicate>,
    #[serde(default)]
    pub terms: Vec<Term>,
}

#[derive(Debug, Error, PartialEq)]
pub enum StrategyError {
    #[error("strategy has an empty name")]
    EmptyName,
    #[error("strategy '{strategy}' references unknown column '{column}'")]
    UnknownColumn { strategy: String, column: String },
    #[error("strategy '{strategy}' groups by '{column}', which is not a text column")]
    NotTextColumn { strategy: String, column: String },
    #[error("strategy '{strategy}' derives '{column}', which already names a column")]
    ColumnClash { strategy: String, column: String },
    #[error("strategy '{strategy}' uses share_of_max outside a score term")]
    MisplacedShareOfMax { strategy: String },
    #[error("strategy '{strategy}' has a non-finite weight or bound")]
    NonFinite { strategy: String },
    #[error("no strategy named '{0}'")]
    NotFound(String),
    #[error("failed to parse strategies: {0}")]
    Parse(String),
}

impl Strategy {
    pub fn new(name: &str) -> Self {
        Strategy {
            name: name.to_string(),
            score_column: None,
            required: Vec::new(),
            derived: Vec::new(),
            predicates: Vec::new(),
            terms: Vec::new(),
        }
    }

    pub fn scored_as(mut self, score_column: &str) -> Self {
        self.score_column = Some(score_column.to_string());
        self
    }

    pub fn require(mut self, columns: &[&str]) -> Self {
        self.required.extend(columns.iter().map(|c| c.to_string()));
        self
    }

    pub fn derive(mut self, name: &str, expr: Expr) -> Self {
        self.derived.push(Derived { name: name.to_string(), expr });
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn weight(mut self, weight: f64, expr: Expr) -> Self {
        self.terms.push(Term::new(weight, expr));
        self
    }

    /// File-friendly form of the name, e.g. "Deep Value" -> "deep_value"
    pub fn slug(&self) -> String {
        let mut slug = String::with_capacity(self.name.len());
        for c in self.name.chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
            } else if !slug.ends_with('_') {
                slug.push('_');
            }
        }
        slug.trim_matches('_').to_string()
    }

    fn is_derived(&self, column: &str) -> bool {
        self.derived.iter().any(|d| d.name == column)
    }

    /// Every expression in derived columns, predicates and terms
    pub(crate) fn all_exprs(&self) -> impl Iterator<Item = &Expr> {
        self.derived
            .iter()
            .map(|d| &d.expr)
            .chain(self.predicates.iter().flat_map(|p| p.exprs()))
            .chain(self.terms.iter().map(|t| &t.expr))
    }

    /// Numeric columns and derived names the strategy reads, first-use order
    pub fn referenced_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        let mut add = |name: &str| {
            if !columns.iter().any(|c| c == name) {
                columns.push(name.to_string());
            }
        };

        for name in &self.required {
            if Fundamentals::is_number_column(name) {
                add(name);
            }
        }
        for expr in self.all_exprs() {
            expr.visit(&mut |e| match e {
                Expr::Column(c) | Expr::ShareOfMax(c) | Expr::GroupMean { column: c, .. } => add(c),
                _ => {}
            });
        }
        columns
    }

    /// Check every column reference against the schema
    pub fn validate(&self) -> Result<(), StrategyError> {
        if self.name.trim().is_empty() {
            return Err(StrategyError::EmptyName);
        }

        let unknown = |column: &str| StrategyError::UnknownColumn {
            strategy: self.name.clone(),
            column: column.to_string(),
        };

        for column in &self.required {
            if !Fundamentals::is_number_column(column) && !Fundamentals::is_text_column(column) {
                return Err(unknown(column));
            }
        }

        // Derived columns may only use columns defined before them
        for (i, derived) in self.derived.iter().enumerate() {
            let earlier = &self.derived[..i];
            if Fundamentals::is_number_column(&derived.name)
                || Fundamentals::is_text_column(&derived.name)
                || earlier.iter().any(|d| d.name == derived.name)
            {
                return Err(StrategyError::ColumnClash {
                    strategy: self.name.clone(),
                    column: derived.name.clone(),
                });
            }
            if derived.expr.contains_share_of_max() {
                return Err(StrategyError::MisplacedShareOfMax { strategy: self.name.clone() });
            }
            self.check_expr(&derived.expr, |c| earlier.iter().any(|d| d.name == c))?;
        }

        for predicate in &self.predicates {
            if let Predicate::Between { low, high, .. } = predicate {
                if !low.is_finite() || !high.is_finite() {
                    return Err(StrategyError::NonFinite { strategy: self.name.clone() });
                }
            }
            for expr in predicate.exprs() {
                if expr.contains_share_of_max() {
                    return Err(StrategyError::MisplacedShareOfMax { strategy: self.name.clone() });
                }
                self.check_expr(expr, |c| self.is_derived(c))?;
            }
        }

        for term in &self.terms {
            if !term.weight.is_finite() {
                return Err(StrategyError::NonFinite { strategy: self.name.clone() });
            }
            self.check_expr(&term.expr, |c| self.is_derived(c))?;
        }

        Ok(())
    }

    fn check_expr(&self, expr: &Expr, is_derived: impl Fn(&str) -> bool) -> Result<(), StrategyError> {
        let mut result = Ok(());
        expr.visit(&mut |e| {
            if result.is_err() {
                return;
            }
            let known = |c: &str| Fundamentals::is_number_column(c) || is_derived(c);
            result = match e {
                Expr::Column(c) | Expr::ShareOfMax(c) if !known(c) => {
                    Err(StrategyError::UnknownColumn { strategy: self.name.clone(), column: c.clone() })
                }
                Expr::GroupMean { group_by, .. } if !Fundamentals::is_text_column(group_by) => {
                    Err(StrategyError::NotTextColumn { strategy: self.name.clone(), column: group_by.clone() })
                }
                Expr::GroupMean { column, .. } if !Fundamentals::is_number_column(column) => {
                    Err(StrategyError::UnknownColumn { strategy: self.name.clone(), column: column.clone() })
                }
                Expr::Const(v) if !v.is_finite() => {
                    Err(StrategyError::NonFinite { strategy: self.name.clone() })
                }
                _ => Ok(()),
            };
        });
        result
    }
}

/// Parse a JSON array of strategies and validate each one
pub fn parse_strategies(json: &str) -> Result<Vec<Strategy>, StrategyError> {
    let strategies: Vec<Strategy> =
        serde_json::from_str(json).map_err(|e| StrategyError::Parse(e.to_string()))?;
    for strategy in &strategies {
        strategy.validate()?;
    }
    Ok(strategies)
}
