//! Screening strategies over a fetched fundamentals table

pub mod catalog;
pub mod report;
pub mod screener;
pub mod strategy;

pub use screener::{screen, ScreenedRow, StrategyResult};
pub use strategy::{Comparison, Expr, Predicate, Strategy, StrategyError};
