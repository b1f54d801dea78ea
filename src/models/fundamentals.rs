//! Canonical fundamentals record and the column schema shared with the
//! strategy engine.
//!
//! Every field is declared exactly once in `fundamentals_schema!` together
//! with its output column name and the provider key it is read from. The
//! column names are the contract downstream screens rely on, so renaming one
//! is a breaking change for every saved table.

use crate::api::ProviderRecord;
use crate::models::Symbol;

/// Written in place of a missing value
pub const MISSING: &str = "N/A";

pub const SYMBOL_COLUMN: &str = "Symbol";
pub const ERROR_COLUMN: &str = "Error";

macro_rules! fundamentals_schema {
    (
        text { $($t_field:ident => $t_column:literal <- $t_key:literal,)* }
        number { $($n_field:ident => $n_column:literal <- $n_key:literal,)* }
    ) => {
        /// One company's snapshot; `None` means the provider had no usable value.
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct Fundamentals {
            $(pub $t_field: Option<String>,)*
            $(pub $n_field: Option<f64>,)*
        }

        impl Fundamentals {
            pub const TEXT_COLUMNS: &'static [&'static str] = &[$($t_column),*];
            pub const NUMBER_COLUMNS: &'static [&'static str] = &[$($n_column),*];
            /// Provider keys, aligned with `TEXT_COLUMNS` and `NUMBER_COLUMNS`
            pub const TEXT_KEYS: &'static [&'static str] = &[$($t_key),*];
            pub const NUMBER_KEYS: &'static [&'static str] = &[$($n_key),*];

            /// Map a provider record onto the canonical fields
            pub fn from_record(record: &ProviderRecord) -> Self {
                Fundamentals {
                    $($t_field: record.text($t_key),)*
                    $($n_field: record.number($n_key),)*
                }
            }

            /// Rebuild from stored cells, looked up by column name
            pub fn from_cells<'a, F>(cell: F) -> Self
            where
                F: Fn(&str) -> Option<&'a str>,
            {
                Fundamentals {
                    $($t_field: cell($t_column).and_then(parse_text),)*
                    $($n_field: cell($n_column).and_then(parse_number),)*
                }
            }

            pub fn text(&self, column: &str) -> Option<&str> {
                match column {
                    $($t_column => self.$t_field.as_deref(),)*
                    _ => None,
                }
            }

            pub fn number(&self, column: &str) -> Option<f64> {
                match column {
                    $($n_column => self.$n_field,)*
                    _ => None,
                }
            }

            /// Cells in schema order, missing values written as the sentinel
            pub fn cells(&self) -> Vec<String> {
                let mut cells = Vec::with_capacity(
                    Self::TEXT_COLUMNS.len() + Self::NUMBER_COLUMNS.len(),
                );
                $(cells.push(self.$t_field.clone().unwrap_or_else(|| MISSING.to_string()));)*
                $(cells.push(self.$n_field.map(|v| v.to_string()).unwrap_or_else(|| MISSING.to_string()));)*
                cells
            }

            /// Number of numeric fields that carry a value
            pub fn populated_numbers(&self) -> usize {
                [$(self.$n_field.is_some()),*].iter().filter(|present| **present).count()
            }
        }
    };
}

fundamentals_schema! {
    text {
        name => "Name" <- "longName",
        sector => "Sector" <- "sector",
        industry => "Industry" <- "industry",
        country => "Country" <- "country",
        currency => "Currency" <- "currency",
        exchange => "Exchange" <- "exchange",
        website => "Website" <- "website",
    }
    number {
        current_price => "Current Price" <- "currentPrice",
        market_cap => "Market Cap" <- "marketCap",
        enterprise_value => "Enterprise Value" <- "enterpriseValue",
        pe_ratio => "PE Ratio" <- "trailingPE",
        forward_pe => "Forward PE" <- "forwardPE",
        peg_ratio => "PEG Ratio" <- "pegRatio",
        price_to_book => "Price to Book" <- "priceToBook",
        price_to_sales => "Price to Sales" <- "priceToSalesTrailing12Months",
        book_value_per_share => "Book Value per Share" <- "bookValue",
        revenue_per_share => "Revenue per Share" <- "revenuePerShare",
        revenue_growth => "Revenue Growth (YoY)" <- "revenueGrowth",
        earnings_growth => "Earnings Growth (YoY)" <- "earningsGrowth",
        ebitda_margins => "EBITDA Margins" <- "ebitdaMargins",
        gross_margins => "Gross Margins" <- "grossMargins",
        operating_margins => "Operating Margins" <- "operatingMargins",
        profit_margins => "Profit Margins" <- "profitMargins",
        dividend_rate => "Dividend Rate" <- "dividendRate",
        dividend_yield => "Dividend Yield" <- "dividendYield",
        payout_ratio => "Payout Ratio" <- "payoutRatio",
        five_year_avg_dividend_yield => "Five-Year Avg. Dividend Yield" <- "fiveYearAvgDividendYield",
        ex_dividend_date => "Ex-Dividend Date" <- "exDividendDate",
        free_cash_flow => "Free Cash Flow" <- "freeCashflow",
        operating_cash_flow => "Operating Cash Flow" <- "operatingCashflow",
        total_cash => "Total Cash" <- "totalCash",
        cash_per_share => "Cash per Share" <- "totalCashPerShare",
        total_debt => "Total Debt" <- "totalDebt",
        net_debt => "Net Debt" <- "netDebt",
        debt_to_equity => "Debt to Equity" <- "debtToEquity",
        current_ratio => "Current Ratio" <- "currentRatio",
        quick_ratio => "Quick Ratio" <- "quickRatio",
        beta => "Beta" <- "beta",
        fifty_two_week_high => "52-Week High" <- "fiftyTwoWeekHigh",
        fifty_two_week_low => "52-Week Low" <- "fiftyTwoWeekLow",
        average_volume => "Average Volume" <- "averageVolume",
        regular_market_volume => "Regular Market Volume" <- "regularMarketVolume",
        price_change_percent => "Current Price Change (%)" <- "regularMarketChangePercent",
        one_year_return => "1-Year Return" <- "52WeekChange",
        insider_ownership => "Insider Ownership" <- "heldPercentInsiders",
        institutional_ownership => "Institutional Ownership" <- "heldPercentInstitutions",
        short_ratio => "Short Ratio" <- "shortRatio",
        target_high_price => "Target High Price" <- "targetHighPrice",
        target_low_price => "Target Low Price" <- "targetLowPrice",
        target_mean_price => "Target Mean Price" <- "targetMeanPrice",
        recommendation_mean => "Recommendation Mean" <- "recommendationMean",
        analyst_opinions => "Number of Analyst Opinions" <- "numberOfAnalystOpinions",
        return_on_assets => "Return on Assets" <- "returnOnAssets",
        return_on_equity => "Return on Equity" <- "returnOnEquity",
        enterprise_to_ebitda => "Enterprise to EBITDA" <- "enterpriseToEbitda",
        trailing_eps => "Trailing EPS" <- "trailingEps",
        forward_eps => "Forward EPS" <- "forwardEps",
        total_revenue => "Total Revenue" <- "totalRevenue",
    }
}

impl Fundamentals {
    /// Full table header: symbol, schema columns, error
    pub fn header() -> Vec<&'static str> {
        let mut header = vec![SYMBOL_COLUMN];
        header.extend_from_slice(Self::TEXT_COLUMNS);
        header.extend_from_slice(Self::NUMBER_COLUMNS);
        header.push(ERROR_COLUMN);
        header
    }

    pub fn is_text_column(column: &str) -> bool {
        Self::TEXT_COLUMNS.contains(&column)
    }

    pub fn is_number_column(column: &str) -> bool {
        Self::NUMBER_COLUMNS.contains(&column)
    }
}

fn parse_text(cell: &str) -> Option<String> {
    let cell = cell.trim();
    if cell.is_empty() || cell == MISSING {
        None
    } else {
        Some(cell.to_string())
    }
}

fn parse_number(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Result of fetching one symbol
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Fetched(Fundamentals),
    Failed(String),
}

/// One row of the result table
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRecord {
    pub symbol: Symbol,
    pub outcome: FetchOutcome,
}

impl FetchRecord {
    pub fn fetched(symbol: Symbol, fundamentals: Fundamentals) -> Self {
        Self { symbol, outcome: FetchOutcome::Fetched(fundamentals) }
    }

    pub fn failed(symbol: Symbol, error: impl Into<String>) -> Self {
        let mut error = error.into();
        if error.trim().is_empty() {
            error = "unknown error".to_string();
        }
        Self { symbol, outcome: FetchOutcome::Failed(error) }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, FetchOutcome::Fetched(_))
    }

    pub fn fundamentals(&self) -> Option<&Fundamentals> {
        match &self.outcome {
            FetchOutcome::Fetched(f) => Some(f),
            FetchOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            FetchOutcome::Fetched(_) => None,
            FetchOutcome::Failed(e) => Some(e),
        }
    }

    /// Cells in header order. Failure rows leave every schema column empty.
    pub fn cells(&self) -> Vec<String> {
        let mut cells = vec![self.symbol.to_string()];
        match &self.outcome {
            FetchOutcome::Fetched(f) => {
                cells.extend(f.cells());
                cells.push(String::new());
            }
            FetchOutcome::Failed(error) => {
                let width = Fundamentals::TEXT_COLUMNS.len() + Fundamentals::NUMBER_COLUMNS.len();
                cells.extend(std::iter::repeat(String::new()).take(width));
                cells.push(error.clone());
            }
        }
        cells
    }
}
