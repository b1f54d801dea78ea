pub mod analysis;
pub mod api;
pub mod concurrent_fetcher;
pub mod fetcher;
pub mod models;
pub mod pipeline;
pub mod rate_limiter;
pub mod result_table;
pub mod tickers;
