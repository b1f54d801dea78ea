use std::path::PathBuf;

use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use stock_screener::analysis::catalog;
use stock_screener::models::Config;
use stock_screener::pipeline::{run_fetch, run_screen, ScreenOptions};

/// Batch fundamentals fetcher and strategy screener
#[derive(Parser)]
#[command(name = "stock-screener")]
#[command(version)]
#[command(about = "Fetch company fundamentals for a ticker list and screen them with investment strategies")]
#[command(long_about = "
Fetches a fundamentals snapshot for every symbol in a ticker list from Yahoo
Finance, under a shared request-rate limit with retries and batch pauses, and
writes one dated CSV row per symbol. Saved tables can then be screened with the
built-in strategies or custom ones loaded from JSON.

Settings come from the environment (or a .env file); flags override them.

Usage:
  stock-screener fetch --tickers Input/tickers.txt --workers 8
  stock-screener screen --input Data/daily_stock_data_2024-03-07.csv --strategy value --top 5
  stock-screener strategies
")]
struct Cli {
    /// Log at debug level
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch fundamentals for every symbol in the ticker list
    Fetch {
        /// Ticker list: one symbol per line, or a CSV with a Symbol column
        #[arg(long, short = 't')]
        tickers: Option<PathBuf>,
        /// Directory for the dated output table
        #[arg(long, short = 'o')]
        output_dir: Option<PathBuf>,
        /// Concurrent fetch workers
        #[arg(long, short = 'w')]
        workers: Option<usize>,
        /// Symbols per batch
        #[arg(long, short = 'b')]
        batch_size: Option<usize>,
        /// Pause between batches in milliseconds
        #[arg(long)]
        batch_pause_ms: Option<u64>,
        /// Maximum requests per second across all workers
        #[arg(long, short = 'r')]
        rate_limit: Option<u32>,
        /// Attempts per symbol before giving up on retryable errors
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// Screen a fetched table with one or more strategies
    Screen {
        /// Table written by `fetch`
        #[arg(long, short = 'i')]
        input: PathBuf,
        /// Directory for the strategy reports
        #[arg(long, short = 'o')]
        output_dir: Option<PathBuf>,
        /// Strategy to run (repeatable); all strategies when omitted
        #[arg(long = "strategy", short = 's')]
        strategies: Vec<String>,
        /// JSON file with additional strategies
        #[arg(long)]
        strategies_file: Option<PathBuf>,
        /// Picks per strategy in the top-picks report
        #[arg(long)]
        top: Option<usize>,
    },
    /// List the built-in strategies
    Strategies,
}

fn init_logging(verbose: bool) -> Result<()> {
    let default = if verbose { "stock_screener=debug" } else { "stock_screener=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::from_env()?;

    match cli.command {
        Command::Fetch {
            tickers,
            output_dir,
            workers,
            batch_size,
            batch_pause_ms,
            rate_limit,
            max_attempts,
        } => {
            if let Some(path) = tickers {
                config.tickers_path = path;
            }
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            config.max_workers = workers.unwrap_or(config.max_workers);
            config.batch_size = batch_size.unwrap_or(config.batch_size);
            config.batch_pause_ms = batch_pause_ms.unwrap_or(config.batch_pause_ms);
            config.rate_limit_per_second = rate_limit.unwrap_or(config.rate_limit_per_second);
            config.retry_max_attempts = max_attempts.unwrap_or(config.retry_max_attempts);
            config.validate()?;

            info!("🚀 Starting fundamentals fetch from {}", config.tickers_path.display());
            let summary = run_fetch(&config).await?;
            println!(
                "✅ {} rows ({} ok, {} failed) written to {}",
                summary.requested,
                summary.succeeded,
                summary.failed,
                summary.output_path.display()
            );
        }
        Command::Screen {
            input,
            output_dir,
            strategies,
            strategies_file,
            top,
        } => {
            let options = ScreenOptions {
                input,
                output_dir: output_dir.unwrap_or_else(|| config.output_dir.clone()),
                strategies,
                strategies_file,
                top_n: top.unwrap_or(config.top_n),
                date: Local::now().date_naive(),
            };
            let summary = run_screen(&options)?;
            for result in &summary.results {
                println!("{:<16} {:>5} matches", result.strategy, result.rows.len());
            }
            println!("🏆 Top picks: {}", summary.top_picks_path.display());
        }
        Command::Strategies => {
            for strategy in catalog::builtin() {
                let score = strategy.score_column.as_deref().unwrap_or("-");
                println!(
                    "{:<16} {:>2} filters  score: {}",
                    strategy.name,
                    strategy.predicates.len(),
                    score
                );
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("❌ Failed to initialise logging: {}", e);
    }

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}
