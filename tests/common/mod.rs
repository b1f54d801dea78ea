//! Common test utilities and helpers

pub mod provider;

use std::path::{Path, PathBuf};

use stock_screener::models::Config;

pub use provider::{full_record, ScriptedProvider};

/// Test logging helpers
pub mod logging {
    use std::sync::Once;
    use tracing::{debug, info};

    static INIT: Once = Once::new();

    /// Initialize test logging
    pub fn init_test_logging() {
        INIT.call_once(|| {
            // A subscriber may already be installed by test-log
            let _ = tracing::subscriber::set_global_default(
                tracing_subscriber::fmt()
                    .with_env_filter("stock_screener=debug")
                    .with_test_writer()
                    .finish(),
            );
        });
    }

    /// Log test step
    pub fn log_test_step(step: &str) {
        info!("🧪 Test Step: {}", step);
    }

    /// Log test data
    pub fn log_test_data<T: std::fmt::Debug>(label: &str, data: &T) {
        debug!("📊 {}: {:?}", label, data);
    }
}

/// Config for runs against a local provider: no pauses, tiny backoff
pub fn fast_config(dir: &Path) -> Config {
    Config {
        tickers_path: dir.join("tickers.txt"),
        output_dir: dir.join("Data"),
        rate_limit_per_second: 1_000,
        rate_limit_jitter_ms: 0,
        max_workers: 4,
        batch_size: 3,
        batch_pause_ms: 0,
        retry_max_attempts: 4,
        retry_base_delay_ms: 5,
        retry_max_delay_ms: 40,
        retry_jitter_ms: 0,
        ..Config::default()
    }
}

/// Write a ticker list, one symbol per line
pub fn write_tickers(path: &Path, symbols: &[&str]) -> PathBuf {
    std::fs::write(path, symbols.join("\n")).unwrap();
    path.to_path_buf()
}

/// Tokio-backed clock that remembers every sleep it was asked for
#[derive(Default)]
pub struct RecordingClock {
    sleeps: std::sync::Mutex<Vec<std::time::Duration>>,
}

impl RecordingClock {
    pub fn sleeps(&self) -> Vec<std::time::Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl stock_screener::rate_limiter::Clock for RecordingClock {
    fn now(&self) -> tokio::time::Instant {
        tokio::time::Instant::now()
    }

    async fn sleep(&self, duration: std::time::Duration) {
        self.sleeps.lock().unwrap().push(duration);
        tokio::time::sleep(duration).await;
    }
}
