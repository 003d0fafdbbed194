use async_trait::async_trait;
use chrono::NaiveDate;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::error::Result;
use crate::models::{FundamentalReport, MultiplierPoint, PricePoint};

pub mod tiingo_client;
pub use tiingo_client::TiingoClient;

/// Spaces outgoing requests to stay under a requests-per-minute budget
pub struct ApiRateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl ApiRateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        let min_interval = if requests_per_minute > 0 {
            Duration::from_millis(60_000 / requests_per_minute as u64)
        } else {
            Duration::from_secs(1) // Default 1 second delay
        };

        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    pub async fn wait_if_needed(&self) {
        let mut last_request = self.last_request.lock().await;
        if let Some(previous) = *last_request {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last_request = Some(Instant::now());
    }
}

/// Strip punctuation and whitespace so class-share tickers fit the provider path
/// (`BRK.B` -> `BRKB`).
pub fn normalize_ticker(ticker: &str) -> String {
    ticker
        .chars()
        .filter(|c| !c.is_ascii_punctuation() && !c.is_whitespace())
        .collect()
}

/// Upstream market data source.
///
/// Every method takes the ticker as stored; implementations normalize it.
/// "No data" is reported as an empty vector or `None`, never as an error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceGateway: Send + Sync {
    async fn daily_prices(&self, ticker: &str, start_date: NaiveDate) -> Result<Vec<PricePoint>>;

    async fn daily_multipliers(&self, ticker: &str) -> Result<Vec<MultiplierPoint>>;

    /// Last date the provider has daily data for
    async fn latest_daily_update(&self, ticker: &str) -> Result<Option<NaiveDate>>;

    async fn quarterly_fundamentals(&self, ticker: &str) -> Result<Vec<FundamentalReport>>;

    /// Report date of the newest quarterly statement bundle
    async fn latest_quarterly_update_date(&self, ticker: &str) -> Result<Option<NaiveDate>>;
}
