use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::utils::{calendar_quarter, DATE_FORMAT};

pub mod statements;
pub mod tiingo;

pub use statements::{FieldSpec, QuarterlyStatement, StatementKind};
pub use tiingo::{DataPoint, FundamentalReport, MultiplierPoint, PricePoint, StatementData};

/// A member of the tracked universe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stock {
    pub id: i64,
    pub symbol: String,
}

/// End-of-day close for one stock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPrice {
    pub stock_id: i64,
    pub date: NaiveDate,
    pub close_price: Option<f64>,
}

/// Daily valuation snapshot reported by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMultipliers {
    pub stock_id: i64,
    pub date: NaiveDate,
    pub market_cap: Option<f64>,
    pub enterprise_val: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub pb_ratio: Option<f64>,
    pub trailing_peg_1y: Option<f64>,
}

/// Fiscal (year, quarter) key. Quarter 0 marks an annual/TTM report.
///
/// Ordering is by year, then quarter, with the annual row of a year sorting
/// after its fourth quarter: the annual report closes the fiscal year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FiscalPeriod {
    pub year: i32,
    pub quarter: i32,
}

impl FiscalPeriod {
    pub fn new(year: i32, quarter: i32) -> Self {
        Self { year, quarter }
    }

    /// Calendar-quarter period containing `date`
    pub fn from_date(date: NaiveDate) -> Self {
        use chrono::Datelike;
        Self::new(date.year(), calendar_quarter(date))
    }

    pub fn is_quarterly(&self) -> bool {
        (1..=4).contains(&self.quarter)
    }

    fn sort_key(&self) -> (i32, i32) {
        let position = if self.quarter == 0 { 5 } else { self.quarter };
        (self.year, position)
    }
}

impl Ord for FiscalPeriod {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for FiscalPeriod {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for FiscalPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.quarter == 0 {
            write!(f, "FY{}", self.year)
        } else {
            write!(f, "{}Q{}", self.year, self.quarter)
        }
    }
}

/// Graham Number for one stock and quarter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrahamNumber {
    pub stock_id: i64,
    pub period: FiscalPeriod,
    pub graham_value: Option<f64>,
}

/// Price to free cash flow per share, priced at `date`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PFreeCashFlowMultiplier {
    pub stock_id: i64,
    pub date: NaiveDate,
    pub period: FiscalPeriod,
    pub pfree_cash_flow_ratio: Option<f64>,
}

/// How far the fundamentals updater catches up when it is behind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CatchUpPolicy {
    /// Append only the newest upstream report date
    #[default]
    LatestOnly,
    /// Append every upstream report newer than what is stored
    Backfill,
}

impl FromStr for CatchUpPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "latest" | "latest_only" | "latest-only" => Ok(CatchUpPolicy::LatestOnly),
            "backfill" => Ok(CatchUpPolicy::Backfill),
            other => Err(anyhow::anyhow!("unknown catch-up policy: {}", other)),
        }
    }
}

/// Configuration for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub tiingo_api_token: String,
    pub tiingo_base_url: String,
    pub database_path: String,
    pub rate_limit_per_minute: u32,
    pub price_history_start: NaiveDate,
    pub fundamentals_start_date: NaiveDate,
    pub catch_up_policy: CatchUpPolicy,
}

impl Config {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.tiingo.com/tiingo";

    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        Ok(Config {
            tiingo_api_token: std::env::var("TIINGO_API_TOKEN")
                .map_err(|_| anyhow::anyhow!("TIINGO_API_TOKEN environment variable required"))?,
            tiingo_base_url: std::env::var("TIINGO_BASE_URL")
                .unwrap_or_else(|_| Self::DEFAULT_BASE_URL.to_string()),
            database_path: Self::database_path_from_env(),
            rate_limit_per_minute: std::env::var("RATE_LIMIT_PER_MINUTE")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .unwrap_or(120),
            price_history_start: date_var("PRICE_HISTORY_START", "2012-01-01")?,
            fundamentals_start_date: date_var("FUNDAMENTALS_START_DATE", "2022-01-01")?,
            catch_up_policy: std::env::var("FUNDAMENTALS_CATCH_UP")
                .map(|v| v.parse())
                .unwrap_or(Ok(CatchUpPolicy::default()))?,
        })
    }

    /// Database location alone, for commands that never call the provider
    pub fn database_path_from_env() -> String {
        dotenvy::dotenv().ok();
        std::env::var("DATABASE_PATH").unwrap_or_else(|_| "stocks.db".to_string())
    }
}

fn date_var(name: &str, default: &str) -> anyhow::Result<NaiveDate> {
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    NaiveDate::parse_from_str(&raw, DATE_FORMAT)
        .map_err(|e| anyhow::anyhow!("{} must be YYYY-MM-DD, got {:?}: {}", name, raw, e))
}
