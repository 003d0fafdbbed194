//! Incremental synchronization: freshness checks, per-table updaters and the
//! batch runner that drives them across the stock universe.

use std::fmt;

use crate::valuation::MetricUnavailable;

pub mod daily;
pub mod derived;
pub mod freshness;
pub mod fundamentals;
pub mod rebuild;
pub mod runner;

pub use daily::DailySeriesUpdater;
pub use derived::{AlignmentState, DerivedMetricsUpdater};
pub use freshness::{latest_upstream_date, FreshnessDecision, FreshnessReconciler, UpstreamSource};
pub use fundamentals::QuarterlyFundamentalsUpdater;
pub use rebuild::DerivedHistoryRebuilder;
pub use runner::{RebuildTarget, StockFailure, SyncReport, UpdateMode, UpdateRunner};

/// Result of updating one table for one stock
#[derive(Debug, Clone, PartialEq)]
pub enum TableOutcome {
    Appended(u64),
    UpToDate,
    Skipped(SkipReason),
}

impl TableOutcome {
    pub fn rows_appended(&self) -> u64 {
        match self {
            TableOutcome::Appended(rows) => *rows,
            _ => 0,
        }
    }
}

/// Non-fatal reasons a table was left untouched
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Provider has no data for the ticker
    UpstreamUnavailable,
    /// Upstream is ahead but no fetched report carried the advertised date
    NoMatchingReport,
    /// Contributing tables disagree on their latest period
    PeriodMismatch(String),
    /// A contributing table has no rows for the stock
    MissingInputs(String),
    MetricUnavailable(MetricUnavailable),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UpstreamUnavailable => write!(f, "no upstream data"),
            SkipReason::NoMatchingReport => write!(f, "no report matches the latest upstream date"),
            SkipReason::PeriodMismatch(detail) => write!(f, "periods disagree: {}", detail),
            SkipReason::MissingInputs(detail) => write!(f, "missing inputs: {}", detail),
            SkipReason::MetricUnavailable(reason) => write!(f, "metric unavailable: {}", reason),
        }
    }
}
