use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use super::daily::DailySeriesUpdater;
use super::derived::DerivedMetricsUpdater;
use super::fundamentals::QuarterlyFundamentalsUpdater;
use super::TableOutcome;
use crate::api::SourceGateway;
use crate::database::{DatabaseManager, Table};
use crate::error::Result;
use crate::models::{CatchUpPolicy, Config, Stock};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum UpdateMode {
    /// End-of-day close prices
    Prices,
    /// Daily market cap, EV, P/E, P/B and PEG
    Multipliers,
    /// Quarterly balance sheet, cash flow, income statement and overview
    Fundamentals,
    /// Graham Number for the latest aligned quarter (requires Fundamentals)
    Graham,
    /// Price to free cash flow for the latest price date (requires Prices + Fundamentals)
    Pfcf,
    /// Every step above, in dependency order
    All,
}

impl UpdateMode {
    const ORDERED: [UpdateMode; 5] = [
        UpdateMode::Prices,
        UpdateMode::Multipliers,
        UpdateMode::Fundamentals,
        UpdateMode::Graham,
        UpdateMode::Pfcf,
    ];

    pub fn steps(self) -> Vec<UpdateMode> {
        match self {
            UpdateMode::All => Self::ORDERED.to_vec(),
            step => vec![step],
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            UpdateMode::Prices => "prices",
            UpdateMode::Multipliers => "multipliers",
            UpdateMode::Fundamentals => "fundamentals",
            UpdateMode::Graham => "graham",
            UpdateMode::Pfcf => "pfcf",
            UpdateMode::All => "all",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum RebuildTarget {
    /// Every stored quarter with any Graham input
    Graham,
    /// Every stored price date with matching fundamentals
    Pfcf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockFailure {
    pub symbol: String,
    pub step: String,
    pub message: String,
}

/// Summary of one batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub operation: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub stocks_processed: usize,
    pub rows_appended: BTreeMap<String, u64>,
    pub up_to_date: u64,
    pub skipped: u64,
    pub failures: Vec<StockFailure>,
}

impl SyncReport {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            operation: operation.into(),
            start_time: Utc::now(),
            end_time: None,
            stocks_processed: 0,
            rows_appended: BTreeMap::new(),
            up_to_date: 0,
            skipped: 0,
            failures: Vec::new(),
        }
    }

    pub fn record(&mut self, table: Table, outcome: &TableOutcome) {
        match outcome {
            TableOutcome::Appended(rows) => {
                *self.rows_appended.entry(table.name().to_string()).or_insert(0) += rows;
            }
            TableOutcome::UpToDate => self.up_to_date += 1,
            TableOutcome::Skipped(_) => self.skipped += 1,
        }
    }

    pub fn rows_for(&self, table: Table) -> u64 {
        self.rows_appended.get(table.name()).copied().unwrap_or(0)
    }

    pub fn total_rows(&self) -> u64 {
        self.rows_appended.values().sum()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        self.end_time.map(|end| (end - self.start_time).num_seconds())
    }

    pub(crate) fn finish(mut self) -> Self {
        self.end_time = Some(Utc::now());
        self
    }
}

/// Drives the updaters over the stock universe, one ticker at a time
pub struct UpdateRunner {
    db: DatabaseManager,
    gateway: Arc<dyn SourceGateway>,
    catch_up_policy: CatchUpPolicy,
    price_history_start: NaiveDate,
}

impl UpdateRunner {
    pub fn new(db: DatabaseManager, gateway: Arc<dyn SourceGateway>, config: &Config) -> Self {
        Self {
            db,
            gateway,
            catch_up_policy: config.catch_up_policy,
            price_history_start: config.price_history_start,
        }
    }

    pub fn database(&self) -> &DatabaseManager {
        &self.db
    }

    /// Run `mode` for every stock. A failing stock is recorded and the batch
    /// moves on to the next one.
    pub async fn run(&self, mode: UpdateMode) -> Result<SyncReport> {
        let stocks = self.db.get_all_stocks().await?;
        let mut report = SyncReport::new(format!("update {}", mode.label()));

        info!("🚀 Starting {} ({}) for {} stocks", report.operation, report.run_id, stocks.len());

        for (index, stock) in stocks.iter().enumerate() {
            info!("[{}/{}] {}", index + 1, stocks.len(), stock.symbol);
            self.run_stock(stock, mode, &mut report).await;
            report.stocks_processed += 1;
        }

        let report = report.finish();
        info!(
            "✅ {} finished: {} rows appended, {} failure(s)",
            report.operation,
            report.total_rows(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Run every step of `mode` for one stock, stopping at its first failure
    pub async fn run_stock(&self, stock: &Stock, mode: UpdateMode, report: &mut SyncReport) {
        for step in mode.steps() {
            if let Err(e) = self.run_step(stock, step, report).await {
                error!("❌ {}: {} failed: {}", stock.symbol, step.label(), e);
                report.failures.push(StockFailure {
                    symbol: stock.symbol.clone(),
                    step: step.label().to_string(),
                    message: e.to_string(),
                });
                return;
            }
        }
    }

    /// Run a single step; `step` is never `All`
    async fn run_step(&self, stock: &Stock, step: UpdateMode, report: &mut SyncReport) -> Result<()> {
        let gateway = self.gateway.as_ref();

        match step {
            UpdateMode::Prices => {
                let updater = DailySeriesUpdater::new(&self.db, gateway, self.price_history_start);
                let outcome = updater.update_prices(stock).await?;
                report.record(Table::DailyPrices, &outcome);
            }
            UpdateMode::Multipliers => {
                let updater = DailySeriesUpdater::new(&self.db, gateway, self.price_history_start);
                let outcome = updater.update_multipliers(stock).await?;
                report.record(Table::DailyMultipliers, &outcome);
            }
            UpdateMode::Fundamentals => {
                let updater = QuarterlyFundamentalsUpdater::new(&self.db, gateway, self.catch_up_policy);
                for (kind, outcome) in updater.update_stock(stock).await? {
                    report.record(Table::Statement(kind), &outcome);
                }
            }
            UpdateMode::Graham => {
                let outcome = DerivedMetricsUpdater::new(&self.db).update_graham(stock).await?;
                report.record(Table::GrahamNumbers, &outcome);
            }
            UpdateMode::Pfcf => {
                let outcome = DerivedMetricsUpdater::new(&self.db).update_pfcf(stock).await?;
                report.record(Table::PfcfMultipliers, &outcome);
            }
            UpdateMode::All => unreachable!("run_stock expands All into its steps"),
        }
        Ok(())
    }
}
