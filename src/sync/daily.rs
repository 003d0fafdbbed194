use chrono::NaiveDate;
use tracing::{debug, info, warn};

use super::freshness::{latest_upstream_date, FreshnessDecision, FreshnessReconciler, UpstreamSource};
use super::{SkipReason, TableOutcome};
use crate::api::SourceGateway;
use crate::database::{DatabaseManager, Table};
use crate::error::Result;
use crate::models::{DailyMultipliers, DailyPrice, MultiplierPoint, Stock};
use crate::utils::day_after;

/// Keeps end-of-day prices and daily multipliers current
pub struct DailySeriesUpdater<'a> {
    db: &'a DatabaseManager,
    gateway: &'a dyn SourceGateway,
    history_start: NaiveDate,
}

impl<'a> DailySeriesUpdater<'a> {
    pub fn new(db: &'a DatabaseManager, gateway: &'a dyn SourceGateway, history_start: NaiveDate) -> Self {
        Self {
            db,
            gateway,
            history_start,
        }
    }

    async fn decide(&self, stock: &Stock, table: Table) -> Result<FreshnessDecision<NaiveDate>> {
        let upstream = latest_upstream_date(self.gateway, &stock.symbol, UpstreamSource::Daily).await?;
        FreshnessReconciler::new(self.db)
            .check_table(stock.id, table, upstream)
            .await
    }

    /// Fetch prices from the day after the stored latest date (or the
    /// configured history start) and append every returned point
    pub async fn update_prices(&self, stock: &Stock) -> Result<TableOutcome> {
        let since = match self.decide(stock, Table::DailyPrices).await? {
            FreshnessDecision::UpstreamUnavailable => {
                warn!("{}: no daily price data upstream", stock.symbol);
                return Ok(TableOutcome::Skipped(SkipReason::UpstreamUnavailable));
            }
            FreshnessDecision::UpToDate => {
                debug!("{}: prices already current", stock.symbol);
                return Ok(TableOutcome::UpToDate);
            }
            FreshnessDecision::Fetch { since, .. } => since,
        };

        let start = since.map(day_after).unwrap_or(self.history_start);
        let points = self.gateway.daily_prices(&stock.symbol, start).await?;

        let rows: Vec<DailyPrice> = points
            .into_iter()
            .filter(|p| since.map_or(true, |stored| p.date > stored))
            .map(|p| DailyPrice {
                stock_id: stock.id,
                date: p.date,
                close_price: p.close,
            })
            .collect();

        let inserted = self.db.append_daily_prices(&rows).await?;
        info!("{}: appended {} price row(s) from {}", stock.symbol, inserted, start);
        Ok(TableOutcome::Appended(inserted))
    }

    /// Fetch the multiplier series and append the points newer than what is stored
    pub async fn update_multipliers(&self, stock: &Stock) -> Result<TableOutcome> {
        let since = match self.decide(stock, Table::DailyMultipliers).await? {
            FreshnessDecision::UpstreamUnavailable => {
                warn!("{}: no daily multiplier data upstream", stock.symbol);
                return Ok(TableOutcome::Skipped(SkipReason::UpstreamUnavailable));
            }
            FreshnessDecision::UpToDate => {
                debug!("{}: multipliers already current", stock.symbol);
                return Ok(TableOutcome::UpToDate);
            }
            FreshnessDecision::Fetch { since, .. } => since,
        };

        let points = self.gateway.daily_multipliers(&stock.symbol).await?;
        let fetched = points.len();
        let rows = multipliers_after(stock.id, points, since);
        debug!(
            "{}: {} of {} multiplier point(s) are new",
            stock.symbol,
            rows.len(),
            fetched
        );

        let inserted = self.db.append_daily_multipliers(&rows).await?;
        info!("{}: appended {} multiplier row(s)", stock.symbol, inserted);
        Ok(TableOutcome::Appended(inserted))
    }
}

/// Rows for the points dated strictly after `since`, oldest first
pub fn multipliers_after(
    stock_id: i64,
    points: Vec<MultiplierPoint>,
    since: Option<NaiveDate>,
) -> Vec<DailyMultipliers> {
    let mut rows: Vec<DailyMultipliers> = points
        .into_iter()
        .filter(|p| since.map_or(true, |stored| p.date > stored))
        .map(|p| DailyMultipliers {
            stock_id,
            date: p.date,
            market_cap: p.market_cap,
            enterprise_val: p.enterprise_val,
            pe_ratio: p.pe_ratio,
            pb_ratio: p.pb_ratio,
            trailing_peg_1y: p.trailing_peg_1y,
        })
        .collect();
    rows.sort_by_key(|r| r.date);
    rows
}
