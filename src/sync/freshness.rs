use chrono::NaiveDate;
use tracing::debug;

use crate::api::SourceGateway;
use crate::database::{DatabaseManager, Table};
use crate::error::Result;
use crate::models::FiscalPeriod;

/// Which provider probe answers "how recent is upstream"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamSource {
    Daily,
    QuarterlyStatements,
}

/// Outcome of comparing stored coverage against upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessDecision<P> {
    /// Upstream is strictly ahead; `since` is what we already hold
    Fetch { since: Option<P>, upstream: P },
    UpToDate,
    UpstreamUnavailable,
}

impl<P> FreshnessDecision<P> {
    pub fn needs_fetch(&self) -> bool {
        matches!(self, FreshnessDecision::Fetch { .. })
    }
}

/// True iff upstream has data strictly newer than what is stored
pub fn needs_update<P: Ord>(stored: Option<&P>, upstream: Option<&P>) -> bool {
    match (upstream, stored) {
        (Some(upstream), Some(stored)) => upstream > stored,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

pub fn reconcile<P: Ord + Copy>(stored: Option<P>, upstream: Option<P>) -> FreshnessDecision<P> {
    match upstream {
        None => FreshnessDecision::UpstreamUnavailable,
        Some(latest) if needs_update(stored.as_ref(), Some(&latest)) => FreshnessDecision::Fetch {
            since: stored,
            upstream: latest,
        },
        Some(_) => FreshnessDecision::UpToDate,
    }
}

/// Ask the gateway how recent its data for `ticker` is
pub async fn latest_upstream_date(
    gateway: &dyn SourceGateway,
    ticker: &str,
    source: UpstreamSource,
) -> Result<Option<NaiveDate>> {
    let latest = match source {
        UpstreamSource::Daily => gateway.latest_daily_update(ticker).await?,
        UpstreamSource::QuarterlyStatements => gateway.latest_quarterly_update_date(ticker).await?,
    };
    debug!(ticker, ?source, ?latest, "upstream probe");
    Ok(latest)
}

/// Answers what the store already covers for one stock at a time
pub struct FreshnessReconciler<'a> {
    db: &'a DatabaseManager,
}

impl<'a> FreshnessReconciler<'a> {
    pub fn new(db: &'a DatabaseManager) -> Self {
        Self { db }
    }

    pub async fn latest_stored_date(&self, stock_id: i64, table: Table) -> Result<Option<NaiveDate>> {
        self.db.latest_date(stock_id, table).await
    }

    /// Latest fiscal quarter in a period-keyed table; annual rows never count
    pub async fn latest_stored_period(&self, stock_id: i64, table: Table) -> Result<Option<FiscalPeriod>> {
        self.db.latest_period(stock_id, table).await
    }

    /// Compare a table's stored coverage with an upstream date probed earlier
    pub async fn check_table(
        &self,
        stock_id: i64,
        table: Table,
        upstream: Option<NaiveDate>,
    ) -> Result<FreshnessDecision<NaiveDate>> {
        let stored = self.latest_stored_date(stock_id, table).await?;
        let decision = reconcile(stored, upstream);
        debug!(stock_id, table = table.name(), ?stored, ?upstream, ?decision, "freshness");
        Ok(decision)
    }
}
