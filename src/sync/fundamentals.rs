use chrono::NaiveDate;
use tracing::{debug, info, warn};

use super::freshness::{latest_upstream_date, FreshnessDecision, FreshnessReconciler, UpstreamSource};
use super::{SkipReason, TableOutcome};
use crate::api::SourceGateway;
use crate::database::{DatabaseManager, Table};
use crate::error::Result;
use crate::models::{CatchUpPolicy, FiscalPeriod, FundamentalReport, QuarterlyStatement, StatementKind, Stock};

/// Appends new quarterly statement reports for all four statement kinds
pub struct QuarterlyFundamentalsUpdater<'a> {
    db: &'a DatabaseManager,
    gateway: &'a dyn SourceGateway,
    policy: CatchUpPolicy,
}

impl<'a> QuarterlyFundamentalsUpdater<'a> {
    pub fn new(db: &'a DatabaseManager, gateway: &'a dyn SourceGateway, policy: CatchUpPolicy) -> Self {
        Self { db, gateway, policy }
    }

    /// Bring every statement table up to date for one stock.
    ///
    /// Upstream is probed once and the statement bundle fetched at most once;
    /// each kind then decides on its own stored coverage.
    pub async fn update_stock(&self, stock: &Stock) -> Result<Vec<(StatementKind, TableOutcome)>> {
        let reconciler = FreshnessReconciler::new(self.db);
        let upstream =
            latest_upstream_date(self.gateway, &stock.symbol, UpstreamSource::QuarterlyStatements).await?;

        let mut bundle: Option<Vec<FundamentalReport>> = None;
        let mut outcomes = Vec::with_capacity(StatementKind::ALL.len());

        for kind in StatementKind::ALL {
            let decision = reconciler
                .check_table(stock.id, Table::Statement(kind), upstream)
                .await?;

            let outcome = match decision {
                FreshnessDecision::UpstreamUnavailable => {
                    warn!("{}: no quarterly {} data upstream", stock.symbol, kind.label());
                    TableOutcome::Skipped(SkipReason::UpstreamUnavailable)
                }
                FreshnessDecision::UpToDate => {
                    debug!("{}: {} already current", stock.symbol, kind.label());
                    TableOutcome::UpToDate
                }
                FreshnessDecision::Fetch { since, upstream } => {
                    if bundle.is_none() {
                        bundle = Some(self.gateway.quarterly_fundamentals(&stock.symbol).await?);
                    }
                    let reports = select_reports(
                        bundle.as_deref().unwrap_or_default(),
                        since,
                        upstream,
                        self.policy,
                    );
                    self.append_reports(stock, kind, &reports).await?
                }
            };
            outcomes.push((kind, outcome));
        }

        Ok(outcomes)
    }

    async fn append_reports(
        &self,
        stock: &Stock,
        kind: StatementKind,
        reports: &[&FundamentalReport],
    ) -> Result<TableOutcome> {
        if reports.is_empty() {
            warn!("{}: no {} report matches the latest upstream date", stock.symbol, kind.label());
            return Ok(TableOutcome::Skipped(SkipReason::NoMatchingReport));
        }

        let rows: Vec<QuarterlyStatement> = reports
            .iter()
            .map(|report| QuarterlyStatement::from_report(kind, stock.id, report))
            .collect();

        let inserted = self.db.statements(kind).append(&rows).await?;
        info!(
            "{}: appended {} quarterly {} row(s) through {}",
            stock.symbol,
            inserted,
            kind.label(),
            rows.last().map(|r| r.period.to_string()).unwrap_or_default()
        );
        Ok(TableOutcome::Appended(inserted))
    }
}

/// Reports to append for one kind, oldest first.
///
/// `LatestOnly` keeps the reports dated exactly at the upstream latest date;
/// `Backfill` keeps everything newer than `since` up to that date. An annual
/// report sharing a date with the fourth quarter is appended after it.
pub fn select_reports<'r>(
    reports: &'r [FundamentalReport],
    since: Option<NaiveDate>,
    upstream: NaiveDate,
    policy: CatchUpPolicy,
) -> Vec<&'r FundamentalReport> {
    let mut selected: Vec<&FundamentalReport> = reports
        .iter()
        .filter(|report| match policy {
            CatchUpPolicy::LatestOnly => report.date == upstream,
            CatchUpPolicy::Backfill => {
                report.date <= upstream && since.map_or(true, |stored| report.date > stored)
            }
        })
        .collect();

    selected.sort_by_key(|report| (report.date, FiscalPeriod::new(report.year, report.quarter)));
    selected
}
