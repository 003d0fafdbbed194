use tracing::{debug, error, info, warn};

use super::runner::{RebuildTarget, StockFailure, SyncReport};
use super::TableOutcome;
use crate::database::{DatabaseManager, Table};
use crate::error::Result;
use crate::models::statements::codes;
use crate::models::{FiscalPeriod, PFreeCashFlowMultiplier, StatementKind, Stock};
use crate::valuation::{pfcf_ratio, CombinedQuarterlyData, PfcfInputs};

/// Recomputes derived tables over every stored period, keeping existing rows
pub struct DerivedHistoryRebuilder<'a> {
    db: &'a DatabaseManager,
}

impl<'a> DerivedHistoryRebuilder<'a> {
    pub fn new(db: &'a DatabaseManager) -> Self {
        Self { db }
    }

    /// Rebuild `target` for the whole universe. A stock whose rebuild fails
    /// is recorded and the run moves on to the next one.
    pub async fn run(&self, target: RebuildTarget) -> Result<SyncReport> {
        let stocks = self.db.get_all_stocks().await?;
        let (mut report, table) = match target {
            RebuildTarget::Graham => (SyncReport::new("rebuild graham"), Table::GrahamNumbers),
            RebuildTarget::Pfcf => (SyncReport::new("rebuild pfcf"), Table::PfcfMultipliers),
        };
        info!("🔄 Starting {} ({}) for {} stocks", report.operation, report.run_id, stocks.len());

        let mut combined = CombinedQuarterlyData::new();
        for stock in &stocks {
            let result = match target {
                RebuildTarget::Graham => self.rebuild_graham(&mut combined, stock).await,
                RebuildTarget::Pfcf => self.rebuild_pfcf(stock).await,
            };

            match result {
                Ok(inserted) => report.record(table, &TableOutcome::Appended(inserted)),
                Err(e) => {
                    error!("❌ {}: {} failed: {}", stock.symbol, report.operation, e);
                    report.failures.push(StockFailure {
                        symbol: stock.symbol.clone(),
                        step: report.operation.clone(),
                        message: e.to_string(),
                    });
                }
            }
            report.stocks_processed += 1;
        }

        if target == RebuildTarget::Graham && combined.is_empty() {
            warn!("No statement quarters stored; graham rebuild had nothing to do");
        }

        Ok(report.finish())
    }

    /// Merge one stock's three Graham inputs into `combined`
    pub async fn load_combined(&self, combined: &mut CombinedQuarterlyData, stock: &Stock) -> Result<()> {
        let shares = self
            .db
            .statements(StatementKind::BalanceSheet)
            .period_values(stock.id, codes::SHARES_BASIC)
            .await?;
        let book = self
            .db
            .statements(StatementKind::Overview)
            .period_values(stock.id, codes::BOOK_VALUE)
            .await?;
        let eps = self
            .db
            .statements(StatementKind::IncomeStatement)
            .period_values(stock.id, codes::EPS_DILUTED)
            .await?;
        combined.fill(stock.id, &shares, &book, &eps);
        Ok(())
    }

    /// Graham row for every populated quarter of `stock`; values may be null
    pub async fn rebuild_graham(&self, combined: &mut CombinedQuarterlyData, stock: &Stock) -> Result<u64> {
        self.load_combined(combined, stock).await?;

        let rows = combined.graham_rows(stock.id);
        if rows.is_empty() {
            debug!("{}: no statement quarters to rebuild", stock.symbol);
            return Ok(0);
        }
        let inserted = self.db.append_graham_numbers(&rows).await?;
        info!("{}: rebuilt {} graham row(s), {} new", stock.symbol, rows.len(), inserted);
        Ok(inserted)
    }

    /// P/FCF row for every stored price date whose calendar quarter exists
    /// in both the balance sheet and cash flow tables; ratios may be null
    pub async fn rebuild_pfcf(&self, stock: &Stock) -> Result<u64> {
        let balance = self.db.statements(StatementKind::BalanceSheet);
        let cash_flow = self.db.statements(StatementKind::CashFlow);

        let mut rows = Vec::new();
        let mut skipped = 0;
        let mut current: Option<(FiscalPeriod, Option<(Option<f64>, Option<f64>)>)> = None;

        for price in self.db.daily_prices(stock.id).await? {
            let period = FiscalPeriod::from_date(price.date);

            // Prices come ordered by date, so each quarter is looked up once
            let fundamentals = match current {
                Some((cached, fundamentals)) if cached == period => fundamentals,
                _ => {
                    let fundamentals = if balance.has_period(stock.id, period).await?
                        && cash_flow.has_period(stock.id, period).await?
                    {
                        Some((
                            cash_flow.value_at(stock.id, period, codes::FREE_CASH_FLOW).await?,
                            balance.value_at(stock.id, period, codes::SHARES_BASIC).await?,
                        ))
                    } else {
                        None
                    };
                    current = Some((period, fundamentals));
                    fundamentals
                }
            };

            let Some((free_cash_flow, shares_basic)) = fundamentals else {
                skipped += 1;
                continue;
            };

            rows.push(PFreeCashFlowMultiplier {
                stock_id: stock.id,
                date: price.date,
                period,
                pfree_cash_flow_ratio: pfcf_ratio(&PfcfInputs {
                    close: price.close_price,
                    free_cash_flow,
                    shares_basic,
                }),
            });
        }

        let inserted = self.db.append_pfcf_multipliers(&rows).await?;
        info!(
            "{}: rebuilt {} p/fcf row(s), {} new, {} price date(s) without a matching quarter",
            stock.symbol,
            rows.len(),
            inserted,
            skipped
        );
        Ok(inserted)
    }
}
