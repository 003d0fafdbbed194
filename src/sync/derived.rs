use chrono::NaiveDate;
use tracing::{debug, info, warn};

use super::freshness::FreshnessReconciler;
use super::{SkipReason, TableOutcome};
use crate::database::{DatabaseManager, Table};
use crate::error::Result;
use crate::models::statements::codes;
use crate::models::{FiscalPeriod, GrahamNumber, PFreeCashFlowMultiplier, StatementKind, Stock};
use crate::valuation::{GrahamInputs, PfcfInputs};

const BALANCE_SHEET: Table = Table::Statement(StatementKind::BalanceSheet);
const CASH_FLOW: Table = Table::Statement(StatementKind::CashFlow);
const INCOME_STATEMENT: Table = Table::Statement(StatementKind::IncomeStatement);
const OVERVIEW: Table = Table::Statement(StatementKind::Overview);

/// The period every contributing table agrees on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alignment {
    pub period: FiscalPeriod,
    /// Latest stored price date, for price-based metrics
    pub price_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlignmentState {
    /// Contributing tables disagree on their latest period
    Behind(String),
    /// A contributing table has nothing stored for the stock
    MissingInputs(String),
    /// Inputs agree and the derived table does not cover them yet
    AlignedStale(Alignment),
    /// The derived table already covers the aligned period
    AlignedCurrent(Alignment),
}

fn missing(named: &[(&str, bool)]) -> Option<String> {
    let absent: Vec<&str> = named
        .iter()
        .filter(|(_, present)| !present)
        .map(|(name, _)| *name)
        .collect();
    (!absent.is_empty()).then(|| absent.join(", "))
}

/// Gate Graham on the balance sheet, overview and income statement sharing
/// one latest quarter.
pub fn classify_graham(
    balance_sheet: Option<FiscalPeriod>,
    overview: Option<FiscalPeriod>,
    income_statement: Option<FiscalPeriod>,
    stored_graham: Option<FiscalPeriod>,
) -> AlignmentState {
    let (Some(balance), Some(overview_period), Some(income)) = (balance_sheet, overview, income_statement) else {
        let absent = missing(&[
            ("balance sheet", balance_sheet.is_some()),
            ("overview", overview.is_some()),
            ("income statement", income_statement.is_some()),
        ]);
        return AlignmentState::MissingInputs(absent.unwrap_or_default());
    };

    if balance != overview_period || balance != income {
        return AlignmentState::Behind(format!(
            "balance sheet {}, overview {}, income statement {}",
            balance, overview_period, income
        ));
    }
    if !balance.is_quarterly() {
        return AlignmentState::Behind(format!("latest shared period {} is not a quarter", balance));
    }

    let alignment = Alignment {
        period: balance,
        price_date: None,
    };
    match stored_graham {
        Some(stored) if stored >= balance => AlignmentState::AlignedCurrent(alignment),
        _ => AlignmentState::AlignedStale(alignment),
    }
}

/// Gate P/FCF on the balance sheet, cash flow and the calendar quarter of the
/// latest price sharing one period.
pub fn classify_pfcf(
    balance_sheet: Option<FiscalPeriod>,
    cash_flow: Option<FiscalPeriod>,
    latest_price: Option<NaiveDate>,
    stored_pfcf: Option<NaiveDate>,
) -> AlignmentState {
    let (Some(balance), Some(cash), Some(price_date)) = (balance_sheet, cash_flow, latest_price) else {
        let absent = missing(&[
            ("balance sheet", balance_sheet.is_some()),
            ("cash flow", cash_flow.is_some()),
            ("daily prices", latest_price.is_some()),
        ]);
        return AlignmentState::MissingInputs(absent.unwrap_or_default());
    };

    let price_period = FiscalPeriod::from_date(price_date);
    if balance != cash || balance != price_period {
        return AlignmentState::Behind(format!(
            "balance sheet {}, cash flow {}, prices {}",
            balance, cash, price_period
        ));
    }

    let alignment = Alignment {
        period: balance,
        price_date: Some(price_date),
    };
    match stored_pfcf {
        Some(stored) if stored >= price_date => AlignmentState::AlignedCurrent(alignment),
        _ => AlignmentState::AlignedStale(alignment),
    }
}

/// Appends Graham and P/FCF rows once their inputs are jointly fresh
pub struct DerivedMetricsUpdater<'a> {
    db: &'a DatabaseManager,
}

impl<'a> DerivedMetricsUpdater<'a> {
    pub fn new(db: &'a DatabaseManager) -> Self {
        Self { db }
    }

    pub async fn graham_state(&self, stock_id: i64) -> Result<AlignmentState> {
        let coverage = FreshnessReconciler::new(self.db);
        let balance = coverage.latest_stored_period(stock_id, BALANCE_SHEET).await?;
        let overview = coverage.latest_stored_period(stock_id, OVERVIEW).await?;
        let income = coverage.latest_stored_period(stock_id, INCOME_STATEMENT).await?;
        let stored = coverage.latest_stored_period(stock_id, Table::GrahamNumbers).await?;
        Ok(classify_graham(balance, overview, income, stored))
    }

    pub async fn pfcf_state(&self, stock_id: i64) -> Result<AlignmentState> {
        let coverage = FreshnessReconciler::new(self.db);
        let balance = coverage.latest_stored_period(stock_id, BALANCE_SHEET).await?;
        let cash_flow = coverage.latest_stored_period(stock_id, CASH_FLOW).await?;
        let price = coverage.latest_stored_date(stock_id, Table::DailyPrices).await?;
        let stored = coverage.latest_stored_date(stock_id, Table::PfcfMultipliers).await?;
        Ok(classify_pfcf(balance, cash_flow, price, stored))
    }

    pub async fn update_graham(&self, stock: &Stock) -> Result<TableOutcome> {
        let alignment = match self.graham_state(stock.id).await? {
            AlignmentState::AlignedStale(alignment) => alignment,
            state => return Ok(self.unaligned("graham number", stock, state)),
        };
        let period = alignment.period;

        let inputs = GrahamInputs {
            book_value: self
                .db
                .statements(StatementKind::Overview)
                .value_at(stock.id, period, codes::BOOK_VALUE)
                .await?,
            shares_basic: self
                .db
                .statements(StatementKind::BalanceSheet)
                .value_at(stock.id, period, codes::SHARES_BASIC)
                .await?,
            diluted_eps: self
                .db
                .statements(StatementKind::IncomeStatement)
                .value_at(stock.id, period, codes::EPS_DILUTED)
                .await?,
        };

        let graham_value = match inputs.evaluate() {
            Ok(value) => value,
            Err(reason) => {
                info!("{}: graham number for {} unavailable: {}", stock.symbol, period, reason);
                return Ok(TableOutcome::Skipped(SkipReason::MetricUnavailable(reason)));
            }
        };

        let row = GrahamNumber {
            stock_id: stock.id,
            period,
            graham_value: Some(graham_value),
        };
        let inserted = self.db.append_graham_numbers(&[row]).await?;
        info!("{}: graham number {:.2} for {}", stock.symbol, graham_value, period);
        Ok(TableOutcome::Appended(inserted))
    }

    pub async fn update_pfcf(&self, stock: &Stock) -> Result<TableOutcome> {
        let alignment = match self.pfcf_state(stock.id).await? {
            AlignmentState::AlignedStale(alignment) => alignment,
            state => return Ok(self.unaligned("p/fcf", stock, state)),
        };
        let Some(price_date) = alignment.price_date else {
            return Ok(TableOutcome::Skipped(SkipReason::MissingInputs("daily prices".to_string())));
        };
        let period = alignment.period;

        let inputs = PfcfInputs {
            close: self.db.close_price_on(stock.id, price_date).await?,
            free_cash_flow: self
                .db
                .statements(StatementKind::CashFlow)
                .value_at(stock.id, period, codes::FREE_CASH_FLOW)
                .await?,
            shares_basic: self
                .db
                .statements(StatementKind::BalanceSheet)
                .value_at(stock.id, period, codes::SHARES_BASIC)
                .await?,
        };

        let ratio = match inputs.evaluate() {
            Ok(ratio) => ratio,
            Err(reason) => {
                info!("{}: p/fcf on {} unavailable: {}", stock.symbol, price_date, reason);
                return Ok(TableOutcome::Skipped(SkipReason::MetricUnavailable(reason)));
            }
        };

        let row = PFreeCashFlowMultiplier {
            stock_id: stock.id,
            date: price_date,
            period,
            pfree_cash_flow_ratio: Some(ratio),
        };
        let inserted = self.db.append_pfcf_multipliers(&[row]).await?;
        info!("{}: p/fcf {:.2} on {}", stock.symbol, ratio, price_date);
        Ok(TableOutcome::Appended(inserted))
    }

    fn unaligned(&self, metric: &str, stock: &Stock, state: AlignmentState) -> TableOutcome {
        match state {
            AlignmentState::Behind(detail) => {
                warn!("{}: cannot update {}, {}", stock.symbol, metric, detail);
                TableOutcome::Skipped(SkipReason::PeriodMismatch(detail))
            }
            AlignmentState::MissingInputs(detail) => {
                warn!("{}: cannot update {}, nothing stored in {}", stock.symbol, metric, detail);
                TableOutcome::Skipped(SkipReason::MissingInputs(detail))
            }
            AlignmentState::AlignedCurrent(alignment) => {
                debug!("{}: {} already covers {}", stock.symbol, metric, alignment.period);
                TableOutcome::UpToDate
            }
            AlignmentState::AlignedStale(_) => TableOutcome::UpToDate,
        }
    }
}
