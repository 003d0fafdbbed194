//! Quarterly statement variants.
//!
//! The four statement tables share one key shape (stock, report date, fiscal
//! year, fiscal quarter) and differ only in their numeric columns, so they are
//! described by a [`StatementKind`] tag plus a static field list instead of
//! four separate row types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::tiingo::{DataPoint, FundamentalReport};
use super::FiscalPeriod;

/// Maps a provider field code to its storage column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub code: &'static str,
    pub column: &'static str,
}

const fn field(code: &'static str, column: &'static str) -> FieldSpec {
    FieldSpec { code, column }
}

const BALANCE_SHEET_FIELDS: &[FieldSpec] = &[
    field("debtCurrent", "debt_current"),
    field("taxAssets", "tax_assets"),
    field("investmentsCurrent", "investments_current"),
    field("totalAssets", "total_assets"),
    field("acctPay", "acct_pay"),
    field("accoci", "accoci"),
    field("inventory", "inventory"),
    field("totalLiabilities", "total_liabilities"),
    field("acctRec", "acct_rec"),
    field("intangibles", "intangibles"),
    field("ppeq", "ppeq"),
    field("deferredRev", "deferred_rev"),
    field("cashAndEq", "cash_and_eq"),
    field("assetsNonCurrent", "assets_non_current"),
    field("taxLiabilities", "tax_liabilities"),
    field("investments", "investments"),
    field("equity", "equity"),
    field("retainedEarnings", "retained_earnings"),
    field("deposits", "deposits"),
    field("assetsCurrent", "assets_current"),
    field("investmentsNonCurrent", "investments_non_current"),
    field("debt", "debt"),
    field("debtNonCurrent", "debt_non_current"),
    field("liabilitiesNonCurrent", "liabilities_non_current"),
    field("liabilitiesCurrent", "liabilities_current"),
    field("sharesBasic", "shares_basic"),
];

const CASH_FLOW_FIELDS: &[FieldSpec] = &[
    field("ncfi", "ncfi"),
    field("capex", "capex"),
    field("ncfx", "ncfx"),
    field("ncff", "ncff"),
    field("sbcomp", "sbcomp"),
    field("ncf", "ncf"),
    field("payDiv", "pay_div"),
    field("businessAcqDisposals", "business_acq_disposals"),
    field("issrepayDebt", "issrepay_debt"),
    field("issrepayEquity", "issrepay_equity"),
    field("investmentsAcqDisposals", "investments_acq_disposals"),
    field("freeCashFlow", "free_cash_flow"),
    field("ncfo", "ncfo"),
    field("depamor", "depamor"),
];

const INCOME_STATEMENT_FIELDS: &[FieldSpec] = &[
    field("ebit", "ebit"),
    field("epsDil", "eps_dil"),
    field("rnd", "rnd"),
    field("shareswa", "shareswa"),
    field("taxExp", "tax_exp"),
    field("opinc", "opinc"),
    field("costRev", "cost_rev"),
    field("grossProfit", "gross_profit"),
    field("ebitda", "ebitda"),
    field("nonControllingInterests", "non_controlling_interests"),
    field("netIncDiscOps", "net_inc_disc_ops"),
    field("eps", "eps"),
    field("intexp", "intexp"),
    field("shareswaDil", "shareswa_dil"),
    field("revenue", "revenue"),
    field("netinc", "netinc"),
    field("opex", "opex"),
    field("consolidatedIncome", "consolidated_income"),
    field("netIncComStock", "net_inc_com_stock"),
    field("ebt", "ebt"),
    field("prefDVDs", "pref_dvds"),
    field("sga", "sga"),
];

const OVERVIEW_FIELDS: &[FieldSpec] = &[
    field("longTermDebtEquity", "long_term_debt_equity"),
    field("shareFactor", "share_factor"),
    field("bookVal", "book_val"),
    field("roa", "roa"),
    field("currentRatio", "current_ratio"),
    field("roe", "roe"),
    field("grossMargin", "gross_margin"),
    field("piotroskiFScore", "piotroski_f_score"),
    field("epsQoQ", "eps_qoq"),
    field("revenueQoQ", "revenue_qoq"),
    field("profitMargin", "profit_margin"),
    field("rps", "rps"),
    field("bvps", "bvps"),
];

/// Provider field codes read by the valuation calculators
pub mod codes {
    pub const SHARES_BASIC: &str = "sharesBasic";
    pub const FREE_CASH_FLOW: &str = "freeCashFlow";
    pub const EPS_DILUTED: &str = "epsDil";
    pub const BOOK_VALUE: &str = "bookVal";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StatementKind {
    BalanceSheet,
    CashFlow,
    IncomeStatement,
    Overview,
}

impl StatementKind {
    pub const ALL: [StatementKind; 4] = [
        StatementKind::BalanceSheet,
        StatementKind::CashFlow,
        StatementKind::IncomeStatement,
        StatementKind::Overview,
    ];

    pub fn table_name(self) -> &'static str {
        match self {
            StatementKind::BalanceSheet => "quarterly_balance_sheets",
            StatementKind::CashFlow => "quarterly_cash_flows",
            StatementKind::IncomeStatement => "quarterly_income_statements",
            StatementKind::Overview => "quarterly_overviews",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StatementKind::BalanceSheet => "balance sheet",
            StatementKind::CashFlow => "cash flow",
            StatementKind::IncomeStatement => "income statement",
            StatementKind::Overview => "overview",
        }
    }

    pub fn fields(self) -> &'static [FieldSpec] {
        match self {
            StatementKind::BalanceSheet => BALANCE_SHEET_FIELDS,
            StatementKind::CashFlow => CASH_FLOW_FIELDS,
            StatementKind::IncomeStatement => INCOME_STATEMENT_FIELDS,
            StatementKind::Overview => OVERVIEW_FIELDS,
        }
    }

    pub fn field(self, code: &str) -> Option<&'static FieldSpec> {
        self.fields().iter().find(|f| f.code == code)
    }

    /// Resolve this kind's field values from a sparse provider section.
    ///
    /// Codes the report does not carry resolve to `None`; an absent section
    /// yields a row of `None`s.
    pub fn extract(self, section: Option<&[DataPoint]>) -> Vec<Option<f64>> {
        let reported: HashMap<&str, Option<f64>> = section
            .unwrap_or_default()
            .iter()
            .map(|point| (point.data_code.as_str(), point.value))
            .collect();

        let values: Vec<Option<f64>> = self
            .fields()
            .iter()
            .map(|f| reported.get(f.code).copied().flatten())
            .collect();

        let missing = values.iter().filter(|v| v.is_none()).count();
        if missing > 0 {
            debug!(
                kind = self.label(),
                missing,
                total = values.len(),
                "statement fields resolved to null"
            );
        }
        values
    }
}

/// One stored row of a quarterly statement table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarterlyStatement {
    pub kind: StatementKind,
    pub stock_id: i64,
    pub date: NaiveDate,
    pub period: FiscalPeriod,
    /// Values aligned with `kind.fields()`
    pub values: Vec<Option<f64>>,
}

impl QuarterlyStatement {
    pub fn from_report(kind: StatementKind, stock_id: i64, report: &FundamentalReport) -> Self {
        Self {
            kind,
            stock_id,
            date: report.date,
            period: FiscalPeriod::new(report.year, report.quarter),
            values: kind.extract(report.statement_data.section(kind)),
        }
    }

    pub fn value(&self, code: &str) -> Option<f64> {
        let index = self.kind.fields().iter().position(|f| f.code == code)?;
        self.values.get(index).copied().flatten()
    }
}
