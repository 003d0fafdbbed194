use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::statements::StatementKind;
use crate::utils::deserialize_date_prefix;

/// End-of-day price bar from `daily/{ticker}/prices`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    #[serde(deserialize_with = "deserialize_date_prefix")]
    pub date: NaiveDate,
    #[serde(default)]
    pub close: Option<f64>,
    #[serde(default)]
    pub open: Option<f64>,
    #[serde(default)]
    pub high: Option<f64>,
    #[serde(default)]
    pub low: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub adj_close: Option<f64>,
}

/// Daily valuation snapshot from `fundamentals/{ticker}/daily`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiplierPoint {
    #[serde(deserialize_with = "deserialize_date_prefix")]
    pub date: NaiveDate,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub enterprise_val: Option<f64>,
    #[serde(default)]
    pub pe_ratio: Option<f64>,
    #[serde(default)]
    pub pb_ratio: Option<f64>,
    #[serde(default, rename = "trailingPEG1Y")]
    pub trailing_peg_1y: Option<f64>,
}

/// Ticker metadata from `daily/{ticker}`; only the coverage end is used
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerMeta {
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

/// One element of `fundamentals/{ticker}/statements`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundamentalReport {
    #[serde(deserialize_with = "deserialize_date_prefix")]
    pub date: NaiveDate,
    pub year: i32,
    pub quarter: i32,
    #[serde(default)]
    pub statement_data: StatementData,
}

/// Sections the provider may omit for any given report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementData {
    #[serde(default)]
    pub balance_sheet: Option<Vec<DataPoint>>,
    #[serde(default)]
    pub cash_flow: Option<Vec<DataPoint>>,
    #[serde(default)]
    pub income_statement: Option<Vec<DataPoint>>,
    #[serde(default)]
    pub overview: Option<Vec<DataPoint>>,
}

impl StatementData {
    pub fn section(&self, kind: StatementKind) -> Option<&[DataPoint]> {
        let section = match kind {
            StatementKind::BalanceSheet => &self.balance_sheet,
            StatementKind::CashFlow => &self.cash_flow,
            StatementKind::IncomeStatement => &self.income_statement,
            StatementKind::Overview => &self.overview,
        };
        section.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    pub data_code: String,
    #[serde(default)]
    pub value: Option<f64>,
}
