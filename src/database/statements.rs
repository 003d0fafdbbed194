use chrono::NaiveDate;
use sqlx::{Row, SqlitePool};

use super::period_from_row;
use crate::error::{Result, SyncError};
use crate::models::{FieldSpec, FiscalPeriod, QuarterlyStatement, StatementKind};

/// One statement field value for a stored report
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodValue {
    pub period: FiscalPeriod,
    pub date: NaiveDate,
    pub value: Option<f64>,
}

/// Generic access to a single quarterly statement table
pub struct StatementTable<'a> {
    pool: &'a SqlitePool,
    kind: StatementKind,
}

impl<'a> StatementTable<'a> {
    pub(super) fn new(pool: &'a SqlitePool, kind: StatementKind) -> Self {
        Self { pool, kind }
    }

    fn column(&self, code: &str) -> Result<&'static FieldSpec> {
        self.kind.field(code).ok_or_else(|| SyncError::Schema {
            table: self.kind.table_name(),
            reason: format!("unknown field code {}", code),
        })
    }

    pub async fn latest_date(&self, stock_id: i64) -> Result<Option<NaiveDate>> {
        let sql = format!("SELECT MAX(date) FROM {} WHERE stock_id = ?", self.kind.table_name());
        let latest: Option<NaiveDate> = sqlx::query_scalar(&sql)
            .bind(stock_id)
            .fetch_one(self.pool)
            .await?;
        Ok(latest)
    }

    /// Latest fiscal quarter (1-4) stored for the stock; annual rows are skipped
    pub async fn latest_period(&self, stock_id: i64) -> Result<Option<FiscalPeriod>> {
        let sql = format!(
            "SELECT year, quarter FROM {} WHERE stock_id = ? AND quarter BETWEEN 1 AND 4 \
             ORDER BY year DESC, quarter DESC LIMIT 1",
            self.kind.table_name()
        );
        let row = sqlx::query(&sql)
            .bind(stock_id)
            .fetch_optional(self.pool)
            .await?;
        row.as_ref().map(period_from_row).transpose()
    }

    /// Append rows of this kind in one transaction; returns rows actually inserted
    pub async fn append(&self, rows: &[QuarterlyStatement]) -> Result<u64> {
        let fields = self.kind.fields();
        let columns: Vec<&str> = fields.iter().map(|f| f.column).collect();
        let placeholders = vec!["?"; fields.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} (stock_id, date, year, quarter, {}) VALUES (?, ?, ?, ?, {}) \
             ON CONFLICT(stock_id, year, quarter, date) DO NOTHING",
            self.kind.table_name(),
            columns.join(", "),
            placeholders
        );

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for row in rows {
            if row.kind != self.kind || row.values.len() != fields.len() {
                return Err(SyncError::Schema {
                    table: self.kind.table_name(),
                    reason: format!(
                        "{} row with {} values does not fit",
                        row.kind.label(),
                        row.values.len()
                    ),
                });
            }

            let mut query = sqlx::query(&sql)
                .bind(row.stock_id)
                .bind(row.date)
                .bind(row.period.year)
                .bind(row.period.quarter);
            for value in &row.values {
                query = query.bind(*value);
            }
            inserted += query.execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn has_period(&self, stock_id: i64, period: FiscalPeriod) -> Result<bool> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE stock_id = ? AND year = ? AND quarter = ?)",
            self.kind.table_name()
        );
        let exists: bool = sqlx::query_scalar(&sql)
            .bind(stock_id)
            .bind(period.year)
            .bind(period.quarter)
            .fetch_one(self.pool)
            .await?;
        Ok(exists)
    }

    /// Field value reported for `period`, taken from the most recent report
    /// date when the period was restated.
    pub async fn value_at(&self, stock_id: i64, period: FiscalPeriod, code: &str) -> Result<Option<f64>> {
        let field = self.column(code)?;
        let sql = format!(
            "SELECT {} FROM {} WHERE stock_id = ? AND year = ? AND quarter = ? ORDER BY date DESC LIMIT 1",
            field.column,
            self.kind.table_name()
        );
        let value: Option<Option<f64>> = sqlx::query_scalar(&sql)
            .bind(stock_id)
            .bind(period.year)
            .bind(period.quarter)
            .fetch_optional(self.pool)
            .await?;
        Ok(value.flatten())
    }

    /// Every stored value of one field for a stock, oldest report first
    pub async fn period_values(&self, stock_id: i64, code: &str) -> Result<Vec<PeriodValue>> {
        let field = self.column(code)?;
        let sql = format!(
            "SELECT year, quarter, date, {} AS value FROM {} WHERE stock_id = ? ORDER BY date, year, quarter",
            field.column,
            self.kind.table_name()
        );
        let rows = sqlx::query(&sql).bind(stock_id).fetch_all(self.pool).await?;

        rows.iter()
            .map(|r| -> Result<PeriodValue> {
                Ok(PeriodValue {
                    period: period_from_row(r)?,
                    date: r.try_get("date")?,
                    value: r.try_get("value")?,
                })
            })
            .collect()
    }

    /// All stored rows for a stock, in append order
    pub async fn rows(&self, stock_id: i64) -> Result<Vec<QuarterlyStatement>> {
        let sql = format!(
            "SELECT * FROM {} WHERE stock_id = ? ORDER BY id",
            self.kind.table_name()
        );
        let rows = sqlx::query(&sql).bind(stock_id).fetch_all(self.pool).await?;

        rows.iter()
            .map(|r| -> Result<QuarterlyStatement> {
                let values = self
                    .kind
                    .fields()
                    .iter()
                    .map(|f| r.try_get::<Option<f64>, _>(f.column))
                    .collect::<std::result::Result<Vec<_>, _>>()?;

                Ok(QuarterlyStatement {
                    kind: self.kind,
                    stock_id: r.try_get("stock_id")?,
                    date: r.try_get("date")?,
                    period: period_from_row(r)?,
                    values,
                })
            })
            .collect()
    }
}
