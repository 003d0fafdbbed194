use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::models::{
    DailyMultipliers, DailyPrice, FiscalPeriod, GrahamNumber, PFreeCashFlowMultiplier,
    StatementKind, Stock,
};

pub mod statements;
pub use statements::{PeriodValue, StatementTable};

/// Every table keyed by stock that the sync writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    DailyPrices,
    DailyMultipliers,
    Statement(StatementKind),
    GrahamNumbers,
    PfcfMultipliers,
}

impl Table {
    pub const ALL: [Table; 8] = [
        Table::DailyPrices,
        Table::DailyMultipliers,
        Table::Statement(StatementKind::BalanceSheet),
        Table::Statement(StatementKind::CashFlow),
        Table::Statement(StatementKind::IncomeStatement),
        Table::Statement(StatementKind::Overview),
        Table::GrahamNumbers,
        Table::PfcfMultipliers,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::DailyPrices => "daily_prices",
            Table::DailyMultipliers => "daily_multipliers",
            Table::Statement(kind) => kind.table_name(),
            Table::GrahamNumbers => "graham_numbers",
            Table::PfcfMultipliers => "pfcf_multipliers",
        }
    }

    fn has_date(self) -> bool {
        !matches!(self, Table::GrahamNumbers)
    }

    fn has_period(self) -> bool {
        !matches!(self, Table::DailyPrices | Table::DailyMultipliers)
    }
}

/// sqlx-backed store for the sync tables
#[derive(Clone)]
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    /// Open (or create) the database file and ensure the schema exists
    pub async fn new(database_path: &str) -> Result<Self> {
        let path = database_path.strip_prefix("sqlite:").unwrap_or(database_path);
        info!("Connecting to database: {}", path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(SqliteConnectOptions::new().filename(path).create_if_missing(true))
            .await?;

        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous = NORMAL").execute(&pool).await?;

        let db = Self { pool };
        db.create_schema().await?;
        Ok(db)
    }

    /// Private in-memory database; a single pinned connection keeps it alive
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
            .await?;

        let db = Self { pool };
        db.create_schema().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stocks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT UNIQUE NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS daily_prices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                stock_id INTEGER NOT NULL,
                date DATE NOT NULL,
                close_price REAL,
                FOREIGN KEY (stock_id) REFERENCES stocks(id),
                UNIQUE(stock_id, date)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS daily_multipliers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                stock_id INTEGER NOT NULL,
                date DATE NOT NULL,
                market_cap REAL,
                enterprise_val REAL,
                pe_ratio REAL,
                pb_ratio REAL,
                trailing_peg_1y REAL,
                FOREIGN KEY (stock_id) REFERENCES stocks(id),
                UNIQUE(stock_id, date)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for kind in StatementKind::ALL {
            sqlx::query(&statement_table_ddl(kind))
                .execute(&self.pool)
                .await?;
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS graham_numbers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                stock_id INTEGER NOT NULL,
                year INTEGER NOT NULL,
                quarter INTEGER NOT NULL,
                graham_value REAL,
                FOREIGN KEY (stock_id) REFERENCES stocks(id),
                UNIQUE(stock_id, year, quarter)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pfcf_multipliers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                stock_id INTEGER NOT NULL,
                date DATE NOT NULL,
                year INTEGER NOT NULL,
                quarter INTEGER NOT NULL,
                pfree_cash_flow_ratio REAL,
                FOREIGN KEY (stock_id) REFERENCES stocks(id),
                UNIQUE(stock_id, date)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("schema ready");
        Ok(())
    }

    /// Insert a ticker into the universe; returns false when it already exists
    pub async fn insert_stock(&self, symbol: &str) -> Result<bool> {
        let result = sqlx::query("INSERT INTO stocks (symbol) VALUES (?) ON CONFLICT(symbol) DO NOTHING")
            .bind(symbol)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// All stock ids and symbols, ordered by symbol
    pub async fn get_all_stocks(&self) -> Result<Vec<Stock>> {
        let rows = sqlx::query("SELECT id, symbol FROM stocks ORDER BY symbol")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(stock_from_row).collect()
    }

    pub async fn ticker_to_id_map(&self) -> Result<HashMap<String, i64>> {
        Ok(self
            .get_all_stocks()
            .await?
            .into_iter()
            .map(|s| (s.symbol, s.id))
            .collect())
    }

    pub async fn get_stock_by_symbol(&self, symbol: &str) -> Result<Option<Stock>> {
        let row = sqlx::query("SELECT id, symbol FROM stocks WHERE symbol = ?")
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(stock_from_row).transpose()
    }

    /// Handle on one quarterly statement table
    pub fn statements(&self, kind: StatementKind) -> StatementTable<'_> {
        StatementTable::new(&self.pool, kind)
    }

    /// Latest date stored for `stock_id` in a date-keyed table
    pub async fn latest_date(&self, stock_id: i64, table: Table) -> Result<Option<NaiveDate>> {
        if !table.has_date() {
            return Err(SyncError::Schema {
                table: table.name(),
                reason: "table has no date column".to_string(),
            });
        }

        let sql = format!("SELECT MAX(date) FROM {} WHERE stock_id = ?", table.name());
        let latest: Option<NaiveDate> = sqlx::query_scalar(&sql)
            .bind(stock_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(latest)
    }

    /// Latest fiscal quarter stored for `stock_id` in a period-keyed table.
    /// Annual rows are not quarters and never count.
    pub async fn latest_period(&self, stock_id: i64, table: Table) -> Result<Option<FiscalPeriod>> {
        if !table.has_period() {
            return Err(SyncError::Schema {
                table: table.name(),
                reason: "table has no year/quarter columns".to_string(),
            });
        }

        let sql = format!(
            "SELECT year, quarter FROM {} WHERE stock_id = ? AND quarter BETWEEN 1 AND 4 \
             ORDER BY year DESC, quarter DESC LIMIT 1",
            table.name()
        );
        let row = sqlx::query(&sql)
            .bind(stock_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(period_from_row).transpose()
    }

    /// Append price rows in one transaction; returns rows actually inserted
    pub async fn append_daily_prices(&self, prices: &[DailyPrice]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for price in prices {
            let result = sqlx::query(
                r#"
                INSERT INTO daily_prices (stock_id, date, close_price)
                VALUES (?, ?, ?)
                ON CONFLICT(stock_id, date) DO NOTHING
                "#,
            )
            .bind(price.stock_id)
            .bind(price.date)
            .bind(price.close_price)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn append_daily_multipliers(&self, rows: &[DailyMultipliers]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for row in rows {
            let result = sqlx::query(
                r#"
                INSERT INTO daily_multipliers
                    (stock_id, date, market_cap, enterprise_val, pe_ratio, pb_ratio, trailing_peg_1y)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(stock_id, date) DO NOTHING
                "#,
            )
            .bind(row.stock_id)
            .bind(row.date)
            .bind(row.market_cap)
            .bind(row.enterprise_val)
            .bind(row.pe_ratio)
            .bind(row.pb_ratio)
            .bind(row.trailing_peg_1y)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn append_graham_numbers(&self, rows: &[GrahamNumber]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for row in rows {
            let result = sqlx::query(
                r#"
                INSERT INTO graham_numbers (stock_id, year, quarter, graham_value)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(stock_id, year, quarter) DO NOTHING
                "#,
            )
            .bind(row.stock_id)
            .bind(row.period.year)
            .bind(row.period.quarter)
            .bind(row.graham_value)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn append_pfcf_multipliers(&self, rows: &[PFreeCashFlowMultiplier]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for row in rows {
            let result = sqlx::query(
                r#"
                INSERT INTO pfcf_multipliers (stock_id, date, year, quarter, pfree_cash_flow_ratio)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(stock_id, date) DO NOTHING
                "#,
            )
            .bind(row.stock_id)
            .bind(row.date)
            .bind(row.period.year)
            .bind(row.period.quarter)
            .bind(row.pfree_cash_flow_ratio)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Close on an exact date. `None` when the row is missing or its close is null.
    pub async fn close_price_on(&self, stock_id: i64, date: NaiveDate) -> Result<Option<f64>> {
        let close: Option<Option<f64>> = sqlx::query_scalar(
            "SELECT close_price FROM daily_prices WHERE stock_id = ? AND date = ?",
        )
        .bind(stock_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(close.flatten())
    }

    /// Full price history for a stock, oldest first
    pub async fn daily_prices(&self, stock_id: i64) -> Result<Vec<DailyPrice>> {
        let rows = sqlx::query(
            "SELECT stock_id, date, close_price FROM daily_prices WHERE stock_id = ? ORDER BY date",
        )
        .bind(stock_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| -> Result<DailyPrice> {
                Ok(DailyPrice {
                    stock_id: r.try_get("stock_id")?,
                    date: r.try_get("date")?,
                    close_price: r.try_get("close_price")?,
                })
            })
            .collect()
    }

    pub async fn daily_multipliers(&self, stock_id: i64) -> Result<Vec<DailyMultipliers>> {
        let rows = sqlx::query(
            r#"
            SELECT stock_id, date, market_cap, enterprise_val, pe_ratio, pb_ratio, trailing_peg_1y
            FROM daily_multipliers
            WHERE stock_id = ?
            ORDER BY date
            "#,
        )
        .bind(stock_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| -> Result<DailyMultipliers> {
                Ok(DailyMultipliers {
                    stock_id: r.try_get("stock_id")?,
                    date: r.try_get("date")?,
                    market_cap: r.try_get("market_cap")?,
                    enterprise_val: r.try_get("enterprise_val")?,
                    pe_ratio: r.try_get("pe_ratio")?,
                    pb_ratio: r.try_get("pb_ratio")?,
                    trailing_peg_1y: r.try_get("trailing_peg_1y")?,
                })
            })
            .collect()
    }

    pub async fn graham_numbers(&self, stock_id: i64) -> Result<Vec<GrahamNumber>> {
        let rows = sqlx::query(
            "SELECT stock_id, year, quarter, graham_value FROM graham_numbers WHERE stock_id = ? ORDER BY year, quarter",
        )
        .bind(stock_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| -> Result<GrahamNumber> {
                Ok(GrahamNumber {
                    stock_id: r.try_get("stock_id")?,
                    period: period_from_row(r)?,
                    graham_value: r.try_get("graham_value")?,
                })
            })
            .collect()
    }

    pub async fn pfcf_multipliers(&self, stock_id: i64) -> Result<Vec<PFreeCashFlowMultiplier>> {
        let rows = sqlx::query(
            r#"
            SELECT stock_id, date, year, quarter, pfree_cash_flow_ratio
            FROM pfcf_multipliers
            WHERE stock_id = ?
            ORDER BY date
            "#,
        )
        .bind(stock_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| -> Result<PFreeCashFlowMultiplier> {
                Ok(PFreeCashFlowMultiplier {
                    stock_id: r.try_get("stock_id")?,
                    date: r.try_get("date")?,
                    period: period_from_row(r)?,
                    pfree_cash_flow_ratio: r.try_get("pfree_cash_flow_ratio")?,
                })
            })
            .collect()
    }

    /// Row counts per table, for the status report
    pub async fn table_counts(&self) -> Result<Vec<(Table, i64)>> {
        let mut counts = Vec::with_capacity(Table::ALL.len());
        for table in Table::ALL {
            let sql = format!("SELECT COUNT(*) FROM {}", table.name());
            let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
            counts.push((table, count));
        }
        Ok(counts)
    }

    pub async fn stock_count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM stocks")
            .fetch_one(&self.pool)
            .await?)
    }
}

fn stock_from_row(row: &SqliteRow) -> Result<Stock> {
    Ok(Stock {
        id: row.try_get("id")?,
        symbol: row.try_get("symbol")?,
    })
}

pub(crate) fn period_from_row(row: &SqliteRow) -> Result<FiscalPeriod> {
    Ok(FiscalPeriod::new(row.try_get("year")?, row.try_get("quarter")?))
}

fn statement_table_ddl(kind: StatementKind) -> String {
    let columns: String = kind
        .fields()
        .iter()
        .map(|f| format!("                {} REAL,\n", f.column))
        .collect();

    format!(
        r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                stock_id INTEGER NOT NULL,
                date DATE NOT NULL,
                year INTEGER NOT NULL,
                quarter INTEGER NOT NULL,
{columns}                FOREIGN KEY (stock_id) REFERENCES stocks(id),
                UNIQUE(stock_id, year, quarter, date)
            )
            "#,
        table = kind.table_name(),
        columns = columns,
    )
}
