//! Database operation tests

use pretty_assertions::assert_eq;
use test_log::test;

use crate::common::fixtures::{date, report, ReportValues};
use crate::common::{database, logging};
use valuation_sync::database::Table;
use valuation_sync::models::{
    DailyMultipliers, FiscalPeriod, GrahamNumber, PFreeCashFlowMultiplier, QuarterlyStatement,
    StatementKind,
};

#[test(tokio::test)]
async fn test_stock_universe_operations() {
    logging::log_test_step("Testing stock universe operations");

    let db = database::init_test_database().await.expect("Failed to create test database");
    let stocks = database::insert_sample_stocks(&db, &["MSFT", "AAPL", "BRK.B"])
        .await
        .expect("Failed to insert stocks");

    assert!(stocks.iter().all(|s| s.id > 0));
    assert!(!db.insert_stock("AAPL").await.unwrap(), "Duplicate symbol should be ignored");

    let all = db.get_all_stocks().await.unwrap();
    let symbols: Vec<_> = all.iter().map(|s| s.symbol.clone()).collect();
    assert_eq!(symbols, vec!["AAPL", "BRK.B", "MSFT"]);

    let map = db.ticker_to_id_map().await.unwrap();
    assert_eq!(map.get("MSFT"), Some(&stocks[0].id));
    assert_eq!(db.get_stock_by_symbol("GOOG").await.unwrap(), None);
}

#[test(tokio::test)]
async fn test_latest_queries_are_scoped_per_stock() {
    logging::log_test_step("Testing latest period and date lookups");

    let db = database::init_test_database().await.unwrap();
    let stocks = database::insert_sample_stocks(&db, &["AAPL", "MSFT"]).await.unwrap();
    let (aapl, msft) = (&stocks[0], &stocks[1]);

    let kind = StatementKind::BalanceSheet;
    let rows: Vec<QuarterlyStatement> = vec![
        QuarterlyStatement::from_report(kind, aapl.id, &report(date(2023, 12, 30), 2024, 1, ReportValues::reference())),
        QuarterlyStatement::from_report(kind, aapl.id, &report(date(2024, 3, 30), 2024, 2, ReportValues::reference())),
        QuarterlyStatement::from_report(kind, msft.id, &report(date(2024, 6, 30), 2024, 4, ReportValues::reference())),
    ];
    assert_eq!(db.statements(kind).append(&rows).await.unwrap(), 3);

    let table = Table::Statement(kind);
    assert_eq!(db.latest_period(aapl.id, table).await.unwrap(), Some(FiscalPeriod::new(2024, 2)));
    assert_eq!(db.latest_date(aapl.id, table).await.unwrap(), Some(date(2024, 3, 30)));
    assert_eq!(db.latest_period(msft.id, table).await.unwrap(), Some(FiscalPeriod::new(2024, 4)));
    assert_eq!(db.latest_date(aapl.id, Table::DailyPrices).await.unwrap(), None);

    logging::log_test_data("aapl balance sheet", &db.statements(kind).rows(aapl.id).await.unwrap());
}

#[test(tokio::test)]
async fn test_appends_never_duplicate_or_mutate() {
    logging::log_test_step("Testing append-only uniqueness");

    let db = database::init_test_database().await.unwrap();
    let stock = database::insert_sample_stocks(&db, &["AAPL"]).await.unwrap().remove(0);

    let multipliers = vec![DailyMultipliers {
        stock_id: stock.id,
        date: date(2024, 5, 1),
        market_cap: Some(2.5e12),
        enterprise_val: None,
        pe_ratio: Some(28.0),
        pb_ratio: None,
        trailing_peg_1y: None,
    }];
    assert_eq!(db.append_daily_multipliers(&multipliers).await.unwrap(), 1);

    let mut changed = multipliers.clone();
    changed[0].pe_ratio = Some(99.0);
    assert_eq!(db.append_daily_multipliers(&changed).await.unwrap(), 0);
    assert_eq!(db.daily_multipliers(stock.id).await.unwrap(), multipliers);

    let graham = GrahamNumber {
        stock_id: stock.id,
        period: FiscalPeriod::new(2024, 2),
        graham_value: None,
    };
    assert_eq!(db.append_graham_numbers(&[graham.clone(), graham.clone()]).await.unwrap(), 1);
    assert_eq!(db.graham_numbers(stock.id).await.unwrap(), vec![graham]);

    let pfcf = PFreeCashFlowMultiplier {
        stock_id: stock.id,
        date: date(2024, 5, 1),
        period: FiscalPeriod::new(2024, 2),
        pfree_cash_flow_ratio: Some(31.5),
    };
    assert_eq!(db.append_pfcf_multipliers(&[pfcf.clone()]).await.unwrap(), 1);
    assert_eq!(db.append_pfcf_multipliers(&[pfcf.clone()]).await.unwrap(), 0);
    assert_eq!(db.latest_date(stock.id, Table::PfcfMultipliers).await.unwrap(), Some(date(2024, 5, 1)));
    assert_eq!(db.latest_period(stock.id, Table::PfcfMultipliers).await.unwrap(), Some(pfcf.period));
}

#[test(tokio::test)]
async fn test_file_database_persists_across_connections() {
    logging::log_test_step("Testing on-disk database");

    let (db, dir) = database::init_file_test_database().await.unwrap();
    database::insert_sample_stocks(&db, &["AAPL"]).await.unwrap();
    drop(db);

    let path = dir.path().join("stocks.db");
    let reopened = valuation_sync::database::DatabaseManager::new(&path.to_string_lossy())
        .await
        .unwrap();
    assert_eq!(reopened.stock_count().await.unwrap(), 1);

    let counts = reopened.table_counts().await.unwrap();
    assert_eq!(counts.len(), Table::ALL.len());
    assert!(counts.iter().all(|(_, count)| *count == 0));
}
