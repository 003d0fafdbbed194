//! End-to-end update flows over an in-memory database and a scripted gateway

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use test_log::test;

use crate::common::fixtures::{date, multiplier, price_series, report, test_config, ReportValues};
use crate::common::{init_test_database, insert_sample_stocks, logging, reject_inserts, FakeGateway, TickerFeed};
use valuation_sync::database::{DatabaseManager, Table};
use valuation_sync::models::{CatchUpPolicy, FiscalPeriod, FundamentalReport, QuarterlyStatement, StatementKind};
use valuation_sync::sync::{
    DailySeriesUpdater, DerivedHistoryRebuilder, DerivedMetricsUpdater, QuarterlyFundamentalsUpdater,
    RebuildTarget, SkipReason, TableOutcome, UpdateMode, UpdateRunner,
};

async fn store(db: &DatabaseManager, stock_id: i64, kinds: &[StatementKind], source: &FundamentalReport) {
    for &kind in kinds {
        let row = QuarterlyStatement::from_report(kind, stock_id, source);
        db.statements(kind).append(&[row]).await.expect("statement append");
    }
}

fn assert_close(actual: Option<f64>, expected: f64) {
    let actual = actual.expect("value should be present");
    assert!((actual - expected).abs() < 1e-9, "{} != {}", actual, expected);
}

#[test(tokio::test)]
async fn test_fundamentals_second_run_is_a_no_op() {
    let db = init_test_database().await.unwrap();
    let stock = insert_sample_stocks(&db, &["AAPL"]).await.unwrap().remove(0);
    let gateway = FakeGateway::new().with_feed(
        "AAPL",
        TickerFeed {
            reports: vec![
                report(date(2024, 6, 29), 2024, 3, ReportValues::reference()),
                report(date(2024, 3, 30), 2024, 2, ReportValues::reference()),
            ],
            ..Default::default()
        },
    );
    let updater = QuarterlyFundamentalsUpdater::new(&db, &gateway, CatchUpPolicy::LatestOnly);

    logging::log_test_step("First run appends the latest report to every statement table");
    let outcomes = updater.update_stock(&stock).await.unwrap();
    assert!(outcomes.iter().all(|(_, o)| *o == TableOutcome::Appended(1)));
    assert_eq!(gateway.fundamentals_fetches(), 1);
    for kind in StatementKind::ALL {
        assert_eq!(
            db.statements(kind).latest_period(stock.id).await.unwrap(),
            Some(FiscalPeriod::new(2024, 3))
        );
    }

    logging::log_test_step("Second run sees equal dates and never fetches the bundle");
    gateway.reset_calls();
    let outcomes = updater.update_stock(&stock).await.unwrap();
    assert!(outcomes.iter().all(|(_, o)| *o == TableOutcome::UpToDate));
    assert_eq!(gateway.fundamentals_fetches(), 0);
    assert_eq!(db.statements(StatementKind::CashFlow).rows(stock.id).await.unwrap().len(), 1);
}

#[test(tokio::test)]
async fn test_annual_report_is_appended_after_fourth_quarter() {
    let db = init_test_database().await.unwrap();
    let stock = insert_sample_stocks(&db, &["AAPL"]).await.unwrap().remove(0);
    let q3 = report(date(2024, 6, 29), 2024, 3, ReportValues::reference());
    let gateway = FakeGateway::new().with_feed(
        "AAPL",
        TickerFeed {
            reports: vec![q3.clone()],
            ..Default::default()
        },
    );
    let updater = QuarterlyFundamentalsUpdater::new(&db, &gateway, CatchUpPolicy::LatestOnly);
    updater.update_stock(&stock).await.unwrap();

    // Fiscal year end: annual and Q4 share a report date, annual listed first
    gateway.set_feed(
        "AAPL",
        TickerFeed {
            reports: vec![
                report(date(2024, 9, 28), 2024, 0, ReportValues::reference()),
                report(date(2024, 9, 28), 2024, 4, ReportValues::reference()),
                q3,
            ],
            ..Default::default()
        },
    );
    let outcomes = updater.update_stock(&stock).await.unwrap();
    assert!(outcomes.iter().all(|(_, o)| *o == TableOutcome::Appended(2)));

    for kind in StatementKind::ALL {
        let rows = db.statements(kind).rows(stock.id).await.unwrap();
        let periods: Vec<_> = rows.iter().map(|r| r.period).collect();
        assert_eq!(
            periods,
            vec![FiscalPeriod::new(2024, 3), FiscalPeriod::new(2024, 4), FiscalPeriod::new(2024, 0)]
        );
        assert!(periods.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    // The annual row never stands in for the latest quarter
    assert_eq!(
        DerivedMetricsUpdater::new(&db).update_graham(&stock).await.unwrap(),
        TableOutcome::Appended(1)
    );
    let graham = db.graham_numbers(stock.id).await.unwrap();
    assert_eq!(graham.last().map(|g| g.period), Some(FiscalPeriod::new(2024, 4)));
}

#[test(tokio::test)]
async fn test_backfill_appends_missed_quarters_in_order() {
    let db = init_test_database().await.unwrap();
    let stock = insert_sample_stocks(&db, &["MSFT"]).await.unwrap().remove(0);
    let q1 = report(date(2023, 9, 30), 2024, 1, ReportValues::reference());
    let q2 = report(date(2023, 12, 31), 2024, 2, ReportValues::reference());
    let q3 = report(date(2024, 3, 31), 2024, 3, ReportValues::reference());

    let gateway = FakeGateway::new().with_feed(
        "MSFT",
        TickerFeed {
            reports: vec![q1.clone()],
            ..Default::default()
        },
    );
    let updater = QuarterlyFundamentalsUpdater::new(&db, &gateway, CatchUpPolicy::Backfill);
    updater.update_stock(&stock).await.unwrap();

    // Two quarters land upstream before the next run
    gateway.set_feed(
        "MSFT",
        TickerFeed {
            reports: vec![q3, q2, q1],
            ..Default::default()
        },
    );
    let outcomes = updater.update_stock(&stock).await.unwrap();
    assert!(outcomes.iter().all(|(_, o)| *o == TableOutcome::Appended(2)));

    let rows = db.statements(StatementKind::IncomeStatement).rows(stock.id).await.unwrap();
    let periods: Vec<_> = rows.iter().map(|r| r.period).collect();
    assert_eq!(
        periods,
        vec![FiscalPeriod::new(2024, 1), FiscalPeriod::new(2024, 2), FiscalPeriod::new(2024, 3)]
    );
    assert!(rows.windows(2).all(|pair| pair[0].date < pair[1].date));
}

#[test(tokio::test)]
async fn test_prices_fetch_from_history_start_then_day_after() {
    let db = init_test_database().await.unwrap();
    let stock = insert_sample_stocks(&db, &["AAPL"]).await.unwrap().remove(0);
    let gateway = FakeGateway::new().with_feed(
        "AAPL",
        TickerFeed {
            latest_daily: Some(date(2024, 7, 3)),
            prices: price_series(date(2024, 7, 1), &[10.0, 11.0, 12.0]),
            ..Default::default()
        },
    );
    let updater = DailySeriesUpdater::new(&db, &gateway, date(2012, 1, 1));

    assert_eq!(updater.update_prices(&stock).await.unwrap(), TableOutcome::Appended(3));
    assert_eq!(gateway.price_requests(), vec![("AAPL".to_string(), date(2012, 1, 1))]);

    gateway.reset_calls();
    gateway.set_feed(
        "AAPL",
        TickerFeed {
            latest_daily: Some(date(2024, 7, 5)),
            prices: price_series(date(2024, 7, 1), &[10.0, 11.0, 12.0, 13.0, 14.0]),
            ..Default::default()
        },
    );
    assert_eq!(updater.update_prices(&stock).await.unwrap(), TableOutcome::Appended(2));
    assert_eq!(gateway.price_requests(), vec![("AAPL".to_string(), date(2024, 7, 4))]);

    gateway.reset_calls();
    assert_eq!(updater.update_prices(&stock).await.unwrap(), TableOutcome::UpToDate);
    assert!(gateway.price_requests().is_empty());

    let stored = db.daily_prices(stock.id).await.unwrap();
    assert_eq!(stored.len(), 5);
    assert_eq!(stored.last().and_then(|p| p.close_price), Some(14.0));
}

#[test(tokio::test)]
async fn test_multiplier_delta_never_duplicates() {
    let db = init_test_database().await.unwrap();
    let stock = insert_sample_stocks(&db, &["AAPL"]).await.unwrap().remove(0);
    let gateway = FakeGateway::new().with_feed(
        "AAPL",
        TickerFeed {
            latest_daily: Some(date(2024, 5, 2)),
            multipliers: vec![multiplier(date(2024, 5, 1), 28.0), multiplier(date(2024, 5, 2), 28.5)],
            ..Default::default()
        },
    );
    let updater = DailySeriesUpdater::new(&db, &gateway, date(2012, 1, 1));
    assert_eq!(updater.update_multipliers(&stock).await.unwrap(), TableOutcome::Appended(2));

    // Full series again with one new day on top
    gateway.set_feed(
        "AAPL",
        TickerFeed {
            latest_daily: Some(date(2024, 5, 3)),
            multipliers: vec![
                multiplier(date(2024, 5, 3), 29.0),
                multiplier(date(2024, 5, 2), 99.0),
                multiplier(date(2024, 5, 1), 99.0),
            ],
            ..Default::default()
        },
    );
    assert_eq!(updater.update_multipliers(&stock).await.unwrap(), TableOutcome::Appended(1));

    let stored = db.daily_multipliers(stock.id).await.unwrap();
    let pe: Vec<_> = stored.iter().map(|m| m.pe_ratio).collect();
    assert_eq!(pe, vec![Some(28.0), Some(28.5), Some(29.0)]);
}

#[test(tokio::test)]
async fn test_unknown_ticker_is_skipped() {
    let db = init_test_database().await.unwrap();
    let stock = insert_sample_stocks(&db, &["DELISTED"]).await.unwrap().remove(0);
    let gateway = FakeGateway::new();

    let updater = DailySeriesUpdater::new(&db, &gateway, date(2012, 1, 1));
    assert_eq!(
        updater.update_prices(&stock).await.unwrap(),
        TableOutcome::Skipped(SkipReason::UpstreamUnavailable)
    );
    assert!(gateway.price_requests().is_empty());
}

#[test(tokio::test)]
async fn test_graham_waits_for_every_input_table() {
    let db = init_test_database().await.unwrap();
    let stock = insert_sample_stocks(&db, &["AAPL"]).await.unwrap().remove(0);
    let q2 = report(date(2024, 3, 30), 2024, 2, ReportValues::reference());
    let q3 = report(date(2024, 6, 29), 2024, 3, ReportValues::reference());

    store(&db, stock.id, &StatementKind::ALL, &q2).await;
    store(&db, stock.id, &[StatementKind::BalanceSheet, StatementKind::IncomeStatement], &q3).await;

    let updater = DerivedMetricsUpdater::new(&db);

    logging::log_test_step("Overview still on Q2");
    assert_matches!(
        updater.update_graham(&stock).await.unwrap(),
        TableOutcome::Skipped(SkipReason::PeriodMismatch(_))
    );
    assert!(db.graham_numbers(stock.id).await.unwrap().is_empty());

    logging::log_test_step("Overview catches up");
    store(&db, stock.id, &[StatementKind::Overview], &q3).await;
    assert_eq!(updater.update_graham(&stock).await.unwrap(), TableOutcome::Appended(1));

    let stored = db.graham_numbers(stock.id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].period, FiscalPeriod::new(2024, 3));
    assert_close(stored[0].graham_value, 15.0);

    assert_eq!(updater.update_graham(&stock).await.unwrap(), TableOutcome::UpToDate);
}

#[test(tokio::test)]
async fn test_graham_with_negative_eps_writes_nothing() {
    let db = init_test_database().await.unwrap();
    let stock = insert_sample_stocks(&db, &["LOSS"]).await.unwrap().remove(0);
    let values = ReportValues {
        eps_dil: Some(-1.5),
        ..ReportValues::reference()
    };
    store(&db, stock.id, &StatementKind::ALL, &report(date(2024, 6, 29), 2024, 3, values)).await;

    let outcome = DerivedMetricsUpdater::new(&db).update_graham(&stock).await.unwrap();
    assert_matches!(outcome, TableOutcome::Skipped(SkipReason::MetricUnavailable(_)));
    assert!(db.graham_numbers(stock.id).await.unwrap().is_empty());
}

#[test(tokio::test)]
async fn test_pfcf_uses_latest_close_in_matching_quarter() {
    let db = init_test_database().await.unwrap();
    let stock = insert_sample_stocks(&db, &["AAPL"]).await.unwrap().remove(0);
    store(
        &db,
        stock.id,
        &[StatementKind::BalanceSheet, StatementKind::CashFlow],
        &report(date(2024, 6, 29), 2024, 3, ReportValues::reference()),
    )
    .await;

    let gateway = FakeGateway::new().with_feed(
        "AAPL",
        TickerFeed {
            latest_daily: Some(date(2024, 8, 15)),
            prices: price_series(date(2024, 8, 13), &[40.0, 45.0, 50.0]),
            ..Default::default()
        },
    );
    DailySeriesUpdater::new(&db, &gateway, date(2024, 8, 1))
        .update_prices(&stock)
        .await
        .unwrap();

    let updater = DerivedMetricsUpdater::new(&db);
    assert_eq!(updater.update_pfcf(&stock).await.unwrap(), TableOutcome::Appended(1));

    let stored = db.pfcf_multipliers(stock.id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].date, date(2024, 8, 15));
    assert_close(stored[0].pfree_cash_flow_ratio, 5.0);

    assert_eq!(updater.update_pfcf(&stock).await.unwrap(), TableOutcome::UpToDate);
}

#[test(tokio::test)]
async fn test_runner_continues_past_failing_ticker() {
    let db = init_test_database().await.unwrap();
    insert_sample_stocks(&db, &["AAPL", "BAD"]).await.unwrap();

    let gateway = Arc::new(FakeGateway::new().with_feed(
        "AAPL",
        TickerFeed {
            latest_daily: Some(date(2024, 8, 15)),
            prices: price_series(date(2024, 8, 13), &[48.0, 49.0, 50.0]),
            multipliers: vec![multiplier(date(2024, 8, 14), 30.0), multiplier(date(2024, 8, 15), 31.0)],
            reports: vec![report(date(2024, 6, 29), 2024, 3, ReportValues::reference())],
        },
    ));
    gateway.fail_for("BAD");

    let runner = UpdateRunner::new(db, gateway.clone(), &test_config("http://unused.invalid"));

    logging::log_test_step("Full update");
    let report = runner.run(UpdateMode::All).await.unwrap();
    logging::log_test_data("first report", &report);

    assert_eq!(report.stocks_processed, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].symbol, "BAD");
    assert_eq!(report.failures[0].step, "prices");
    assert_eq!(report.rows_for(Table::DailyPrices), 3);
    assert_eq!(report.rows_for(Table::DailyMultipliers), 2);
    assert_eq!(report.rows_for(Table::Statement(StatementKind::Overview)), 1);
    assert_eq!(report.rows_for(Table::GrahamNumbers), 1);
    assert_eq!(report.rows_for(Table::PfcfMultipliers), 1);

    let aapl = runner.database().get_stock_by_symbol("AAPL").await.unwrap().unwrap();
    let pfcf = runner.database().pfcf_multipliers(aapl.id).await.unwrap();
    assert_close(pfcf[0].pfree_cash_flow_ratio, 5.0);

    logging::log_test_step("Rerun with nothing new upstream");
    let report = runner.run(UpdateMode::All).await.unwrap();
    assert_eq!(report.total_rows(), 0);
    assert_eq!(report.up_to_date, 8);
    assert_eq!(report.failures.len(), 1);
}

#[test(tokio::test)]
async fn test_runner_storage_failure_rolls_back_only_that_ticker() {
    let db = init_test_database().await.unwrap();
    let stocks = insert_sample_stocks(&db, &["AAA", "BBB"]).await.unwrap();
    let (aaa, bbb) = (stocks[0].clone(), stocks[1].clone());

    // The third of AAA's prices hits a storage error mid-transaction
    reject_inserts(&db, "daily_prices", aaa.id, Some("2024-07-03")).await.unwrap();

    let feed = TickerFeed {
        latest_daily: Some(date(2024, 7, 3)),
        prices: price_series(date(2024, 7, 1), &[10.0, 11.0, 12.0]),
        ..Default::default()
    };
    let gateway = Arc::new(FakeGateway::new().with_feed("AAA", feed.clone()).with_feed("BBB", feed));
    let runner = UpdateRunner::new(db, gateway, &test_config("http://unused.invalid"));

    let report = runner.run(UpdateMode::Prices).await.unwrap();
    logging::log_test_data("storage failure report", &report);

    assert_eq!(report.stocks_processed, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].symbol, "AAA");
    assert_eq!(report.failures[0].step, "prices");
    assert!(report.failures[0].message.contains("storage failure"));
    assert_eq!(report.rows_for(Table::DailyPrices), 3);

    assert!(runner.database().daily_prices(aaa.id).await.unwrap().is_empty());
    assert_eq!(runner.database().daily_prices(bbb.id).await.unwrap().len(), 3);
}

#[test(tokio::test)]
async fn test_rebuild_graham_continues_past_failing_stock() {
    let db = init_test_database().await.unwrap();
    let stocks = insert_sample_stocks(&db, &["AAA", "BBB"]).await.unwrap();
    let reference = report(date(2024, 6, 29), 2024, 3, ReportValues::reference());
    for stock in &stocks {
        store(&db, stock.id, &StatementKind::ALL, &reference).await;
    }
    reject_inserts(&db, "graham_numbers", stocks[0].id, None).await.unwrap();

    let report = DerivedHistoryRebuilder::new(&db).run(RebuildTarget::Graham).await.unwrap();

    assert_eq!(report.stocks_processed, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].symbol, "AAA");
    assert_eq!(report.rows_for(Table::GrahamNumbers), 1);

    assert!(db.graham_numbers(stocks[0].id).await.unwrap().is_empty());
    let bbb = db.graham_numbers(stocks[1].id).await.unwrap();
    assert_eq!(bbb.len(), 1);
    assert_close(bbb[0].graham_value, 15.0);
}

#[test(tokio::test)]
async fn test_rebuild_graham_fills_quarters_from_annual_eps() {
    let db = init_test_database().await.unwrap();
    let stock = insert_sample_stocks(&db, &["AAPL"]).await.unwrap().remove(0);

    let no_eps = ReportValues {
        eps_dil: None,
        ..ReportValues::reference()
    };
    let own_eps = ReportValues {
        eps_dil: Some(8.0),
        ..ReportValues::reference()
    };
    store(&db, stock.id, &StatementKind::ALL, &report(date(2023, 12, 30), 2024, 1, no_eps)).await;
    store(&db, stock.id, &StatementKind::ALL, &report(date(2024, 3, 30), 2024, 2, own_eps)).await;
    store(
        &db,
        stock.id,
        &[StatementKind::IncomeStatement],
        &report(date(2024, 9, 28), 2024, 0, ReportValues::reference()),
    )
    .await;

    let rebuilder = DerivedHistoryRebuilder::new(&db);
    let report = rebuilder.run(RebuildTarget::Graham).await.unwrap();
    assert!(report.is_success());

    let stored = db.graham_numbers(stock.id).await.unwrap();
    let periods: Vec<_> = stored.iter().map(|g| g.period.quarter).collect();
    assert_eq!(periods, vec![1, 2, 3, 4]);
    assert_eq!(report.rows_for(Table::GrahamNumbers), 4);

    // Q1 borrows the annual eps of 2.0; Q2 keeps its own
    assert_close(stored[0].graham_value, 15.0);
    assert_close(stored[1].graham_value, 30.0);
    assert_eq!(stored[2].graham_value, None);

    let again = rebuilder.run(RebuildTarget::Graham).await.unwrap();
    assert_eq!(again.rows_for(Table::GrahamNumbers), 0);
}

#[test(tokio::test)]
async fn test_rebuild_pfcf_covers_price_history() {
    let db = init_test_database().await.unwrap();
    let stock = insert_sample_stocks(&db, &["AAPL"]).await.unwrap().remove(0);
    store(
        &db,
        stock.id,
        &[StatementKind::BalanceSheet, StatementKind::CashFlow],
        &report(date(2024, 6, 29), 2024, 3, ReportValues::reference()),
    )
    .await;

    let mut prices = price_series(date(2024, 8, 13), &[50.0, 60.0]);
    prices.extend(price_series(date(2024, 10, 1), &[70.0]));
    let gateway = FakeGateway::new().with_feed(
        "AAPL",
        TickerFeed {
            latest_daily: Some(date(2024, 10, 1)),
            prices,
            ..Default::default()
        },
    );
    DailySeriesUpdater::new(&db, &gateway, date(2024, 8, 1))
        .update_prices(&stock)
        .await
        .unwrap();

    let rebuilder = DerivedHistoryRebuilder::new(&db);
    assert_eq!(rebuilder.rebuild_pfcf(&stock).await.unwrap(), 2);

    let stored = db.pfcf_multipliers(stock.id).await.unwrap();
    let dates: Vec<_> = stored.iter().map(|p| p.date).collect();
    assert_eq!(dates, vec![date(2024, 8, 13), date(2024, 8, 14)]);
    assert_close(stored[0].pfree_cash_flow_ratio, 5.0);
    assert_close(stored[1].pfree_cash_flow_ratio, 6.0);

    assert_eq!(rebuilder.rebuild_pfcf(&stock).await.unwrap(), 0);
}
