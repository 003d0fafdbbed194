use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use valuation_sync::api::TiingoClient;
use valuation_sync::database::DatabaseManager;
use valuation_sync::models::Config;
use valuation_sync::sync::{DerivedHistoryRebuilder, RebuildTarget, SyncReport, UpdateMode, UpdateRunner};
use valuation_sync::universe;

#[derive(Parser)]
#[command(
    name = "valuation-sync",
    about = "🔄 S&P 500 fundamentals sync",
    long_about = "Pulls prices and quarterly fundamentals from Tiingo and derives Graham Number and P/FCF per quarter. Run `status` to see what is stored."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Show debug logging (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch new upstream data and append it
    Update {
        #[arg(value_enum, default_value = "all")]
        mode: UpdateMode,
    },
    /// Recompute a derived table over all stored history
    Rebuild {
        #[arg(value_enum)]
        target: RebuildTarget,
    },
    /// Add tickers from a constituents CSV
    Seed { csv: PathBuf },
    /// Show row counts per table
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "valuation_sync=debug"
    } else {
        "valuation_sync=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    println!("🔄 Valuation Sync");
    println!("📅 {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
    println!("══════════════════════════════════════");

    match cli.command {
        Command::Update { mode } => {
            let config = match Config::from_env() {
                Ok(config) => config,
                Err(e) => {
                    error!("Failed to load configuration: {}", e);
                    eprintln!("❌ Configuration Error: {}", e);
                    eprintln!("Make sure you have a .env file with TIINGO_API_TOKEN set.");
                    std::process::exit(1);
                }
            };

            let db = DatabaseManager::new(&config.database_path).await?;
            let client = TiingoClient::new(&config)?;
            let runner = UpdateRunner::new(db, Arc::new(client), &config);

            let report = runner.run(mode).await?;
            print_report(&report);
        }
        Command::Rebuild { target } => {
            let db = DatabaseManager::new(&Config::database_path_from_env()).await?;
            let report = DerivedHistoryRebuilder::new(&db).run(target).await?;
            print_report(&report);
        }
        Command::Seed { csv } => {
            let db = DatabaseManager::new(&Config::database_path_from_env()).await?;
            let added = universe::seed_from_file(&db, &csv).await?;
            println!("📋 Added {} new ticker(s) from {}", added, csv.display());
            println!("📊 Universe size: {}", db.stock_count().await?);
        }
        Command::Status => {
            let db = DatabaseManager::new(&Config::database_path_from_env()).await?;
            println!("📊 {:28} {:>12}", "stocks", db.stock_count().await?);
            for (table, count) in db.table_counts().await? {
                println!("   {:28} {:>12}", table.name(), count);
            }
        }
    }

    Ok(())
}

fn print_report(report: &SyncReport) {
    println!();
    println!("🎯 {} ({})", report.operation, report.run_id);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("📈 Stocks processed: {}", report.stocks_processed);
    for (table, rows) in &report.rows_appended {
        println!("   {:28} +{}", table, rows);
    }
    println!("✅ Up to date: {} | ⏭️  Skipped: {}", report.up_to_date, report.skipped);
    if let Some(seconds) = report.duration_seconds() {
        println!("⏱️  Duration: {}s", seconds);
    }

    if report.is_success() {
        println!("🎉 Completed without failures");
    } else {
        println!("⚠️  {} failure(s):", report.failures.len());
        for failure in &report.failures {
            println!("   ❌ {} [{}]: {}", failure.symbol, failure.step, failure.message);
        }
    }
}
