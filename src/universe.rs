//! Ticker universe seeding from a constituents CSV
//! (e.g. the public `s-and-p-500-companies` dataset).

use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

use crate::database::DatabaseManager;
use crate::error::Result;

/// Symbols from the `Symbol` column (case-insensitive), falling back to the
/// first column. Blank and duplicate symbols are dropped.
pub fn parse_constituents<R: Read>(input: R) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_reader(input);
    let column = reader
        .headers()?
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case("symbol"))
        .unwrap_or(0);

    let mut symbols: Vec<String> = Vec::new();
    for result in reader.records() {
        let record = result?;
        let symbol = record.get(column).unwrap_or("").trim().to_uppercase();
        if symbol.is_empty() || symbols.contains(&symbol) {
            continue;
        }
        symbols.push(symbol);
    }
    Ok(symbols)
}

/// Insert every symbol not yet tracked; returns how many were new
pub async fn seed_universe(db: &DatabaseManager, symbols: &[String]) -> Result<usize> {
    let mut added = 0;
    for symbol in symbols {
        if db.insert_stock(symbol).await? {
            debug!("added {}", symbol);
            added += 1;
        }
    }
    info!("📋 Universe seeded: {} new of {} symbols", added, symbols.len());
    Ok(added)
}

pub async fn seed_from_file(db: &DatabaseManager, path: impl AsRef<Path>) -> Result<usize> {
    let file = std::fs::File::open(path.as_ref()).map_err(csv::Error::from)?;
    let symbols = parse_constituents(file)?;
    seed_universe(db, &symbols).await
}
