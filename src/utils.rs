use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Calendar quarter (1-4) a date falls in.
pub fn calendar_quarter(date: NaiveDate) -> i32 {
    (date.month0() / 3 + 1) as i32
}

/// Parse the leading `YYYY-MM-DD` of a provider date or timestamp
/// (`2024-01-05T00:00:00.000Z` -> 2024-01-05).
pub fn parse_date_prefix(raw: &str) -> Option<NaiveDate> {
    let prefix = raw.get(..10)?;
    NaiveDate::parse_from_str(prefix, DATE_FORMAT).ok()
}

/// Serde adapter for provider date fields.
pub fn deserialize_date_prefix<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_date_prefix(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid date: {raw}")))
}

/// First calendar day after `date`; saturates at the maximum representable date.
pub fn day_after(date: NaiveDate) -> NaiveDate {
    date.succ_opt().unwrap_or(date)
}
