use thiserror::Error;

/// Failures that abort the current ticker's work.
///
/// Non-fatal conditions (no upstream data, mismatched periods, guarded
/// arithmetic) are not errors; they surface as
/// [`SkipReason`](crate::sync::SkipReason) values instead.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("storage failure: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("gateway request failed: {0}")]
    Gateway(#[from] reqwest::Error),

    #[error("unexpected gateway response: {0}")]
    GatewayResponse(String),

    #[error("invalid gateway url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("invalid query against {table}: {reason}")]
    Schema { table: &'static str, reason: String },

    #[error("failed to read constituents: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
