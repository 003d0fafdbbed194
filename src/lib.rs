pub mod api;
pub mod database;
pub mod error;
pub mod models;
pub mod sync;
pub mod universe;
pub mod utils;
pub mod valuation;

pub use error::{Result, SyncError};
