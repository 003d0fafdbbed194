// Valuation metrics derived from stored fundamentals and prices

use std::fmt;

pub mod combined;
pub mod graham;
pub mod pfcf;

pub use combined::{CombinedQuarterlyData, QuarterlyCombined};
pub use graham::{graham_number, GrahamInputs};
pub use pfcf::{pfcf_ratio, PfcfInputs};

/// Why a metric could not be computed. Never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricUnavailable {
    MissingInput(&'static str),
    ZeroDivisor(&'static str),
    NegativeRadicand,
}

impl fmt::Display for MetricUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricUnavailable::MissingInput(input) => write!(f, "missing {}", input),
            MetricUnavailable::ZeroDivisor(input) => write!(f, "{} is zero", input),
            MetricUnavailable::NegativeRadicand => write!(f, "negative value under square root"),
        }
    }
}

pub(crate) fn require(value: Option<f64>, name: &'static str) -> Result<f64, MetricUnavailable> {
    value.ok_or(MetricUnavailable::MissingInput(name))
}

pub(crate) fn non_zero(value: f64, name: &'static str) -> Result<f64, MetricUnavailable> {
    if value == 0.0 {
        Err(MetricUnavailable::ZeroDivisor(name))
    } else {
        Ok(value)
    }
}
