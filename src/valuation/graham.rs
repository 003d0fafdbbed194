use serde::{Deserialize, Serialize};

use super::{non_zero, require, MetricUnavailable};

/// Graham's 15x earnings times 1.5x book ceiling
pub const GRAHAM_MULTIPLIER: f64 = 22.5;

/// Inputs for one (stock, year, quarter)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GrahamInputs {
    pub book_value: Option<f64>,
    pub shares_basic: Option<f64>,
    pub diluted_eps: Option<f64>,
}

impl GrahamInputs {
    /// `sqrt(22.5 * (book_value / shares_basic) * diluted_eps)`
    pub fn evaluate(&self) -> Result<f64, MetricUnavailable> {
        let book_value = require(self.book_value, "book value")?;
        let shares = non_zero(require(self.shares_basic, "basic shares")?, "basic shares")?;
        let eps = require(self.diluted_eps, "diluted eps")?;

        let before_root = GRAHAM_MULTIPLIER * (book_value / shares) * eps;
        if before_root >= 0.0 {
            Ok(before_root.sqrt())
        } else {
            Err(MetricUnavailable::NegativeRadicand)
        }
    }
}

pub fn graham_number(inputs: &GrahamInputs) -> Option<f64> {
    inputs.evaluate().ok()
}
