use serde::{Deserialize, Serialize};

use super::{non_zero, require, MetricUnavailable};

/// Close on a price date plus the fundamentals of that date's calendar quarter
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PfcfInputs {
    pub close: Option<f64>,
    pub free_cash_flow: Option<f64>,
    pub shares_basic: Option<f64>,
}

impl PfcfInputs {
    /// `close / (free_cash_flow / shares_basic)`
    pub fn evaluate(&self) -> Result<f64, MetricUnavailable> {
        let close = require(self.close, "close price")?;
        let fcf = non_zero(require(self.free_cash_flow, "free cash flow")?, "free cash flow")?;
        let shares = non_zero(require(self.shares_basic, "basic shares")?, "basic shares")?;

        Ok(close / (fcf / shares))
    }
}

pub fn pfcf_ratio(inputs: &PfcfInputs) -> Option<f64> {
    inputs.evaluate().ok()
}
