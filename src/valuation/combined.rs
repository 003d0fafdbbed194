use std::collections::BTreeMap;
use tracing::debug;

use super::graham::{graham_number, GrahamInputs};
use crate::database::PeriodValue;
use crate::models::{FiscalPeriod, GrahamNumber};

/// Graham inputs gathered for one (stock, year, quarter) slot
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QuarterlyCombined {
    pub eps_dil: Option<f64>,
    pub book_val: Option<f64>,
    pub shares_basic: Option<f64>,
}

impl QuarterlyCombined {
    pub fn graham_inputs(&self) -> GrahamInputs {
        GrahamInputs {
            book_value: self.book_val,
            shares_basic: self.shares_basic,
            diluted_eps: self.eps_dil,
        }
    }
}

type YearSlots = [Option<QuarterlyCombined>; 5];

/// Statement values joined across tables for a batch of stocks.
///
/// Built for one rebuild run and dropped afterwards. Slot 0 holds the
/// annual report; slots 1-4 the fiscal quarters.
#[derive(Debug, Default)]
pub struct CombinedQuarterlyData {
    stocks: BTreeMap<i64, BTreeMap<i32, YearSlots>>,
}

impl CombinedQuarterlyData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.stocks.is_empty()
    }

    pub fn get(&self, stock_id: i64, period: FiscalPeriod) -> Option<&QuarterlyCombined> {
        let index = slot_index(period.quarter)?;
        self.stocks.get(&stock_id)?.get(&period.year)?[index].as_ref()
    }

    fn slot_mut(&mut self, stock_id: i64, year: i32, index: usize) -> &mut QuarterlyCombined {
        let slots = self
            .stocks
            .entry(stock_id)
            .or_default()
            .entry(year)
            .or_insert([None; 5]);
        slots[index].get_or_insert_with(QuarterlyCombined::default)
    }

    /// Merge one stock's stored values. Each slice is ordered oldest report
    /// first so restated periods keep their latest value.
    ///
    /// An annual diluted EPS stands in for every quarter of that year that
    /// has no quarterly EPS of its own.
    pub fn fill(
        &mut self,
        stock_id: i64,
        shares_basic: &[PeriodValue],
        book_val: &[PeriodValue],
        eps_dil: &[PeriodValue],
    ) {
        for item in shares_basic {
            if let Some(index) = slot_index(item.period.quarter) {
                self.slot_mut(stock_id, item.period.year, index).shares_basic = item.value;
            }
        }

        for item in book_val {
            if let Some(index) = slot_index(item.period.quarter) {
                self.slot_mut(stock_id, item.period.year, index).book_val = item.value;
            }
        }

        let mut annual_eps = BTreeMap::new();
        for item in eps_dil {
            match item.period.quarter {
                0 => {
                    annual_eps.insert(item.period.year, item.value);
                }
                quarter => {
                    if let Some(index) = slot_index(quarter) {
                        self.slot_mut(stock_id, item.period.year, index).eps_dil = item.value;
                    }
                }
            }
        }

        for (year, eps) in annual_eps {
            for index in 0..5 {
                let slot = self.slot_mut(stock_id, year, index);
                if slot.eps_dil.is_none() {
                    slot.eps_dil = eps;
                }
            }
        }
    }

    /// One row per populated quarter slot (1-4); the value is null when the
    /// inputs are incomplete or guarded
    pub fn graham_rows(&self, stock_id: i64) -> Vec<GrahamNumber> {
        let Some(years) = self.stocks.get(&stock_id) else {
            return Vec::new();
        };

        let mut rows = Vec::new();
        for (&year, slots) in years {
            for (quarter, slot) in slots.iter().enumerate().skip(1) {
                let Some(data) = slot else {
                    continue;
                };
                let period = FiscalPeriod::new(year, quarter as i32);
                let graham_value = graham_number(&data.graham_inputs());
                debug!(stock_id, %period, ?graham_value, "graham slot");
                rows.push(GrahamNumber {
                    stock_id,
                    period,
                    graham_value,
                });
            }
        }
        rows
    }
}

fn slot_index(quarter: i32) -> Option<usize> {
    usize::try_from(quarter).ok().filter(|q| *q < 5)
}
