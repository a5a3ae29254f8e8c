//! Nominal reference series (monthly minimum wage) and its resolution rules.

use std::collections::BTreeMap;

use crate::error::{IncomeError, Result};
use crate::models::MonthKey;

/// Month → nominal reference value, e.g. the minimum wage in force.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceSeries {
    values: BTreeMap<MonthKey, f64>,
}

impl ReferenceSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, month: MonthKey, value: f64) {
        self.values.insert(month, value);
    }

    /// Exact-month lookup, used per row for the row's own period.
    pub fn get(&self, month: MonthKey) -> Option<f64> {
        self.values.get(&month).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Resolve the value in force at `target`.
    ///
    /// Returns the exact month when present, otherwise the latest month
    /// strictly before `target`. Fails when every month in the series is
    /// after `target`.
    pub fn at_or_before(&self, target: MonthKey) -> Result<(MonthKey, f64)> {
        self.values
            .range(..=target)
            .next_back()
            .map(|(&month, &value)| (month, value))
            .ok_or(IncomeError::NoReferenceValueAvailable(target))
    }
}

impl FromIterator<(MonthKey, f64)> for ReferenceSeries {
    fn from_iter<I: IntoIterator<Item = (MonthKey, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
