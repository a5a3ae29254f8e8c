//! Price index and ratio-to-target deflation factors.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{IncomeError, Result};
use crate::models::MonthKey;

// ── PriceIndex ────────────────────────────────────────────────────────────────

/// Monthly price-level series (IPCA). Immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceIndex {
    levels: BTreeMap<MonthKey, f64>,
}

impl PriceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the level for `month`; a later value for the same month wins.
    pub fn insert(&mut self, month: MonthKey, level: f64) {
        self.levels.insert(month, level);
    }

    pub fn get(&self, month: MonthKey) -> Option<f64> {
        self.levels.get(&month).copied()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Most recent month in the series, the default deflation target.
    pub fn latest_month(&self) -> Option<MonthKey> {
        self.levels.keys().next_back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MonthKey, f64)> + '_ {
        self.levels.iter().map(|(k, v)| (*k, *v))
    }

    /// Build the factor table that moves values from any month to `target`.
    ///
    /// `factor[m] = index[target] / index[m]`. Months with a non-positive
    /// level get no factor. Nothing is interpolated.
    pub fn deflators_to(&self, target: MonthKey) -> Result<DeflationFactorTable> {
        let target_level = self
            .get(target)
            .ok_or(IncomeError::TargetNotFound(target))?;

        let factors: BTreeMap<MonthKey, f64> = self
            .levels
            .iter()
            .filter(|&(_, &level)| level > 0.0)
            .map(|(&month, &level)| (month, target_level / level))
            .collect();

        debug!(
            "Built {} deflation factors to {} ({} index months)",
            factors.len(),
            target,
            self.levels.len()
        );

        Ok(DeflationFactorTable { target, factors })
    }
}

impl FromIterator<(MonthKey, f64)> for PriceIndex {
    fn from_iter<I: IntoIterator<Item = (MonthKey, f64)>>(iter: I) -> Self {
        Self {
            levels: iter.into_iter().collect(),
        }
    }
}

// ── DeflationFactorTable ──────────────────────────────────────────────────────

/// Multipliers converting nominal values of a month into target-month prices.
#[derive(Debug, Clone, PartialEq)]
pub struct DeflationFactorTable {
    target: MonthKey,
    factors: BTreeMap<MonthKey, f64>,
}

impl DeflationFactorTable {
    pub fn target(&self) -> MonthKey {
        self.target
    }

    pub fn factor(&self, month: MonthKey) -> Option<f64> {
        self.factors.get(&month).copied()
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// Factors in chronological order.
    pub fn iter(&self) -> impl Iterator<Item = (MonthKey, f64)> + '_ {
        self.factors.iter().map(|(k, v)| (*k, *v))
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
