//! Streaming reconstruction of households from person-level rows.
//!
//! Every row is either folded into exactly one household or counted under a
//! single skip reason; nothing is zero-filled.

use std::collections::HashSet;

use csv::ByteRecord;
use income_core::deflator::DeflationFactorTable;
use income_core::error::Result;
use income_core::models::{HouseholdId, MonthKey, OrderedMap, Tally};
use income_core::parsing::{parse_decimal, parse_int};
use income_core::reference::ReferenceSeries;
use income_core::regions::{macro_region_for, normalize_uf_code};
use serde::Serialize;
use tracing::{debug, warn};

use crate::columns::ColumnMap;
use crate::reader::{cell, CsvSource};

/// Household weights closer than this are treated as equal.
const WEIGHT_EPSILON: f64 = 1e-6;

// ── Household ─────────────────────────────────────────────────────────────────

/// All person rows sharing one `dom_id`, aggregated.
///
/// Attributes captured on the first row (state, period, factor, reference
/// value, household weight) are never overwritten by later rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Household {
    pub id: HouseholdId,
    pub uf_code: String,
    /// State label, falling back to the code when the label cell is empty.
    pub uf_label: String,
    pub macro_region: &'static str,
    pub period: MonthKey,
    pub persons_n: u64,
    pub persons_weight: f64,
    pub household_weight: f64,
    pub income_nominal: f64,
    /// Sum of member incomes deflated to the target month.
    pub income_target: f64,
    /// Deflation factor of [`Household::period`].
    pub factor: f64,
    /// Nominal minimum wage of [`Household::period`].
    pub sm_period: f64,
    /// Weighted category tallies, parallel to [`ColumnMap::dimensions`].
    pub dimensions: Vec<Tally>,
}

impl Household {
    /// The period's minimum wage expressed in target-month prices.
    pub fn sm_period_deflated(&self) -> f64 {
        self.sm_period * self.factor
    }
}

// ── Counters / options ────────────────────────────────────────────────────────

/// Row-level anomalies, reported in payload metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SkipCounters {
    pub skipped_missing_period: u64,
    pub skipped_missing_factor: u64,
    pub skipped_missing_sm: u64,
    pub skipped_missing_weight: u64,
    pub skipped_invalid_weight: u64,
    pub inconsistent_household_weight_rows: u64,
}

/// Per-run switches for the reconstructor.
#[derive(Debug, Clone, Default)]
pub struct ReconstructionOptions {
    /// Lowercased state codes or labels to keep; empty keeps every state.
    pub state_filter: HashSet<String>,
    /// Ignore sample weights: every row weighs `1.0`.
    pub unweighted: bool,
    /// Tally demographic categories per household.
    pub track_dimensions: bool,
}

/// Parse a comma-separated `--state` value into a lowercased filter set.
pub fn parse_state_filter(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

// ── Reconstruction ────────────────────────────────────────────────────────────

/// Result of one pass over the input.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    pub households: OrderedMap<HouseholdId, Household>,
    pub counters: SkipCounters,
    pub rows_read: u64,
}

impl Reconstruction {
    /// Number of distinct state codes among the households.
    pub fn states_covered(&self) -> usize {
        self.households
            .values()
            .map(|h| h.uf_code.as_str())
            .collect::<HashSet<_>>()
            .len()
    }
}

/// Builds [`Household`]s one row at a time.
pub struct HouseholdReconstructor<'a> {
    columns: &'a ColumnMap,
    factors: &'a DeflationFactorTable,
    reference: &'a ReferenceSeries,
    options: &'a ReconstructionOptions,
    households: OrderedMap<HouseholdId, Household>,
    counters: SkipCounters,
    rows_read: u64,
}

impl<'a> HouseholdReconstructor<'a> {
    pub fn new(
        columns: &'a ColumnMap,
        factors: &'a DeflationFactorTable,
        reference: &'a ReferenceSeries,
        options: &'a ReconstructionOptions,
    ) -> Self {
        Self {
            columns,
            factors,
            reference,
            options,
            households: OrderedMap::new(),
            counters: SkipCounters::default(),
            rows_read: 0,
        }
    }

    /// Fold one person row.
    pub fn push_row(&mut self, record: &ByteRecord) {
        let cols = self.columns;
        self.rows_read += 1;

        let dom = cell(record, Some(cols.household_id));
        let dom = dom.trim();
        if dom.is_empty() {
            return;
        }

        let year = parse_int(&cell(record, Some(cols.year))).and_then(|y| i32::try_from(y).ok());
        let quarter = parse_int(&cell(record, Some(cols.quarter)));
        let (Some(year), Some(quarter)) = (year, quarter) else {
            self.counters.skipped_missing_period += 1;
            return;
        };
        let period = MonthKey::from_quarter(year, quarter);

        let Some(factor) = self.factors.factor(period) else {
            self.counters.skipped_missing_factor += 1;
            return;
        };
        let Some(sm_period) = self.reference.get(period) else {
            self.counters.skipped_missing_sm += 1;
            return;
        };

        let uf_code = normalize_uf_code(&cell(record, Some(cols.uf)));
        let uf_label = cell(record, cols.uf_label).trim().to_string();
        let filter = &self.options.state_filter;
        if !filter.is_empty()
            && !filter.contains(&uf_code.to_lowercase())
            && !filter.contains(&uf_label.to_lowercase())
        {
            return;
        }

        let weight = if self.options.unweighted {
            1.0
        } else if let Some(idx) = cols.weight {
            let raw = cell(record, Some(idx));
            if raw.is_empty() {
                self.counters.skipped_missing_weight += 1;
                return;
            }
            match parse_decimal(&raw) {
                Some(w) if w > 0.0 => w,
                _ => {
                    self.counters.skipped_invalid_weight += 1;
                    return;
                }
            }
        } else {
            1.0
        };

        let income = parse_decimal(&cell(record, Some(cols.income))).unwrap_or(0.0);
        let macro_region = macro_region_for(&uf_code);

        let track = self.options.track_dimensions;
        let n_dims = if track { cols.dimensions.len() } else { 0 };
        let household = self
            .households
            .get_or_insert_with(HouseholdId::new(dom), || Household {
                id: HouseholdId::new(dom),
                uf_label: if uf_label.is_empty() {
                    uf_code.clone()
                } else {
                    uf_label.clone()
                },
                uf_code: uf_code.clone(),
                macro_region,
                period,
                persons_n: 0,
                persons_weight: 0.0,
                household_weight: weight,
                income_nominal: 0.0,
                income_target: 0.0,
                factor,
                sm_period,
                dimensions: vec![Tally::new(); n_dims],
            });

        household.persons_n += 1;
        household.persons_weight += weight;
        household.income_nominal += income;
        household.income_target += income * factor;
        if (household.household_weight - weight).abs() > WEIGHT_EPSILON {
            self.counters.inconsistent_household_weight_rows += 1;
        }

        if track {
            for (tally, dim) in household.dimensions.iter_mut().zip(&cols.dimensions) {
                tally.add(&dim.category(record, macro_region), weight);
            }
        }
    }

    pub fn finish(self) -> Reconstruction {
        if self.counters.inconsistent_household_weight_rows > 0 {
            warn!(
                "{} rows carried a household weight different from the household's first row",
                self.counters.inconsistent_household_weight_rows
            );
        }
        Reconstruction {
            households: self.households,
            counters: self.counters,
            rows_read: self.rows_read,
        }
    }
}

/// Stream every row of `source` through a [`HouseholdReconstructor`].
pub fn reconstruct(
    source: &mut CsvSource,
    columns: &ColumnMap,
    factors: &DeflationFactorTable,
    reference: &ReferenceSeries,
    options: &ReconstructionOptions,
) -> Result<Reconstruction> {
    let mut builder = HouseholdReconstructor::new(columns, factors, reference, options);
    for record in source.records() {
        builder.push_row(&record?);
    }
    let result = builder.finish();
    debug!(
        "Reconstructed {} households from {} rows ({:?})",
        result.households.len(),
        result.rows_read,
        result.counters
    );
    Ok(result)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use income_core::deflator::PriceIndex;

    // ── Helpers ───────────────────────────────────────────────────────────────

    const HEADERS: &[&str] = &[
        "Ano", "Trimestre", "UF", "UF_label", "dom_id", "V1028", "VD4020", "V2007_label",
    ];

    fn columns(unweighted: bool) -> ColumnMap {
        let headers: Vec<String> = HEADERS.iter().map(|s| s.to_string()).collect();
        ColumnMap::resolve(&headers, None, None, unweighted).unwrap()
    }

    fn factors() -> DeflationFactorTable {
        let index: PriceIndex = [(MonthKey::new(2025, 6), 100.0), (MonthKey::new(2025, 7), 110.0)]
            .into_iter()
            .collect();
        index.deflators_to(MonthKey::new(2025, 7)).unwrap()
    }

    fn reference() -> ReferenceSeries {
        [(MonthKey::new(2025, 6), 1518.0)].into_iter().collect()
    }

    fn row(fields: [&str; 8]) -> ByteRecord {
        ByteRecord::from(fields.to_vec())
    }

    fn run(rows: &[ByteRecord], options: &ReconstructionOptions, unweighted: bool) -> Reconstruction {
        let cols = columns(unweighted);
        let f = factors();
        let r = reference();
        let mut builder = HouseholdReconstructor::new(&cols, &f, &r, options);
        for record in rows {
            builder.push_row(record);
        }
        builder.finish()
    }

    fn tracked() -> ReconstructionOptions {
        ReconstructionOptions {
            track_dimensions: true,
            ..Default::default()
        }
    }

    // ── Accumulation ─────────────────────────────────────────────────────────

    #[test]
    fn test_rows_fold_into_one_household() {
        let rows = [
            row(["2025", "2", "35", "SP", "d1", "100", "1000", "Homem"]),
            row(["2025", "2", "35", "SP", "d1", "100", "", "Mulher"]),
        ];
        let result = run(&rows, &tracked(), false);
        assert_eq!(result.rows_read, 2);
        assert_eq!(result.households.len(), 1);

        let h = result.households.get(&HouseholdId::new("d1")).unwrap();
        assert_eq!(h.persons_n, 2);
        assert!((h.persons_weight - 200.0).abs() < 1e-9);
        assert!((h.household_weight - 100.0).abs() < 1e-9);
        assert!((h.income_nominal - 1000.0).abs() < 1e-9);
        assert!((h.income_target - 1100.0).abs() < 1e-9);
        assert!((h.sm_period - 1518.0).abs() < 1e-9);
        assert!((h.sm_period_deflated() - 1669.8).abs() < 1e-9);
        assert_eq!(h.period, MonthKey::new(2025, 6));
        assert_eq!(h.macro_region, "Sudeste");
        assert_eq!(h.dimensions[0].get("Homem"), Some(&100.0));
        assert_eq!(h.dimensions[0].get("Mulher"), Some(&100.0));
    }

    #[test]
    fn test_deflated_income_independent_of_row_order() {
        let a = row(["2025", "2", "35", "SP", "d1", "10", "700", ""]);
        let b = row(["2025", "2", "35", "SP", "d1", "10", "300,5", ""]);
        let forward = run(&[a.clone(), b.clone()], &tracked(), false);
        let backward = run(&[b, a], &tracked(), false);
        let hf = forward.households.get(&HouseholdId::new("d1")).unwrap();
        let hb = backward.households.get(&HouseholdId::new("d1")).unwrap();
        assert!((hf.income_target - hb.income_target).abs() < 1e-9);
        assert!((hf.income_target - 1.1 * 1000.5).abs() < 1e-9);
    }

    #[test]
    fn test_first_seen_weight_wins_and_inconsistency_counted() {
        let rows = [
            row(["2025", "2", "35", "SP", "d1", "100", "1", ""]),
            row(["2025", "2", "35", "SP", "d1", "90", "1", ""]),
            row(["2025", "2", "35", "SP", "d1", "100.0000001", "1", ""]),
        ];
        let result = run(&rows, &tracked(), false);
        let h = result.households.get(&HouseholdId::new("d1")).unwrap();
        assert!((h.household_weight - 100.0).abs() < 1e-9);
        assert_eq!(result.counters.inconsistent_household_weight_rows, 1);
    }

    #[test]
    fn test_label_falls_back_to_code_and_code_is_padded() {
        let rows = [row(["2025", "2", "5", "", "d1", "1", "1", ""])];
        let result = run(&rows, &tracked(), false);
        let h = result.households.get(&HouseholdId::new("d1")).unwrap();
        assert_eq!(h.uf_code, "05");
        assert_eq!(h.uf_label, "05");
        assert_eq!(h.macro_region, "Desconhecida");
    }

    // ── Skip reasons ─────────────────────────────────────────────────────────

    #[test]
    fn test_skip_counters() {
        let rows = [
            row(["2025", "", "35", "SP", "d1", "1", "1", ""]),   // period
            row(["x", "2", "35", "SP", "d2", "1", "1", ""]),     // period
            row(["2025", "3", "35", "SP", "d3", "1", "1", ""]),  // factor
            row(["2025", "1", "35", "SP", "d4", "1", "1", ""]),  // factor
            row(["2025", "2", "35", "SP", "d5", "", "1", ""]),   // weight missing
            row(["2025", "2", "35", "SP", "d6", "0", "1", ""]),  // weight invalid
            row(["2025", "2", "35", "SP", "d7", "abc", "1", ""]), // weight invalid
            row(["2025", "2", "35", "SP", "", "1", "1", ""]),    // no id
        ];
        let result = run(&rows, &tracked(), false);
        assert_eq!(result.rows_read, 8);
        assert!(result.households.is_empty());
        let c = &result.counters;
        assert_eq!(c.skipped_missing_period, 2);
        assert_eq!(c.skipped_missing_factor, 2);
        assert_eq!(c.skipped_missing_sm, 0);
        assert_eq!(c.skipped_missing_weight, 1);
        assert_eq!(c.skipped_invalid_weight, 2);
    }

    #[test]
    fn test_missing_reference_value_is_counted() {
        let cols = columns(false);
        let index: PriceIndex = [(MonthKey::new(2025, 3), 95.0), (MonthKey::new(2025, 6), 100.0)]
            .into_iter()
            .collect();
        let f = index.deflators_to(MonthKey::new(2025, 6)).unwrap();
        let r = reference();
        let options = tracked();
        let mut builder = HouseholdReconstructor::new(&cols, &f, &r, &options);
        builder.push_row(&row(["2025", "1", "35", "SP", "d1", "1", "1", ""]));
        let result = builder.finish();
        assert_eq!(result.counters.skipped_missing_sm, 1);
        assert!(result.households.is_empty());
    }

    #[test]
    fn test_unweighted_mode_ignores_weights() {
        let rows = [
            row(["2025", "2", "35", "SP", "d1", "", "1", ""]),
            row(["2025", "2", "35", "SP", "d1", "abc", "1", ""]),
        ];
        let result = run(&rows, &tracked(), true);
        let h = result.households.get(&HouseholdId::new("d1")).unwrap();
        assert_eq!(h.persons_n, 2);
        assert!((h.persons_weight - 2.0).abs() < 1e-12);
        assert!((h.household_weight - 1.0).abs() < 1e-12);
        assert_eq!(result.counters, SkipCounters::default());
    }

    // ── State filter ─────────────────────────────────────────────────────────

    #[test]
    fn test_state_filter_matches_code_or_label() {
        let rows = [
            row(["2025", "2", "35", "SP", "d1", "1", "1", ""]),
            row(["2025", "2", "33", "RJ", "d2", "1", "1", ""]),
            row(["2025", "2", "31", "MG", "d3", "1", "1", ""]),
        ];
        let options = ReconstructionOptions {
            state_filter: parse_state_filter(" 35, rj ,"),
            ..tracked()
        };
        let result = run(&rows, &options, false);
        let ids: Vec<&str> = result.households.keys().map(|k| k.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d2"]);
        assert_eq!(result.states_covered(), 2);
    }

    #[test]
    fn test_parse_state_filter() {
        let f = parse_state_filter("SP, 33,,");
        assert_eq!(f.len(), 2);
        assert!(f.contains("sp"));
        assert!(f.contains("33"));
        assert!(parse_state_filter("").is_empty());
    }

    #[test]
    fn test_dimensions_not_tracked_when_disabled() {
        let rows = [row(["2025", "2", "35", "SP", "d1", "1", "1", "Homem"])];
        let result = run(&rows, &ReconstructionOptions::default(), false);
        let h = result.households.get(&HouseholdId::new("d1")).unwrap();
        assert!(h.dimensions.is_empty());
    }

    #[test]
    fn test_insertion_order_preserved() {
        let rows = [
            row(["2025", "2", "35", "SP", "z", "1", "1", ""]),
            row(["2025", "2", "35", "SP", "a", "1", "1", ""]),
            row(["2025", "2", "35", "SP", "z", "1", "1", ""]),
        ];
        let result = run(&rows, &tracked(), false);
        let ids: Vec<&str> = result.households.keys().map(|k| k.as_str()).collect();
        assert_eq!(ids, vec!["z", "a"]);
    }
}
