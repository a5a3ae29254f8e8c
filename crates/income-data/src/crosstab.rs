//! Demographic distributions and (category × band) cross-tabulations.

use income_core::bands::BandSpec;
use income_core::formatting::percentage;
use income_core::models::{OrderedMap, Tally};
use serde::Serialize;

use crate::households::Household;

/// One category of a demographic distribution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionRow {
    pub label: String,
    pub value: f64,
    /// Share of the national weighted person total, rounded to 4 places.
    pub pct: f64,
}

/// Weighted count of one category inside one band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossCell {
    pub value: f64,
    pub pct_within_label: f64,
}

/// One category's breakdown across all bands.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossRow {
    pub label: String,
    pub total: f64,
    pub bands: OrderedMap<String, CrossCell>,
}

/// Accumulates member tallies of classified households, one dimension at a
/// time, in the order the dimensions were resolved.
#[derive(Debug, Clone)]
pub struct CrossTabulator {
    keys: Vec<String>,
    band_count: usize,
    totals: Vec<Tally>,
    by_band: Vec<OrderedMap<String, Vec<f64>>>,
}

impl CrossTabulator {
    pub fn new(keys: Vec<String>, band_count: usize) -> Self {
        let n = keys.len();
        Self {
            keys,
            band_count,
            totals: vec![Tally::new(); n],
            by_band: vec![OrderedMap::new(); n],
        }
    }

    /// Add every member tally of `household` under `band`.
    pub fn add(&mut self, household: &Household, band: usize) {
        let band_count = self.band_count;
        let dims = self.totals.iter_mut().zip(self.by_band.iter_mut());
        for ((totals, by_band), tally) in dims.zip(&household.dimensions) {
            for (label, &value) in tally.iter() {
                totals.add(label, value);
                let cells = by_band.get_or_insert_with(label.clone(), || vec![0.0; band_count]);
                if let Some(cell) = cells.get_mut(band) {
                    *cell += value;
                }
            }
        }
    }

    /// Per-dimension distributions sorted by value, descending.
    pub fn demographics(&self, persons_total: f64) -> OrderedMap<String, Vec<DistributionRow>> {
        self.keys
            .iter()
            .zip(&self.totals)
            .map(|(key, tally)| {
                let mut rows: Vec<DistributionRow> = tally
                    .iter()
                    .map(|(label, &value)| DistributionRow {
                        label: label.clone(),
                        value,
                        pct: percentage(value, persons_total, 4),
                    })
                    .collect();
                rows.sort_by(|a, b| b.value.total_cmp(&a.value));
                (key.clone(), rows)
            })
            .collect()
    }

    /// Cross rows keyed `"{dimension}_by_band"`, each sorted by total,
    /// descending.
    pub fn cross(&self, spec: &BandSpec) -> OrderedMap<String, Vec<CrossRow>> {
        self.keys
            .iter()
            .zip(&self.by_band)
            .map(|(key, categories)| {
                let mut rows: Vec<CrossRow> = categories
                    .iter()
                    .map(|(label, cells)| {
                        let total: f64 = cells.iter().sum();
                        let bands = spec
                            .labels()
                            .zip(cells)
                            .map(|(band, &value)| {
                                let cell = CrossCell {
                                    value,
                                    pct_within_label: percentage(value, total, 4),
                                };
                                (band.to_string(), cell)
                            })
                            .collect();
                        CrossRow {
                            label: label.clone(),
                            total,
                            bands,
                        }
                    })
                    .collect();
                rows.sort_by(|a, b| b.total.total_cmp(&a.total));
                (format!("{key}_by_band"), rows)
            })
            .collect()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use income_core::models::{HouseholdId, MonthKey};

    fn household(sex: &[(&str, f64)], age: &[(&str, f64)]) -> Household {
        let tally = |pairs: &[(&str, f64)]| {
            let mut t = Tally::new();
            for (label, w) in pairs {
                t.add(label, *w);
            }
            t
        };
        Household {
            id: HouseholdId::new("x"),
            uf_code: "35".into(),
            uf_label: "SP".into(),
            macro_region: "Sudeste",
            period: MonthKey::new(2025, 6),
            persons_n: 1,
            persons_weight: 1.0,
            household_weight: 1.0,
            income_nominal: 0.0,
            income_target: 0.0,
            factor: 1.0,
            sm_period: 1518.0,
            dimensions: vec![tally(sex), tally(age)],
        }
    }

    fn tabulator() -> CrossTabulator {
        let mut ct = CrossTabulator::new(vec!["sex".into(), "age".into()], 4);
        ct.add(&household(&[("Mulher", 100.0), ("Homem", 100.0)], &[("25-39", 200.0)]), 0);
        ct.add(&household(&[("Homem", 50.0)], &[("60+", 50.0)]), 1);
        ct.add(&household(&[("Mulher", 10.0)], &[("25-39", 10.0)]), 3);
        ct
    }

    #[test]
    fn test_demographics_sorted_with_pct_of_persons_total() {
        let demo = tabulator().demographics(260.0);
        let sex = demo.get("sex").unwrap();
        assert_eq!(sex[0].label, "Homem");
        assert!((sex[0].value - 150.0).abs() < 1e-9);
        assert_eq!(sex[0].pct, 57.6923);
        assert_eq!(sex[1].label, "Mulher");
        assert_eq!(sex[1].pct, 42.3077);
    }

    #[test]
    fn test_cross_rows_per_band() {
        let spec = BandSpec::default();
        let cross = tabulator().cross(&spec);
        let keys: Vec<&String> = cross.keys().collect();
        assert_eq!(keys, vec!["sex_by_band", "age_by_band"]);

        let age = cross.get("age_by_band").unwrap();
        assert_eq!(age[0].label, "25-39");
        assert!((age[0].total - 210.0).abs() < 1e-9);
        let first = age[0].bands.get("0-2").unwrap();
        assert!((first.value - 200.0).abs() < 1e-9);
        assert_eq!(first.pct_within_label, 95.2381);
        assert_eq!(age[0].bands.get("10+").unwrap().pct_within_label, 4.7619);
        assert_eq!(age[0].bands.get("2-5").unwrap().value, 0.0);
        assert_eq!(age[0].bands.len(), 4);
    }

    #[test]
    fn test_cross_totals_match_demographics() {
        let ct = tabulator();
        let spec = BandSpec::default();
        let demo = ct.demographics(1.0);
        let cross = ct.cross(&spec);
        for row in cross.get("sex_by_band").unwrap() {
            let d = demo.get("sex").unwrap().iter().find(|d| d.label == row.label).unwrap();
            assert!((d.value - row.total).abs() < 1e-9);
        }
    }

    #[test]
    fn test_cross_serializes_bands_in_spec_order() {
        let spec = BandSpec::default();
        let cross = tabulator().cross(&spec);
        let json = serde_json::to_string(&cross.get("sex_by_band").unwrap()[0]).unwrap();
        let positions: Vec<usize> = ["\"0-2\"", "\"2-5\"", "\"5-10\"", "\"10+\""]
            .iter()
            .map(|k| json.find(k).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }
}
