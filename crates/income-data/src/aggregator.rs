//! Weighted band aggregation over the national / state / macro-region
//! hierarchy.

use income_core::bands::BandSpec;
use income_core::error::{IncomeError, Result};
use income_core::formatting::{percentage, round_to, safe_div};
use income_core::models::{GroupKey, OrderedMap, NATIONAL_LABEL};
use income_core::regions::macro_region_rank;
use income_core::stats::{weighted_gini, weighted_median};
use serde::Serialize;

use crate::households::Household;

// ── Modes ─────────────────────────────────────────────────────────────────────

/// Which minimum wage a household's income is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonMode {
    /// Nominal income over the minimum wage of the household's own period.
    Periodo,
    /// Deflated income over the minimum wage in force at the target month.
    Alvo,
}

impl ComparisonMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ComparisonMode::Periodo => "periodo",
            ComparisonMode::Alvo => "alvo",
        }
    }
}

/// The `--sm-mode` option: one comparison mode, or both in a fixed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmMode {
    Both,
    Periodo,
    Alvo,
}

impl SmMode {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "both" => Ok(SmMode::Both),
            "periodo" => Ok(SmMode::Periodo),
            "alvo" => Ok(SmMode::Alvo),
            other => Err(IncomeError::Config(format!("invalid sm mode: {other}"))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SmMode::Both => "both",
            SmMode::Periodo => "periodo",
            SmMode::Alvo => "alvo",
        }
    }

    /// Comparison modes to run, `periodo` first.
    pub fn modes(self) -> Vec<ComparisonMode> {
        match self {
            SmMode::Both => vec![ComparisonMode::Periodo, ComparisonMode::Alvo],
            SmMode::Periodo => vec![ComparisonMode::Periodo],
            SmMode::Alvo => vec![ComparisonMode::Alvo],
        }
    }
}

/// State ordering in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UfOrder {
    /// Descending average household ratio.
    #[default]
    RendaDesc,
    RendaAsc,
    /// Case-insensitive label order.
    Alfabetica,
    /// State code order.
    Codigo,
}

impl UfOrder {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "renda_desc" => Ok(UfOrder::RendaDesc),
            "renda_asc" => Ok(UfOrder::RendaAsc),
            "alfabetica" => Ok(UfOrder::Alfabetica),
            "codigo" => Ok(UfOrder::Codigo),
            other => Err(IncomeError::Config(format!("invalid uf order: {other}"))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UfOrder::RendaDesc => "renda_desc",
            UfOrder::RendaAsc => "renda_asc",
            UfOrder::Alfabetica => "alfabetica",
            UfOrder::Codigo => "codigo",
        }
    }
}

/// Grouping of the band report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    /// One national group.
    Pais,
    /// One group per state.
    Uf,
}

impl GroupBy {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pais" => Ok(GroupBy::Pais),
            "uf" => Ok(GroupBy::Uf),
            other => Err(IncomeError::Config(format!("invalid group-by: {other}"))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GroupBy::Pais => "pais",
            GroupBy::Uf => "uf",
        }
    }
}

// ── Finalised output ──────────────────────────────────────────────────────────

/// One band of a finalised group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandRow {
    pub range: String,
    pub households: f64,
    pub households_pct: f64,
    pub persons: f64,
    pub persons_pct: f64,
}

/// A finalised aggregate group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStats {
    pub group: String,
    pub label: String,
    pub households_total: f64,
    pub persons_total: f64,
    pub households_sample: u64,
    pub persons_sample: u64,
    pub avg_household_sm: f64,
    pub bands: Vec<BandRow>,
}

impl GroupStats {
    /// `persons_pct` of the band labelled `range`, or `0.0`.
    pub fn band_persons_pct(&self, range: &str) -> f64 {
        self.bands
            .iter()
            .find(|b| b.range == range)
            .map_or(0.0, |b| b.persons_pct)
    }
}

/// The national group plus its distributional estimators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NationalStats {
    #[serde(flatten)]
    pub group: GroupStats,
    pub median_household_sm: f64,
    pub gini_household_sm: f64,
}

// ── Accumulation ──────────────────────────────────────────────────────────────

/// One household's contribution under one comparison mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HouseholdSample {
    pub ratio: f64,
    /// Index into the band specification.
    pub band: usize,
    pub households_weight: f64,
    pub persons_weight: f64,
    pub persons_n: u64,
}

impl HouseholdSample {
    /// Weights follow the run's weighting mode: unweighted runs count each
    /// household once and each member once.
    pub fn new(household: &Household, ratio: f64, band: usize, unweighted: bool) -> Self {
        let (households_weight, persons_weight) = if unweighted {
            (1.0, household.persons_n as f64)
        } else {
            (household.household_weight, household.persons_weight)
        };
        Self {
            ratio,
            band,
            households_weight,
            persons_weight,
            persons_n: household.persons_n,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct BandTally {
    households: f64,
    persons: f64,
}

/// Running totals of one group.
#[derive(Debug, Clone)]
pub struct GroupAccumulator {
    key: GroupKey,
    label: String,
    households_total: f64,
    persons_total: f64,
    households_sample: u64,
    persons_sample: u64,
    sum_ratio: f64,
    bands: Vec<BandTally>,
}

impl GroupAccumulator {
    pub fn new(key: GroupKey, label: impl Into<String>, band_count: usize) -> Self {
        Self {
            key,
            label: label.into(),
            households_total: 0.0,
            persons_total: 0.0,
            households_sample: 0,
            persons_sample: 0,
            sum_ratio: 0.0,
            bands: vec![BandTally::default(); band_count],
        }
    }

    pub fn add(&mut self, sample: &HouseholdSample) {
        self.households_total += sample.households_weight;
        self.persons_total += sample.persons_weight;
        self.households_sample += 1;
        self.persons_sample += sample.persons_n;
        self.sum_ratio += sample.ratio * sample.households_weight;
        if let Some(band) = self.bands.get_mut(sample.band) {
            band.households += sample.households_weight;
            band.persons += sample.persons_weight;
        }
    }

    /// Percentages are rounded to 4 places and the average ratio to 6; both
    /// are `0.0` for an empty group.
    pub fn finalize(&self, spec: &BandSpec) -> GroupStats {
        let bands = spec
            .bands()
            .iter()
            .zip(&self.bands)
            .map(|(band, tally)| BandRow {
                range: band.label.clone(),
                households: tally.households,
                households_pct: percentage(tally.households, self.households_total, 4),
                persons: tally.persons,
                persons_pct: percentage(tally.persons, self.persons_total, 4),
            })
            .collect();

        GroupStats {
            group: self.key.code().to_string(),
            label: self.label.clone(),
            households_total: self.households_total,
            persons_total: self.persons_total,
            households_sample: self.households_sample,
            persons_sample: self.persons_sample,
            avg_household_sm: round_to(safe_div(self.sum_ratio, self.households_total), 6),
            bands,
        }
    }
}

/// Household-weighted mean, min and max of a per-household reference value.
/// Non-positive values are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReferenceAccumulator {
    weighted_sum: f64,
    weight_total: f64,
    min: Option<f64>,
    max: Option<f64>,
}

impl ReferenceAccumulator {
    pub fn add(&mut self, value: f64, weight: f64) {
        if value <= 0.0 {
            return;
        }
        self.weighted_sum += value * weight;
        self.weight_total += weight;
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
    }

    pub fn mean(&self) -> f64 {
        safe_div(self.weighted_sum, self.weight_total)
    }

    pub fn min(&self) -> Option<f64> {
        self.min
    }

    pub fn max(&self) -> Option<f64> {
        self.max
    }
}

// ── Hierarchy ─────────────────────────────────────────────────────────────────

/// Finalised national, state and macro-region groups for one mode.
#[derive(Debug, Clone, PartialEq)]
pub struct HierarchyStats {
    pub national: NationalStats,
    /// States in the requested order.
    pub states: Vec<GroupStats>,
    /// Macro-regions in their fixed geographic order.
    pub macro_regions: Vec<GroupStats>,
}

/// Folds households into the national group, their state and their
/// macro-region simultaneously.
pub struct HierarchyAggregator<'a> {
    spec: &'a BandSpec,
    national: GroupAccumulator,
    states: OrderedMap<GroupKey, GroupAccumulator>,
    regions: OrderedMap<GroupKey, GroupAccumulator>,
    ratio_pairs: Vec<(f64, f64)>,
}

impl<'a> HierarchyAggregator<'a> {
    pub fn new(spec: &'a BandSpec) -> Self {
        Self {
            spec,
            national: GroupAccumulator::new(GroupKey::National, NATIONAL_LABEL, spec.len()),
            states: OrderedMap::new(),
            regions: OrderedMap::new(),
            ratio_pairs: Vec::new(),
        }
    }

    pub fn add(&mut self, household: &Household, sample: &HouseholdSample) {
        let n = self.spec.len();
        self.national.add(sample);
        self.ratio_pairs.push((sample.ratio, sample.households_weight));

        let state = GroupKey::State(household.uf_code.clone());
        self.states
            .get_or_insert_with(state.clone(), || {
                GroupAccumulator::new(state, household.uf_label.clone(), n)
            })
            .add(sample);

        let region = household.macro_region;
        let key = GroupKey::MacroRegion(region.to_string());
        self.regions
            .get_or_insert_with(key.clone(), || GroupAccumulator::new(key, region, n))
            .add(sample);
    }

    pub fn finish(self, order: UfOrder) -> HierarchyStats {
        let national = NationalStats {
            group: self.national.finalize(self.spec),
            median_household_sm: round_to(weighted_median(&self.ratio_pairs), 6),
            gini_household_sm: round_to(weighted_gini(&self.ratio_pairs), 6),
        };

        let mut states: Vec<GroupStats> = self.states.values().map(|g| g.finalize(self.spec)).collect();
        sort_states(&mut states, order);

        let mut macro_regions: Vec<GroupStats> =
            self.regions.values().map(|g| g.finalize(self.spec)).collect();
        macro_regions.sort_by_key(|g| macro_region_rank(&g.group));

        HierarchyStats {
            national,
            states,
            macro_regions,
        }
    }
}

/// Order finalised state groups. Ties fall back to the state code.
pub fn sort_states(rows: &mut [GroupStats], order: UfOrder) {
    match order {
        UfOrder::Alfabetica => rows.sort_by(|a, b| {
            a.label
                .to_lowercase()
                .cmp(&b.label.to_lowercase())
                .then_with(|| a.group.cmp(&b.group))
        }),
        UfOrder::Codigo => rows.sort_by(|a, b| a.group.cmp(&b.group)),
        UfOrder::RendaAsc => rows.sort_by(|a, b| {
            a.avg_household_sm
                .total_cmp(&b.avg_household_sm)
                .then_with(|| a.group.cmp(&b.group))
        }),
        UfOrder::RendaDesc => rows.sort_by(|a, b| {
            b.avg_household_sm
                .total_cmp(&a.avg_household_sm)
                .then_with(|| a.group.cmp(&b.group))
        }),
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use income_core::models::{HouseholdId, MonthKey};

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn household(id: &str, uf: &str, label: &str, weight: f64, persons: u64) -> Household {
        Household {
            id: HouseholdId::new(id),
            uf_code: uf.to_string(),
            uf_label: label.to_string(),
            macro_region: income_core::regions::macro_region_for(uf),
            period: MonthKey::new(2025, 6),
            persons_n: persons,
            persons_weight: weight * persons as f64,
            household_weight: weight,
            income_nominal: 0.0,
            income_target: 0.0,
            factor: 1.0,
            sm_period: 1518.0,
            dimensions: Vec::new(),
        }
    }

    fn group(code: &str, label: &str, avg: f64) -> GroupStats {
        GroupStats {
            group: code.to_string(),
            label: label.to_string(),
            households_total: 0.0,
            persons_total: 0.0,
            households_sample: 0,
            persons_sample: 0,
            avg_household_sm: avg,
            bands: Vec::new(),
        }
    }

    fn codes(rows: &[GroupStats]) -> Vec<&str> {
        rows.iter().map(|r| r.group.as_str()).collect()
    }

    /// Households weighted 100 (two members), 50 and 10 at ratios in the
    /// first, second and last default bands.
    fn fixture() -> HierarchyStats {
        let spec = BandSpec::default();
        let mut agg = HierarchyAggregator::new(&spec);
        let rows = [
            (household("d1", "35", "SP", 100.0, 2), 1000.0 / 1518.0),
            (household("d2", "33", "RJ", 50.0, 1), 6000.0 / 1518.0),
            (household("d3", "33", "RJ", 10.0, 1), 30000.0 / 1518.0),
        ];
        for (h, ratio) in &rows {
            let band = spec.classify_index(*ratio);
            agg.add(h, &HouseholdSample::new(h, *ratio, band, false));
        }
        agg.finish(UfOrder::RendaDesc)
    }

    // ── Mode parsing ─────────────────────────────────────────────────────────

    #[test]
    fn test_sm_mode_expansion() {
        assert_eq!(
            SmMode::parse("both").unwrap().modes(),
            vec![ComparisonMode::Periodo, ComparisonMode::Alvo]
        );
        assert_eq!(SmMode::parse("alvo").unwrap().modes(), vec![ComparisonMode::Alvo]);
        assert!(SmMode::parse("x").is_err());
    }

    #[test]
    fn test_order_and_group_by_round_trip_names() {
        for name in ["renda_desc", "renda_asc", "alfabetica", "codigo"] {
            assert_eq!(UfOrder::parse(name).unwrap().as_str(), name);
        }
        assert_eq!(GroupBy::parse("uf").unwrap(), GroupBy::Uf);
        assert!(GroupBy::parse("municipio").is_err());
    }

    // ── Finalisation ─────────────────────────────────────────────────────────

    #[test]
    fn test_national_totals_and_percentages() {
        let stats = fixture();
        let n = &stats.national.group;
        assert_eq!(n.group, "BR");
        assert_eq!(n.label, "Brasil");
        assert!((n.households_total - 160.0).abs() < 1e-9);
        assert!((n.persons_total - 260.0).abs() < 1e-9);
        assert_eq!(n.households_sample, 3);
        assert_eq!(n.persons_sample, 4);

        let hh: Vec<f64> = n.bands.iter().map(|b| b.households_pct).collect();
        assert_eq!(hh, vec![62.5, 31.25, 0.0, 6.25]);
        let pp: Vec<f64> = n.bands.iter().map(|b| b.persons_pct).collect();
        assert_eq!(pp, vec![76.9231, 19.2308, 0.0, 3.8462]);

        let sum: f64 = hh.iter().sum();
        assert!((sum - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_national_median_and_gini() {
        let stats = fixture();
        assert!((stats.national.median_household_sm - 0.658762).abs() < 1e-6);
        assert!(stats.national.gini_household_sm > 0.0 && stats.national.gini_household_sm < 1.0);
    }

    #[test]
    fn test_state_and_region_groups() {
        let stats = fixture();
        assert_eq!(codes(&stats.states), vec!["33", "35"]);
        let rj = &stats.states[0];
        assert_eq!(rj.label, "RJ");
        assert!((rj.households_total - 60.0).abs() < 1e-9);
        assert_eq!(codes(&stats.macro_regions), vec!["Sudeste"]);
    }

    #[test]
    fn test_groups_keyed_by_group_key_in_first_seen_order() {
        let spec = BandSpec::default();
        let mut agg = HierarchyAggregator::new(&spec);
        for h in [
            household("d1", "35", "SP", 1.0, 1),
            household("d2", "13", "AM", 1.0, 1),
            household("d3", "35", "SP", 1.0, 1),
        ] {
            agg.add(&h, &HouseholdSample::new(&h, 1.0, 1, false));
        }

        let states: Vec<&GroupKey> = agg.states.keys().collect();
        assert_eq!(
            states,
            vec![&GroupKey::State("35".into()), &GroupKey::State("13".into())]
        );
        let regions: Vec<&GroupKey> = agg.regions.keys().collect();
        assert_eq!(
            regions,
            vec![
                &GroupKey::MacroRegion("Sudeste".into()),
                &GroupKey::MacroRegion("Norte".into())
            ]
        );
        let sp = agg.states.get(&GroupKey::State("35".into())).unwrap();
        assert_eq!(sp.finalize(&spec).households_sample, 2);
    }

    #[test]
    fn test_empty_group_finalizes_to_zero() {
        let spec = BandSpec::default();
        let g = GroupAccumulator::new(GroupKey::State("11".into()), "RO", spec.len()).finalize(&spec);
        assert_eq!(g.avg_household_sm, 0.0);
        assert!(g.bands.iter().all(|b| b.households_pct == 0.0 && b.persons_pct == 0.0));
        assert_eq!(g.bands.len(), 4);
    }

    #[test]
    fn test_unweighted_sample_counts_people() {
        let h = household("d1", "35", "SP", 123.0, 3);
        let s = HouseholdSample::new(&h, 1.0, 0, true);
        assert_eq!(s.households_weight, 1.0);
        assert_eq!(s.persons_weight, 3.0);
    }

    #[test]
    fn test_band_persons_pct_lookup() {
        let stats = fixture();
        assert_eq!(stats.national.group.band_persons_pct("10+"), 3.8462);
        assert_eq!(stats.national.group.band_persons_pct("nope"), 0.0);
    }

    // ── Ordering ─────────────────────────────────────────────────────────────

    #[test]
    fn test_sort_states_orders() {
        let base = vec![
            group("35", "Sao Paulo", 2.0),
            group("33", "Rio de Janeiro", 1.0),
            group("11", "acre", 2.0),
        ];

        let mut rows = base.clone();
        sort_states(&mut rows, UfOrder::RendaDesc);
        assert_eq!(codes(&rows), vec!["11", "35", "33"]);

        let mut rows = base.clone();
        sort_states(&mut rows, UfOrder::RendaAsc);
        assert_eq!(codes(&rows), vec!["33", "11", "35"]);

        let mut rows = base.clone();
        sort_states(&mut rows, UfOrder::Alfabetica);
        assert_eq!(codes(&rows), vec!["11", "33", "35"]);

        let mut rows = base;
        sort_states(&mut rows, UfOrder::Codigo);
        assert_eq!(codes(&rows), vec!["11", "33", "35"]);
    }

    #[test]
    fn test_macro_regions_in_geographic_order() {
        let spec = BandSpec::default();
        let mut agg = HierarchyAggregator::new(&spec);
        for (id, uf) in [("a", "43"), ("b", "99"), ("c", "11"), ("d", "29")] {
            let h = household(id, uf, uf, 1.0, 1);
            agg.add(&h, &HouseholdSample::new(&h, 1.0, 0, false));
        }
        let stats = agg.finish(UfOrder::Codigo);
        assert_eq!(
            codes(&stats.macro_regions),
            vec!["Norte", "Nordeste", "Sul", "Desconhecida"]
        );
    }

    // ── ReferenceAccumulator ─────────────────────────────────────────────────

    #[test]
    fn test_reference_accumulator() {
        let mut acc = ReferenceAccumulator::default();
        assert_eq!(acc.mean(), 0.0);
        assert_eq!(acc.min(), None);

        acc.add(1412.0, 1.0);
        acc.add(1518.0, 3.0);
        acc.add(0.0, 100.0);
        assert!((acc.mean() - (1412.0 + 3.0 * 1518.0) / 4.0).abs() < 1e-9);
        assert_eq!(acc.min(), Some(1412.0));
        assert_eq!(acc.max(), Some(1518.0));
    }
}
