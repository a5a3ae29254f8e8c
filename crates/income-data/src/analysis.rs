//! Report pipelines.
//!
//! Orchestrates series loading, household reconstruction, aggregation and
//! post-processing, returning serializable payloads ready for output.

use std::path::{Path, PathBuf};

use income_core::bands::{Band, BandSpec};
use income_core::deflator::DeflationFactorTable;
use income_core::error::{IncomeError, Result};
use income_core::formatting::{round_to, safe_div};
use income_core::models::{GroupKey, MonthKey, OrderedMap, NATIONAL_LABEL};
use income_core::reference::ReferenceSeries;
use income_core::settings::{BandReportArgs, DashboardArgs, SourceArgs};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::aggregator::{
    sort_states, ComparisonMode, GroupAccumulator, GroupBy, GroupStats, HierarchyAggregator,
    HouseholdSample, NationalStats, ReferenceAccumulator, SmMode, UfOrder,
};
use crate::columns::ColumnMap;
use crate::crosstab::{CrossRow, CrossTabulator, DistributionRow};
use crate::households::{
    parse_state_filter, reconstruct, Household, Reconstruction, ReconstructionOptions, SkipCounters,
};
use crate::insights::{ranges_money, BandMoney, Insights, Rankings};
use crate::reader::{read_ipca_csv, read_reference_csv, CsvSource};

/// Group code used in the band report for households without a state code.
const UNKNOWN_UF: &str = "UF?";

// ── Requests ──────────────────────────────────────────────────────────────────

/// Options shared by both reports, with every enumerated value validated.
#[derive(Debug, Clone)]
pub struct ReportSource {
    pub input: PathBuf,
    pub ipca_csv: PathBuf,
    pub salario_minimo_csv: PathBuf,
    /// `YYYY-MM`; blank selects the latest IPCA month.
    pub target: String,
    pub ranges: BandSpec,
    pub uf_order: UfOrder,
    pub state: String,
    pub income_col: Option<String>,
    pub weight_col: Option<String>,
    pub unweighted: bool,
}

impl ReportSource {
    pub fn from_args(args: &SourceArgs) -> Result<Self> {
        Ok(Self {
            input: args.input.clone(),
            ipca_csv: args.ipca_csv.clone(),
            salario_minimo_csv: args.salario_minimo_csv.clone(),
            target: args.target.clone(),
            ranges: BandSpec::parse(&args.ranges)?,
            uf_order: UfOrder::parse(&args.uf_order)?,
            state: args.state.clone(),
            income_col: args.income_col.clone(),
            weight_col: args.weight_col.clone(),
            unweighted: args.unweighted,
        })
    }

    fn weighting_mode(&self) -> &'static str {
        if self.unweighted {
            "unweighted"
        } else {
            "weighted"
        }
    }
}

#[derive(Debug, Clone)]
pub struct DashboardRequest {
    pub source: ReportSource,
    pub sm_mode: SmMode,
}

impl DashboardRequest {
    pub fn from_args(args: &DashboardArgs) -> Result<Self> {
        Ok(Self {
            source: ReportSource::from_args(&args.source)?,
            sm_mode: SmMode::parse(&args.sm_mode)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct BandReportRequest {
    pub source: ReportSource,
    pub group_by: GroupBy,
}

impl BandReportRequest {
    pub fn from_args(args: &BandReportArgs) -> Result<Self> {
        Ok(Self {
            source: ReportSource::from_args(&args.source)?,
            group_by: GroupBy::parse(&args.group_by)?,
        })
    }
}

// ── Dashboard payload ─────────────────────────────────────────────────────────

/// Everything computed for one comparison mode.
#[derive(Debug, Clone, Serialize)]
pub struct ModeReport {
    pub national: NationalStats,
    pub uf: Vec<GroupStats>,
    pub macro_regions: Vec<GroupStats>,
    pub top5_uf: Vec<GroupStats>,
    pub bottom5_uf: Vec<GroupStats>,
    pub top10_uf_income: Vec<GroupStats>,
    pub bottom10_uf_income: Vec<GroupStats>,
    pub top10_uf_population: Vec<GroupStats>,
    pub top10_uf_low_income: Vec<GroupStats>,
    pub top10_uf_high_income: Vec<GroupStats>,
    pub sm_reference_value: f64,
    pub sm_reference_month: String,
    pub sm_reference_min: Option<f64>,
    pub sm_reference_max: Option<f64>,
    pub ranges_money: Vec<BandMoney>,
    pub insights: Insights,
    pub demographics: OrderedMap<String, Vec<DistributionRow>>,
    pub dimensions: Vec<String>,
    pub cross: OrderedMap<String, Vec<CrossRow>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardMetadata {
    pub rows_read: u64,
    pub households: usize,
    pub states_covered: usize,
    pub dimensions: Vec<String>,
    #[serde(flatten)]
    pub counters: SkipCounters,
    pub ipca_csv: String,
    pub salario_minimo_csv: String,
}

/// The complete output of [`build_dashboard_payload`].
#[derive(Debug, Clone, Serialize)]
pub struct DashboardPayload {
    pub input: String,
    pub target: MonthKey,
    pub sm_target_month: MonthKey,
    pub sm_target_value: f64,
    pub sm_mode: &'static str,
    pub uf_order: &'static str,
    pub ranges: Vec<String>,
    pub range_specs: Vec<Band>,
    pub income_col: String,
    pub weight_col: Option<String>,
    pub weighting_mode: &'static str,
    pub dimension_labels: OrderedMap<String, String>,
    pub modes: OrderedMap<String, ModeReport>,
    pub metadata: DashboardMetadata,
}

// ── Band report payload ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct BandReportMetadata {
    pub rows_read: u64,
    pub households: usize,
    #[serde(flatten)]
    pub counters: SkipCounters,
    pub ipca_csv: String,
    pub salario_minimo_csv: String,
    pub method_income: &'static str,
    pub method_ratio: &'static str,
    pub weights: &'static str,
}

/// The complete output of [`build_band_report`].
#[derive(Debug, Clone, Serialize)]
pub struct BandReport {
    pub input: String,
    pub income_col: String,
    pub weight_col: Option<String>,
    pub weighting_mode: &'static str,
    pub target: MonthKey,
    pub sm_reference_value: f64,
    pub sm_reference_mode: &'static str,
    pub sm_reference_min: Option<f64>,
    pub sm_reference_max: Option<f64>,
    pub group_by: &'static str,
    pub uf_order: Option<&'static str>,
    pub ranges: Vec<String>,
    pub range_specs: Vec<Band>,
    pub ranges_money: Vec<BandMoney>,
    pub groups: Vec<GroupStats>,
    pub metadata: BandReportMetadata,
}

// ── Shared loading ────────────────────────────────────────────────────────────

/// Deflation factors and the minimum-wage series resolved for one run.
struct SeriesContext {
    target: MonthKey,
    factors: DeflationFactorTable,
    reference: ReferenceSeries,
}

/// Minimum wage in effect at the target month.
#[derive(Debug, Clone, Copy)]
struct TargetWage {
    month: MonthKey,
    value: f64,
}

impl TargetWage {
    fn resolve(series: &SeriesContext) -> Result<Self> {
        let (month, value) = series.reference.at_or_before(series.target)?;
        debug!("Minimum wage at {}: {value} from {month}", series.target);
        Ok(Self { month, value })
    }
}

/// Resolve the target month: the trimmed `requested` value, or the latest
/// month of the price index when blank.
fn load_series(source: &ReportSource) -> Result<SeriesContext> {
    let index = read_ipca_csv(&source.ipca_csv)?;
    let requested = source.target.trim();
    let target = if requested.is_empty() {
        index
            .latest_month()
            .ok_or_else(|| IncomeError::EmptyIndexSeries(source.ipca_csv.clone()))?
    } else {
        MonthKey::parse(requested)?
    };
    let factors = index.deflators_to(target)?;
    let reference = read_reference_csv(&source.salario_minimo_csv)?;
    debug!("Target {target}: {} factors", factors.len());
    Ok(SeriesContext {
        target,
        factors,
        reference,
    })
}

/// Open the input, resolve its columns and reconstruct households.
fn load_households(
    source: &ReportSource,
    series: &SeriesContext,
    track_dimensions: bool,
) -> Result<(ColumnMap, Reconstruction)> {
    if !source.input.exists() {
        return Err(IncomeError::InputNotFound(source.input.clone()));
    }
    let mut csv = CsvSource::open(&source.input)?;
    let columns = ColumnMap::resolve(
        csv.headers(),
        source.income_col.as_deref(),
        source.weight_col.as_deref(),
        source.unweighted,
    )?;
    let options = ReconstructionOptions {
        state_filter: parse_state_filter(&source.state),
        unweighted: source.unweighted,
        track_dimensions,
    };
    let reconstruction = reconstruct(&mut csv, &columns, &series.factors, &series.reference, &options)?;
    info!(
        "Read {} rows into {} households",
        reconstruction.rows_read,
        reconstruction.households.len()
    );
    Ok((columns, reconstruction))
}

fn path_string(path: &Path) -> String {
    path.display().to_string()
}

// ── Dashboard ─────────────────────────────────────────────────────────────────

/// Run the dashboard pipeline.
///
/// 1. Resolve the target month, deflation factors, the minimum-wage series
///    and the minimum wage in effect at the target month.
/// 2. Reconstruct households from the input, tallying every active dimension.
/// 3. For each comparison mode, aggregate, cross-tabulate and rank.
/// 4. Assemble the payload.
pub fn build_dashboard_payload(request: &DashboardRequest) -> Result<DashboardPayload> {
    let source = &request.source;
    let spec = &source.ranges;

    // ── Step 1: Series ────────────────────────────────────────────────────────
    let series = load_series(source)?;
    let wage = TargetWage::resolve(&series)?;

    // ── Step 2: Households ────────────────────────────────────────────────────
    let (columns, reconstruction) = load_households(source, &series, true)?;
    let dimension_keys = columns.dimension_keys();

    // ── Step 3: Modes ─────────────────────────────────────────────────────────
    let modes: OrderedMap<String, ModeReport> = request
        .sm_mode
        .modes()
        .into_iter()
        .map(|mode| {
            let report = build_mode_report(
                mode,
                &reconstruction,
                wage,
                spec,
                source.uf_order,
                source.unweighted,
                &dimension_keys,
            );
            (mode.as_str().to_string(), report)
        })
        .collect();

    // ── Step 4: Payload ───────────────────────────────────────────────────────
    let dimension_labels = columns
        .dimensions
        .iter()
        .map(|d| (d.dimension.key().to_string(), d.dimension.display_label().to_string()))
        .collect();

    let metadata = DashboardMetadata {
        rows_read: reconstruction.rows_read,
        households: reconstruction.households.len(),
        states_covered: reconstruction.states_covered(),
        dimensions: dimension_keys,
        counters: reconstruction.counters.clone(),
        ipca_csv: path_string(&source.ipca_csv),
        salario_minimo_csv: path_string(&source.salario_minimo_csv),
    };

    Ok(DashboardPayload {
        input: path_string(&source.input),
        target: series.target,
        sm_target_month: wage.month,
        sm_target_value: wage.value,
        sm_mode: request.sm_mode.as_str(),
        uf_order: source.uf_order.as_str(),
        ranges: spec.labels().map(str::to_string).collect(),
        range_specs: spec.bands().to_vec(),
        income_col: columns.income_col,
        weight_col: columns.weight_col,
        weighting_mode: source.weighting_mode(),
        dimension_labels,
        modes,
        metadata,
    })
}

/// Ratio of a household's income to the minimum wage under `mode`, and the
/// per-household reference value the mode compares against.
fn mode_ratio(mode: ComparisonMode, household: &Household, sm_target_value: f64) -> (f64, f64) {
    match mode {
        ComparisonMode::Periodo => (
            safe_div(household.income_nominal, household.sm_period),
            household.sm_period,
        ),
        ComparisonMode::Alvo => (
            safe_div(household.income_target, sm_target_value),
            sm_target_value,
        ),
    }
}

fn build_mode_report(
    mode: ComparisonMode,
    reconstruction: &Reconstruction,
    wage: TargetWage,
    spec: &BandSpec,
    uf_order: UfOrder,
    unweighted: bool,
    dimension_keys: &[String],
) -> ModeReport {
    let mut hierarchy = HierarchyAggregator::new(spec);
    let mut crosstab = CrossTabulator::new(dimension_keys.to_vec(), spec.len());
    let mut reference = ReferenceAccumulator::default();

    for household in reconstruction.households.values() {
        let (ratio, sm_value) = mode_ratio(mode, household, wage.value);
        let band = spec.classify_index(ratio.max(0.0));
        let sample = HouseholdSample::new(household, ratio, band, unweighted);
        hierarchy.add(household, &sample);
        crosstab.add(household, band);
        reference.add(sm_value, sample.households_weight);
    }

    let stats = hierarchy.finish(uf_order);
    let rankings = Rankings::build(&stats.states, spec);

    let mean = reference.mean();
    let sm_reference = if mean > 0.0 { mean } else { wage.value };
    let money = ranges_money(spec, sm_reference);
    let insights = Insights::build(&stats.national, &rankings, &money, spec);
    let demographics = crosstab.demographics(stats.national.group.persons_total);
    let cross = crosstab.cross(spec);

    let sm_reference_month = match mode {
        ComparisonMode::Alvo => wage.month.to_string(),
        ComparisonMode::Periodo => "periodo_medio".to_string(),
    };
    debug!(
        "Mode {}: {} states, {} macro-regions",
        mode.as_str(),
        stats.states.len(),
        stats.macro_regions.len()
    );

    ModeReport {
        top5_uf: rankings.top5(),
        bottom5_uf: rankings.bottom5(),
        top10_uf_income: rankings.top10_income,
        bottom10_uf_income: rankings.bottom10_income,
        top10_uf_population: rankings.top10_population,
        top10_uf_low_income: rankings.top10_low_income,
        top10_uf_high_income: rankings.top10_high_income,
        national: stats.national,
        uf: stats.states,
        macro_regions: stats.macro_regions,
        sm_reference_value: round_to(sm_reference, 2),
        sm_reference_month,
        sm_reference_min: reference.min().map(|v| round_to(v, 2)),
        sm_reference_max: reference.max().map(|v| round_to(v, 2)),
        ranges_money: money,
        insights,
        demographics,
        dimensions: dimension_keys.to_vec(),
        cross,
    }
}

// ── Band report ───────────────────────────────────────────────────────────────

/// Run the band report: each household's deflated income over its own
/// period's minimum wage expressed in target-month prices.
pub fn build_band_report(request: &BandReportRequest) -> Result<BandReport> {
    let source = &request.source;
    let spec = &source.ranges;

    // ── Step 1: Series ────────────────────────────────────────────────────────
    let series = load_series(source)?;

    // ── Step 2: Households ────────────────────────────────────────────────────
    let (columns, reconstruction) = load_households(source, &series, false)?;

    // ── Step 3: Groups ────────────────────────────────────────────────────────
    let mut groups: OrderedMap<GroupKey, GroupAccumulator> = OrderedMap::new();
    let mut reference = ReferenceAccumulator::default();
    let mut unclassified = 0u64;

    for household in reconstruction.households.values() {
        let (key, label) = match request.group_by {
            GroupBy::Pais => (GroupKey::National, NATIONAL_LABEL.to_string()),
            GroupBy::Uf => {
                let code = if household.uf_code.is_empty() {
                    UNKNOWN_UF.to_string()
                } else {
                    household.uf_code.clone()
                };
                let label = if household.uf_label.is_empty() {
                    code.clone()
                } else {
                    household.uf_label.clone()
                };
                (GroupKey::State(code), label)
            }
        };
        let group = groups.get_or_insert_with(key.clone(), || GroupAccumulator::new(key, label, spec.len()));

        let sm_target = household.sm_period_deflated();
        if sm_target <= 0.0 {
            unclassified += 1;
            continue;
        }
        let ratio = household.income_target / sm_target;
        let sample = HouseholdSample::new(household, ratio, spec.classify_index(ratio), source.unweighted);
        group.add(&sample);
        reference.add(sm_target, sample.households_weight);
    }
    if unclassified > 0 {
        warn!("{unclassified} households had a non-positive deflated minimum wage and were not classified");
    }

    let mut rows: Vec<GroupStats> = groups.values().map(|g| g.finalize(spec)).collect();
    match request.group_by {
        GroupBy::Uf => sort_states(&mut rows, source.uf_order),
        GroupBy::Pais => rows.sort_by(|a, b| a.group.cmp(&b.group)),
    }

    // ── Step 4: Payload ───────────────────────────────────────────────────────
    let mean = reference.mean();
    let sm_reference = if mean > 0.0 { mean } else { 0.0 };

    let metadata = BandReportMetadata {
        rows_read: reconstruction.rows_read,
        households: reconstruction.households.len(),
        counters: reconstruction.counters.clone(),
        ipca_csv: path_string(&source.ipca_csv),
        salario_minimo_csv: path_string(&source.salario_minimo_csv),
        method_income: "sum of individual income by dom_id",
        method_ratio: "household_income_deflated / salario_minimo_deflated",
        weights: "weighted by V1028/V1027 unless --unweighted",
    };

    Ok(BandReport {
        input: path_string(&source.input),
        income_col: columns.income_col,
        weight_col: columns.weight_col,
        weighting_mode: source.weighting_mode(),
        target: series.target,
        sm_reference_value: round_to(sm_reference, 2),
        sm_reference_mode: "periodo_deflacionado",
        sm_reference_min: reference.min().map(|v| round_to(v, 2)),
        sm_reference_max: reference.max().map(|v| round_to(v, 2)),
        group_by: request.group_by.as_str(),
        uf_order: match request.group_by {
            GroupBy::Uf => Some(source.uf_order.as_str()),
            GroupBy::Pais => None,
        },
        ranges: spec.labels().map(str::to_string).collect(),
        range_specs: spec.bands().to_vec(),
        ranges_money: ranges_money(spec, sm_reference),
        groups: rows,
        metadata,
    })
}

// ── Output ────────────────────────────────────────────────────────────────────

/// Serialize `value` as pretty JSON, or on a single line when `compact`.
pub fn to_json<T: Serialize>(value: &T, compact: bool) -> Result<String> {
    let json = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    Ok(json)
}

/// Write `json` to `path`, creating parent directories as needed.
pub fn write_json(path: &Path, json: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| IncomeError::FileWrite {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, json).map_err(|source| IncomeError::FileWrite {
        path: path.to_path_buf(),
        source,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const HEADER: &str = "Ano__ano_de_referncia,Trimestre__trimestre_de_referncia,\
UF__unidade_da_federao,UF_label,dom_id,V1028,VD4020__rendim_efetivo_qq_trabalho";

    const ROWS: &[&str] = &[
        "2025,2,35,SP,d1,100,1000",
        "2025,2,35,SP,d1,100,",
        "2025,2,33,RJ,d2,50,6000",
        "2025,2,33,RJ,d3,10,30000",
    ];

    fn write(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, lines.join("\n") + "\n").unwrap();
        path
    }

    fn source(dir: &TempDir, header: &str, rows: &[&str]) -> ReportSource {
        let mut lines = vec![header];
        lines.extend_from_slice(rows);
        ReportSource {
            input: write(dir.path(), "base.csv", &lines),
            ipca_csv: write(dir.path(), "ipca.csv", &["date,index", "2025-06,100", "2025-07,110"]),
            salario_minimo_csv: write(dir.path(), "sm.csv", &["date,value", "2025-06,1518.00"]),
            target: "2025-07".to_string(),
            ranges: BandSpec::default(),
            uf_order: UfOrder::RendaDesc,
            state: String::new(),
            income_col: None,
            weight_col: None,
            unweighted: false,
        }
    }

    fn band_report(source: ReportSource, group_by: GroupBy) -> Result<BandReport> {
        build_band_report(&BandReportRequest { source, group_by })
    }

    fn dashboard(source: ReportSource, sm_mode: SmMode) -> Result<DashboardPayload> {
        build_dashboard_payload(&DashboardRequest { source, sm_mode })
    }

    fn pcts(group: &GroupStats, households: bool) -> Vec<f64> {
        group
            .bands
            .iter()
            .map(|b| if households { b.households_pct } else { b.persons_pct })
            .collect()
    }

    // ── Band report ──────────────────────────────────────────────────────────

    #[test]
    fn test_band_report_national() {
        let dir = TempDir::new().unwrap();
        let report = band_report(source(&dir, HEADER, ROWS), GroupBy::Pais).unwrap();

        assert_eq!(report.groups.len(), 1);
        let g = &report.groups[0];
        assert_eq!(g.group, "BR");
        assert_eq!(g.label, "Brasil");
        assert!((g.households_total - 160.0).abs() < 1e-9);
        assert!((g.persons_total - 260.0).abs() < 1e-9);
        assert_eq!(g.households_sample, 3);
        assert_eq!(g.persons_sample, 4);
        assert_eq!(pcts(g, true), vec![62.5, 31.25, 0.0, 6.25]);
        assert_eq!(pcts(g, false), vec![76.9231, 19.2308, 0.0, 3.8462]);

        assert_eq!(report.income_col, "VD4020__rendim_efetivo_qq_trabalho");
        assert_eq!(report.weight_col.as_deref(), Some("V1028"));
        assert_eq!(report.weighting_mode, "weighted");
        assert_eq!(report.uf_order, None);
        assert_eq!(report.metadata.rows_read, 4);
        assert_eq!(report.metadata.households, 3);
    }

    #[test]
    fn test_band_report_reference_is_deflated_period_wage() {
        let dir = TempDir::new().unwrap();
        let report = band_report(source(&dir, HEADER, ROWS), GroupBy::Pais).unwrap();
        assert!((report.sm_reference_value - 1669.8).abs() < 1e-9);
        assert_eq!(report.sm_reference_min, Some(1669.8));
        assert_eq!(report.sm_reference_max, Some(1669.8));
        assert_eq!(report.sm_reference_mode, "periodo_deflacionado");
        assert_eq!(report.ranges_money[0].money_label, "R$ 0,00 a R$ 3.339,60");
    }

    #[test]
    fn test_band_report_state_filter_by_uf() {
        let dir = TempDir::new().unwrap();
        let mut src = source(&dir, HEADER, ROWS);
        src.state = "35".to_string();
        let report = band_report(src, GroupBy::Uf).unwrap();
        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.groups[0].group, "35");
        assert_eq!(report.groups[0].label, "SP");
        assert_eq!(report.uf_order, Some("renda_desc"));
    }

    #[test]
    fn test_band_report_uf_ordering() {
        let dir = TempDir::new().unwrap();
        let rows = ["2025,2,35,SP,a,100,3000", "2025,2,33,RJ,b,100,1000"];

        let report = band_report(source(&dir, HEADER, &rows), GroupBy::Uf).unwrap();
        let codes: Vec<&str> = report.groups.iter().map(|g| g.group.as_str()).collect();
        assert_eq!(codes, vec!["35", "33"]);

        let mut src = source(&dir, HEADER, &rows);
        src.uf_order = UfOrder::Alfabetica;
        let report = band_report(src, GroupBy::Uf).unwrap();
        let codes: Vec<&str> = report.groups.iter().map(|g| g.group.as_str()).collect();
        assert_eq!(codes, vec!["33", "35"]);
    }

    #[test]
    fn test_band_report_missing_weight_column() {
        let dir = TempDir::new().unwrap();
        let header = "Ano,Trimestre,UF,dom_id,VD4020";
        let err = band_report(source(&dir, header, &["2025,2,35,d1,1000"]), GroupBy::Pais).unwrap_err();
        assert!(err.to_string().starts_with("weight column not found"));
    }

    #[test]
    fn test_band_report_unweighted_without_weight_column() {
        let dir = TempDir::new().unwrap();
        let header = "Ano,Trimestre,UF,dom_id,VD4020";
        let mut src = source(&dir, header, &["2025,2,35,d1,1000", "2025,2,35,d1,500"]);
        src.unweighted = true;
        let report = band_report(src, GroupBy::Pais).unwrap();
        let g = &report.groups[0];
        assert!((g.households_total - 1.0).abs() < 1e-9);
        assert!((g.persons_total - 2.0).abs() < 1e-9);
        assert_eq!(report.weight_col, None);
        assert_eq!(report.weighting_mode, "unweighted");
    }

    #[test]
    fn test_band_report_skip_counters_in_metadata() {
        let dir = TempDir::new().unwrap();
        let rows = [
            "2025,2,35,SP,d1,100,1000",
            "x,2,35,SP,d2,100,1000",
            "2025,3,35,SP,d3,100,1000",
            "2025,2,35,SP,d4,,1000",
            "2025,2,35,SP,d5,-1,1000",
        ];
        let report = band_report(source(&dir, HEADER, &rows), GroupBy::Pais).unwrap();
        let c = &report.metadata.counters;
        assert_eq!(report.metadata.rows_read, 5);
        assert_eq!(c.skipped_missing_period, 1);
        assert_eq!(c.skipped_missing_factor, 1);
        assert_eq!(c.skipped_missing_weight, 1);
        assert_eq!(c.skipped_invalid_weight, 1);
        assert_eq!(report.metadata.households, 1);
    }

    #[test]
    fn test_band_report_input_not_found() {
        let dir = TempDir::new().unwrap();
        let mut src = source(&dir, HEADER, ROWS);
        src.input = dir.path().join("missing.csv");
        let err = band_report(src, GroupBy::Pais).unwrap_err();
        assert!(matches!(err, IncomeError::InputNotFound(_)));
        assert!(err.to_string().starts_with("input file not found"));
    }

    #[test]
    fn test_band_report_target_not_in_index() {
        let dir = TempDir::new().unwrap();
        let mut src = source(&dir, HEADER, ROWS);
        src.target = "2030-01".to_string();
        let err = band_report(src, GroupBy::Pais).unwrap_err();
        assert!(matches!(err, IncomeError::TargetNotFound(_)));
    }

    #[test]
    fn test_band_report_target_before_first_minimum_wage() {
        let dir = TempDir::new().unwrap();
        let mut src = source(&dir, HEADER, &["2025,2,35,SP,d1,100,3036"]);
        src.ipca_csv = write(dir.path(), "ipca.csv", &["date,index", "2025-05,100", "2025-06,110"]);
        src.target = "2025-05".to_string();

        let report = band_report(src, GroupBy::Pais).unwrap();
        assert_eq!(report.target, MonthKey::new(2025, 5));
        assert!((report.sm_reference_value - 1380.0).abs() < 1e-9);
        assert_eq!(report.groups[0].households_sample, 1);
        assert!((report.groups[0].avg_household_sm - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_dashboard_needs_minimum_wage_at_target() {
        let dir = TempDir::new().unwrap();
        let mut src = source(&dir, HEADER, ROWS);
        src.ipca_csv = write(dir.path(), "ipca.csv", &["date,index", "2025-05,100", "2025-06,110"]);
        src.target = "2025-05".to_string();

        let err = dashboard(src, SmMode::Alvo).unwrap_err();
        assert!(matches!(err, IncomeError::NoReferenceValueAvailable(m) if m == MonthKey::new(2025, 5)));
    }

    #[test]
    fn test_band_report_json_fields() {
        let dir = TempDir::new().unwrap();
        let report = band_report(source(&dir, HEADER, ROWS), GroupBy::Pais).unwrap();
        let v: serde_json::Value = serde_json::from_str(&to_json(&report, true).unwrap()).unwrap();
        assert_eq!(v["target"], "2025-07");
        assert_eq!(v["group_by"], "pais");
        assert!(v["uf_order"].is_null());
        assert_eq!(v["ranges"][3], "10+");
        assert!(v["range_specs"][3]["max"].is_null());
        assert_eq!(v["metadata"]["skipped_missing_sm"], 0);
        assert_eq!(v["metadata"]["method_income"], "sum of individual income by dom_id");
    }

    // ── Dashboard ────────────────────────────────────────────────────────────

    #[test]
    fn test_dashboard_alvo_national_matches_fixture() {
        let dir = TempDir::new().unwrap();
        let payload = dashboard(source(&dir, HEADER, ROWS), SmMode::Alvo).unwrap();

        assert_eq!(payload.target, MonthKey::new(2025, 7));
        assert_eq!(payload.sm_target_month, MonthKey::new(2025, 6));
        assert!((payload.sm_target_value - 1518.0).abs() < 1e-9);
        assert_eq!(payload.modes.len(), 1);

        let alvo = payload.modes.get("alvo").unwrap();
        let n = &alvo.national.group;
        assert_eq!(pcts(n, true), vec![62.5, 31.25, 0.0, 6.25]);
        assert_eq!(pcts(n, false), vec![76.9231, 19.2308, 0.0, 3.8462]);
        assert_eq!(alvo.sm_reference_month, "2025-06");
        assert!((alvo.sm_reference_value - 1518.0).abs() < 1e-9);
        assert_eq!(alvo.uf.len(), 2);
        assert_eq!(alvo.macro_regions.len(), 1);
        assert_eq!(alvo.macro_regions[0].group, "Sudeste");
    }

    #[test]
    fn test_dashboard_both_modes_in_order() {
        let dir = TempDir::new().unwrap();
        let payload = dashboard(source(&dir, HEADER, ROWS), SmMode::Both).unwrap();
        let keys: Vec<&String> = payload.modes.keys().collect();
        assert_eq!(keys, vec!["periodo", "alvo"]);

        let periodo = payload.modes.get("periodo").unwrap();
        assert_eq!(periodo.sm_reference_month, "periodo_medio");
        assert_eq!(periodo.sm_reference_min, Some(1518.0));
        assert_eq!(pcts(&periodo.national.group, true), vec![62.5, 31.25, 0.0, 6.25]);
    }

    #[test]
    fn test_dashboard_rankings_and_insights() {
        let dir = TempDir::new().unwrap();
        let payload = dashboard(source(&dir, HEADER, ROWS), SmMode::Alvo).unwrap();
        let alvo = payload.modes.get("alvo").unwrap();

        assert_eq!(alvo.top10_uf_income[0].label, "RJ");
        assert_eq!(alvo.bottom10_uf_income[0].label, "SP");
        assert_eq!(alvo.top10_uf_population[0].label, "SP");
        assert_eq!(alvo.insights.richest_uf_by_avg_sm, "RJ");
        assert_eq!(alvo.insights.poorest_uf_by_avg_sm, "SP");
        assert_eq!(alvo.insights.highest_low_income_uf, "SP");
        assert_eq!(alvo.insights.highest_high_income_uf, "RJ");
        assert_eq!(alvo.insights.national_low_income_pct, 76.9231);
        assert_eq!(alvo.top5_uf.len(), 2);
    }

    #[test]
    fn test_dashboard_dimensions_and_metadata() {
        let dir = TempDir::new().unwrap();
        let payload = dashboard(source(&dir, HEADER, ROWS), SmMode::Alvo).unwrap();

        let keys: Vec<&String> = payload.dimension_labels.keys().collect();
        assert_eq!(keys.len(), 6);
        assert_eq!(payload.metadata.dimensions.len(), 6);
        assert_eq!(payload.metadata.states_covered, 2);
        assert_eq!(payload.metadata.households, 3);

        let alvo = payload.modes.get("alvo").unwrap();
        assert_eq!(alvo.dimensions, payload.metadata.dimensions);
        assert_eq!(alvo.cross.len(), 6);
        let macro_rows = alvo.demographics.get("macro_region").unwrap();
        assert_eq!(macro_rows.len(), 1);
        assert_eq!(macro_rows[0].label, "Sudeste");
        assert_eq!(macro_rows[0].pct, 100.0);
    }

    #[test]
    fn test_dashboard_defaults_target_to_latest_ipca_month() {
        let dir = TempDir::new().unwrap();
        let mut src = source(&dir, HEADER, ROWS);
        src.target = "  ".to_string();
        let payload = dashboard(src, SmMode::Alvo).unwrap();
        assert_eq!(payload.target, MonthKey::new(2025, 7));
    }

    #[test]
    fn test_dashboard_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let a = to_json(&dashboard(source(&dir, HEADER, ROWS), SmMode::Both).unwrap(), false).unwrap();
        let b = to_json(&dashboard(source(&dir, HEADER, ROWS), SmMode::Both).unwrap(), false).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_dashboard_json_top_level_order() {
        let dir = TempDir::new().unwrap();
        let json = to_json(&dashboard(source(&dir, HEADER, ROWS), SmMode::Alvo).unwrap(), true).unwrap();
        let fields = ["\"input\"", "\"target\"", "\"sm_target_month\"", "\"modes\"", "\"metadata\""];
        let positions: Vec<usize> = fields.iter().map(|f| json.find(f).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));

        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["weighting_mode"], "weighted");
        assert_eq!(v["modes"]["alvo"]["national"]["group"], "BR");
        assert!(v["modes"]["alvo"]["national"]["median_household_sm"].is_number());
    }

    // ── Output ───────────────────────────────────────────────────────────────

    #[test]
    fn test_write_json_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("report.json");
        write_json(&path, "{}").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "{}");
    }
}
