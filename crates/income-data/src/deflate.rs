//! Deflation tools over CSV files: factor emission and column augmentation.

use std::path::Path;

use csv::ByteRecord;
use income_core::deflator::DeflationFactorTable;
use income_core::error::{IncomeError, Result};
use income_core::models::MonthKey;
use income_core::parsing::{parse_decimal, parse_int};
use tracing::{debug, info};

use crate::columns::find_col;
use crate::reader::{cell, create_writer, finish_writer, write_error, CsvSource};

// ── Factor emission ───────────────────────────────────────────────────────────

/// Write `date,factor_to_target` rows in chronological order. Returns the
/// number of months written.
pub fn emit_factors(factors: &DeflationFactorTable, out: &Path) -> Result<usize> {
    let mut writer = create_writer(out)?;
    writer
        .write_record(["date", "factor_to_target"])
        .map_err(write_error(out))?;
    for (month, factor) in factors.iter() {
        writer
            .write_record([month.to_string(), format!("{factor:.12}")])
            .map_err(write_error(out))?;
    }
    finish_writer(writer, out)?;
    info!("Wrote {} deflators to {}", factors.len(), out.display());
    Ok(factors.len())
}

// ── Column augmentation ───────────────────────────────────────────────────────

/// How rows of the input are mapped to months and which columns are deflated.
#[derive(Debug, Clone, Default)]
pub struct DeflateOptions {
    /// Columns to deflate; empty selects the default income columns.
    pub columns: Vec<String>,
    /// Column holding `YYYY-MM`. Takes precedence over year/quarter.
    pub date_col: Option<String>,
    pub year_col: Option<String>,
    pub quarter_col: Option<String>,
    /// Current minimum wage used for the `_mw` columns.
    pub min_wage: f64,
    /// Suffix of the deflated columns; derived from the target when `None`.
    pub label: Option<String>,
}

/// Outcome of [`apply_deflator`].
#[derive(Debug, Clone, PartialEq)]
pub struct DeflateSummary {
    pub rows: u64,
    pub columns: Vec<String>,
    /// Rows whose period had no deflation factor.
    pub rows_without_factor: u64,
}

/// Suffix of deflated columns for `target`: `2025-07` becomes `202507`.
pub fn deflated_label(target: MonthKey) -> String {
    target.to_string().replace('-', "").to_lowercase()
}

/// The first `VD4019*` and the first `VD4020*` header, in that order.
pub fn default_income_columns(headers: &[String]) -> Vec<String> {
    ["VD4019", "VD4020"]
        .iter()
        .filter_map(|prefix| headers.iter().find(|h| h.starts_with(prefix)).cloned())
        .collect()
}

#[derive(Debug, Clone, Copy)]
enum PeriodSource {
    Date(usize),
    Quarter { year: usize, quarter: usize },
}

impl PeriodSource {
    /// Month of `record`; an unparseable quarter counts as the fourth.
    fn month(self, record: &ByteRecord) -> Option<MonthKey> {
        match self {
            PeriodSource::Date(idx) => MonthKey::parse(&cell(record, Some(idx))).ok(),
            PeriodSource::Quarter { year, quarter } => {
                let year = parse_int(&cell(record, Some(year))).and_then(|y| i32::try_from(y).ok())?;
                let quarter = parse_int(&cell(record, Some(quarter))).unwrap_or(4);
                Some(MonthKey::from_quarter(year, quarter))
            }
        }
    }
}

/// Stream `input` to `out`, appending `{col}_{label}` (deflated, 2 decimals)
/// and `{col}_mw` (deflated over the minimum wage, 6 decimals) per selected
/// column. Cells with no value or no factor stay blank.
pub fn apply_deflator(
    input: &Path,
    out: &Path,
    factors: &DeflationFactorTable,
    options: &DeflateOptions,
) -> Result<DeflateSummary> {
    if options.min_wage.is_nan() || options.min_wage <= 0.0 {
        return Err(IncomeError::Config(format!(
            "--min-wage must be positive, got {}",
            options.min_wage
        )));
    }
    if !input.exists() {
        return Err(IncomeError::InputNotFound(input.to_path_buf()));
    }
    let mut source = CsvSource::open(input)?;
    let headers = source.headers().to_vec();

    let columns = if options.columns.is_empty() {
        let detected = default_income_columns(&headers);
        if detected.is_empty() {
            return Err(IncomeError::NoIncomeColumns);
        }
        detected
    } else {
        options.columns.clone()
    };

    let period = resolve_period(&headers, options);
    let mut missing: Vec<String> = columns
        .iter()
        .filter(|c| !headers.contains(c))
        .cloned()
        .collect();
    let explicit_period = [&options.date_col, &options.year_col, &options.quarter_col];
    missing.extend(
        explicit_period
            .into_iter()
            .flatten()
            .filter(|c| !headers.contains(c))
            .cloned(),
    );
    if !missing.is_empty() {
        return Err(IncomeError::MissingInputColumns(missing));
    }
    let period = period.ok_or(IncomeError::NoPeriodColumns)?;

    let indices: Vec<usize> = columns
        .iter()
        .filter_map(|c| headers.iter().position(|h| h == c))
        .collect();
    let label = options
        .label
        .clone()
        .unwrap_or_else(|| deflated_label(factors.target()));

    let mut out_header = headers.clone();
    for c in &columns {
        out_header.push(format!("{c}_{label}"));
        out_header.push(format!("{c}_mw"));
    }

    let mut writer = create_writer(out)?;
    writer.write_record(&out_header).map_err(write_error(out))?;

    let width = headers.len();
    let mut rows = 0u64;
    let mut rows_without_factor = 0u64;
    for record in source.records() {
        let record = record?;
        rows += 1;

        let factor = period.month(&record).and_then(|m| factors.factor(m));
        if factor.is_none() {
            rows_without_factor += 1;
        }

        let mut row: Vec<String> = (0..width)
            .map(|i| cell(&record, Some(i)).into_owned())
            .collect();
        for &idx in &indices {
            let value = parse_decimal(&cell(&record, Some(idx)));
            match value.zip(factor) {
                Some((value, factor)) => {
                    let adjusted = value * factor;
                    row.push(format!("{adjusted:.2}"));
                    row.push(format!("{:.6}", adjusted / options.min_wage));
                }
                None => {
                    row.push(String::new());
                    row.push(String::new());
                }
            }
        }
        writer.write_record(&row).map_err(write_error(out))?;
    }
    finish_writer(writer, out)?;

    debug!(
        "Deflated {} rows of {} ({} without factor)",
        rows,
        input.display(),
        rows_without_factor
    );
    info!("Wrote deflated CSV to {}", out.display());
    Ok(DeflateSummary {
        rows,
        columns,
        rows_without_factor,
    })
}

/// The period source, or `None` when neither a date column nor both
/// year and quarter columns can be found.
fn resolve_period(headers: &[String], options: &DeflateOptions) -> Option<PeriodSource> {
    let position = |name: &str| headers.iter().position(|h| h == name);

    if let Some(date_col) = &options.date_col {
        return position(date_col).map(PeriodSource::Date);
    }
    let year = options
        .year_col
        .clone()
        .or_else(|| find_col(headers, "Ano__", "Ano"));
    let quarter = options
        .quarter_col
        .clone()
        .or_else(|| find_col(headers, "Trimestre__", "Trimestre"));
    year.as_deref()
        .and_then(position)
        .zip(quarter.as_deref().and_then(position))
        .map(|(year, quarter)| PeriodSource::Quarter { year, quarter })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
