//! Consistency checks of VD4020 against the income columns it is built from.

use std::path::Path;

use income_core::error::{IncomeError, Result};
use income_core::parsing::parse_decimal;
use serde::Serialize;
use tracing::debug;

use crate::reader::{cell, CsvSource};

/// Report of [`vd4020_components`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentsReport {
    pub rows_total: u64,
    pub rows_with_target_and_any_component: u64,
    pub matches_within_tol: u64,
    pub match_rate: Option<f64>,
    pub tol: f64,
    pub mean_abs_error: Option<f64>,
}

/// Report of [`vd4020_vs_principal`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrincipalReport {
    pub rows_total: u64,
    pub rows_comparable: u64,
    pub vd4020_ge_principal_rate: Option<f64>,
    pub rows_without_secondary_money: u64,
    pub equal_when_no_secondary_rate: Option<f64>,
    pub tol: f64,
}

fn open(input: &Path) -> Result<CsvSource> {
    if !input.exists() {
        return Err(IncomeError::InputNotFound(input.to_path_buf()));
    }
    CsvSource::open(input)
}

fn rate(part: u64, whole: u64) -> Option<f64> {
    (whole > 0).then(|| part as f64 / whole as f64)
}

/// Compare `target` with the sum of the `components` present on each row.
///
/// Rows count only when the target and at least one component parse.
/// `limit > 0` stops after that many counted rows. Absent columns read as
/// empty cells.
pub fn vd4020_components(
    input: &Path,
    target: &str,
    components: &[String],
    tol: f64,
    limit: usize,
) -> Result<ComponentsReport> {
    let mut source = open(input)?;
    let target_idx = source.index_of(target);
    let component_idx: Vec<Option<usize>> = components.iter().map(|c| source.index_of(c)).collect();

    let mut rows_total = 0u64;
    let mut available = 0u64;
    let mut within = 0u64;
    let mut abs_error_sum = 0.0;

    for record in source.records() {
        let record = record?;
        rows_total += 1;

        let Some(t) = parse_decimal(&cell(&record, target_idx)) else {
            continue;
        };
        let present: Vec<f64> = component_idx
            .iter()
            .filter_map(|&idx| parse_decimal(&cell(&record, idx)))
            .collect();
        if present.is_empty() {
            continue;
        }

        available += 1;
        let err = (present.iter().sum::<f64>() - t).abs();
        abs_error_sum += err;
        if err <= tol {
            within += 1;
        }
        if limit > 0 && available >= limit as u64 {
            break;
        }
    }

    debug!("vd4020-components: {available} of {rows_total} rows comparable");
    Ok(ComponentsReport {
        rows_total,
        rows_with_target_and_any_component: available,
        matches_within_tol: within,
        match_rate: rate(within, available),
        tol,
        mean_abs_error: (available > 0).then(|| abs_error_sum / available as f64),
    })
}

/// Check that `target` is at least the `principal` job income, and equal to
/// it on rows without secondary-job money.
///
/// `limit > 0` stops after that many comparable rows.
pub fn vd4020_vs_principal(
    input: &Path,
    target: &str,
    principal: &str,
    secondary_money: Option<&str>,
    tol: f64,
    limit: usize,
) -> Result<PrincipalReport> {
    let mut source = open(input)?;
    let target_idx = source.index_of(target);
    let principal_idx = source.index_of(principal);
    let secondary_idx = secondary_money.map(|c| source.index_of(c));

    let mut rows_total = 0u64;
    let mut comparable = 0u64;
    let mut geq = 0u64;
    let mut without_secondary = 0u64;
    let mut equal = 0u64;

    for record in source.records() {
        let record = record?;
        rows_total += 1;

        let t = parse_decimal(&cell(&record, target_idx));
        let p = parse_decimal(&cell(&record, principal_idx));
        let (Some(t), Some(p)) = (t, p) else {
            continue;
        };

        comparable += 1;
        if t + tol >= p {
            geq += 1;
        }
        if let Some(idx) = secondary_idx {
            if parse_decimal(&cell(&record, idx)).is_none() {
                without_secondary += 1;
                if (t - p).abs() <= tol {
                    equal += 1;
                }
            }
        }
        if limit > 0 && comparable >= limit as u64 {
            break;
        }
    }

    debug!("vd4020-vs-principal: {comparable} of {rows_total} rows comparable");
    Ok(PrincipalReport {
        rows_total,
        rows_comparable: comparable,
        vd4020_ge_principal_rate: rate(geq, comparable),
        rows_without_secondary_money: without_secondary,
        equal_when_no_secondary_rate: rate(equal, without_secondary),
        tol,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
