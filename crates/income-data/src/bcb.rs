//! Conversion of Banco Central (SGS) JSON series into the `date,index` CSV
//! read by [`crate::reader::read_ipca_csv`].

use std::path::Path;

use income_core::error::{IncomeError, Result};
use income_core::models::MonthKey;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::reader::{create_writer, finish_writer, write_error};

/// Number of trailing observations inspected to tell percent changes from
/// index levels.
const PERCENT_SAMPLE_WINDOW: usize = 120;
/// Monthly percent changes stay far below this magnitude; index levels don't.
const PERCENT_THRESHOLD: f64 = 20.0;
const INDEX_BASE: f64 = 100.0;

/// One item of an SGS series download.
#[derive(Debug, Clone, Deserialize)]
pub struct BcbObservation {
    #[serde(default)]
    pub data: String,
    /// A string such as `"0,26"` or a bare number.
    #[serde(default)]
    pub valor: Value,
}

impl BcbObservation {
    fn value(&self) -> Option<f64> {
        let raw = match &self.valor {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let normalised = raw.replace(',', ".");
        let trimmed = normalised.trim();
        if trimmed.is_empty() {
            return None;
        }
        trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

/// Parse `mm/yyyy` or `dd/mm/yyyy`.
pub fn parse_bcb_date(raw: &str) -> Result<MonthKey> {
    let trimmed = raw.trim();
    let invalid = || IncomeError::InvalidBcbDate(trimmed.to_string());
    let parts: Vec<&str> = trimmed.split('/').collect();
    let (month, year) = match parts.as_slice() {
        [m, y] => (*m, *y),
        [_, m, y] => (*m, *y),
        _ => return Err(invalid()),
    };
    let month: u32 = month.parse().map_err(|_| invalid())?;
    let year: i32 = year.parse().map_err(|_| invalid())?;
    MonthKey::from_ym(year, month).ok_or_else(invalid)
}

/// Turn observations into a monthly index series, sorted by month.
///
/// When the median of the last observations is small in magnitude the values
/// are monthly percent changes and are compounded from a base of 100;
/// otherwise they are already index levels.
pub fn to_index_series(observations: &[BcbObservation]) -> Result<Vec<(MonthKey, f64)>> {
    let mut series = Vec::with_capacity(observations.len());
    for obs in observations {
        let month = parse_bcb_date(&obs.data)?;
        if let Some(value) = obs.value() {
            series.push((month, value));
        }
    }
    series.sort_by_key(|(month, _)| *month);

    if !is_percent_change(&series) {
        return Ok(series);
    }
    let mut level = INDEX_BASE;
    Ok(series
        .into_iter()
        .map(|(month, pct)| {
            level *= 1.0 + pct / 100.0;
            (month, level)
        })
        .collect())
}

fn is_percent_change(series: &[(MonthKey, f64)]) -> bool {
    let start = series.len().saturating_sub(PERCENT_SAMPLE_WINDOW);
    let mut tail: Vec<f64> = series[start..].iter().map(|(_, v)| *v).collect();
    if tail.is_empty() {
        return false;
    }
    tail.sort_by(f64::total_cmp);
    tail[tail.len() / 2].abs() < PERCENT_THRESHOLD
}

/// Read a BCB JSON download from `input` and write `date,index` to `out`.
/// Returns the number of months written.
pub fn ipca_from_bcb(input: &Path, out: &Path) -> Result<usize> {
    if !input.exists() {
        return Err(IncomeError::InputNotFound(input.to_path_buf()));
    }
    let raw = std::fs::read_to_string(input).map_err(|source| IncomeError::FileRead {
        path: input.to_path_buf(),
        source,
    })?;
    let observations: Vec<BcbObservation> = serde_json::from_str(&raw)?;
    let series = to_index_series(&observations)?;
    debug!(
        "Parsed {} BCB observations into {} months",
        observations.len(),
        series.len()
    );

    let mut writer = create_writer(out)?;
    writer
        .write_record(["date", "index"])
        .map_err(write_error(out))?;
    for (month, level) in &series {
        writer
            .write_record([month.to_string(), format!("{level:.6}")])
            .map_err(write_error(out))?;
    }
    finish_writer(writer, out)?;
    info!("Wrote {} IPCA months to {}", series.len(), out.display());
    Ok(series.len())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
