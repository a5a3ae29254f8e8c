//! Header resolution for the labeled microdata CSV.
//!
//! Labeled exports name columns `VAR__description`, raw exports just `VAR`,
//! and categorical variables may carry a decoded `VAR_label` sibling. All the
//! lookup rules are pure functions of the header row.

use csv::ByteRecord;
use income_core::categories::{age_band, capital_category, Dimension, NO_AGE};
use income_core::error::{IncomeError, Result};

use crate::reader::cell;

// ── Lookup helpers ────────────────────────────────────────────────────────────

/// First header starting with `prefix`, else `fallback` when present exactly.
pub fn find_col(headers: &[String], prefix: &str, fallback: &str) -> Option<String> {
    headers
        .iter()
        .find(|h| h.starts_with(prefix))
        .or_else(|| headers.iter().find(|h| *h == fallback))
        .cloned()
}

/// `VAR_label` when present, else `find_col(VAR__, VAR)`.
pub fn label_or_prefixed(headers: &[String], var: &str) -> Option<String> {
    let label = format!("{var}_label");
    if headers.iter().any(|h| *h == label) {
        return Some(label);
    }
    find_col(headers, &format!("{var}__"), var)
}

/// Resolve the income column.
///
/// An explicit request must exist verbatim; otherwise the first header
/// starting with `VD4020` (all-jobs effective income) wins, then `VD4019`.
pub fn detect_income_col(headers: &[String], requested: Option<&str>) -> Result<String> {
    if let Some(name) = requested.filter(|n| !n.is_empty()) {
        if !headers.iter().any(|h| h == name) {
            return Err(IncomeError::MissingColumn {
                kind: "income",
                name: name.to_string(),
            });
        }
        return Ok(name.to_string());
    }
    ["VD4020", "VD4019"]
        .iter()
        .find_map(|prefix| headers.iter().find(|h| h.starts_with(prefix)))
        .cloned()
        .ok_or(IncomeError::IncomeColumnUndetected)
}

/// Resolve the sample weight column.
///
/// An explicit request must exist verbatim; otherwise the first header whose
/// base name (text before the first `__`) is `V1028` (calibrated weight),
/// then `V1027`. `Ok(None)` when neither is present.
pub fn detect_weight_col(headers: &[String], requested: Option<&str>) -> Result<Option<String>> {
    if let Some(name) = requested.filter(|n| !n.is_empty()) {
        if !headers.iter().any(|h| h == name) {
            return Err(IncomeError::MissingColumn {
                kind: "weight",
                name: name.to_string(),
            });
        }
        return Ok(Some(name.to_string()));
    }
    fn base(name: &str) -> &str {
        name.split("__").next().unwrap_or(name)
    }
    Ok(["V1028", "V1027"]
        .iter()
        .find_map(|target| headers.iter().find(|h| base(h.as_str()) == *target))
        .cloned())
}

fn position(headers: &[String], name: Option<&str>) -> Option<usize> {
    name.and_then(|n| headers.iter().position(|h| h == n))
}

// ── Dimension sources ─────────────────────────────────────────────────────────

/// Where a dimension's category comes from in a row.
#[derive(Debug, Clone, PartialEq)]
pub enum DimensionSource {
    /// A categorical column read verbatim.
    Column(Option<usize>),
    /// An age column bucketed into age bands.
    Age(Option<usize>),
    /// Capital label column, falling back to the raw capital code.
    Capital {
        label: Option<usize>,
        code: Option<usize>,
    },
    /// Derived from the household's state code.
    MacroRegion,
}

/// A dimension tallied in this run and its source in the row.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveDimension {
    pub dimension: Dimension,
    pub source: DimensionSource,
}

impl ActiveDimension {
    /// The category of `record` for this dimension, placeholders applied.
    pub fn category(&self, record: &ByteRecord, macro_region: &str) -> String {
        let raw = match &self.source {
            DimensionSource::Column(idx) => cell(record, *idx).into_owned(),
            DimensionSource::Age(Some(idx)) => age_band(&cell(record, Some(*idx))).to_string(),
            DimensionSource::Age(None) => NO_AGE.to_string(),
            DimensionSource::Capital { label, code } => {
                capital_category(&cell(record, *label), &cell(record, *code))
            }
            DimensionSource::MacroRegion => macro_region.to_string(),
        };
        self.dimension.category(&raw)
    }
}

fn resolve_dimensions(headers: &[String]) -> Vec<ActiveDimension> {
    let mut active = Vec::new();
    for dimension in Dimension::ALWAYS.iter().chain(Dimension::OPTIONAL.iter()).copied() {
        let source = match dimension {
            Dimension::Age => DimensionSource::Age(position(
                headers,
                find_col(headers, "V2009__", "V2009").as_deref(),
            )),
            Dimension::Capital => DimensionSource::Capital {
                label: position(headers, find_col(headers, "Capital_label", "Capital_label").as_deref()),
                code: position(headers, find_col(headers, "Capital__", "Capital").as_deref()),
            },
            Dimension::MacroRegion => DimensionSource::MacroRegion,
            Dimension::MetroRegion => {
                let col = if headers.iter().any(|h| h == "RM_RIDE_label") {
                    Some("RM_RIDE_label".to_string())
                } else {
                    find_col(headers, "RM_RIDE__", "RM_RIDE")
                };
                DimensionSource::Column(position(headers, col.as_deref()))
            }
            other => {
                let var = other.survey_variable().unwrap_or_default();
                DimensionSource::Column(position(headers, label_or_prefixed(headers, var).as_deref()))
            }
        };

        let present = !matches!(source, DimensionSource::Column(None));
        if Dimension::ALWAYS.contains(&dimension) || present {
            active.push(ActiveDimension { dimension, source });
        }
    }
    active
}

// ── ColumnMap ─────────────────────────────────────────────────────────────────

/// Every column index the household reconstructor reads, resolved once.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    pub household_id: usize,
    pub year: usize,
    pub quarter: usize,
    pub uf: usize,
    pub uf_label: Option<usize>,
    pub income: usize,
    pub weight: Option<usize>,
    /// Name of the selected income column.
    pub income_col: String,
    /// Name of the selected weight column; `None` in unweighted mode.
    pub weight_col: Option<String>,
    pub dimensions: Vec<ActiveDimension>,
}

impl ColumnMap {
    /// Resolve all columns from `headers`.
    ///
    /// Checks run in a fixed order so the first failure reported is stable:
    /// empty header, income detection, weight detection, required columns,
    /// then weight presence in weighted mode.
    pub fn resolve(
        headers: &[String],
        income_override: Option<&str>,
        weight_override: Option<&str>,
        unweighted: bool,
    ) -> Result<Self> {
        if headers.iter().all(|h| h.trim().is_empty()) {
            return Err(IncomeError::NoHeader);
        }

        let income_col = detect_income_col(headers, income_override)?;
        let weight_col = if unweighted {
            None
        } else {
            detect_weight_col(headers, weight_override)?
        };

        let household_id = position(headers, find_col(headers, "dom_id", "dom_id").as_deref());
        let year = position(headers, find_col(headers, "Ano__", "Ano").as_deref());
        let quarter = position(headers, find_col(headers, "Trimestre__", "Trimestre").as_deref());
        let uf = position(headers, find_col(headers, "UF__", "UF").as_deref());
        let (Some(household_id), Some(year), Some(quarter), Some(uf)) =
            (household_id, year, quarter, uf)
        else {
            return Err(IncomeError::MissingRequiredColumns);
        };

        if !unweighted && weight_col.is_none() {
            return Err(IncomeError::WeightColumnNotFound);
        }

        Ok(Self {
            household_id,
            year,
            quarter,
            uf,
            uf_label: position(headers, find_col(headers, "UF_label", "UF_label").as_deref()),
            income: position(headers, Some(&income_col)).unwrap_or_default(),
            weight: position(headers, weight_col.as_deref()),
            income_col,
            weight_col,
            dimensions: resolve_dimensions(headers),
        })
    }

    /// Payload keys of the active dimensions, in tally order.
    pub fn dimension_keys(&self) -> Vec<String> {
        self.dimensions
            .iter()
            .map(|d| d.dimension.key().to_string())
            .collect()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
