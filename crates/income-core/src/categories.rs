//! Demographic dimensions and the rules that turn raw cells into categories.
//!
//! Every placeholder string that can reach a report is defined here.

use serde::Serialize;

/// Category used when a dimension's cell is empty.
pub const NO_INFO: &str = "sem_info";
/// Category used when the capital/interior cell is empty.
pub const NOT_APPLICABLE: &str = "N/A";
/// Age category when the age cell is missing or unparseable.
pub const NO_AGE: &str = "sem_idade";
/// Capital code `1` / `01`.
pub const CAPITAL: &str = "Capital";
/// Capital code `2` / `02`.
pub const NON_CAPITAL: &str = "Nao capital";

// ── Dimension ─────────────────────────────────────────────────────────────────

/// A demographic attribute tallied per household and cross-tabulated
/// against income bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Sex,
    Race,
    Education,
    Age,
    Capital,
    MacroRegion,
    Relationship,
    OccupationStatus,
    LaborType,
    OccupationPosition,
    MetroRegion,
}

impl Dimension {
    /// Dimensions tallied for every input, whether or not a column exists.
    pub const ALWAYS: [Dimension; 6] = [
        Dimension::Sex,
        Dimension::Race,
        Dimension::Education,
        Dimension::Age,
        Dimension::Capital,
        Dimension::MacroRegion,
    ];

    /// Dimensions tallied only when their source column is present.
    pub const OPTIONAL: [Dimension; 5] = [
        Dimension::Relationship,
        Dimension::OccupationStatus,
        Dimension::LaborType,
        Dimension::OccupationPosition,
        Dimension::MetroRegion,
    ];

    /// Machine key used in payloads (`"macro_region"`, ...).
    pub fn key(self) -> &'static str {
        match self {
            Dimension::Sex => "sex",
            Dimension::Race => "race",
            Dimension::Education => "education",
            Dimension::Age => "age",
            Dimension::Capital => "capital",
            Dimension::MacroRegion => "macro_region",
            Dimension::Relationship => "relationship",
            Dimension::OccupationStatus => "occupation_status",
            Dimension::LaborType => "labor_type",
            Dimension::OccupationPosition => "occupation_position",
            Dimension::MetroRegion => "metro_region",
        }
    }

    /// Human-readable title.
    pub fn display_label(self) -> &'static str {
        match self {
            Dimension::Sex => "Sexo",
            Dimension::Race => "Raca/Cor",
            Dimension::Education => "Escolaridade",
            Dimension::Age => "Faixa etaria",
            Dimension::Capital => "Capital x Interior",
            Dimension::MacroRegion => "Macro-regiao",
            Dimension::Relationship => "Relacao no domicilio",
            Dimension::OccupationStatus => "Condicao ocupacional",
            Dimension::LaborType => "Tipo de trabalho",
            Dimension::OccupationPosition => "Posicao ocupacao",
            Dimension::MetroRegion => "RM/RIDE",
        }
    }

    /// PNAD variable a categorical dimension is read from. `None` for
    /// dimensions derived from other columns.
    pub fn survey_variable(self) -> Option<&'static str> {
        match self {
            Dimension::Sex => Some("V2007"),
            Dimension::Race => Some("V2010"),
            Dimension::Education => Some("V3009A"),
            Dimension::Age => Some("V2009"),
            Dimension::Relationship => Some("V2005"),
            Dimension::OccupationStatus => Some("VD4009"),
            Dimension::LaborType => Some("VD4005"),
            Dimension::OccupationPosition => Some("V4010"),
            Dimension::MetroRegion => Some("RM_RIDE"),
            Dimension::Capital | Dimension::MacroRegion => None,
        }
    }

    /// Category recorded when the cell is empty.
    pub fn placeholder(self) -> &'static str {
        match self {
            Dimension::Capital => NOT_APPLICABLE,
            _ => NO_INFO,
        }
    }

    /// The trimmed value, or this dimension's placeholder when empty.
    pub fn category(self, value: &str) -> String {
        let v = value.trim();
        if v.is_empty() {
            self.placeholder().to_string()
        } else {
            v.to_string()
        }
    }
}

// ── Derived categories ────────────────────────────────────────────────────────

/// Age band of a raw age cell. Fractional ages are truncated.
pub fn age_band(raw: &str) -> &'static str {
    let Some(age) = crate::parsing::parse_decimal(raw) else {
        return NO_AGE;
    };
    match age.trunc() as i64 {
        a if a <= 13 => "00-13",
        a if a <= 24 => "14-24",
        a if a <= 39 => "25-39",
        a if a <= 59 => "40-59",
        _ => "60+",
    }
}

/// Capital/interior category before placeholder substitution.
///
/// A non-empty label wins; otherwise the raw code `1`/`01` and `2`/`02` are
/// translated and any other raw value is kept verbatim.
pub fn capital_category(label: &str, raw_code: &str) -> String {
    let label = label.trim();
    if !label.is_empty() {
        return label.to_string();
    }
    match raw_code.trim() {
        "1" | "01" => CAPITAL.to_string(),
        "2" | "02" => NON_CAPITAL.to_string(),
        other => other.to_string(),
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
