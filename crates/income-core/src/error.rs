use std::path::PathBuf;
use thiserror::Error;

use crate::models::MonthKey;

/// All errors produced by the PNAD income engine.
///
/// Every variant is fatal for the run that raised it. Row-level anomalies are
/// never represented here; they are counted by the household reconstructor.
#[derive(Error, Debug)]
pub enum IncomeError {
    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file could not be created or written.
    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A CSV document was malformed or could not be written.
    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A JSON document could not be parsed or serialized.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// The requested input file does not exist.
    #[error("input file not found: {0}")]
    InputNotFound(PathBuf),

    /// A month string was not of the form `YYYY-MM`.
    #[error("Invalid month key: {0}")]
    InvalidMonth(String),

    /// The deflation target month is absent from the price index.
    #[error("target {0} missing from index data")]
    TargetNotFound(MonthKey),

    /// The reference series has no month at or before the target.
    #[error("no series value available at or before {0}")]
    NoReferenceValueAvailable(MonthKey),

    /// The price-index CSV yielded no usable rows.
    #[error("empty IPCA series: {0}")]
    EmptyIndexSeries(PathBuf),

    /// The minimum-wage CSV yielded no usable rows.
    #[error("empty salario minimo series: {0}")]
    EmptyReferenceSeries(PathBuf),

    /// A series CSV does not carry the expected header set.
    #[error("{0}")]
    SeriesHeader(&'static str),

    /// A BCB observation carried a date in an unknown layout.
    #[error("invalid BCB date: {0}")]
    InvalidBcbDate(String),

    /// A band token matched neither `N-M` nor `N+`.
    #[error("invalid range token: {0}")]
    InvalidRangeToken(String),

    /// A closed band whose upper bound does not exceed its lower bound.
    #[error("range upper bound must be greater than lower bound: {0}")]
    RangeBounds(String),

    /// The band specification contained no tokens.
    #[error("empty range specification")]
    EmptyRangeSpec,

    /// Band lower bounds decrease somewhere in the specification.
    #[error("ranges must be ordered by lower bound")]
    UnorderedRanges,

    /// The input CSV has an empty header row.
    #[error("input has no header")]
    NoHeader,

    /// An explicitly requested column is absent from the header row.
    #[error("{kind} column not found: {name}")]
    MissingColumn { kind: &'static str, name: String },

    /// Neither VD4020 nor VD4019 could be found.
    #[error("could not auto-detect income column; use --income-col")]
    IncomeColumnUndetected,

    /// Household id, year, quarter or state column is missing.
    #[error("input must contain dom_id, Ano, Trimestre and UF")]
    MissingRequiredColumns,

    /// Weighted mode was requested but no weight column resolved.
    #[error(
        "weight column not found. Re-run pipeline including V1028 \
         or pass --weight-col / use --unweighted for diagnostics."
    )]
    WeightColumnNotFound,

    /// Columns selected for deflation are absent from the input.
    #[error("Missing input columns: {0:?}")]
    MissingInputColumns(Vec<String>),

    /// No way to derive the period of a row was found.
    #[error("Could not determine date column nor (year,quarter) columns")]
    NoPeriodColumns,

    /// Deflation was requested without columns and none could be detected.
    #[error("could not auto-detect income columns (VD4019/VD4020); use --columns")]
    NoIncomeColumns,

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the income crates.
pub type Result<T> = std::result::Result<T, IncomeError>;
