//! CSV loading for the microdata file and the monthly series it joins with.
//!
//! Cells are decoded lossily: microdata exports occasionally carry stray
//! Latin-1 bytes and those rows must still be counted, not rejected.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek};
use std::path::{Path, PathBuf};

use csv::ByteRecord;
use income_core::deflator::PriceIndex;
use income_core::error::{IncomeError, Result};
use income_core::models::MonthKey;
use income_core::parsing::{parse_decimal, parse_int};
use income_core::reference::ReferenceSeries;
use tracing::debug;

const UTF8_BOM: char = '\u{feff}';

/// Pick `;` when the header line has more semicolons than commas, as in
/// IBGE exports; otherwise `,`.
fn sniff_delimiter(header_line: &[u8]) -> u8 {
    let count = |d: u8| header_line.iter().filter(|&&b| b == d).count();
    if count(b';') > count(b',') {
        b';'
    } else {
        b','
    }
}

// ── CsvSource ─────────────────────────────────────────────────────────────────

/// An open CSV file with its decoded header row.
pub struct CsvSource {
    path: PathBuf,
    reader: csv::Reader<File>,
    headers: Vec<String>,
}

impl CsvSource {
    /// Open `path` as a flexible CSV with a header row.
    ///
    /// The delimiter (`,` or `;`) is detected from the header line. A leading
    /// byte-order mark is removed from the first header.
    pub fn open(path: &Path) -> Result<Self> {
        let read_error = |source| IncomeError::FileRead {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(read_error)?;
        let mut buffered = BufReader::new(file);
        let mut header_line = Vec::new();
        buffered.read_until(b'\n', &mut header_line).map_err(read_error)?;
        buffered.rewind().map_err(read_error)?;
        let delimiter = sniff_delimiter(&header_line);
        debug!("{}: delimiter {:?}", path.display(), delimiter as char);

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .has_headers(true)
            .delimiter(delimiter)
            .from_reader(buffered.into_inner());

        let headers: Vec<String> = reader
            .byte_headers()
            .map_err(|source| IncomeError::Csv {
                path: path.to_path_buf(),
                source,
            })?
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let h = String::from_utf8_lossy(h);
                if i == 0 {
                    h.trim_start_matches(UTF8_BOM).to_string()
                } else {
                    h.into_owned()
                }
            })
            .collect();

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            headers,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Position of the header named exactly `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Stream the data rows. Malformed records surface as [`IncomeError::Csv`].
    pub fn records(&mut self) -> impl Iterator<Item = Result<ByteRecord>> + '_ {
        let path = &self.path;
        self.reader.byte_records().map(move |r| {
            r.map_err(|source| IncomeError::Csv {
                path: path.clone(),
                source,
            })
        })
    }
}

/// The cell at `idx`, lossily decoded. Missing columns and short rows read
/// as the empty string.
pub fn cell(record: &ByteRecord, idx: Option<usize>) -> Cow<'_, str> {
    match idx.and_then(|i| record.get(i)) {
        Some(bytes) => String::from_utf8_lossy(bytes),
        None => Cow::Borrowed(""),
    }
}

/// Create a CSV writer at `path`, creating parent directories as needed.
pub fn create_writer(path: &Path) -> Result<csv::Writer<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| IncomeError::FileWrite {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let file = File::create(path).map_err(|source| IncomeError::FileWrite {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(csv::Writer::from_writer(file))
}

/// Map a `csv` error raised while writing `path`.
pub fn write_error(path: &Path) -> impl FnOnce(csv::Error) -> IncomeError + '_ {
    move |source| IncomeError::Csv {
        path: path.to_path_buf(),
        source,
    }
}

/// Flush `writer`, mapping the error to [`IncomeError::FileWrite`].
pub fn finish_writer(mut writer: csv::Writer<File>, path: &Path) -> Result<()> {
    writer.flush().map_err(|source| IncomeError::FileWrite {
        path: path.to_path_buf(),
        source,
    })
}

// ── Series readers ────────────────────────────────────────────────────────────

/// Case-insensitive position of `name` among trimmed headers.
fn header_position(headers: &[String], name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
}

/// Read monthly IPCA index levels.
///
/// Accepted header sets (case-insensitive): `date,index` with `YYYY-MM`
/// dates, or `year,month,index`. Rows with a blank or unparseable index or
/// month are skipped. The returned index may be empty.
pub fn read_ipca_csv(path: &Path) -> Result<PriceIndex> {
    let mut source = CsvSource::open(path)?;
    let headers = source.headers().to_vec();

    let index_col = header_position(&headers, "index");
    let date_col = header_position(&headers, "date");
    let year_col = header_position(&headers, "year");
    let month_col = header_position(&headers, "month");

    #[derive(Clone, Copy)]
    enum Layout {
        Date(usize),
        YearMonth(usize, usize),
    }

    let (layout, index_col) = match (date_col, year_col, month_col, index_col) {
        (Some(d), _, _, Some(i)) => (Layout::Date(d), i),
        (None, Some(y), Some(m), Some(i)) => (Layout::YearMonth(y, m), i),
        _ => {
            return Err(IncomeError::SeriesHeader(
                "ipca csv must have columns (date,index) or (year,month,index)",
            ))
        }
    };

    let mut index = PriceIndex::new();
    let mut skipped = 0usize;
    for record in source.records() {
        let record = record?;
        let month = match layout {
            Layout::Date(d) => MonthKey::parse(&cell(&record, Some(d))).ok(),
            Layout::YearMonth(y, m) => {
                let year = parse_int(&cell(&record, Some(y)));
                let month = parse_int(&cell(&record, Some(m)));
                match (year, month) {
                    (Some(y), Some(m)) => i32::try_from(y)
                        .ok()
                        .zip(u32::try_from(m).ok())
                        .and_then(|(y, m)| MonthKey::from_ym(y, m)),
                    _ => None,
                }
            }
        };
        let level = parse_decimal(&cell(&record, Some(index_col)));
        match (month, level) {
            (Some(month), Some(level)) => index.insert(month, level),
            _ => skipped += 1,
        }
    }

    debug!(
        "Read {} IPCA months from {} ({} rows skipped)",
        index.len(),
        path.display(),
        skipped
    );
    Ok(index)
}

/// Read the monthly nominal minimum wage (`date,value`, case-insensitive).
///
/// Rows with a blank or unparseable date or value are skipped; an empty
/// result is an error.
pub fn read_reference_csv(path: &Path) -> Result<ReferenceSeries> {
    let mut source = CsvSource::open(path)?;
    let headers = source.headers().to_vec();

    let (Some(date_col), Some(value_col)) = (
        header_position(&headers, "date"),
        header_position(&headers, "value"),
    ) else {
        return Err(IncomeError::SeriesHeader(
            "salario minimo csv must contain headers: date,value",
        ));
    };

    let mut series = ReferenceSeries::new();
    for record in source.records() {
        let record = record?;
        let raw_date = cell(&record, Some(date_col));
        if raw_date.trim().is_empty() {
            continue;
        }
        let Ok(month) = MonthKey::parse(&raw_date) else {
            continue;
        };
        if let Some(value) = parse_decimal(&cell(&record, Some(value_col))) {
            series.insert(month, value);
        }
    }

    if series.is_empty() {
        return Err(IncomeError::EmptyReferenceSeries(path.to_path_buf()));
    }
    debug!(
        "Read {} minimum wage months from {}",
        series.len(),
        path.display()
    );
    Ok(series)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
