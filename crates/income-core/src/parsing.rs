//! Lenient scalar parsing for survey CSV cells.
//!
//! Microdata exports mix `.` and `,` as the decimal separator and pad cells
//! with whitespace; these helpers absorb both.

/// Parse a decimal cell, accepting `,` as the decimal separator.
///
/// Returns `None` for empty, unparseable or non-finite input.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let normalised = s.replace(',', ".");
    normalised.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse an integer cell such as a year or quarter.
pub fn parse_int(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok()
}

/// Split a comma-separated option value into trimmed, non-empty tokens.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
