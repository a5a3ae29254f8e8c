/// Format a number with a fixed number of decimals and custom separators.
///
/// The digits come from Rust's `{:.N}` formatting, so rounding follows the
/// exact binary value, and the integer part is then grouped in threes.
///
/// # Examples
///
/// ```
/// use income_core::formatting::format_grouped;
///
/// assert_eq!(format_grouped(1234567.891, 2, '.', ','), "1.234.567,89");
/// assert_eq!(format_grouped(1234.5, 1, ',', '.'), "1,234.5");
/// assert_eq!(format_grouped(-9876.0, 0, '.', ','), "-9.876");
/// ```
pub fn format_grouped(value: f64, decimals: usize, thousands: char, decimal: char) -> String {
    let negative = value < 0.0;
    let digits = format!("{:.prec$}", value.abs(), prec = decimals);
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (digits.as_str(), None),
    };

    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 2);
    // "-0.00" would be misleading for tiny negatives that round to zero.
    if negative && digits.chars().any(|c| c.is_ascii_digit() && c != '0') {
        out.push('-');
    }
    out.push_str(&group_thousands(int_part, thousands));
    if let Some(frac) = frac_part {
        out.push(decimal);
        out.push_str(frac);
    }
    out
}

/// Format an amount in Brazilian reais: `R$ 1.518,00`.
///
/// # Examples
///
/// ```
/// use income_core::formatting::format_brl;
///
/// assert_eq!(format_brl(1518.0), "R$ 1.518,00");
/// assert_eq!(format_brl(0.0), "R$ 0,00");
/// assert_eq!(format_brl(15180.0), "R$ 15.180,00");
/// ```
pub fn format_brl(amount: f64) -> String {
    format!("R$ {}", format_grouped(amount, 2, '.', ','))
}

/// Round `value` to `places` decimal places. Exact ties go to the even
/// neighbour, so `1412.125` rounds to `1412.12`.
pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10_f64.powi(places as i32);
    let scaled = value * factor;
    let mut rounded = scaled.round();
    if (rounded - scaled).abs() == 0.5 && rounded % 2.0 != 0.0 {
        rounded -= scaled.signum();
    }
    rounded / factor
}

/// `num / den`, or `0.0` when the denominator is zero.
pub fn safe_div(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        return 0.0;
    }
    num / den
}

/// Calculate `(part / whole) * 100`, rounded to `decimal_places`.
///
/// Returns `0.0` if `whole` is zero to avoid division by zero.
///
/// # Examples
///
/// ```
/// use income_core::formatting::percentage;
///
/// assert!((percentage(100.0, 160.0, 4) - 62.5).abs() < 1e-9);
/// assert_eq!(percentage(5.0, 0.0, 4), 0.0);
/// ```
pub fn percentage(part: f64, whole: f64, decimal_places: u32) -> f64 {
    round_to(100.0 * safe_div(part, whole), decimal_places)
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Insert `sep` every three digits from the right of an integer string.
fn group_thousands(s: &str, sep: char) -> String {
    if s.len() <= 3 {
        return s.to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    let remainder = chars.len() % 3;
    for (i, &c) in chars.iter().enumerate() {
        if i != 0 && (i % 3 == remainder) {
            result.push(sep);
        }
        result.push(c);
    }
    result
}

// ── Tests ──────────────────────────────────────────────────────────────────────
