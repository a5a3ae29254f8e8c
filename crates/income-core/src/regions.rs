//! State (UF) codes and the macro-regions they belong to.

/// Macro-region assigned to unknown or non-numeric state codes.
pub const UNKNOWN_MACRO_REGION: &str = "Desconhecida";

/// Display order of macro-regions in reports.
pub const MACRO_REGION_ORDER: [&str; 6] = [
    "Norte",
    "Nordeste",
    "Sudeste",
    "Sul",
    "Centro-Oeste",
    UNKNOWN_MACRO_REGION,
];

/// Normalise a raw state code: trim, and left-pad all-digit codes to two
/// characters (`"5"` → `"05"`). Non-numeric codes are returned trimmed.
pub fn normalize_uf_code(raw: &str) -> String {
    let s = raw.trim();
    if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) && s.len() < 2 {
        format!("{:0>2}", s)
    } else {
        s.to_string()
    }
}

/// Macro-region of a state code, via the IBGE two-digit numbering.
pub fn macro_region_for(uf_code: &str) -> &'static str {
    match normalize_uf_code(uf_code).as_str() {
        "11" | "12" | "13" | "14" | "15" | "16" | "17" => "Norte",
        "21" | "22" | "23" | "24" | "25" | "26" | "27" | "28" | "29" => "Nordeste",
        "31" | "32" | "33" | "35" => "Sudeste",
        "41" | "42" | "43" => "Sul",
        "50" | "51" | "52" | "53" => "Centro-Oeste",
        _ => UNKNOWN_MACRO_REGION,
    }
}

/// Sort rank of a macro-region name; names outside the table sort last.
pub fn macro_region_rank(name: &str) -> usize {
    MACRO_REGION_ORDER
        .iter()
        .position(|&m| m == name)
        .unwrap_or(MACRO_REGION_ORDER.len())
}
