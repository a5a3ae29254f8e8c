//! Income bands expressed as multiples of a reference value.
//!
//! A band specification is a `;`-separated list of closed ranges `N-M`
//! (lower bound inclusive, upper exclusive) and open ranges `N+`, e.g. the
//! default `0-2;2-5;5-10;10+`. Bounds accept `.` or `,` as decimal mark.

use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::error::{IncomeError, Result};

/// Band specification used when none is configured.
pub const DEFAULT_BAND_SPEC: &str = "0-2;2-5;5-10;10+";

fn range_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*([0-9]+(?:[.,][0-9]+)?)\s*-\s*([0-9]+(?:[.,][0-9]+)?)\s*$")
            .expect("regex is valid")
    })
}

fn plus_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*([0-9]+(?:[.,][0-9]+)?)\s*\+\s*$").expect("regex is valid"))
}

// ── Band ──────────────────────────────────────────────────────────────────────

/// One labeled half-open interval `[min, max)`; `max = None` means unbounded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Band {
    pub label: String,
    pub min: f64,
    pub max: Option<f64>,
}

impl Band {
    /// Whether `ratio` falls inside `[min, max)`.
    pub fn contains(&self, ratio: f64) -> bool {
        ratio >= self.min && self.max.map_or(true, |hi| ratio < hi)
    }
}

// ── BandSpec ──────────────────────────────────────────────────────────────────

/// A validated, non-empty sequence of bands with non-decreasing lower bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct BandSpec {
    bands: Vec<Band>,
}

impl BandSpec {
    /// Parse a specification such as `"0-2;2-5;5-10;10+"`.
    ///
    /// Each band's label is its trimmed token. Blank tokens are ignored.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut bands = Vec::new();
        for token in spec.split(';').map(str::trim).filter(|t| !t.is_empty()) {
            if let Some(caps) = plus_re().captures(token) {
                bands.push(Band {
                    label: token.to_string(),
                    min: parse_bound(&caps[1], token)?,
                    max: None,
                });
                continue;
            }
            let caps = range_re()
                .captures(token)
                .ok_or_else(|| IncomeError::InvalidRangeToken(token.to_string()))?;
            let lo = parse_bound(&caps[1], token)?;
            let hi = parse_bound(&caps[2], token)?;
            if hi <= lo {
                return Err(IncomeError::RangeBounds(token.to_string()));
            }
            bands.push(Band {
                label: token.to_string(),
                min: lo,
                max: Some(hi),
            });
        }

        if bands.is_empty() {
            return Err(IncomeError::EmptyRangeSpec);
        }
        if bands.windows(2).any(|w| w[1].min < w[0].min) {
            return Err(IncomeError::UnorderedRanges);
        }
        Ok(Self { bands })
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.bands.iter().map(|b| b.label.as_str())
    }

    /// The lowest band.
    pub fn first(&self) -> &Band {
        &self.bands[0]
    }

    /// The highest band.
    pub fn last(&self) -> &Band {
        &self.bands[self.bands.len() - 1]
    }

    /// Index of the band `ratio` belongs to.
    ///
    /// Walks the bands in order and returns the first containing `ratio`.
    /// Ratios below the first lower bound clamp to the first band; any other
    /// unmatched ratio (a gap between closed bands or beyond the last closed
    /// band) falls to the last band.
    pub fn classify_index(&self, ratio: f64) -> usize {
        if let Some(i) = self.bands.iter().position(|b| b.contains(ratio)) {
            return i;
        }
        if ratio < self.bands[0].min {
            return 0;
        }
        self.bands.len() - 1
    }

    /// Label of the band `ratio` belongs to. See [`BandSpec::classify_index`].
    pub fn classify(&self, ratio: f64) -> &str {
        &self.bands[self.classify_index(ratio)].label
    }
}

impl Default for BandSpec {
    fn default() -> Self {
        Self {
            bands: vec![
                Band {
                    label: "0-2".to_string(),
                    min: 0.0,
                    max: Some(2.0),
                },
                Band {
                    label: "2-5".to_string(),
                    min: 2.0,
                    max: Some(5.0),
                },
                Band {
                    label: "5-10".to_string(),
                    min: 5.0,
                    max: Some(10.0),
                },
                Band {
                    label: "10+".to_string(),
                    min: 10.0,
                    max: None,
                },
            ],
        }
    }
}

impl FromStr for BandSpec {
    type Err = IncomeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn parse_bound(raw: &str, token: &str) -> Result<f64> {
    raw.replace(',', ".")
        .parse::<f64>()
        .map_err(|_| IncomeError::InvalidRangeToken(token.to_string()))
}

// ── Tests ──────────────────────────────────────────────────────────────────────
