//! Rankings, headline insights and money equivalents of each band.
//!
//! Everything here is post-processing over finalised groups.

use std::cmp::Ordering;

use income_core::bands::BandSpec;
use income_core::formatting::{format_brl, round_to};
use serde::Serialize;

use crate::aggregator::{GroupStats, NationalStats};

const TOP_N: usize = 10;
const HEADLINE_N: usize = 5;

// ── Money equivalents ─────────────────────────────────────────────────────────

/// A band expressed in reais for a given reference value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandMoney {
    pub range: String,
    pub min_sm: f64,
    pub max_sm: Option<f64>,
    pub min_brl: f64,
    pub max_brl: Option<f64>,
    /// `"R$ X a R$ Y"` for closed bands, `">= R$ X"` for the open band.
    pub money_label: String,
}

/// Convert every band of `spec` into reais at `reference`.
pub fn ranges_money(spec: &BandSpec, reference: f64) -> Vec<BandMoney> {
    spec.bands()
        .iter()
        .map(|band| {
            let lo = band.min * reference;
            let hi = band.max.map(|m| m * reference);
            let money_label = match hi {
                Some(hi) => format!("{} a {}", format_brl(lo), format_brl(hi)),
                None => format!(">= {}", format_brl(lo)),
            };
            BandMoney {
                range: band.label.clone(),
                min_sm: band.min,
                max_sm: band.max,
                min_brl: round_to(lo, 2),
                max_brl: hi.map(|v| round_to(v, 2)),
                money_label,
            }
        })
        .collect()
}

// ── Rankings ──────────────────────────────────────────────────────────────────

/// State rankings derived from the ordered state list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Rankings {
    pub top10_income: Vec<GroupStats>,
    pub bottom10_income: Vec<GroupStats>,
    pub top10_population: Vec<GroupStats>,
    pub top10_low_income: Vec<GroupStats>,
    pub top10_high_income: Vec<GroupStats>,
}

impl Rankings {
    /// `ordered_states` must already be in the report's state order; the
    /// income top-10 is its head. Other rankings are stable sorts of it.
    pub fn build(ordered_states: &[GroupStats], spec: &BandSpec) -> Self {
        let low = spec.first().label.as_str();
        let high = spec.last().label.as_str();

        Self {
            top10_income: ordered_states.iter().take(TOP_N).cloned().collect(),
            bottom10_income: top_by(ordered_states, |a, b| {
                a.avg_household_sm.total_cmp(&b.avg_household_sm)
            }),
            top10_population: top_by(ordered_states, |a, b| {
                b.persons_total.total_cmp(&a.persons_total)
            }),
            top10_low_income: top_by(ordered_states, |a, b| {
                b.band_persons_pct(low).total_cmp(&a.band_persons_pct(low))
            }),
            top10_high_income: top_by(ordered_states, |a, b| {
                b.band_persons_pct(high).total_cmp(&a.band_persons_pct(high))
            }),
        }
    }

    pub fn top5(&self) -> Vec<GroupStats> {
        self.top10_income.iter().take(HEADLINE_N).cloned().collect()
    }

    pub fn bottom5(&self) -> Vec<GroupStats> {
        self.bottom10_income.iter().take(HEADLINE_N).cloned().collect()
    }
}

/// Stable sort of a copy of `rows`, cut to the first ten.
fn top_by(rows: &[GroupStats], cmp: impl Fn(&GroupStats, &GroupStats) -> Ordering) -> Vec<GroupStats> {
    let mut rows = rows.to_vec();
    rows.sort_by(|a, b| cmp(a, b));
    rows.truncate(TOP_N);
    rows
}

// ── Insights ──────────────────────────────────────────────────────────────────

/// Headline comparisons for one mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insights {
    pub national_low_income_band: String,
    pub national_high_income_band: String,
    pub national_low_income_money: String,
    pub national_high_income_money: String,
    pub national_low_income_pct: f64,
    pub national_high_income_pct: f64,
    pub richest_uf_by_avg_sm: String,
    pub poorest_uf_by_avg_sm: String,
    pub highest_low_income_uf: String,
    pub highest_high_income_uf: String,
}

impl Insights {
    pub fn build(
        national: &NationalStats,
        rankings: &Rankings,
        money: &[BandMoney],
        spec: &BandSpec,
    ) -> Self {
        let low = spec.first().label.clone();
        let high = spec.last().label.clone();
        let money_for = |range: &str| {
            money
                .iter()
                .find(|m| m.range == range)
                .map(|m| m.money_label.clone())
                .unwrap_or_default()
        };
        let first_label = |rows: &[GroupStats]| rows.first().map(|g| g.label.clone()).unwrap_or_default();

        Self {
            national_low_income_money: money_for(&low),
            national_high_income_money: money_for(&high),
            national_low_income_pct: round_to(national.group.band_persons_pct(&low), 4),
            national_high_income_pct: round_to(national.group.band_persons_pct(&high), 4),
            richest_uf_by_avg_sm: first_label(&rankings.top10_income),
            poorest_uf_by_avg_sm: first_label(&rankings.bottom10_income),
            highest_low_income_uf: first_label(&rankings.top10_low_income),
            highest_high_income_uf: first_label(&rankings.top10_high_income),
            national_low_income_band: low,
            national_high_income_band: high,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
