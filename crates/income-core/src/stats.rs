//! Weighted point estimators over `(value, weight)` pairs.

// ── Weighted median ───────────────────────────────────────────────────────────

/// Weighted median of `(value, weight)` pairs.
///
/// Pairs with a non-positive weight are dropped, the rest sorted ascending by
/// value, and the first value whose cumulative weight reaches half the total
/// is returned. Returns `0.0` when nothing remains.
pub fn weighted_median(pairs: &[(f64, f64)]) -> f64 {
    let mut data: Vec<(f64, f64)> = pairs.iter().copied().filter(|&(_, w)| w > 0.0).collect();
    if data.is_empty() {
        return 0.0;
    }
    data.sort_by(|a, b| a.0.total_cmp(&b.0));

    let total: f64 = data.iter().map(|&(_, w)| w).sum();
    let cutoff = total * 0.5;
    let mut acc = 0.0;
    for &(x, w) in &data {
        acc += w;
        if acc >= cutoff {
            return x;
        }
    }
    data[data.len() - 1].0
}

// ── Weighted Gini ─────────────────────────────────────────────────────────────

/// Weighted Gini coefficient via the discrete Lorenz-curve area.
///
/// Negative values are treated as zero and non-positive weights dropped.
/// The area under the Lorenz curve is accumulated as trapezoids over the
/// cumulative weight and cumulative value-weight; the result is
/// `1 - 2 * area / (total_w * total_xw)` clamped to `[0, 1]`.
///
/// Returns `0.0` for degenerate input (no weight, or all values zero).
pub fn weighted_gini(pairs: &[(f64, f64)]) -> f64 {
    let mut data: Vec<(f64, f64)> = pairs
        .iter()
        .filter(|&&(_, w)| w > 0.0)
        .map(|&(x, w)| (x.max(0.0), w))
        .collect();
    if data.is_empty() {
        return 0.0;
    }
    data.sort_by(|a, b| a.0.total_cmp(&b.0));

    let total_w: f64 = data.iter().map(|&(_, w)| w).sum();
    let total_xw: f64 = data.iter().map(|&(x, w)| x * w).sum();
    if total_w <= 0.0 || total_xw <= 0.0 {
        return 0.0;
    }

    let mut cum_w = 0.0;
    let mut cum_xw = 0.0;
    let mut area = 0.0;
    for &(x, w) in &data {
        let prev_w = cum_w;
        let prev_xw = cum_xw;
        cum_w += w;
        cum_xw += x * w;
        area += (prev_xw + cum_xw) * (cum_w - prev_w) * 0.5;
    }
    let gini = 1.0 - 2.0 * area / (total_w * total_xw);
    gini.clamp(0.0, 1.0)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
