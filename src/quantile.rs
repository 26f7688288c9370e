//! Order statistics over density samples.

/// Percentiles (in `[0, 1]`) reported in the density CDF summary. The low
/// end matters most: that is where outliers live.
pub(crate) const CDF_LEVELS: [f64; 10] = [
    0.0001, 0.001, 0.005, 0.01, 0.015, 0.02, 0.1, 0.5, 0.9, 0.99,
];

/// Compute the `q`-quantile (`q` in `[0, 1]`) of an already sorted,
/// non-empty slice.
///
/// Uses linear interpolation between the two nearest ranks.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub(crate) fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    debug_assert!(!sorted.is_empty(), "quantile_sorted: empty input");
    let len = sorted.len();
    if len == 1 {
        return sorted[0];
    }
    let q = q.clamp(0.0, 1.0);
    // Rank in [0, len-1] range
    let rank = q * (len - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}

/// Sorts `values` in place and returns the quantile at each of `levels`.
pub(crate) fn quantiles(values: &mut [f64], levels: &[f64]) -> Vec<f64> {
    values.sort_unstable_by(f64::total_cmp);
    levels.iter().map(|&q| quantile_sorted(values, q)).collect()
}

/// `(level, value)` pairs of the empirical CDF of `values` at [`CDF_LEVELS`].
pub(crate) fn cdf_summary(values: &[f64]) -> Vec<(f64, f64)> {
    if values.is_empty() {
        return Vec::new();
    }
    let mut sorted = values.to_vec();
    let at = quantiles(&mut sorted, &CDF_LEVELS);
    CDF_LEVELS.iter().copied().zip(at).collect()
}
