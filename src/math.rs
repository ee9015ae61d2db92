//! Small numeric helpers shared by the scoring stages.
//!
//! Every stage boundary clamps through these so that a NaN or an overflow
//! coming out of one engine never reaches the odds math downstream.

/// Lowest probability any stage may emit.
pub const PROB_FLOOR: f64 = 0.01;
/// Highest probability any stage may emit.
pub const PROB_CEIL: f64 = 0.99;

/// Clamp `value` into `[lo, hi]`, mapping non-finite input to `fallback`
/// (which is itself clamped).
pub fn clamp_or(value: f64, lo: f64, hi: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(lo, hi)
    } else {
        fallback.clamp(lo, hi)
    }
}

/// Clamp into `[0, 1]`; NaN becomes 0.
pub fn clamp_unit(value: f64) -> f64 {
    clamp_or(value, 0.0, 1.0, 0.0)
}

/// Clamp into the global probability band `[0.01, 0.99]`; NaN becomes 0.5.
pub fn clamp_prob(value: f64) -> f64 {
    clamp_or(value, PROB_FLOOR, PROB_CEIL, 0.5)
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation (divides by N), `None` for an empty slice.
pub fn population_std(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Weighted mean of `(value, weight)` pairs. `None` when the total weight
/// is zero, negative or not finite.
pub fn weighted_mean(pairs: impl IntoIterator<Item = (f64, f64)>) -> Option<f64> {
    let (num, den) = pairs
        .into_iter()
        .fold((0.0, 0.0), |(n, d), (v, w)| (n + v * w, d + w));
    if den > 0.0 && den.is_finite() && num.is_finite() {
        Some(num / den)
    } else {
        None
    }
}
