//! Single-step Bayesian update from market line movement.
//!
//! Treats the sharp-money score (0–100) as the likelihood that the
//! evaluated side is the one the smart money backs.

/// Keeps the denominator away from zero when prior and likelihood both
/// sit at opposite extremes.
const DENOM_EPS: f64 = 1e-9;

/// Posterior probability after folding `sharp_score` into `prior`.
pub fn update(prior: f64, sharp_score: f64) -> f64 {
    let prior = if prior.is_finite() { prior.clamp(0.0, 1.0) } else { 0.5 };
    let likelihood = if sharp_score.is_finite() {
        sharp_score.clamp(0.0, 100.0) / 100.0
    } else {
        0.5
    };
    let evidence = prior * likelihood + (1.0 - prior) * (1.0 - likelihood);
    prior * likelihood / evidence.max(DENOM_EPS)
}
