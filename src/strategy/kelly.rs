//! Kelly criterion baseline.
//!
//! Kelly formula for decimal odds: f* = (p·odds − (1 − p)) / b, with
//! b = odds − 1 the net payout per unit staked. Negative fractions mean
//! the odds do not justify a bet and are floored at zero.

/// Raw (full) Kelly fraction. Zero for `odds <= 1`, non-finite input, or
/// any non-positive edge.
pub fn kelly_fraction(probability: f64, odds: f64) -> f64 {
    if !probability.is_finite() || !odds.is_finite() || odds <= 1.0 {
        return 0.0;
    }
    let b = odds - 1.0;
    let edge = probability * odds - (1.0 - probability);
    let k = edge / b;
    if k.is_finite() {
        k.max(0.0)
    } else {
        0.0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
