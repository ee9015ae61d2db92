//! Edge and value evaluation.
//!
//! Compares the consensus probability to the market's decimal odds and
//! ranks priced matches by model edge.

use tracing::debug;

use crate::config::EdgeConfig;
use crate::math::clamp_prob;
use crate::types::{EdgeValue, FusionError, MatchEvaluation};

// ---------------------------------------------------------------------------
// Pure helpers
// ---------------------------------------------------------------------------

/// Market-implied probability of decimal odds, `None` unless `odds > 1`.
pub fn implied_probability(odds: f64) -> Option<f64> {
    (odds.is_finite() && odds > 1.0).then(|| 1.0 / odds)
}

/// Relative move from the current price to the (expected) closing price.
/// Positive when the line is expected to drift out.
pub fn closing_line_value(current_odds: f64, closing_odds: f64) -> Option<f64> {
    if !current_odds.is_finite() || !closing_odds.is_finite() || current_odds <= 0.0 {
        return None;
    }
    Some((closing_odds - current_odds) / current_odds)
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

pub struct EdgeEvaluator {
    config: EdgeConfig,
}

impl EdgeEvaluator {
    pub fn new(config: EdgeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EdgeConfig {
        &self.config
    }

    /// Edge (percentage points) and value of `probability` at decimal `odds`.
    ///
    /// ```text
    /// fair_odds = 1 / p
    /// edge      = (p - 1/odds) × 100
    /// value     = p × odds - (1 - p)
    /// ```
    ///
    /// Odds must be finite and above 1; anything else leaves edge and value
    /// undefined and the match must be excluded.
    pub fn evaluate(&self, probability: f64, odds: f64) -> Result<EdgeValue, FusionError> {
        let implied = implied_probability(odds).ok_or(FusionError::InvalidOdds(odds))?;
        let p = clamp_prob(probability);

        let ev = EdgeValue {
            edge: (p - implied) * 100.0,
            value: p * odds - (1.0 - p),
            fair_odds: 1.0 / p,
            odds,
        };
        debug!(
            probability = p,
            odds,
            edge = format!("{:.2}pp", ev.edge),
            value = format!("{:.4}", ev.value),
            "Edge evaluated"
        );
        Ok(ev)
    }

    /// Priced evaluations at or above `min_edge`, best edge first.
    pub fn rank<'a>(&self, evaluations: &'a [MatchEvaluation]) -> Vec<&'a MatchEvaluation> {
        let mut ranked: Vec<&MatchEvaluation> = evaluations
            .iter()
            .filter(|e| {
                e.edge_value()
                    .is_some_and(|ev| ev.edge >= self.config.min_edge)
            })
            .collect();
        ranked.sort_by(|a, b| {
            let ea = a.edge_value().map_or(f64::MIN, |ev| ev.edge);
            let eb = b.edge_value().map_or(f64::MIN, |ev| ev.edge);
            eb.partial_cmp(&ea).unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
