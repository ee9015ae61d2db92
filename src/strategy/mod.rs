//! Strategy layer. Turns engine outputs into a priced, staked evaluation.

pub mod edge;
pub mod kelly;
pub mod stake;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::engine::fail_safe::FailSafeEngine;
use crate::fusion::aggregator::Aggregator;
use crate::fusion::calibration::Calibrator;
use crate::fusion::quality::{ConsistencyInput, QualityScorer};
use crate::math::{clamp_unit, mean, population_std};
use crate::types::{
    ConsensusResult, EdgeValue, EngineOutputs, FusionError, MarketSnapshot, MatchEvaluation,
    Streaks, Verdict,
};
use edge::{closing_line_value, implied_probability, EdgeEvaluator};
use stake::{StakeInputs, StakeSizer};

/// Fewer odds points than this give a volatility of zero.
const MIN_HISTORY_POINTS: usize = 3;

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Pipelines quality scoring → calibrated consensus → edge/value → stake.
///
/// Holds no per-match state, so one instance can be shared across any
/// number of concurrent evaluations.
pub struct MatchOrchestrator {
    quality: QualityScorer,
    aggregator: Aggregator,
    edge: EdgeEvaluator,
    stake: StakeSizer,
}

impl MatchOrchestrator {
    /// Build every stage from one validated config. Invalid settings are
    /// rejected here, before any match is seen.
    pub fn new(config: &AppConfig) -> Result<Self, FusionError> {
        config.validate()?;
        Ok(Self {
            quality: QualityScorer::new(config.quality.clone()),
            aggregator: Aggregator::new(
                config.fusion.clone(),
                Calibrator::new(config.calibration.clone()),
                FailSafeEngine::new(config.fail_safe.clone()),
            ),
            edge: EdgeEvaluator::new(config.edge.clone()),
            stake: StakeSizer::new(config.stake.clone()),
        })
    }

    pub fn edge_evaluator(&self) -> &EdgeEvaluator {
        &self.edge
    }

    /// Evaluate one match from already-collected engine outputs.
    ///
    /// Never fails: missing engines are substituted, degenerate weights are
    /// recovered, and unusable odds turn into [`Verdict::Excluded`].
    pub fn evaluate_match(
        &self,
        match_id: &str,
        outputs: &EngineOutputs,
        market: &MarketSnapshot,
        streaks: Option<&Streaks>,
        bankroll: f64,
    ) -> MatchEvaluation {
        let outputs = &self.aggregator.expected_outputs(outputs);
        let consistency = ConsistencyInput {
            probability: Self::raw_mean(outputs),
            drift: market.drift,
            expected_closing: market.expected_closing,
        };
        let quality = self
            .quality
            .analyze(outputs, &consistency, market.signal_history.as_ref());
        let consensus = self.aggregator.aggregate(outputs, &quality, market.sharp_score);

        let verdict = match self.edge.evaluate(consensus.probability, market.odds) {
            Ok(edge_value) => {
                let inputs = Self::stake_inputs(&consensus, &edge_value, market);
                let stake = self.stake.size(bankroll, &inputs, streaks);
                Verdict::Priced { edge_value, stake }
            }
            Err(e) => {
                warn!(match_id, error = %e, "Match excluded from pricing");
                Verdict::Excluded {
                    reason: e.to_string(),
                }
            }
        };

        let evaluation = MatchEvaluation {
            match_id: match_id.to_string(),
            evaluated_at: Utc::now(),
            quality,
            consensus,
            verdict,
        };

        match &evaluation.verdict {
            Verdict::Priced { edge_value, stake } => info!(
                match_id,
                probability = format!("{:.1}%", evaluation.consensus.probability * 100.0),
                confidence = format!("{:.0}%", evaluation.consensus.confidence * 100.0),
                quality = format!("{:.2}", evaluation.quality.quality_score),
                edge = format!("{:+.2}pp", edge_value.edge),
                stake = format!("{:.2}%", stake.stake_pct * 100.0),
                amount = format!("${:.2}", stake.stake_amount),
                live_engines = evaluation.consensus.live_engines(),
                "Match evaluated"
            ),
            Verdict::Excluded { reason } => info!(
                match_id,
                probability = format!("{:.1}%", evaluation.consensus.probability * 100.0),
                reason = %reason,
                "Match evaluated without pricing"
            ),
        }

        evaluation
    }

    /// Unweighted mean of the raw probabilities actually reported.
    fn raw_mean(outputs: &EngineOutputs) -> Option<f64> {
        let probs: Vec<f64> = outputs
            .values()
            .flatten()
            .filter(|o| o.is_well_formed())
            .map(|o| o.probability)
            .collect();
        mean(&probs)
    }

    fn stake_inputs(
        consensus: &ConsensusResult,
        edge_value: &EdgeValue,
        market: &MarketSnapshot,
    ) -> StakeInputs {
        let clv = market
            .clv
            .filter(|v| v.is_finite())
            .or_else(|| {
                market
                    .expected_closing
                    .and_then(|closing| closing_line_value(market.odds, closing))
            })
            .unwrap_or(0.0);

        StakeInputs {
            probability: consensus.probability,
            odds: edge_value.odds,
            clv,
            sharp_money: market
                .sharp_score
                .map(|s| clamp_unit(s / 100.0))
                .unwrap_or(0.0),
            volatility: market_volatility(&market.history),
            confidence: consensus.confidence,
            risk: consensus.risk,
            value_score: clamp_unit(edge_value.value),
        }
    }
}

/// Population std of implied probabilities over an odds history. Invalid
/// odds are skipped; fewer than three usable points give 0.
pub fn market_volatility(history: &[f64]) -> f64 {
    let implied: Vec<f64> = history
        .iter()
        .filter_map(|&odds| implied_probability(odds))
        .collect();
    if implied.len() < MIN_HISTORY_POINTS {
        return 0.0;
    }
    population_std(&implied).unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EngineOutput;
    use assert_float_eq::*;

    fn orchestrator() -> MatchOrchestrator {
        MatchOrchestrator::new(&AppConfig::default()).unwrap()
    }

    fn outputs(entries: &[(&str, Option<(f64, f64)>)]) -> EngineOutputs {
        entries
            .iter()
            .map(|(name, v)| {
                (
                    name.to_string(),
                    v.map(|(p, c)| EngineOutput::new(*name, p, c, 1.0 - c)),
                )
            })
            .collect()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = AppConfig::default();
        config.stake.min_stake_pct = 0.10;
        assert!(matches!(
            MatchOrchestrator::new(&config),
            Err(FusionError::Config(_))
        ));
    }

    #[test]
    fn test_priced_match() {
        let outs = outputs(&[("poisson", Some((0.68, 0.8))), ("lstm", Some((0.72, 0.75)))]);
        let eval = orchestrator().evaluate_match(
            "m1",
            &outs,
            &MarketSnapshot::with_odds(2.10),
            None,
            1000.0,
        );
        assert_eq!(eval.match_id, "m1");
        let ev = eval.edge_value().unwrap();
        assert!(ev.edge > 0.0);
        let stake = eval.stake().unwrap();
        assert!((0.003..=0.05).contains(&stake.stake_pct));
        assert_float_absolute_eq!(stake.stake_pct * 1000.0, stake.stake_amount, 1e-9);
    }

    #[test]
    fn test_invalid_odds_excluded() {
        let outs = outputs(&[("poisson", Some((0.6, 0.8)))]);
        let o = orchestrator();
        for odds in [1.0, 0.0, -3.0, f64::NAN] {
            let eval = o.evaluate_match("m", &outs, &MarketSnapshot::with_odds(odds), None, 1000.0);
            assert!(matches!(eval.verdict, Verdict::Excluded { .. }), "odds {odds}");
            assert!(eval.stake().is_none());
            // The consensus is still reported.
            assert!((0.01..=0.99).contains(&eval.consensus.probability));
        }
    }

    #[test]
    fn test_all_engines_missing_uses_fail_safe() {
        let outs = outputs(&[("poisson", None), ("lstm", None), ("gnn", None)]);
        let eval = orchestrator().evaluate_match(
            "m",
            &outs,
            &MarketSnapshot::with_odds(1.9),
            None,
            500.0,
        );
        assert_float_absolute_eq!(0.55, eval.consensus.probability, 1e-12);
        assert!(eval.consensus.confidence >= 0.40);
        assert_eq!(eval.consensus.live_engines(), 0);
        assert!(eval.consensus.fallback.is_none());
        assert!(eval.quality.missing_score > 0.0);
    }

    #[test]
    fn test_configured_absent_engines_count_as_missing() {
        let mut config = AppConfig::default();
        for (name, w) in [("poisson", 2.0), ("weather", 0.5), ("injury", 1.0)] {
            config.fusion.engines.insert(name.into(), w);
        }
        let o = MatchOrchestrator::new(&config).unwrap();
        let outs = outputs(&[("poisson", Some((0.6, 0.8)))]);
        let eval = o.evaluate_match("m", &outs, &MarketSnapshot::with_odds(2.0), None, 1000.0);

        assert_float_absolute_eq!(2.0 / 3.0, eval.quality.missing_score, 1e-12);
        assert_eq!(
            eval.quality.engines_checked,
            vec!["injury".to_string(), "poisson".into(), "weather".into()]
        );
        let substituted = eval
            .consensus
            .contributions
            .iter()
            .filter(|c| c.substituted)
            .count();
        assert_eq!(substituted, 2);
        assert!(eval.quality.quality_score < 0.8);
    }

    #[test]
    fn test_consistency_needs_drift_and_expected_closing() {
        let outs = outputs(&[("poisson", Some((0.7, 0.8)))]);
        let o = orchestrator();
        let market = MarketSnapshot {
            drift: Some(0.0),
            expected_closing: Some(2.0),
            ..MarketSnapshot::with_odds(2.0)
        };
        let eval = o.evaluate_match("m", &outs, &market, None, 1000.0);
        // |(0.7 - 0.5) - 0.0 * 1.4| * 2
        assert_float_absolute_eq!(0.4, eval.quality.consistency_score, 1e-12);

        let no_drift = MarketSnapshot {
            drift: None,
            ..market
        };
        let eval = o.evaluate_match("m", &outs, &no_drift, None, 1000.0);
        assert_eq!(eval.quality.consistency_score, 0.0);
    }

    #[test]
    fn test_outlier_scenario() {
        let outs = outputs(&[
            ("lstm", Some((0.60, 0.8))),
            ("poisson", Some((0.62, 0.8))),
            ("weather", Some((0.95, 0.5))),
        ]);
        let eval = orchestrator().evaluate_match(
            "m",
            &outs,
            &MarketSnapshot::with_odds(2.0),
            None,
            1000.0,
        );
        assert!(eval.quality.outlier_score > 0.0);
        let p = eval.consensus.probability;
        assert!(p < (0.60 + 0.62 + 0.95) / 3.0);
        assert!((p - 0.61).abs() < (p - 0.95).abs());
    }

    #[test]
    fn test_hot_streak_scenario() {
        let outs = outputs(&[("poisson", Some((0.6, 0.8)))]);
        let hot = Streaks { hot_streak: 5, cold_streak: 0 };
        let eval = orchestrator().evaluate_match(
            "m",
            &outs,
            &MarketSnapshot::with_odds(2.0),
            Some(&hot),
            1000.0,
        );
        let stake = eval.stake().unwrap();
        assert_eq!(stake.streak_mod, 1.4);
        assert_eq!(stake.market_mod, 1.0);
    }

    #[test]
    fn test_sharp_money_feeds_posterior_and_modifier() {
        let outs = outputs(&[("poisson", Some((0.5, 0.8)))]);
        let market = MarketSnapshot {
            sharp_score: Some(80.0),
            ..MarketSnapshot::with_odds(2.0)
        };
        let eval = orchestrator().evaluate_match("m", &outs, &market, None, 1000.0);
        assert!(eval.consensus.sharp_posterior.unwrap() > 0.5);
        assert_eq!(eval.stake().unwrap().market_mod, 1.2);
    }

    #[test]
    fn test_clv_from_expected_closing() {
        let market = MarketSnapshot {
            expected_closing: Some(2.2),
            ..MarketSnapshot::with_odds(2.0)
        };
        let consensus = ConsensusResult {
            probability: 0.6,
            confidence: 0.7,
            quality_score: 0.8,
            risk: 0.3,
            contributions: Vec::new(),
            fallback: None,
            sharp_posterior: None,
        };
        let ev = EdgeEvaluator::new(Default::default()).evaluate(0.6, 2.0).unwrap();
        let inputs = MatchOrchestrator::stake_inputs(&consensus, &ev, &market);
        assert_float_absolute_eq!(0.1, inputs.clv, 1e-12);
        assert_float_absolute_eq!(0.8, inputs.value_score, 1e-12);

        let known = MarketSnapshot {
            clv: Some(-0.05),
            ..market
        };
        let inputs = MatchOrchestrator::stake_inputs(&consensus, &ev, &known);
        assert_float_absolute_eq!(-0.05, inputs.clv, 1e-12);
    }

    #[test]
    fn test_market_volatility() {
        assert_eq!(market_volatility(&[2.0, 2.1]), 0.0);
        assert_eq!(market_volatility(&[2.0, 2.0, 2.0, 2.0]), 0.0);
        // implied 0.5, 0.4, 0.25 → std ≈ 0.1027
        let v = market_volatility(&[2.0, 2.5, 4.0]);
        assert_float_absolute_eq!(0.10274, v, 1e-4);
        // Invalid points are skipped, leaving too few.
        assert_eq!(market_volatility(&[2.0, 0.9, f64::NAN, 3.0]), 0.0);
    }

    #[test]
    fn test_volatile_market_dampens_stake() {
        let outs = outputs(&[("poisson", Some((0.6, 0.8)))]);
        let market = MarketSnapshot {
            history: vec![2.0, 2.5, 4.0],
            ..MarketSnapshot::with_odds(2.0)
        };
        let eval = orchestrator().evaluate_match("m", &outs, &market, None, 1000.0);
        assert_eq!(eval.stake().unwrap().market_mod, 0.7);
    }
}
