//! Consensus aggregation.
//!
//! Folds the calibrated outputs of every expected engine slot into one
//! probability and confidence. Slots with no usable output are filled by
//! the fail-safe engine, so the consensus is always defined.

use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::config::FusionConfig;
use crate::engine::fail_safe::FailSafeEngine;
use crate::fusion::bayesian;
use crate::fusion::calibration::Calibrator;
use crate::math::{clamp_prob, clamp_unit, mean, weighted_mean};
use crate::types::{
    ConsensusResult, EngineContribution, EngineOutputs, FusionError, QualityReport, WeightFallback,
};

pub struct Aggregator {
    config: FusionConfig,
    calibrator: Calibrator,
    fail_safe: FailSafeEngine,
}

impl Aggregator {
    pub fn new(config: FusionConfig, calibrator: Calibrator, fail_safe: FailSafeEngine) -> Self {
        Self {
            config,
            calibrator,
            fail_safe,
        }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Expected slots: configured engines plus whatever the caller supplied.
    pub fn slots<'a>(&'a self, outputs: &'a EngineOutputs) -> BTreeSet<&'a str> {
        self.config
            .engines
            .keys()
            .map(String::as_str)
            .chain(outputs.keys().map(String::as_str))
            .collect()
    }

    /// `outputs` with an empty entry for every configured slot it lacks, so
    /// quality scoring and aggregation see the same slot set.
    pub fn expected_outputs(&self, outputs: &EngineOutputs) -> EngineOutputs {
        let mut expected = outputs.clone();
        for slot in self.config.engines.keys() {
            expected.entry(slot.clone()).or_insert(None);
        }
        expected
    }

    /// Build the consensus for one match.
    ///
    /// Effective weight per slot is `static_weight × confidence × quality`.
    /// When a sharp score is supplied and at least one real engine reported,
    /// the line-movement posterior is blended in by `sharp_blend`.
    pub fn aggregate(
        &self,
        outputs: &EngineOutputs,
        quality: &QualityReport,
        sharp_score: Option<f64>,
    ) -> ConsensusResult {
        let quality_weight = quality.quality_score;
        let mut contributions: Vec<EngineContribution> = self
            .slots(outputs)
            .into_iter()
            .map(|slot| self.contribution(slot, outputs, quality_weight))
            .collect();

        let total_weight: f64 = contributions.iter().map(|c| c.effective_weight).sum();
        if total_weight > 0.0 && total_weight.is_finite() {
            for c in &mut contributions {
                c.share = c.effective_weight / total_weight;
            }
        }

        let probs: Vec<f64> = contributions.iter().map(|c| c.probability).collect();
        let confs: Vec<f64> = contributions.iter().map(|c| c.confidence).collect();

        let mut fallback = None;
        let probability = match weighted_mean(
            contributions.iter().map(|c| (c.probability, c.effective_weight)),
        ) {
            Some(p) => p,
            None => match mean(&probs) {
                Some(p) => {
                    warn!(
                        error = %FusionError::DegenerateWeights,
                        slots = contributions.len(),
                        "Falling back to unweighted mean"
                    );
                    fallback = Some(WeightFallback::UnweightedMean);
                    p
                }
                None => {
                    warn!("No engine slots at all, using fail-safe probability");
                    fallback = Some(WeightFallback::FailSafe);
                    self.fail_safe.probability()
                }
            },
        };

        let confidence = weighted_mean(
            contributions.iter().map(|c| (c.confidence, c.effective_weight)),
        )
        .or_else(|| mean(&confs))
        .unwrap_or_else(|| self.fail_safe.output(None).confidence);
        let confidence = clamp_unit(confidence).max(self.config.min_confidence);

        let live = contributions.iter().filter(|c| !c.substituted).count();
        let mut probability = clamp_prob(probability);
        let sharp_posterior = sharp_score.map(|score| bayesian::update(probability, score));
        if let Some(posterior) = sharp_posterior {
            if live > 0 && self.config.sharp_blend > 0.0 {
                let blend = self.config.sharp_blend;
                probability = clamp_prob((1.0 - blend) * probability + blend * posterior);
            }
        }

        let risk = clamp_unit(
            (1.0 - confidence)
                + quality.outlier_score * self.config.outlier_risk_weight
                + quality.volatility * self.config.volatility_risk_weight,
        );

        debug!(
            probability,
            confidence,
            risk,
            live,
            slots = contributions.len(),
            fallback = ?fallback,
            "Consensus built"
        );

        ConsensusResult {
            probability,
            confidence,
            quality_score: quality.quality_score,
            risk,
            contributions,
            fallback,
            sharp_posterior,
        }
    }

    fn contribution(
        &self,
        slot: &str,
        outputs: &EngineOutputs,
        quality_weight: f64,
    ) -> EngineContribution {
        let static_weight = self.config.weight_for(slot);
        let present = outputs
            .get(slot)
            .and_then(Option::as_ref)
            .filter(|o| o.is_well_formed());

        let (source, raw, probability, confidence, method, substituted) = match present {
            Some(output) => {
                let calibrated = self.calibrator.calibrate_output(&output.clone().normalized());
                (
                    calibrated.output.source,
                    calibrated.raw_probability,
                    calibrated.output.probability,
                    calibrated.output.confidence,
                    Some(calibrated.method),
                    false,
                )
            }
            None => {
                debug!(
                    engine = slot,
                    error = %FusionError::MissingSignal { engine: slot.to_string() },
                    "Substituting fail-safe output"
                );
                let output = self.fail_safe.output(Some(slot));
                (
                    output.source,
                    output.probability,
                    output.probability,
                    output.confidence,
                    None,
                    true,
                )
            }
        };

        let effective = static_weight * confidence * quality_weight;
        EngineContribution {
            engine: slot.to_string(),
            source,
            raw_probability: raw,
            probability,
            confidence,
            static_weight,
            effective_weight: if effective.is_finite() && effective > 0.0 {
                effective
            } else {
                0.0
            },
            share: 0.0,
            method,
            substituted,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
