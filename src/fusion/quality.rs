//! Data quality scoring.
//!
//! Judges how trustworthy the full set of engine outputs for one match is:
//! do the probabilities disagree wildly (outliers), does the market move
//! agree with the probability (consistency), how many engines are silent
//! (missing), and how jumpy have the recent signals been (volatility).
//! The resulting quality score becomes a dynamic fusion weight.

use tracing::debug;

use crate::config::QualityConfig;
use crate::math::{clamp_unit, mean, population_std};
use crate::types::{EngineOutputs, QualityReport, SignalHistory};

/// Outlier score is always weighted at this fixed penalty.
const OUTLIER_PENALTY: f64 = 0.25;

/// Probability shift expected per unit of market drift.
const DRIFT_TO_PROB: f64 = 1.4;

/// Standard deviation at which a history series counts as fully volatile.
const MAX_VOLATILITY_STD: f64 = 0.20;

/// Minimum number of points for a z-score or a volatility estimate.
const MIN_POINTS: usize = 3;

/// Paired market readings used by the consistency check. All three must be
/// present for the check to say anything.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConsistencyInput {
    pub probability: Option<f64>,
    pub drift: Option<f64>,
    pub expected_closing: Option<f64>,
}

pub struct QualityScorer {
    config: QualityConfig,
}

impl QualityScorer {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Score one match. Pure function of its inputs.
    pub fn analyze(
        &self,
        outputs: &EngineOutputs,
        consistency: &ConsistencyInput,
        history: Option<&SignalHistory>,
    ) -> QualityReport {
        let outlier = self.outlier_score(&Self::probability_values(outputs));
        let consistency = Self::consistency_score(consistency);
        let missing = Self::missing_score(outputs);
        let volatility = history.map(Self::volatility).unwrap_or(0.0);

        let c = &self.config;
        let raw = c.base_quality
            - outlier * OUTLIER_PENALTY
            - consistency * c.consistency_penalty
            - missing * c.missing_penalty
            - volatility * c.volatility_penalty;
        let quality = if raw.is_finite() {
            raw.clamp(c.min_quality, 1.0)
        } else {
            c.min_quality
        };

        debug!(
            quality,
            outlier,
            consistency,
            missing,
            volatility,
            engines = outputs.len(),
            "Quality scored"
        );

        QualityReport {
            quality_score: quality,
            outlier_score: outlier,
            consistency_score: consistency,
            missing_score: missing,
            volatility,
            confidence: quality,
            risk: 1.0 - quality,
            engines_checked: outputs.keys().cloned().collect(),
        }
    }

    /// Every numeric value keyed by something containing "prob": the
    /// `probability` field itself plus any such `meta` entries.
    fn probability_values(outputs: &EngineOutputs) -> Vec<f64> {
        let mut values = Vec::new();
        for output in outputs.values().flatten() {
            if !output.is_well_formed() {
                continue;
            }
            values.push(output.probability);
            for (key, value) in &output.meta {
                if key.contains("prob") {
                    if let Some(v) = value.as_f64().filter(|v| v.is_finite()) {
                        values.push(v);
                    }
                }
            }
        }
        values
    }

    /// `max|z| / outlier_threshold`, clamped to [0, 1].
    pub fn outlier_score(&self, values: &[f64]) -> f64 {
        if values.len() < MIN_POINTS {
            return 0.0;
        }
        let (Some(m), Some(std)) = (mean(values), population_std(values)) else {
            return 0.0;
        };
        if std == 0.0 || !std.is_finite() {
            return 0.0;
        }
        let max_z = values
            .iter()
            .map(|v| ((v - m) / std).abs())
            .fold(0.0, f64::max);
        clamp_unit(max_z / self.config.outlier_threshold)
    }

    fn consistency_score(input: &ConsistencyInput) -> f64 {
        let (Some(probability), Some(drift), Some(_closing)) =
            (input.probability, input.drift, input.expected_closing)
        else {
            return 0.0;
        };
        let expected_shift = drift * DRIFT_TO_PROB;
        let actual_shift = probability - 0.5;
        clamp_unit((actual_shift - expected_shift).abs() * 2.0)
    }

    fn missing_score(outputs: &EngineOutputs) -> f64 {
        if outputs.is_empty() {
            return 1.0;
        }
        let missing = outputs
            .values()
            .filter(|o| o.as_ref().map_or(true, |o| !o.is_well_formed()))
            .count();
        clamp_unit(missing as f64 / outputs.len() as f64)
    }

    fn volatility(history: &SignalHistory) -> f64 {
        let subs = [
            Self::series_volatility(&history.trend),
            Self::series_volatility(&history.probability),
            Self::series_volatility(&history.drift),
        ];
        subs.iter().sum::<f64>() / subs.len() as f64
    }

    fn series_volatility(series: &[f64]) -> f64 {
        if series.len() < MIN_POINTS {
            return 0.0;
        }
        population_std(series)
            .map(|std| clamp_unit(std / MAX_VOLATILITY_STD))
            .unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
