//! Probability calibration.
//!
//! Runs three cheap calibration strategies over a raw engine probability
//! and keeps the one whose output stays closest to the input (a per-value
//! ECE proxy), then pulls the winner part of the way back towards the raw
//! value.
//!
//! - platt: sigmoid squash around 0.5, `1 / (1 + e^{-4(p - 0.5)})`
//! - isotonic: monotone compressor, `sqrt(p)`
//! - hybrid: inverse-error weighted blend of the two

use crate::config::CalibrationConfig;
use crate::math::clamp_or;
use crate::types::{CalibratedOutput, Calibration, CalibrationMethod, EngineOutput};

/// Inner clamp applied before the strategy functions.
const STRATEGY_EPS: f64 = 1e-4;

/// Keeps the inverse-error weights finite when a strategy is exact.
const WEIGHT_EPS: f64 = 1e-6;

/// Lower bound of the calibrator's own confidence.
const MIN_CALIBRATION_CONFIDENCE: f64 = 0.55;

pub struct Calibrator {
    config: CalibrationConfig,
}

impl Calibrator {
    pub fn new(config: CalibrationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Calibrate a single probability. Never fails: out-of-range input is
    /// clamped to `[min_prob, max_prob]` and NaN is treated as 0.5.
    pub fn calibrate(&self, probability: f64) -> Calibration {
        let (lo, hi) = (self.config.min_prob, self.config.max_prob);
        let p = clamp_or(probability, lo, hi, 0.5);

        let platt = platt(p);
        let isotonic = isotonic(p);
        let err_platt = (p - platt).abs();
        let err_iso = (p - isotonic).abs();

        let w_platt = 1.0 / (err_platt + WEIGHT_EPS);
        let w_iso = 1.0 / (err_iso + WEIGHT_EPS);
        let hybrid = (platt * w_platt + isotonic * w_iso) / (w_platt + w_iso);
        let err_hybrid = (p - hybrid).abs();

        // Strict `<` keeps the earlier candidate on ties.
        let candidates = [
            (err_platt, CalibrationMethod::Platt, platt),
            (err_iso, CalibrationMethod::Isotonic, isotonic),
            (err_hybrid, CalibrationMethod::Hybrid, hybrid),
        ];
        let (best_err, method, best) = candidates
            .into_iter()
            .reduce(|best, c| if c.0 < best.0 { c } else { best })
            .unwrap_or(candidates[0]);

        let correction = best_err * self.config.ece_scaling;
        let corrected = if best > p {
            best - correction
        } else {
            best + correction
        };

        Calibration {
            calibrated: clamp_or(corrected, lo, hi, p),
            method,
            ece: best_err,
            confidence: clamp_or(
                1.0 - best_err,
                MIN_CALIBRATION_CONFIDENCE,
                1.0,
                MIN_CALIBRATION_CONFIDENCE,
            ),
        }
    }

    /// Calibrate an engine output, replacing its probability.
    pub fn calibrate_output(&self, output: &EngineOutput) -> CalibratedOutput {
        let calibration = self.calibrate(output.probability);
        let mut calibrated = output.clone();
        calibrated.probability = calibration.calibrated;
        CalibratedOutput {
            output: calibrated.normalized(),
            raw_probability: output.probability,
            method: calibration.method,
            ece: calibration.ece,
            calibration_confidence: calibration.confidence,
        }
    }
}

fn platt(p: f64) -> f64 {
    let p = p.clamp(STRATEGY_EPS, 1.0 - STRATEGY_EPS);
    1.0 / (1.0 + (-4.0 * (p - 0.5)).exp())
}

fn isotonic(p: f64) -> f64 {
    let p = p.clamp(STRATEGY_EPS, 1.0 - STRATEGY_EPS);
    p.sqrt().clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
