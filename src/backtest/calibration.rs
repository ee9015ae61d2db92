//! Calibration tracking.
//!
//! Measures how well settled predictions matched reality, overall and per
//! engine source: Brier scores, a reliability curve, binned expected
//! calibration error (ECE), and a coarse over/under-confidence diagnosis.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::CalibrationConfig;
use crate::types::MatchEvaluation;

/// Source label used for the fused consensus itself.
pub const CONSENSUS_SOURCE: &str = "consensus";

/// Buckets with fewer points are ignored by the diagnosis.
const MIN_BUCKET_POINTS: usize = 3;
const MIN_POPULATED_BUCKETS: usize = 3;
const MIN_TOTAL_POINTS: usize = 20;
/// Deviation below which a bucket counts as calibrated.
const BUCKET_TOLERANCE: f64 = 0.05;

// ---------------------------------------------------------------------------
// Calibration data
// ---------------------------------------------------------------------------

/// One settled prediction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationPoint {
    pub match_id: String,
    pub source: String,
    pub predicted: f64,
    pub won: bool,
}

impl CalibrationPoint {
    fn squared_error(&self) -> f64 {
        let outcome = if self.won { 1.0 } else { 0.0 };
        (self.predicted - outcome).powi(2)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CalibrationReport {
    pub total_predictions: usize,
    pub overall_brier: f64,
    pub source_brier: BTreeMap<String, f64>,
    pub reliability_curve: Vec<CalibrationBucket>,
    pub ece: f64,
    pub diagnosis: CalibrationDiagnosis,
}

/// A bucket in the reliability curve (e.g. all predictions in [0.6, 0.7)).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationBucket {
    pub bin_start: f64,
    pub bin_end: f64,
    pub mean_predicted: f64,
    pub actual_rate: f64,
    pub count: usize,
    /// `|mean_predicted - actual_rate|`
    pub deviation: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationDiagnosis {
    WellCalibrated,
    /// Predictions too extreme.
    OverConfident,
    /// Predictions too central.
    UnderConfident,
    InsufficientData,
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

pub struct CalibrationTracker {
    points: Vec<CalibrationPoint>,
    bins: usize,
}

impl CalibrationTracker {
    /// Uses `ece_bins` bins for the reliability curve.
    pub fn new(config: &CalibrationConfig) -> Self {
        Self {
            points: Vec::new(),
            bins: config.ece_bins.max(1),
        }
    }

    /// Add a settled prediction. Non-finite predictions are ignored.
    pub fn record(
        &mut self,
        match_id: impl Into<String>,
        source: impl Into<String>,
        predicted: f64,
        won: bool,
    ) {
        if !predicted.is_finite() {
            return;
        }
        self.points.push(CalibrationPoint {
            match_id: match_id.into(),
            source: source.into(),
            predicted: predicted.clamp(0.0, 1.0),
            won,
        });
    }

    /// Record a settled evaluation: the consensus plus every live engine's
    /// calibrated probability under its own source.
    pub fn record_evaluation(&mut self, evaluation: &MatchEvaluation, won: bool) {
        let id = &evaluation.match_id;
        self.record(id.as_str(), CONSENSUS_SOURCE, evaluation.consensus.probability, won);
        for c in evaluation.consensus.contributions.iter().filter(|c| !c.substituted) {
            self.record(id.as_str(), c.source.as_str(), c.probability, won);
        }
    }

    pub fn count(&self) -> usize {
        self.points.len()
    }

    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    pub fn report(&self) -> CalibrationReport {
        let reliability_curve = self.reliability_curve();
        let ece = Self::ece(&reliability_curve, self.points.len());
        let diagnosis = self.diagnose(&reliability_curve);
        CalibrationReport {
            total_predictions: self.points.len(),
            overall_brier: Self::brier(self.points.iter()),
            source_brier: self.source_brier(),
            reliability_curve,
            ece,
            diagnosis,
        }
    }

    /// Mean squared error against the 0/1 outcome. 0 when empty.
    fn brier<'a>(points: impl Iterator<Item = &'a CalibrationPoint>) -> f64 {
        let (sum, n) = points.fold((0.0, 0usize), |(s, n), p| (s + p.squared_error(), n + 1));
        if n == 0 {
            0.0
        } else {
            sum / n as f64
        }
    }

    fn source_brier(&self) -> BTreeMap<String, f64> {
        let mut by_source: BTreeMap<&str, Vec<&CalibrationPoint>> = BTreeMap::new();
        for p in &self.points {
            by_source.entry(p.source.as_str()).or_default().push(p);
        }
        by_source
            .into_iter()
            .map(|(source, points)| (source.to_string(), Self::brier(points.into_iter())))
            .collect()
    }

    fn bin_index(&self, predicted: f64) -> usize {
        ((predicted * self.bins as f64) as usize).min(self.bins - 1)
    }

    fn reliability_curve(&self) -> Vec<CalibrationBucket> {
        let width = 1.0 / self.bins as f64;
        let mut sums = vec![(0.0, 0usize, 0usize); self.bins];
        for p in &self.points {
            let slot = &mut sums[self.bin_index(p.predicted)];
            slot.0 += p.predicted;
            slot.1 += 1;
            slot.2 += usize::from(p.won);
        }

        sums.into_iter()
            .enumerate()
            .map(|(i, (predicted_sum, count, wins))| {
                let bin_start = i as f64 * width;
                let bin_end = bin_start + width;
                if count == 0 {
                    return CalibrationBucket {
                        bin_start,
                        bin_end,
                        mean_predicted: (bin_start + bin_end) / 2.0,
                        actual_rate: 0.0,
                        count: 0,
                        deviation: 0.0,
                    };
                }
                let mean_predicted = predicted_sum / count as f64;
                let actual_rate = wins as f64 / count as f64;
                CalibrationBucket {
                    bin_start,
                    bin_end,
                    mean_predicted,
                    actual_rate,
                    count,
                    deviation: (mean_predicted - actual_rate).abs(),
                }
            })
            .collect()
    }

    /// `Σ count/N × |mean_predicted − actual_rate|`
    fn ece(curve: &[CalibrationBucket], total: usize) -> f64 {
        if total == 0 {
            return 0.0;
        }
        curve
            .iter()
            .map(|b| b.count as f64 / total as f64 * b.deviation)
            .sum()
    }

    fn diagnose(&self, curve: &[CalibrationBucket]) -> CalibrationDiagnosis {
        let populated: Vec<&CalibrationBucket> =
            curve.iter().filter(|b| b.count >= MIN_BUCKET_POINTS).collect();
        if populated.len() < MIN_POPULATED_BUCKETS || self.points.len() < MIN_TOTAL_POINTS {
            return CalibrationDiagnosis::InsufficientData;
        }

        // Only the tails say anything about over/under-confidence.
        let (mut over, mut under) = (0, 0);
        for b in populated.iter().filter(|b| b.deviation >= BUCKET_TOLERANCE) {
            let mid = (b.bin_start + b.bin_end) / 2.0;
            let too_extreme = if mid < 0.3 {
                b.actual_rate > b.mean_predicted
            } else if mid > 0.7 {
                b.actual_rate < b.mean_predicted
            } else {
                continue;
            };
            if too_extreme {
                over += 1;
            } else {
                under += 1;
            }
        }

        if over > under + 1 {
            CalibrationDiagnosis::OverConfident
        } else if under > over + 1 {
            CalibrationDiagnosis::UnderConfident
        } else {
            CalibrationDiagnosis::WellCalibrated
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::strategy::MatchOrchestrator;
    use crate::types::{EngineOutput, EngineOutputs, MarketSnapshot};
    use assert_float_eq::*;

    fn tracker() -> CalibrationTracker {
        CalibrationTracker::new(&CalibrationConfig::default())
    }

    #[test]
    fn test_empty_tracker() {
        let report = tracker().report();
        assert_eq!(report.total_predictions, 0);
        assert_eq!(report.overall_brier, 0.0);
        assert_eq!(report.ece, 0.0);
        assert_eq!(report.reliability_curve.len(), 10);
        assert_eq!(report.diagnosis, CalibrationDiagnosis::InsufficientData);
    }

    #[test]
    fn test_sharp_predictions_score_well() {
        let mut t = tracker();
        for i in 0..10 {
            t.record(format!("w{i}"), "poisson", 0.9, true);
            t.record(format!("l{i}"), "poisson", 0.1, false);
        }
        let report = t.report();
        assert_float_absolute_eq!(0.01, report.overall_brier, 1e-12);
        assert!(report.ece < 0.11);
    }

    #[test]
    fn test_inverted_predictions_score_badly() {
        let mut t = tracker();
        for i in 0..10 {
            t.record(format!("w{i}"), "lstm", 0.9, false);
            t.record(format!("l{i}"), "lstm", 0.1, true);
        }
        let report = t.report();
        assert!(report.overall_brier > 0.5);
        assert_float_absolute_eq!(0.9, report.ece, 1e-9);
    }

    #[test]
    fn test_brier_per_source() {
        let mut t = tracker();
        t.record("m1", "poisson", 0.8, true);
        t.record("m1", "gnn", 0.4, true);
        let report = t.report();
        assert_float_absolute_eq!(0.04, report.source_brier["poisson"], 1e-12);
        assert_float_absolute_eq!(0.36, report.source_brier["gnn"], 1e-12);
        assert_float_absolute_eq!(0.2, report.overall_brier, 1e-12);
    }

    #[test]
    fn test_bins_cover_edges() {
        let mut t = tracker();
        t.record("a", "x", 0.0, false);
        t.record("b", "x", 1.0, true);
        t.record("c", "x", 0.35, true);
        t.record("d", "x", f64::NAN, true);
        let curve = t.report().reliability_curve;
        assert_eq!(t.count(), 3);
        assert_eq!(curve[0].count, 1);
        assert_eq!(curve[3].count, 1);
        assert_eq!(curve[9].count, 1);
        assert_float_absolute_eq!(0.65, curve[3].deviation, 1e-12);
    }

    #[test]
    fn test_overconfident_diagnosis() {
        let mut t = tracker();
        // High bins win far less than predicted; low bins far more.
        for (p, wins) in [(0.05, 2), (0.15, 2), (0.85, 1), (0.95, 2)] {
            for i in 0..5 {
                t.record(format!("{p}-{i}"), "lstm", p, i < wins);
            }
        }
        assert_eq!(t.report().diagnosis, CalibrationDiagnosis::OverConfident);
    }

    #[test]
    fn test_record_evaluation_tracks_consensus_and_live_engines() {
        let orchestrator = MatchOrchestrator::new(&AppConfig::default()).unwrap();
        let outputs: EngineOutputs = [
            ("poisson".to_string(), Some(EngineOutput::new("poisson", 0.62, 0.8, 0.2))),
            ("lstm".to_string(), None),
        ]
        .into_iter()
        .collect();
        let eval = orchestrator.evaluate_match(
            "m1",
            &outputs,
            &MarketSnapshot::with_odds(2.0),
            None,
            100.0,
        );

        let mut t = tracker();
        t.record_evaluation(&eval, true);
        let sources: Vec<&str> = t.points().iter().map(|p| p.source.as_str()).collect();
        assert_eq!(sources, vec![CONSENSUS_SOURCE, "poisson"]);
    }
}
