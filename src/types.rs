//! Shared types for the TIPFUSION core.
//!
//! These types form the data model used across all modules. Every one
//! of them is a transient, per-request value: nothing here is shared
//! mutably between concurrent match evaluations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::math::{clamp_prob, clamp_unit};

/// Engine slot name → output. `None` means the engine produced nothing
/// for this match, which is an expected state rather than an error.
pub type EngineOutputs = BTreeMap<String, Option<EngineOutput>>;

/// Free-form match payload handed to every engine. Must carry `match_id`.
pub type MatchData = HashMap<String, serde_json::Value>;

/// Key under which [`MatchData`] carries the match identifier.
pub const MATCH_ID_KEY: &str = "match_id";

// ---------------------------------------------------------------------------
// Engine output contract
// ---------------------------------------------------------------------------

/// The uniform shape every predictive engine emits for one match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineOutput {
    /// Win probability for the fixed outcome side, in [0.01, 0.99].
    pub probability: f64,
    /// Engine's self-reported reliability, in [0, 1].
    pub confidence: f64,
    /// Engine's self-reported uncertainty, in [0, 1].
    pub risk: f64,
    /// Producing engine.
    pub source: String,
    /// Engine-specific diagnostics. Keys are documented per engine, not
    /// contractual.
    #[serde(default)]
    pub meta: BTreeMap<String, serde_json::Value>,
}

impl EngineOutput {
    /// Build an output, clamping every number into its contractual range.
    pub fn new(source: impl Into<String>, probability: f64, confidence: f64, risk: f64) -> Self {
        Self {
            probability,
            confidence,
            risk,
            source: source.into(),
            meta: BTreeMap::new(),
        }
        .normalized()
    }

    /// Attach a meta entry (builder style).
    pub fn with_meta(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Whether the load-bearing numbers are all finite.
    pub fn is_well_formed(&self) -> bool {
        self.probability.is_finite() && self.confidence.is_finite() && self.risk.is_finite()
    }

    /// Clamp probability into [0.01, 0.99] and confidence/risk into [0, 1].
    pub fn normalized(mut self) -> Self {
        self.probability = clamp_prob(self.probability);
        self.confidence = clamp_unit(self.confidence);
        self.risk = clamp_unit(self.risk);
        self
    }

    /// Parse an untyped record. Returns `None` for anything that is not a
    /// well-formed output, so the caller can treat it as a missing engine.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        let output: EngineOutput = serde_json::from_value(value.clone()).ok()?;
        output.is_well_formed().then(|| output.normalized())
    }
}

impl fmt::Display for EngineOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] p={:.1}% conf={:.0}% risk={:.0}%",
            self.source,
            self.probability * 100.0,
            self.confidence * 100.0,
            self.risk * 100.0,
        )
    }
}

// ---------------------------------------------------------------------------
// Quality
// ---------------------------------------------------------------------------

/// Data-quality verdict over the full set of engine outputs for one match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub quality_score: f64,
    pub outlier_score: f64,
    pub consistency_score: f64,
    pub missing_score: f64,
    pub volatility: f64,
    /// Equal to `quality_score`.
    pub confidence: f64,
    /// `1 - confidence`.
    pub risk: f64,
    pub engines_checked: Vec<String>,
}

impl fmt::Display for QualityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "quality={:.3} (outlier={:.3} consistency={:.3} missing={:.3} volatility={:.3})",
            self.quality_score,
            self.outlier_score,
            self.consistency_score,
            self.missing_score,
            self.volatility,
        )
    }
}

// ---------------------------------------------------------------------------
// Calibration
// ---------------------------------------------------------------------------

/// Which calibration strategy won for a given probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMethod {
    Platt,
    Isotonic,
    Hybrid,
}

impl fmt::Display for CalibrationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationMethod::Platt => write!(f, "platt"),
            CalibrationMethod::Isotonic => write!(f, "isotonic"),
            CalibrationMethod::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// Result of calibrating a single probability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub calibrated: f64,
    pub method: CalibrationMethod,
    pub ece: f64,
    pub confidence: f64,
}

/// An engine output whose probability has been replaced by its calibrated value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedOutput {
    pub output: EngineOutput,
    pub raw_probability: f64,
    pub method: CalibrationMethod,
    pub ece: f64,
    pub calibration_confidence: f64,
}

// ---------------------------------------------------------------------------
// Consensus
// ---------------------------------------------------------------------------

/// How much one engine slot contributed to the consensus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineContribution {
    pub engine: String,
    pub source: String,
    pub raw_probability: f64,
    pub probability: f64,
    pub confidence: f64,
    pub static_weight: f64,
    pub effective_weight: f64,
    /// Fraction of the total effective weight (0 when weights degenerated).
    pub share: f64,
    /// `None` for fail-safe substitutes, which are not calibrated.
    pub method: Option<CalibrationMethod>,
    pub substituted: bool,
}

/// Recovery applied when the effective fusion weights were unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightFallback {
    /// All weights were zero; plain mean of the slot probabilities.
    UnweightedMean,
    /// Nothing to average; the fail-safe probability was used.
    FailSafe,
}

/// The consensus for one match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub probability: f64,
    pub confidence: f64,
    pub quality_score: f64,
    pub risk: f64,
    pub contributions: Vec<EngineContribution>,
    pub fallback: Option<WeightFallback>,
    /// Posterior from the line-movement update, when a sharp score was supplied.
    pub sharp_posterior: Option<f64>,
}

impl ConsensusResult {
    /// Number of slots that carried a real (non-substituted) engine output.
    pub fn live_engines(&self) -> usize {
        self.contributions.iter().filter(|c| !c.substituted).count()
    }
}

impl fmt::Display for ConsensusResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "p={:.1}% conf={:.0}% risk={:.0}% quality={:.2} ({}/{} live engines)",
            self.probability * 100.0,
            self.confidence * 100.0,
            self.risk * 100.0,
            self.quality_score,
            self.live_engines(),
            self.contributions.len(),
        )
    }
}

// ---------------------------------------------------------------------------
// Pricing and staking
// ---------------------------------------------------------------------------

/// Edge and value of a probability against decimal market odds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeValue {
    /// Percentage points of model probability over implied probability.
    pub edge: f64,
    /// `p * odds - (1 - p)`.
    pub value: f64,
    pub fair_odds: f64,
    pub odds: f64,
}

/// Recommended stake for one priced match.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StakeDecision {
    pub stake_pct: f64,
    pub stake_amount: f64,
    pub kelly_raw: f64,
    pub reward: f64,
    pub streak_mod: f64,
    pub market_mod: f64,
}

impl fmt::Display for StakeDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stake {:.2}% (${:.2}) kelly={:.4} reward={:.4} streak×{} market×{}",
            self.stake_pct * 100.0,
            self.stake_amount,
            self.kelly_raw,
            self.reward,
            self.streak_mod,
            self.market_mod,
        )
    }
}

/// Win/loss run counters. Owned by the caller; the core only reads them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streaks {
    #[serde(default)]
    pub hot_streak: u32,
    #[serde(default)]
    pub cold_streak: u32,
}

impl Streaks {
    /// Advance the counters after a settled tip.
    pub fn record(&mut self, won: bool) {
        if won {
            self.hot_streak += 1;
            self.cold_streak = 0;
        } else {
            self.cold_streak += 1;
            self.hot_streak = 0;
        }
    }
}

// ---------------------------------------------------------------------------
// Market snapshot
// ---------------------------------------------------------------------------

/// Recent series used for the volatility check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalHistory {
    #[serde(default)]
    pub trend: Vec<f64>,
    #[serde(default)]
    pub probability: Vec<f64>,
    #[serde(default)]
    pub drift: Vec<f64>,
}

/// Market state for the outcome side being evaluated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Current decimal odds.
    pub odds: f64,
    /// Odds history, oldest first.
    #[serde(default)]
    pub history: Vec<f64>,
    /// Smart-money strength, 0–100.
    #[serde(default)]
    pub sharp_score: Option<f64>,
    /// Closing line value, if already known.
    #[serde(default)]
    pub clv: Option<f64>,
    /// Forecast closing odds.
    #[serde(default)]
    pub expected_closing: Option<f64>,
    /// Expected probability drift towards close.
    #[serde(default)]
    pub drift: Option<f64>,
    #[serde(default)]
    pub signal_history: Option<SignalHistory>,
}

impl MarketSnapshot {
    pub fn with_odds(odds: f64) -> Self {
        Self {
            odds,
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// One match to evaluate end to end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRequest {
    pub match_id: String,
    /// Extra payload forwarded to every engine.
    #[serde(default)]
    pub data: MatchData,
    pub market: MarketSnapshot,
    #[serde(default)]
    pub streaks: Option<Streaks>,
    /// Falls back to the service-wide bankroll when absent.
    #[serde(default)]
    pub bankroll: Option<f64>,
}

impl MatchRequest {
    pub fn new(match_id: impl Into<String>, market: MarketSnapshot) -> Self {
        Self {
            match_id: match_id.into(),
            data: MatchData::new(),
            market,
            streaks: None,
            bankroll: None,
        }
    }

    /// Engine payload: `data` with `match_id` set.
    pub fn match_data(&self) -> MatchData {
        let mut data = self.data.clone();
        data.insert(
            MATCH_ID_KEY.to_string(),
            serde_json::Value::String(self.match_id.clone()),
        );
        data
    }
}

/// Whether a match could be priced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    Priced {
        edge_value: EdgeValue,
        stake: StakeDecision,
    },
    /// Left out of edge/value/stake computation (e.g. odds ≤ 1).
    Excluded { reason: String },
}

/// Everything the core decides about one match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchEvaluation {
    pub match_id: String,
    pub evaluated_at: DateTime<Utc>,
    pub quality: QualityReport,
    pub consensus: ConsensusResult,
    pub verdict: Verdict,
}

impl MatchEvaluation {
    pub fn edge_value(&self) -> Option<&EdgeValue> {
        match &self.verdict {
            Verdict::Priced { edge_value, .. } => Some(edge_value),
            Verdict::Excluded { .. } => None,
        }
    }

    pub fn stake(&self) -> Option<&StakeDecision> {
        match &self.verdict {
            Verdict::Priced { stake, .. } => Some(stake),
            Verdict::Excluded { .. } => None,
        }
    }
}

impl fmt::Display for MatchEvaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.verdict {
            Verdict::Priced { edge_value, stake } => write!(
                f,
                "{}: {} | edge {:+.2}pp @ {:.2} | {}",
                self.match_id, self.consensus, edge_value.edge, edge_value.odds, stake,
            ),
            Verdict::Excluded { reason } => {
                write!(f, "{}: {} | excluded: {}", self.match_id, self.consensus, reason)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for TIPFUSION.
#[derive(Debug, thiserror::Error)]
pub enum FusionError {
    #[error("Missing signal from engine {engine}")]
    MissingSignal { engine: String },

    #[error("Invalid market odds: {0} (must be finite and > 1)")]
    InvalidOdds(f64),

    #[error("All effective fusion weights are zero")]
    DegenerateWeights,

    #[error("Engine error ({engine}): {message}")]
    Engine { engine: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
