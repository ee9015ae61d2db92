//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! key is optional and falls back to the documented default, so an empty
//! file (or no file at all) yields a working configuration. The resulting
//! `AppConfig` is immutable and handed to each component at construction.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::types::FusionError;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub quality: QualityConfig,
    pub calibration: CalibrationConfig,
    pub fusion: FusionConfig,
    pub fail_safe: FailSafeConfig,
    pub edge: EdgeConfig,
    pub stake: StakeConfig,
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct QualityConfig {
    /// z-score at which the outlier score saturates.
    pub outlier_threshold: f64,
    pub min_quality: f64,
    pub base_quality: f64,
    pub consistency_penalty: f64,
    pub missing_penalty: f64,
    pub volatility_penalty: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            outlier_threshold: 3.0,
            min_quality: 0.40,
            base_quality: 0.80,
            consistency_penalty: 0.20,
            missing_penalty: 0.15,
            volatility_penalty: 0.10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Reliability-curve bins used by the calibration tracker.
    pub ece_bins: usize,
    pub min_prob: f64,
    pub max_prob: f64,
    /// Fraction of the calibration error pulled back towards the raw value.
    pub ece_scaling: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            ece_bins: 10,
            min_prob: 0.05,
            max_prob: 0.95,
            ece_scaling: 0.35,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FusionConfig {
    /// Expected engine slots and their static importance weights.
    pub engines: BTreeMap<String, f64>,
    /// Static weight for slots not listed in `engines`.
    pub default_weight: f64,
    /// Floor for the consensus confidence.
    pub min_confidence: f64,
    pub outlier_risk_weight: f64,
    pub volatility_risk_weight: f64,
    /// How far the line-movement posterior pulls the consensus (0 disables).
    pub sharp_blend: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            engines: BTreeMap::new(),
            default_weight: 1.0,
            min_confidence: 0.40,
            outlier_risk_weight: 0.25,
            volatility_risk_weight: 0.10,
            sharp_blend: 0.25,
        }
    }
}

impl FusionConfig {
    /// Static importance weight for an engine slot.
    pub fn weight_for(&self, engine: &str) -> f64 {
        self.engines.get(engine).copied().unwrap_or(self.default_weight)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FailSafeConfig {
    pub base_probability: f64,
    pub min_confidence: f64,
    pub base_value: f64,
}

impl Default for FailSafeConfig {
    fn default() -> Self {
        Self {
            base_probability: 0.55,
            min_confidence: 0.55,
            base_value: 0.02,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct EdgeConfig {
    /// Minimum edge (percentage points) for a priced match to be ranked.
    pub min_edge: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StakeConfig {
    pub base_stake_pct: f64,
    pub max_stake_pct: f64,
    pub min_stake_pct: f64,
    /// Stake multiplier on a hot streak.
    pub aggressive_factor: f64,
    /// Stake multiplier on a cold streak.
    pub protect_factor: f64,
}

impl Default for StakeConfig {
    fn default() -> Self {
        Self {
            base_stake_pct: 0.01,
            max_stake_pct: 0.05,
            min_stake_pct: 0.003,
            aggressive_factor: 1.4,
            protect_factor: 0.55,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DispatchConfig {
    /// Per-engine budget for a single `predict` call.
    pub engine_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            engine_timeout_ms: 2000,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("Failed to load config file: {}", path.display()))?;
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject out-of-range settings. Called once at startup; a bad config
    /// is fatal rather than a per-request failure.
    pub fn validate(&self) -> Result<(), FusionError> {
        let q = &self.quality;
        ensure(q.outlier_threshold > 0.0, "quality.outlier_threshold must be > 0")?;
        ensure_unit(q.min_quality, "quality.min_quality")?;
        ensure_unit(q.base_quality, "quality.base_quality")?;
        for (name, v) in [
            ("quality.consistency_penalty", q.consistency_penalty),
            ("quality.missing_penalty", q.missing_penalty),
            ("quality.volatility_penalty", q.volatility_penalty),
        ] {
            ensure(v.is_finite() && v >= 0.0, &format!("{name} must be >= 0"))?;
        }

        let c = &self.calibration;
        ensure(c.ece_bins > 0, "calibration.ece_bins must be > 0")?;
        ensure_unit(c.min_prob, "calibration.min_prob")?;
        ensure_unit(c.max_prob, "calibration.max_prob")?;
        ensure(
            c.min_prob < c.max_prob,
            "calibration.min_prob must be < calibration.max_prob",
        )?;
        ensure_unit(c.ece_scaling, "calibration.ece_scaling")?;

        let f = &self.fusion;
        ensure(
            f.default_weight.is_finite() && f.default_weight >= 0.0,
            "fusion.default_weight must be >= 0",
        )?;
        for (engine, w) in &f.engines {
            ensure(
                w.is_finite() && *w >= 0.0,
                &format!("fusion.engines.{engine} weight must be >= 0"),
            )?;
        }
        ensure_unit(f.min_confidence, "fusion.min_confidence")?;
        ensure_unit(f.sharp_blend, "fusion.sharp_blend")?;
        ensure(
            f.outlier_risk_weight >= 0.0 && f.volatility_risk_weight >= 0.0,
            "fusion risk weights must be >= 0",
        )?;

        let safe = &self.fail_safe;
        ensure(
            safe.base_probability > 0.0 && safe.base_probability < 1.0,
            "fail_safe.base_probability must be in (0, 1)",
        )?;
        ensure_unit(safe.min_confidence, "fail_safe.min_confidence")?;

        ensure(self.edge.min_edge.is_finite(), "edge.min_edge must be finite")?;

        let s = &self.stake;
        ensure_unit(s.min_stake_pct, "stake.min_stake_pct")?;
        ensure_unit(s.max_stake_pct, "stake.max_stake_pct")?;
        ensure(
            s.min_stake_pct <= s.max_stake_pct,
            "stake.min_stake_pct must be <= stake.max_stake_pct",
        )?;
        ensure(s.base_stake_pct.is_finite(), "stake.base_stake_pct must be finite")?;
        ensure(
            s.aggressive_factor > 0.0 && s.protect_factor > 0.0,
            "stake streak factors must be > 0",
        )?;

        ensure(
            self.dispatch.engine_timeout_ms > 0,
            "dispatch.engine_timeout_ms must be > 0",
        )?;
        Ok(())
    }
}

fn ensure(cond: bool, message: &str) -> Result<(), FusionError> {
    if cond {
        Ok(())
    } else {
        Err(FusionError::Config(message.to_string()))
    }
}

fn ensure_unit(value: f64, name: &str) -> Result<(), FusionError> {
    ensure(
        value.is_finite() && (0.0..=1.0).contains(&value),
        &format!("{name} must be in [0, 1]"),
    )
}
