//! Fail-safe engine.
//!
//! Stands in for any engine that is missing, timed out, or returned a
//! malformed record. Its output is deterministic so that fusion always has
//! at least one well-defined signal to work with.

use serde_json::json;

use crate::config::FailSafeConfig;
use crate::math::clamp_unit;
use crate::types::EngineOutput;

/// Source tag carried by every substitute output.
pub const FAIL_SAFE_SOURCE: &str = "fail_safe";

#[derive(Debug, Clone)]
pub struct FailSafeEngine {
    config: FailSafeConfig,
}

impl FailSafeEngine {
    pub fn new(config: FailSafeConfig) -> Self {
        Self { config }
    }

    /// The fixed center probability.
    pub fn probability(&self) -> f64 {
        self.config.base_probability
    }

    /// Substitute output for `missing_engine` (or a generic one).
    pub fn output(&self, missing_engine: Option<&str>) -> EngineOutput {
        let p = self.config.base_probability;
        let confidence = self.confidence(p);
        let risk = clamp_unit((1.0 - p) * 0.4 + (1.0 - confidence) * 0.6);
        let ev = (p * 1.01 - 1.0).clamp(-0.20, 0.20);
        let note = match missing_engine {
            Some(name) => format!("fallback activated ({name} missing)"),
            None => "fallback activated".to_string(),
        };

        EngineOutput::new(FAIL_SAFE_SOURCE, p, confidence, risk)
            .with_meta("value_score", self.config.base_value)
            .with_meta("ev", ev)
            .with_meta("clv", 0.0)
            .with_meta("note", json!(note))
    }

    /// At least the configured floor, growing with distance from 0.5.
    fn confidence(&self, p: f64) -> f64 {
        (0.5 + (p - 0.5).abs()).clamp(self.config.min_confidence, 1.0)
    }
}
