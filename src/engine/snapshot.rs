//! Snapshot-backed engines.
//!
//! A snapshot is a JSON file holding precomputed engine outputs together
//! with the matches to evaluate. Each engine in it becomes a
//! [`SnapshotEngine`] that serves its stored records through the normal
//! [`PredictionEngine`] contract, so the CLI goes through the same
//! dispatcher as a live deployment.
//!
//! ```json
//! {
//!   "bankroll": 1000.0,
//!   "matches": [{ "match_id": "m1", "market": { "odds": 2.1 } }],
//!   "engines": { "poisson": { "m1": { "probability": 0.64, ... } } },
//!   "outcomes": { "m1": true }
//! }
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use super::registry::EngineRegistry;
use super::PredictionEngine;
use crate::types::{EngineOutput, MatchData, MatchRequest, MATCH_ID_KEY};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub bankroll: Option<f64>,
    #[serde(default)]
    pub matches: Vec<MatchRequest>,
    /// Engine name → match id → raw output record.
    #[serde(default)]
    pub engines: BTreeMap<String, HashMap<String, serde_json::Value>>,
    /// Settled results (match id → won), fed to the calibration tracker.
    #[serde(default)]
    pub outcomes: BTreeMap<String, bool>,
}

impl Snapshot {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse snapshot: {}", path.display()))
    }

    /// One [`SnapshotEngine`] per engine in the file.
    pub fn registry(&self) -> Result<EngineRegistry> {
        let mut registry = EngineRegistry::new();
        for (name, records) in &self.engines {
            registry.register(Arc::new(SnapshotEngine::new(name.clone(), records.clone())))?;
        }
        Ok(registry)
    }
}

/// Serves stored records for the matches it knows about.
pub struct SnapshotEngine {
    name: String,
    records: HashMap<String, serde_json::Value>,
}

impl SnapshotEngine {
    pub fn new(name: impl Into<String>, records: HashMap<String, serde_json::Value>) -> Self {
        Self {
            name: name.into(),
            records,
        }
    }
}

#[async_trait]
impl PredictionEngine for SnapshotEngine {
    async fn predict(&self, match_data: &MatchData) -> Result<HashMap<String, EngineOutput>> {
        let mut out = HashMap::new();
        let Some(match_id) = match_data.get(MATCH_ID_KEY).and_then(|v| v.as_str()) else {
            return Ok(out);
        };
        match self.records.get(match_id).map(EngineOutput::from_value) {
            Some(Some(output)) => {
                out.insert(match_id.to_string(), output);
            }
            Some(None) => {
                warn!(engine = %self.name, match_id, "Stored record is not a valid engine output");
            }
            None => debug!(engine = %self.name, match_id, "No stored record"),
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
