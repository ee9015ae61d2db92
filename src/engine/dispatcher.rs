//! Concurrent engine dispatch.
//!
//! Every registered engine is called at once for a match, each under its
//! own timeout. A slow, failing, or silent engine only ever costs its own
//! slot: it comes back as `None` and the fusion layer substitutes it.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::registry::EngineRegistry;
use super::PredictionEngine;
use crate::config::DispatchConfig;
use crate::types::{EngineOutput, EngineOutputs, FusionError, MatchData, MATCH_ID_KEY};

pub struct EngineDispatcher {
    registry: EngineRegistry,
    timeout: Duration,
}

impl EngineDispatcher {
    pub fn new(registry: EngineRegistry, config: &DispatchConfig) -> Self {
        Self {
            registry,
            timeout: Duration::from_millis(config.engine_timeout_ms),
        }
    }

    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    /// Call every engine for one match and collect one slot per engine.
    pub async fn collect(&self, match_data: &MatchData) -> EngineOutputs {
        let match_id = match match_data.get(MATCH_ID_KEY).and_then(|v| v.as_str()) {
            Some(id) => id.to_string(),
            None => {
                warn!("Match data has no match_id; every engine slot left empty");
                return self
                    .registry
                    .names()
                    .into_iter()
                    .map(|name| (name.to_string(), None))
                    .collect();
            }
        };

        let calls = self
            .registry
            .iter()
            .map(|engine| self.call(Arc::clone(engine), &match_id, match_data));
        join_all(calls).await.into_iter().collect()
    }

    async fn call(
        &self,
        engine: Arc<dyn PredictionEngine>,
        match_id: &str,
        match_data: &MatchData,
    ) -> (String, Option<EngineOutput>) {
        let name = engine.name().to_string();
        let output = match timeout(self.timeout, engine.predict(match_data)).await {
            Ok(Ok(mut predictions)) => match predictions.remove(match_id) {
                Some(output) if output.is_well_formed() => Some(output.normalized()),
                Some(_) => {
                    warn!(engine = %name, match_id, "Discarding malformed engine output");
                    None
                }
                None => {
                    debug!(
                        error = %FusionError::MissingSignal { engine: name.clone() },
                        match_id,
                        "Engine did not score this match"
                    );
                    None
                }
            },
            Ok(Err(e)) => {
                let error = FusionError::Engine {
                    engine: name.clone(),
                    message: format!("{e:#}"),
                };
                warn!(match_id, error = %error, "Engine call failed");
                None
            }
            Err(_) => {
                warn!(
                    engine = %name,
                    match_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Engine timed out"
                );
                None
            }
        };
        (name, output)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
