//! Fusion service. Dispatches engines for a match, then evaluates it.

use futures::future::join_all;
use tracing::info;

use super::dispatcher::EngineDispatcher;
use super::registry::EngineRegistry;
use crate::config::AppConfig;
use crate::strategy::MatchOrchestrator;
use crate::types::{FusionError, MatchEvaluation, MatchRequest};

pub struct FusionService {
    dispatcher: EngineDispatcher,
    orchestrator: MatchOrchestrator,
    bankroll: f64,
}

impl FusionService {
    /// `bankroll` is used for requests that do not carry their own.
    pub fn new(
        config: &AppConfig,
        registry: EngineRegistry,
        bankroll: f64,
    ) -> Result<Self, FusionError> {
        if !bankroll.is_finite() || bankroll < 0.0 {
            return Err(FusionError::Config(format!(
                "bankroll must be finite and non-negative, got {bankroll}"
            )));
        }
        let orchestrator = MatchOrchestrator::new(config)?;
        info!(
            engines = ?registry.names(),
            configured = config.fusion.engines.len(),
            bankroll = format!("${:.2}", bankroll),
            "Fusion service ready"
        );
        Ok(Self {
            dispatcher: EngineDispatcher::new(registry, &config.dispatch),
            orchestrator,
            bankroll,
        })
    }

    pub fn orchestrator(&self) -> &MatchOrchestrator {
        &self.orchestrator
    }

    pub fn registry(&self) -> &EngineRegistry {
        self.dispatcher.registry()
    }

    /// Collect every engine's output for the match and evaluate it.
    pub async fn evaluate(&self, request: &MatchRequest) -> MatchEvaluation {
        let outputs = self.dispatcher.collect(&request.match_data()).await;
        self.orchestrator.evaluate_match(
            &request.match_id,
            &outputs,
            &request.market,
            request.streaks.as_ref(),
            request.bankroll.unwrap_or(self.bankroll),
        )
    }

    /// Evaluate matches concurrently. Results keep the request order.
    pub async fn evaluate_batch(&self, requests: &[MatchRequest]) -> Vec<MatchEvaluation> {
        let evaluations = join_all(requests.iter().map(|r| self.evaluate(r))).await;
        let priced = evaluations.iter().filter(|e| e.stake().is_some()).count();
        info!(
            matches = evaluations.len(),
            priced,
            excluded = evaluations.len() - priced,
            "Batch evaluated"
        );
        evaluations
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
