//! Engine layer: the prediction-engine contract, the static registry,
//! concurrent dispatch with per-engine timeouts, and the service that
//! drives a match from engine calls through to a stake recommendation.

pub mod dispatcher;
pub mod fail_safe;
pub mod registry;
pub mod service;
pub mod snapshot;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

use crate::types::{EngineOutput, MatchData};

/// Abstraction over an external predictive engine (Poisson, Monte Carlo,
/// LSTM, GNN, trend, weather, injury, odds-implied, ...).
///
/// Engines that cannot score a match must leave its id out of the returned
/// map instead of emitting a zero-valued entry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PredictionEngine: Send + Sync {
    /// Score the match described by `match_data`, keyed by match id.
    async fn predict(&self, match_data: &MatchData) -> Result<HashMap<String, EngineOutput>>;

    /// Slot name used for weighting and reporting.
    fn name(&self) -> &str;
}
