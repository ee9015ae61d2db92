//! Static engine registry.
//!
//! Engines are declared explicitly at startup; nothing is discovered at
//! runtime, so the set of expected slots is known before the first match.

use std::sync::Arc;

use super::PredictionEngine;
use crate::types::FusionError;

#[derive(Clone, Default)]
pub struct EngineRegistry {
    engines: Vec<Arc<dyn PredictionEngine>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an engine. Names must be unique.
    pub fn register(&mut self, engine: Arc<dyn PredictionEngine>) -> Result<(), FusionError> {
        if self.get(engine.name()).is_some() {
            return Err(FusionError::Config(format!(
                "engine registered twice: {}",
                engine.name()
            )));
        }
        self.engines.push(engine);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn PredictionEngine>> {
        self.engines.iter().find(|e| e.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.engines.iter().map(|e| e.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn PredictionEngine>> {
        self.engines.iter()
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
