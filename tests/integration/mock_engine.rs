//! Mock engine for integration testing.
//!
//! Provides a deterministic `PredictionEngine` that serves fixed outputs
//! per match, counts its calls, and can be switched into failing or slow
//! modes from test code.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tipfusion::engine::PredictionEngine;
use tipfusion::types::{EngineOutput, MatchData, MATCH_ID_KEY};

pub struct MockEngine {
    name: String,
    outputs: HashMap<String, EngineOutput>,
    calls: Arc<AtomicUsize>,
    /// If set, every call fails with this message.
    force_error: Mutex<Option<String>>,
    delay: Option<Duration>,
}

impl MockEngine {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            outputs: HashMap::new(),
            calls: Arc::new(AtomicUsize::new(0)),
            force_error: Mutex::new(None),
            delay: None,
        }
    }

    /// Score `match_id` with the given probability and confidence.
    pub fn scoring(mut self, match_id: &str, probability: f64, confidence: f64) -> Self {
        self.outputs.insert(
            match_id.to_string(),
            EngineOutput::new(self.name.clone(), probability, confidence, 1.0 - confidence)
                .with_meta("mode", "mock"),
        );
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    /// Shared call counter, readable after the engine is moved into a registry.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl PredictionEngine for MockEngine {
    async fn predict(&self, match_data: &MatchData) -> Result<HashMap<String, EngineOutput>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(msg) = self.force_error.lock().unwrap().clone() {
            return Err(anyhow!(msg));
        }
        let mut out = HashMap::new();
        if let Some(id) = match_data.get(MATCH_ID_KEY).and_then(|v| v.as_str()) {
            if let Some(output) = self.outputs.get(id) {
                out.insert(id.to_string(), output.clone());
            }
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
