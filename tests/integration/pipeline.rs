//! End-to-end evaluation through `FusionService`.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tipfusion::backtest::calibration::{CalibrationTracker, CONSENSUS_SOURCE};
use tipfusion::config::AppConfig;
use tipfusion::engine::registry::EngineRegistry;
use tipfusion::engine::service::FusionService;
use tipfusion::types::{MarketSnapshot, MatchRequest, Streaks, Verdict};

use crate::mock_engine::MockEngine;

fn registry(engines: Vec<MockEngine>) -> EngineRegistry {
    let mut registry = EngineRegistry::new();
    for engine in engines {
        registry.register(Arc::new(engine)).unwrap();
    }
    registry
}

fn config(toml: &str) -> AppConfig {
    AppConfig::from_toml(toml).unwrap()
}

#[tokio::test]
async fn test_full_pipeline_prices_value_match() {
    let engines = vec![
        MockEngine::new("poisson").scoring("ars-che", 0.68, 0.8),
        MockEngine::new("lstm").scoring("ars-che", 0.71, 0.75),
        MockEngine::new("gnn").scoring("ars-che", 0.66, 0.7),
    ];
    let svc = FusionService::new(&AppConfig::default(), registry(engines), 1000.0).unwrap();

    let market = MarketSnapshot {
        history: vec![2.2, 2.15, 2.1],
        expected_closing: Some(2.0),
        ..MarketSnapshot::with_odds(2.1)
    };
    let eval = svc.evaluate(&MatchRequest::new("ars-che", market)).await;

    assert_eq!(eval.consensus.live_engines(), 3);
    assert!(eval.consensus.fallback.is_none());
    let ev = eval.edge_value().unwrap();
    assert!(ev.edge > 10.0, "edge {}", ev.edge);
    let stake = eval.stake().unwrap();
    assert!((0.003..=0.05).contains(&stake.stake_pct));
    assert!(stake.kelly_raw > 0.0);
}

#[tokio::test]
async fn test_configured_engine_absent_from_registry_is_substituted() {
    let cfg = config(
        r#"
        [fusion.engines]
        poisson = 2.0
        weather = 0.5
        "#,
    );
    let engines = vec![MockEngine::new("poisson").scoring("m1", 0.6, 0.8)];
    let svc = FusionService::new(&cfg, registry(engines), 500.0).unwrap();

    let eval = svc
        .evaluate(&MatchRequest::new("m1", MarketSnapshot::with_odds(1.9)))
        .await;
    let weather = eval
        .consensus
        .contributions
        .iter()
        .find(|c| c.engine == "weather")
        .unwrap();
    assert!(weather.substituted);
    assert_eq!(weather.static_weight, 0.5);
    assert!(weather.method.is_none());
    assert_eq!(eval.consensus.live_engines(), 1);
    assert!((eval.quality.missing_score - 0.5).abs() < 1e-12);
    assert_eq!(eval.quality.engines_checked, vec!["poisson", "weather"]);
}

#[tokio::test]
async fn test_every_engine_failing_still_yields_consensus() {
    let a = MockEngine::new("poisson").scoring("m1", 0.7, 0.8);
    a.set_error("connection refused");
    let b = MockEngine::new("lstm").delayed(Duration::from_secs(10));
    let cfg = config("[dispatch]\nengine_timeout_ms = 50\n");
    let svc = FusionService::new(&cfg, registry(vec![a, b]), 1000.0).unwrap();

    let eval = svc
        .evaluate(&MatchRequest::new("m1", MarketSnapshot::with_odds(2.0)))
        .await;
    assert_eq!(eval.consensus.live_engines(), 0);
    assert!((eval.consensus.probability - 0.55).abs() < 1e-12);
    assert!(eval.consensus.confidence >= 0.40);
    assert!(eval.quality.missing_score > 0.99);
}

#[tokio::test]
async fn test_batch_runs_each_engine_once_per_match() {
    let engine = MockEngine::new("poisson")
        .scoring("a", 0.6, 0.8)
        .scoring("b", 0.4, 0.8)
        .scoring("c", 0.55, 0.8);
    let calls = engine.calls();
    let svc = FusionService::new(&AppConfig::default(), registry(vec![engine]), 1000.0).unwrap();

    let mut hot = MatchRequest::new("c", MarketSnapshot::with_odds(2.4));
    hot.streaks = Some(Streaks { hot_streak: 6, cold_streak: 0 });
    let requests = vec![
        MatchRequest::new("a", MarketSnapshot::with_odds(2.0)),
        MatchRequest::new("b", MarketSnapshot::with_odds(0.95)),
        hot,
    ];
    let evals = svc.evaluate_batch(&requests).await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(matches!(evals[1].verdict, Verdict::Excluded { .. }));
    assert_eq!(evals[2].stake().unwrap().streak_mod, 1.4);

    let ranked = svc.orchestrator().edge_evaluator().rank(&evals);
    assert!(ranked.iter().all(|e| e.match_id != "b"));
    let edges: Vec<f64> = ranked.iter().map(|e| e.edge_value().unwrap().edge).collect();
    assert!(edges.windows(2).all(|w| w[0] >= w[1]));
}

#[tokio::test]
async fn test_settled_batch_feeds_calibration_tracker() {
    let engines = vec![
        MockEngine::new("poisson").scoring("a", 0.7, 0.8).scoring("b", 0.3, 0.8),
        MockEngine::new("lstm").scoring("a", 0.65, 0.8),
    ];
    let cfg = AppConfig::default();
    let svc = FusionService::new(&cfg, registry(engines), 1000.0).unwrap();
    let requests = vec![
        MatchRequest::new("a", MarketSnapshot::with_odds(1.8)),
        MatchRequest::new("b", MarketSnapshot::with_odds(3.0)),
    ];
    let evals = svc.evaluate_batch(&requests).await;

    let mut tracker = CalibrationTracker::new(&cfg.calibration);
    tracker.record_evaluation(&evals[0], true);
    tracker.record_evaluation(&evals[1], false);
    let report = tracker.report();

    // a: consensus + 2 engines; b: consensus + poisson (lstm substituted).
    assert_eq!(report.total_predictions, 5);
    assert!(report.source_brier.contains_key(CONSENSUS_SOURCE));
    assert!(report.source_brier.contains_key("lstm"));
    assert!(report.overall_brier < 0.25);
}
