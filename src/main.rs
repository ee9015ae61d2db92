//! TIPFUSION — multi-engine probability fusion and stake sizing.
//!
//! Entry point. Loads configuration, initialises structured logging, reads
//! a snapshot of engine outputs, evaluates every match in it, and prints
//! the evaluations as JSON on stdout.

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

use tipfusion::backtest::calibration::CalibrationTracker;
use tipfusion::config::AppConfig;
use tipfusion::engine::service::FusionService;
use tipfusion::engine::snapshot::Snapshot;

const DEFAULT_BANKROLL: f64 = 1000.0;

/// Fuse engine predictions into priced, staked tips.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON snapshot with matches and per-engine outputs.
    snapshot: PathBuf,

    /// TOML configuration; defaults are used when the file is absent.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Bankroll for stake amounts (overrides the snapshot's).
    #[arg(long)]
    bankroll: Option<f64>,

    /// Pretty-print the JSON output.
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let args = Args::parse();
    init_logging();

    let cfg = if args.config.exists() {
        AppConfig::load(&args.config)?
    } else {
        warn!(path = %args.config.display(), "Config file not found, using defaults");
        AppConfig::default()
    };

    let snapshot = Snapshot::load(&args.snapshot)?;
    let bankroll = args
        .bankroll
        .or(snapshot.bankroll)
        .unwrap_or(DEFAULT_BANKROLL);

    info!(
        matches = snapshot.matches.len(),
        engines = snapshot.engines.len(),
        bankroll = format!("${:.2}", bankroll),
        "TIPFUSION starting up"
    );

    let service = FusionService::new(&cfg, snapshot.registry()?, bankroll)
        .context("Failed to build fusion service")?;
    let evaluations = service.evaluate_batch(&snapshot.matches).await;

    let ranked = service.orchestrator().edge_evaluator().rank(&evaluations);
    for (i, eval) in ranked.iter().enumerate() {
        info!(rank = i + 1, "{eval}");
    }
    let ranked_ids: Vec<&str> = ranked.iter().map(|e| e.match_id.as_str()).collect();

    let mut output = json!({
        "evaluations": evaluations,
        "ranked": ranked_ids,
    });

    if !snapshot.outcomes.is_empty() {
        let mut tracker = CalibrationTracker::new(&cfg.calibration);
        for eval in &evaluations {
            if let Some(&won) = snapshot.outcomes.get(&eval.match_id) {
                tracker.record_evaluation(eval, won);
            }
        }
        let report = tracker.report();
        info!(
            predictions = report.total_predictions,
            brier = format!("{:.4}", report.overall_brier),
            ece = format!("{:.4}", report.ece),
            diagnosis = ?report.diagnosis,
            "Calibration report"
        );
        output["calibration"] = serde_json::to_value(&report)?;
    }

    let rendered = if args.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{rendered}");

    Ok(())
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logs go to stderr so stdout stays machine-readable.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tipfusion=info"));

    let json_logging = std::env::var("TIPFUSION_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }
}
