//! TRADECYCLE: single-shot trading cycle orchestrator
//!
//! Entry point for the external scheduler. Loads configuration, initialises
//! structured logging, opens the store and runs exactly one cycle.
//! Exit status: 0 when the cycle completed or was intentionally skipped,
//! 1 on any fatal error.

use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use tradecycle::config::{self, AppConfig};
use tradecycle::engine::pacer::FixedIntervalPacer;
use tradecycle::engine::{CycleOutcome, Orchestrator, OrchestratorConfig};
use tradecycle::storage::SqliteStore;
use tradecycle::strategy::bridge::BridgeStrategyFactory;
use tradecycle::types::CycleError;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging();

    match run().await {
        Ok(outcome) => {
            match &outcome {
                CycleOutcome::Completed(report) => info!(cycle_id = %report.cycle_id, "Cycle completed"),
                CycleOutcome::Skipped(reason) => info!(%reason, "Cycle skipped"),
            }
            ExitCode::from(outcome.exit_code())
        }
        Err(e) => {
            error!(error = %e, "Cycle failed");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<CycleOutcome, CycleError> {
    let path = std::env::var("TRADECYCLE_CONFIG")
        .unwrap_or_else(|_| config::DEFAULT_CONFIG_PATH.to_string());
    let cfg = AppConfig::load(&path).map_err(|e| CycleError::Configuration(format!("{e:#}")))?;

    info!(
        agent_name = %cfg.agent.name,
        bridge = %cfg.bridge.base_url,
        max_pairs = cfg.cycle.max_pairs,
        "TRADECYCLE starting"
    );

    let store = SqliteStore::connect(&cfg.database_url())
        .await
        .map_err(|e| CycleError::Connectivity(e.to_string()))?;

    let orchestrator = Orchestrator::new(
        Arc::new(store),
        Box::new(BridgeStrategyFactory::new(cfg.bridge.clone())),
        Box::new(FixedIntervalPacer::new(cfg.cycle.pair_delay())),
        OrchestratorConfig::from_app(&cfg),
    );

    orchestrator.run_cycle().await
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tradecycle=info"));

    let json_logging = std::env::var("TRADECYCLE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
