//! Core engine: one trading cycle, gate → lock → select → run → analyse →
//! retain.

pub mod alerts;
pub mod analysis_loop;
pub mod gate;
pub mod journal;
pub mod lock;
pub mod pacer;
pub mod retention;
pub mod runner;
pub mod selector;

use chrono::{DateTime, Utc};
use serde_json::json;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::{AlertsConfig, AppConfig, RetentionConfig};
use crate::storage::{CycleStore, LogSink};
use crate::strategy::{RunSummary, StrategyFactory, StrategyVariant};
use crate::types::{CycleError, SkipReason};
use alerts::AlertGate;
use analysis_loop::{AnalysisReport, BoundedAnalysisLoop, LoopConfig};
use gate::{ConfigGate, GateDecision};
use journal::{category, CycleLogger};
use lock::{LockAttempt, RunLock};
use pacer::Pacer;
use retention::{RetentionReport, RetentionSweep};
use runner::CycleRunner;
use selector::StrategySelector;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Completed(CycleReport),
    Skipped(SkipReason),
}

impl CycleOutcome {
    /// Completed and skipped cycles both report success to the scheduler.
    pub fn exit_code(&self) -> u8 {
        0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub cycle_id: String,
    pub strategy: String,
    pub variant: StrategyVariant,
    pub degraded: bool,
    /// "enhanced" or "basic".
    pub analyzer: &'static str,
    pub summary: RunSummary,
    /// `None` when AI was off.
    pub analysis: Option<AnalysisReport>,
    pub retention: RetentionReport,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cycle {} via {} ({})", self.cycle_id, self.strategy, self.variant)?;
        if self.degraded {
            write!(f, " [degraded]")?;
        }
        match &self.analysis {
            Some(a) => {
                write!(
                    f,
                    ": analyzed {}/{} (skipped {}, failed {}, slow {})",
                    a.analyzed, a.eligible, a.skipped, a.failed, a.slow
                )?;
                if a.cap_reached {
                    write!(f, " capped")?;
                }
                write!(f, ", alerts {} created {} failed", a.alerts.created, a.alerts.failed)?;
            }
            None => write!(f, ": analysis off")?,
        }
        write!(
            f,
            ", retention deleted {} ({} failed), {}ms",
            self.retention.total_deleted(),
            self.retention.failures(),
            (self.finished_at - self.started_at).num_milliseconds()
        )
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub require_ai: bool,
    pub try_enhanced: bool,
    pub analysis: LoopConfig,
    pub alerts: AlertsConfig,
    pub retention: RetentionConfig,
    pub lock_file: PathBuf,
    /// A holder running longer than this is logged as overdue.
    pub lock_stale_after: Duration,
}

impl OrchestratorConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            require_ai: config.cycle.require_ai,
            try_enhanced: config.bridge.enhanced,
            analysis: LoopConfig::from_cycle(&config.cycle),
            alerts: config.alerts.clone(),
            retention: config.retention.clone(),
            lock_file: PathBuf::from(&config.cycle.lock_file),
            lock_stale_after: config.cycle.lock_stale_after(),
        }
    }
}

pub struct Orchestrator<S: CycleStore> {
    store: Arc<S>,
    factory: Box<dyn StrategyFactory>,
    pacer: Box<dyn Pacer>,
    config: OrchestratorConfig,
}

impl<S: CycleStore> Orchestrator<S> {
    pub fn new(
        store: Arc<S>,
        factory: Box<dyn StrategyFactory>,
        pacer: Box<dyn Pacer>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            factory,
            pacer,
            config,
        }
    }

    /// Run exactly one cycle. `Ok` covers both completion and intentional
    /// skips; any `Err` is fatal for this invocation.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, CycleError> {
        let store = self.store.as_ref();
        let cycle_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let log = CycleLogger::new(store as &dyn LogSink, cycle_id.clone());

        store
            .ping()
            .await
            .map_err(|e| CycleError::Connectivity(e.to_string()))?;
        let settings = store
            .get_settings()
            .await
            .map_err(|e| CycleError::Connectivity(format!("settings: {e}")))?;

        let gate = ConfigGate::new(self.config.require_ai);
        let settings = match gate.evaluate(settings.as_ref()) {
            Ok(GateDecision::Allow(settings)) => settings,
            Ok(GateDecision::Deny(reason)) => {
                let context = json!({ "reason": format!("{reason:?}") });
                let message = format!("Cycle skipped: {reason}");
                if reason == SkipReason::EmergencyStop {
                    log.warning(category::SCHEDULER, &message, context).await;
                } else {
                    log.info(category::SCHEDULER, &message, context).await;
                }
                return Ok(CycleOutcome::Skipped(reason));
            }
            Err(e) => {
                log.error(category::SCHEDULER, "Cycle aborted", json!({ "error": e.to_string() }))
                    .await;
                return Err(e);
            }
        };

        let _lock = match RunLock::acquire(&self.config.lock_file, &cycle_id) {
            Ok(LockAttempt::Acquired(lock)) => lock,
            Ok(LockAttempt::Held(holder)) => {
                let message = "Cycle skipped: another cycle is still running";
                match holder {
                    Some(holder) => {
                        let overdue = holder.age(Utc::now()) >= self.config.lock_stale_after;
                        let context = json!({
                            "holder_pid": holder.pid,
                            "holder_cycle_id": holder.cycle_id,
                            "held_since": holder.acquired_at.to_rfc3339(),
                            "overdue": overdue,
                        });
                        if overdue {
                            log.warning(category::SCHEDULER, message, context).await;
                        } else {
                            log.info(category::SCHEDULER, message, context).await;
                        }
                    }
                    None => log.info(category::SCHEDULER, message, json!({})).await,
                }
                return Ok(CycleOutcome::Skipped(SkipReason::CycleInProgress));
            }
            Err(e) => {
                let err = CycleError::Configuration(format!("run lock: {e:#}"));
                log.error(category::SCHEDULER, "Cycle aborted", json!({ "error": err.to_string() }))
                    .await;
                return Err(err);
            }
        };

        log.info(
            category::SCHEDULER,
            "Cycle started",
            json!({
                "ai_enabled": settings.ai_enabled,
                "spot": settings.spot_trading_enabled,
                "futures": settings.futures_trading_enabled,
            }),
        )
        .await;

        let selection = StrategySelector::new(self.factory.as_ref(), self.config.try_enhanced)
            .select(&log)
            .await?;

        let analysis_loop = BoundedAnalysisLoop::new(
            &selection.analyzer,
            self.pacer.as_ref(),
            AlertGate::new(&self.config.alerts),
            store,
            self.config.analysis,
        );
        let runner = CycleRunner::new(selection.strategy.as_ref(), store, store);
        let run = match runner.run(settings, &analysis_loop, &log).await {
            Ok(run) => run,
            Err(e) => {
                if !matches!(e, CycleError::StrategyRun { .. }) {
                    log.error(category::SCHEDULER, "Cycle aborted", json!({ "error": e.to_string() }))
                        .await;
                }
                return Err(e);
            }
        };

        let retention = RetentionSweep::from_config(&self.config.retention)
            .run(store, &log, Utc::now())
            .await;

        let report = CycleReport {
            cycle_id,
            strategy: selection.strategy.name().to_string(),
            variant: selection.variant,
            degraded: selection.degraded,
            analyzer: selection.analyzer.variant(),
            summary: run.summary,
            analysis: run.analysis,
            retention,
            started_at,
            finished_at: Utc::now(),
        };

        log.info(category::SCHEDULER, "Cycle complete", json!({ "summary": report.to_string() }))
            .await;
        info!(%report, "Cycle finished");
        Ok(CycleOutcome::Completed(report))
    }
}
