//! Cycle runner: one strategy execution, then the analysis loop when AI
//! signal generation is on.

use serde_json::json;

use super::alerts::notify_cycle_failure;
use super::analysis_loop::{AnalysisReport, BoundedAnalysisLoop};
use super::journal::{category, CycleLogger};
use crate::storage::{InstrumentRegistry, NotificationSink};
use crate::strategy::{ExecutionStrategy, RunSummary};
use crate::types::{CycleError, OperationalSettings};

#[derive(Debug, Clone, PartialEq)]
pub struct RunnerReport {
    pub summary: RunSummary,
    /// `None` when AI was off for this cycle.
    pub analysis: Option<AnalysisReport>,
}

pub struct CycleRunner<'a> {
    strategy: &'a dyn ExecutionStrategy,
    registry: &'a dyn InstrumentRegistry,
    notifications: &'a dyn NotificationSink,
}

impl<'a> CycleRunner<'a> {
    pub fn new(
        strategy: &'a dyn ExecutionStrategy,
        registry: &'a dyn InstrumentRegistry,
        notifications: &'a dyn NotificationSink,
    ) -> Self {
        Self {
            strategy,
            registry,
            notifications,
        }
    }

    pub async fn run(
        &self,
        settings: &OperationalSettings,
        analysis: &BoundedAnalysisLoop<'_>,
        log: &CycleLogger<'_>,
    ) -> Result<RunnerReport, CycleError> {
        let summary = match self.strategy.execute(settings).await {
            Ok(summary) => summary,
            Err(e) => {
                let err = CycleError::StrategyRun {
                    strategy: self.strategy.name().to_string(),
                    message: format!("{e:#}"),
                };
                log.error(
                    category::STRATEGY,
                    "Strategy run failed",
                    json!({ "strategy": self.strategy.name(), "error": format!("{e:#}") }),
                )
                .await;
                notify_cycle_failure(self.notifications, log, &err).await;
                return Err(err);
            }
        };

        log.info(
            category::STRATEGY,
            "Strategy run complete",
            json!({
                "strategy": self.strategy.name(),
                "orders_placed": summary.orders_placed,
                "positions_closed": summary.positions_closed,
                "note": summary.note,
            }),
        )
        .await;

        if !settings.ai_enabled {
            log.info(category::AI, "AI signal generation disabled, skipping analysis", json!({}))
                .await;
            return Ok(RunnerReport {
                summary,
                analysis: None,
            });
        }

        let instruments = self
            .registry
            .list_enabled_instruments()
            .await
            .map_err(|e| CycleError::Connectivity(format!("instrument registry: {e}")))?;

        let report = analysis.run(instruments, settings, log).await;
        Ok(RunnerReport {
            summary,
            analysis: Some(report),
        })
    }
}
