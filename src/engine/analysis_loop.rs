//! Bounded, paced, error-tolerant analysis over eligible instruments.

use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;

use super::alerts::{AlertGate, AlertTally};
use super::journal::{category, CycleLogger};
use super::pacer::Pacer;
use crate::analysis::Analyzer;
use crate::config::CycleConfig;
use crate::storage::NotificationSink;
use crate::types::{OperationalSettings, TradableInstrument};

#[derive(Debug, Clone, Copy)]
pub struct LoopConfig {
    pub max_pairs: usize,
    /// Calls slower than this are logged; they are never cancelled.
    pub slow_after: Duration,
}

impl LoopConfig {
    pub fn from_cycle(config: &CycleConfig) -> Self {
        Self {
            max_pairs: config.max_pairs,
            slow_after: config.slow_analysis(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisReport {
    /// Instruments left after the enabled/trading-type filter.
    pub eligible: usize,
    pub analyzed: usize,
    /// Timeouts and degenerate data.
    pub skipped: usize,
    pub failed: usize,
    pub slow: usize,
    pub cap_reached: bool,
    pub alerts: AlertTally,
}

impl AnalysisReport {
    pub fn attempted(&self) -> usize {
        self.analyzed + self.skipped + self.failed
    }
}

/// Enabled instruments whose market is open under `settings`, in
/// registry order.
pub fn eligible_instruments(
    instruments: Vec<TradableInstrument>,
    settings: &OperationalSettings,
) -> Vec<TradableInstrument> {
    instruments
        .into_iter()
        .filter(|i| i.enabled && settings.allows(i.trading_type))
        .collect()
}

pub struct BoundedAnalysisLoop<'a> {
    analyzer: &'a Analyzer,
    pacer: &'a dyn Pacer,
    alerts: AlertGate,
    notifications: &'a dyn NotificationSink,
    config: LoopConfig,
}

impl<'a> BoundedAnalysisLoop<'a> {
    pub fn new(
        analyzer: &'a Analyzer,
        pacer: &'a dyn Pacer,
        alerts: AlertGate,
        notifications: &'a dyn NotificationSink,
        config: LoopConfig,
    ) -> Self {
        Self {
            analyzer,
            pacer,
            alerts,
            notifications,
            config,
        }
    }

    pub async fn run(
        &self,
        instruments: Vec<TradableInstrument>,
        settings: &OperationalSettings,
        log: &CycleLogger<'_>,
    ) -> AnalysisReport {
        let eligible = eligible_instruments(instruments, settings);
        let mut report = AnalysisReport {
            eligible: eligible.len(),
            ..AnalysisReport::default()
        };

        log.info(
            category::AI,
            "Starting analysis",
            json!({
                "eligible": eligible.len(),
                "max_pairs": self.config.max_pairs,
                "analyzer": self.analyzer.variant(),
            }),
        )
        .await;

        for (index, instrument) in eligible.iter().enumerate() {
            if index >= self.config.max_pairs {
                report.cap_reached = true;
                log.info(
                    category::AI,
                    "Pair cap reached, remaining instruments deferred",
                    json!({
                        "max_pairs": self.config.max_pairs,
                        "remaining": eligible.len() - index,
                    }),
                )
                .await;
                break;
            }

            self.process(instrument, &mut report, log).await;
            self.pacer.pause().await;
        }

        report
    }

    async fn process(
        &self,
        instrument: &TradableInstrument,
        report: &mut AnalysisReport,
        log: &CycleLogger<'_>,
    ) {
        let started = Instant::now();
        let outcome = self.analyzer.analyze(instrument).await;
        let elapsed = started.elapsed();

        if elapsed > self.config.slow_after {
            report.slow += 1;
            log.warning(
                category::AI,
                "Slow analysis",
                json!({
                    "symbol": instrument.symbol,
                    "elapsed_ms": elapsed.as_millis() as u64,
                    "threshold_ms": self.config.slow_after.as_millis() as u64,
                }),
            )
            .await;
        }

        match outcome {
            Ok(result) => {
                report.analyzed += 1;
                log.info(
                    category::AI,
                    "Analysis complete",
                    json!({
                        "symbol": result.symbol,
                        "signal": result.signal.to_string(),
                        "confidence": result.confidence,
                        "trading_type": result.trading_type.as_str(),
                        "elapsed_ms": elapsed.as_millis() as u64,
                    }),
                )
                .await;
                let alert = self.alerts.notify(self.notifications, log, &result).await;
                report.alerts.record(alert);
            }
            Err(e) if e.kind.is_skip() => {
                report.skipped += 1;
                log.warning(
                    category::AI,
                    "Analysis skipped",
                    json!({
                        "symbol": instrument.symbol,
                        "reason": e.kind.to_string(),
                        "error": e.message,
                    }),
                )
                .await;
            }
            Err(e) => {
                report.failed += 1;
                log.error(
                    category::AI,
                    "Analysis failed",
                    json!({ "symbol": instrument.symbol, "error": e.message }),
                )
                .await;
            }
        }
    }
}
