//! Alert gate: turns high-confidence analysis results into user
//! notifications.

use chrono::Utc;
use serde_json::json;

use super::journal::{category, CycleLogger};
use crate::config::AlertsConfig;
use crate::storage::NotificationSink;
use crate::types::{
    AnalysisResult, CycleError, Notification, NotificationCategory, NotificationKind, Priority,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertOutcome {
    Created(i64),
    BelowThreshold,
    /// The sink rejected the write; already logged.
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertTally {
    pub created: u32,
    pub failed: u32,
    pub below_threshold: u32,
}

impl AlertTally {
    pub fn record(&mut self, outcome: AlertOutcome) {
        match outcome {
            AlertOutcome::Created(_) => self.created += 1,
            AlertOutcome::Failed => self.failed += 1,
            AlertOutcome::BelowThreshold => self.below_threshold += 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AlertGate {
    notify_threshold: f64,
    high_priority_threshold: f64,
}

impl AlertGate {
    pub fn new(config: &AlertsConfig) -> Self {
        Self {
            notify_threshold: config.notify_threshold,
            high_priority_threshold: config.high_priority_threshold,
        }
    }

    /// Both thresholds are strict: exactly 0.8 is not notified, exactly
    /// 0.9 is NORMAL.
    pub fn priority_for(&self, confidence: f64) -> Option<Priority> {
        if confidence > self.high_priority_threshold {
            Some(Priority::High)
        } else if confidence > self.notify_threshold {
            Some(Priority::Normal)
        } else {
            None
        }
    }

    pub fn build(&self, result: &AnalysisResult) -> Option<Notification> {
        let priority = self.priority_for(result.confidence)?;
        let strength = result
            .strength
            .map(|s| s.to_string())
            .unwrap_or_else(|| "UNRATED".to_string());

        Some(Notification {
            kind: NotificationKind::Signal,
            category: NotificationCategory::Ai,
            title: format!("{} signal for {}", result.signal, result.symbol),
            message: format!(
                "{} {} ({}) with {:.1}% confidence on {}",
                result.symbol,
                result.signal,
                strength,
                result.confidence * 100.0,
                result.trading_type,
            ),
            priority,
            data: json!({
                "symbol": result.symbol,
                "signal": result.signal,
                "confidence": result.confidence,
                "strength": result.strength,
                "trading_type": result.trading_type,
            }),
            created_at: Utc::now(),
            read_at: None,
        })
    }

    pub async fn notify(
        &self,
        sink: &dyn NotificationSink,
        log: &CycleLogger<'_>,
        result: &AnalysisResult,
    ) -> AlertOutcome {
        let Some(notification) = self.build(result) else {
            return AlertOutcome::BelowThreshold;
        };

        match sink.create(&notification).await {
            Ok(id) => {
                log.info(
                    category::AI,
                    "Signal notification created",
                    json!({
                        "notification_id": id,
                        "symbol": result.symbol,
                        "priority": notification.priority.as_str(),
                    }),
                )
                .await;
                AlertOutcome::Created(id)
            }
            Err(e) => {
                log.warning(
                    category::AI,
                    "Failed to create signal notification",
                    json!({ "symbol": result.symbol, "error": e.to_string() }),
                )
                .await;
                AlertOutcome::Failed
            }
        }
    }
}

/// Best-effort URGENT notification for a fatal cycle error. Returns whether
/// it was stored.
pub async fn notify_cycle_failure(
    sink: &dyn NotificationSink,
    log: &CycleLogger<'_>,
    error: &CycleError,
) -> bool {
    let notification = Notification {
        kind: NotificationKind::Error,
        category: NotificationCategory::System,
        title: "Trading cycle failed".to_string(),
        message: error.to_string(),
        priority: Priority::Urgent,
        data: json!({ "cycle_id": log.cycle_id(), "error": error.to_string() }),
        created_at: Utc::now(),
        read_at: None,
    };

    match sink.create(&notification).await {
        Ok(_) => true,
        Err(e) => {
            log.warning(
                category::SCHEDULER,
                "Failed to create failure notification",
                json!({ "error": e.to_string() }),
            )
            .await;
            false
        }
    }
}
