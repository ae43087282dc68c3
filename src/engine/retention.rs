//! Retention sweep over transient records.
//!
//! Policies are applied independently; one failing never stops the others,
//! and the sweep itself never fails the cycle.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use super::journal::{category, CycleLogger};
use crate::config::RetentionConfig;
use crate::storage::{RecordClass, RetentionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionRule {
    /// Delete rows whose own expiry has passed.
    Expired,
    /// Delete rows created longer ago than this.
    MaxAge(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub class: RecordClass,
    pub rule: RetentionRule,
}

/// Saturates instead of panicking on windows beyond chrono's range.
fn days(n: i64) -> Duration {
    Duration::try_days(n).unwrap_or(Duration::MAX)
}

/// Cache by expiry, then read notifications, routine logs and critical
/// logs by age.
pub fn default_policies(config: &RetentionConfig) -> Vec<RetentionPolicy> {
    vec![
        RetentionPolicy {
            class: RecordClass::ExpiredCache,
            rule: RetentionRule::Expired,
        },
        RetentionPolicy {
            class: RecordClass::ReadNotifications,
            rule: RetentionRule::MaxAge(days(config.read_notification_days)),
        },
        RetentionPolicy {
            class: RecordClass::RoutineLogs,
            rule: RetentionRule::MaxAge(days(config.log_days)),
        },
        RetentionPolicy {
            class: RecordClass::CriticalLogs,
            rule: RetentionRule::MaxAge(days(config.critical_log_days)),
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyOutcome {
    Deleted(u64),
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub outcomes: Vec<(RecordClass, PolicyOutcome)>,
}

impl RetentionReport {
    pub fn total_deleted(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|(_, outcome)| match outcome {
                PolicyOutcome::Deleted(n) => *n,
                PolicyOutcome::Failed(_) => 0,
            })
            .sum()
    }

    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, PolicyOutcome::Failed(_)))
            .count()
    }
}

pub struct RetentionSweep {
    policies: Vec<RetentionPolicy>,
}

impl RetentionSweep {
    pub fn new(policies: Vec<RetentionPolicy>) -> Self {
        Self { policies }
    }

    pub fn from_config(config: &RetentionConfig) -> Self {
        Self::new(default_policies(config))
    }

    pub async fn run(
        &self,
        store: &dyn RetentionStore,
        log: &CycleLogger<'_>,
        now: DateTime<Utc>,
    ) -> RetentionReport {
        let mut report = RetentionReport::default();

        for policy in &self.policies {
            let result = match policy.rule {
                RetentionRule::Expired => store.delete_expired(policy.class, now).await,
                RetentionRule::MaxAge(age) => match now.checked_sub_signed(age) {
                    Some(cutoff) => store.delete_older_than(policy.class, cutoff).await,
                    // Nothing can be older than the earliest representable time.
                    None => Ok(0),
                },
            };

            let outcome = match result {
                Ok(deleted) => PolicyOutcome::Deleted(deleted),
                Err(e) => {
                    log.warning(
                        category::RETENTION,
                        "Retention policy failed",
                        json!({ "class": policy.class.to_string(), "error": e.to_string() }),
                    )
                    .await;
                    PolicyOutcome::Failed(e.to_string())
                }
            };
            report.outcomes.push((policy.class, outcome));
        }

        log.info(
            category::RETENTION,
            "Retention sweep finished",
            json!({
                "deleted": report.total_deleted(),
                "failed_policies": report.failures(),
            }),
        )
        .await;
        report
    }
}
