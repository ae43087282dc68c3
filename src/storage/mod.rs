//! Persistence layer.
//!
//! Defines the narrow collaborator traits the orchestrator talks to
//! (settings, instrument registry, notification and log sinks, retention)
//! and provides a SQLite implementation of all of them.

pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;

use crate::types::{LogEntry, Notification, OperationalSettings, TradableInstrument};

pub use sqlite::SqliteStore;

/// Persistence failures. Fatal only when they happen at cycle start.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid value in {table}: {message}")]
    Invalid {
        table: &'static str,
        message: String,
    },

    #[error("Retention rule not supported for {0}")]
    UnsupportedRule(RecordClass),
}

/// Classes of transient records subject to retention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordClass {
    /// API cache rows past their `expires_at`.
    ExpiredCache,
    /// Notifications the user has already read.
    ReadNotifications,
    /// Debug, info and warning log lines.
    RoutineLogs,
    /// Error and critical log lines.
    CriticalLogs,
}

impl fmt::Display for RecordClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordClass::ExpiredCache => write!(f, "expired cache"),
            RecordClass::ReadNotifications => write!(f, "read notifications"),
            RecordClass::RoutineLogs => write!(f, "routine logs"),
            RecordClass::CriticalLogs => write!(f, "critical logs"),
        }
    }
}

/// Read access to the operational settings record.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Cheap round-trip proving the store is reachable.
    async fn ping(&self) -> Result<(), StoreError>;

    /// The current settings, or `None` if the record was never created.
    async fn get_settings(&self) -> Result<Option<OperationalSettings>, StoreError>;
}

/// Read access to tradable instruments.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InstrumentRegistry: Send + Sync {
    /// Enabled instruments in registry order.
    async fn list_enabled_instruments(&self) -> Result<Vec<TradableInstrument>, StoreError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Persist a notification and return its id.
    async fn create(&self, notification: &Notification) -> Result<i64, StoreError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn append(&self, entry: &LogEntry) -> Result<(), StoreError>;
}

/// Deletion primitives used by the retention sweep.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RetentionStore: Send + Sync {
    /// Delete rows of `class` whose own expiry is before `now`.
    async fn delete_expired(
        &self,
        class: RecordClass,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Delete rows of `class` created before `cutoff`.
    async fn delete_older_than(
        &self,
        class: RecordClass,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}

/// Everything a cycle needs from persistence.
pub trait CycleStore:
    SettingsStore + InstrumentRegistry + NotificationSink + LogSink + RetentionStore
{
}

impl<T> CycleStore for T where
    T: SettingsStore + InstrumentRegistry + NotificationSink + LogSink + RetentionStore
{
}
